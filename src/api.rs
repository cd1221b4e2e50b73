use crate::dashboard;
use crate::db::{self, ReportFilter};
use crate::ingest::{self, Outcome};
use crate::models::Report;
use crate::state::AppState;
use axum::{
    extract::{Form, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::TimeZone;
use serde::{Deserialize, Serialize};

/// Lines of log kept in the single-report detail view.
const LOG_TAIL_LINES: usize = 17;
/// Short form of a commit hash in human-facing fields.
const COMMIT_SHORT_LEN: usize = 7;

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/reports", get(list_reports))
        .route("/api/report/:id", get(get_report))
        .route("/api/report/:id/log", get(get_report_log))
        .with_state(state)
}

/// Report ingestion. The response never says why a submission was
/// refused: every client-caused failure is the same bodiless 403, and
/// only the logs carry the cause. Store failures alone are 503.
async fn submit(
    State(state): State<AppState>,
    form: Result<Form<ingest::RawSubmission>, axum::extract::rejection::FormRejection>,
) -> StatusCode {
    let Ok(Form(raw)) = form else {
        tracing::warn!("invalid request");
        return StatusCode::FORBIDDEN;
    };

    let now = chrono::Utc::now().timestamp();
    match ingest::process(&state.db, &raw, now).await {
        Ok(Outcome::Accepted { .. }) => StatusCode::CREATED,
        Ok(Outcome::Rejected(rejection)) => {
            tracing::warn!("{rejection}");
            StatusCode::FORBIDDEN
        }
        Err(e) => {
            tracing::error!("report insert failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardRowResponse {
    pub project_name: String,
    pub newest_commit: String,
    pub newest_commit_short: String,
    pub commit_url: Option<String>,
    pub newest_ctime: i64,
    pub newest_ctime_rfc3339: String,
    pub finished: u64,
    pub success: u64,
    pub pending: u64,
    pub success_rate: u64,
    pub finished_rate: u64,
    pub pass: bool,
}

async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<Json<Vec<DashboardRowResponse>>, StatusCode> {
    let key = "dashboard".to_string();
    if let Some(cached) = state.cache.get(&key) {
        if let Ok(v) = serde_json::from_value::<Vec<DashboardRowResponse>>(cached.clone()) {
            return Ok(Json(v));
        }
    }

    let reports = db::list_reports(&state.db, &ReportFilter::All)
        .await
        .map_err(|e| {
            tracing::error!("dashboard query failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    let base = &state.config.repo.commit_base;
    let rows: Vec<DashboardRowResponse> = dashboard::aggregate(&reports)
        .into_iter()
        .map(|row| DashboardRowResponse {
            newest_commit_short: short_commit(&row.fetchhead),
            commit_url: commit_url(
                pick_base(base, &row.project_repo),
                &row.project_name,
                &row.fetchhead,
            ),
            newest_ctime_rfc3339: rfc3339(row.ctime),
            project_name: row.project_name,
            newest_commit: row.fetchhead,
            newest_ctime: row.ctime,
            finished: row.finished,
            success: row.success,
            pending: row.pending,
            success_rate: row.success_rate,
            finished_rate: row.finished_rate,
            pass: row.pass,
        })
        .collect();

    if let Ok(val) = serde_json::to_value(&rows) {
        state.cache.insert(key, val).await;
    }

    Ok(Json(rows))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportQuery {
    /// Project name: the per-project dashboard.
    project: Option<String>,
    /// Machine hash: the per-machine dashboard.
    machine: Option<String>,
    /// Any epoch within the wanted UTC day.
    date: Option<i64>,
}

/// Per-stage elapsed seconds, measured against the preceding stage.
/// A stage that was never reached has no entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOffsets {
    pub env: Option<i64>,
    pub depend: Option<i64>,
    pub build: Option<i64>,
    pub test: Option<i64>,
    pub install: Option<i64>,
    pub distcheck: Option<i64>,
}

fn offset(prev: i64, given: i64) -> Option<i64> {
    (given != 0).then(|| given - prev)
}

impl StageOffsets {
    fn from_report(r: &Report) -> Self {
        StageOffsets {
            env: offset(r.start, r.env),
            depend: offset(r.env, r.depend),
            build: offset(r.depend, r.build),
            test: offset(r.build, r.test),
            install: offset(r.test, r.install),
            distcheck: offset(r.install, r.distcheck),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: i64,
    pub id_padded: String,
    pub project_name: String,
    pub success: bool,
    pub commit: String,
    pub commit_short: String,
    pub commit_url: Option<String>,
    pub start: i64,
    pub start_rfc3339: String,
    pub ctime: i64,
    pub system: String,
    pub machine_hash: String,
    pub stages: StageOffsets,
    /// True only in the per-project view for reports built against a
    /// commit older than the project's newest.
    pub stale: bool,
}

fn summarize(r: &Report, base: &str, newest: Option<&str>) -> ReportSummary {
    ReportSummary {
        id: r.id,
        id_padded: format!("{:04}", r.id),
        project_name: r.project_name.clone(),
        success: r.distcheck != 0,
        commit_short: short_commit(&r.fetchhead),
        commit_url: commit_url(
            pick_base(base, &r.project_repo),
            &r.project_name,
            &r.fetchhead,
        ),
        commit: r.fetchhead.clone(),
        start: r.start,
        start_rfc3339: rfc3339(r.start),
        ctime: r.ctime,
        system: format!("{} {} {}", r.unames, r.unamer, r.unamem),
        machine_hash: r.unamehash.clone(),
        stages: StageOffsets::from_report(r),
        stale: newest.is_some_and(|hash| r.fetchhead != hash),
    }
}

/// Chronological report listings: per-project, per-machine, or per-day
/// depending on which query parameter is present. No filter lists the
/// full history. Empty result sets are empty arrays, never errors.
async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Vec<ReportSummary>>, StatusCode> {
    let filter = if let Some(name) = &query.project {
        ReportFilter::ProjectName(name.clone())
    } else if let Some(hash) = &query.machine {
        ReportFilter::MachineHash(hash.clone())
    } else if let Some(ts) = query.date {
        let day = ts - ts.rem_euclid(86400);
        ReportFilter::CtimeRange(day, day + 86400)
    } else {
        ReportFilter::All
    };

    let key = format!("reports:{filter:?}");
    if let Some(cached) = state.cache.get(&key) {
        if let Ok(v) = serde_json::from_value::<Vec<ReportSummary>>(cached.clone()) {
            return Ok(Json(v));
        }
    }

    let reports = db::list_reports(&state.db, &filter).await.map_err(|e| {
        tracing::error!("report listing failed: {e}");
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    // Only the per-project view marks rows stale against the newest
    // commit. Rows come back newest-first, so the first report with a
    // commit at all carries the newest one.
    let newest = match &filter {
        ReportFilter::ProjectName(_) => reports
            .iter()
            .find(|r| !r.fetchhead.is_empty())
            .map(|r| r.fetchhead.clone()),
        _ => None,
    };

    let base = &state.config.repo.commit_base;
    let rows: Vec<ReportSummary> = reports
        .iter()
        .map(|r| summarize(r, base, newest.as_deref()))
        .collect();

    if let Ok(val) = serde_json::to_value(&rows) {
        state.cache.insert(key, val).await;
    }

    Ok(Json(rows))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub summary: ReportSummary,
    pub system_version: String,
    pub log_tail: String,
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReportDetail>, StatusCode> {
    let report = db::get_report_by_id(&state.db, id)
        .await
        .map_err(|e| {
            tracing::error!("report lookup failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let base = &state.config.repo.commit_base;
    Ok(Json(ReportDetail {
        summary: summarize(&report, base, None),
        system_version: report.unamev.clone(),
        log_tail: log_tail(&report.log, LOG_TAIL_LINES),
    }))
}

async fn get_report_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, StatusCode> {
    let report = db::get_report_by_id(&state.db, id)
        .await
        .map_err(|e| {
            tracing::error!("report lookup failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        report.log,
    ))
}

/// A project's own hosting location wins over the configured default.
fn pick_base<'a>(default: &'a str, repo: &'a str) -> &'a str {
    if repo.is_empty() {
        default
    } else {
        repo
    }
}

fn short_commit(fetchhead: &str) -> String {
    fetchhead.chars().take(COMMIT_SHORT_LEN).collect()
}

fn commit_url(base: &str, project: &str, fetchhead: &str) -> Option<String> {
    if fetchhead.is_empty() {
        return None;
    }
    Some(format!("{base}/{project}/tree/{fetchhead}"))
}

fn rfc3339(ts: i64) -> String {
    chrono::Utc
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

fn log_tail(log: &str, lines: usize) -> String {
    let count = log.lines().count();
    if count <= lines {
        return log.to_string();
    }
    let mut tail: Vec<&str> = log.lines().skip(count - lines).collect();
    // Preserve a trailing newline the way the raw log carried one.
    if log.ends_with('\n') {
        tail.push("");
    }
    tail.join("\n")
}
