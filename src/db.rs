use crate::models::{Project, Report, User};
use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS project (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    repo TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY,
    apikey INTEGER NOT NULL UNIQUE,
    apisecret TEXT NOT NULL,
    email TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS report (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES project(id),
    user_id INTEGER NOT NULL REFERENCES user(id),
    start INTEGER NOT NULL,
    env INTEGER NOT NULL,
    depend INTEGER NOT NULL,
    build INTEGER NOT NULL,
    test INTEGER NOT NULL,
    install INTEGER NOT NULL,
    distcheck INTEGER NOT NULL,
    ctime INTEGER NOT NULL,
    log TEXT NOT NULL,
    unamem TEXT NOT NULL,
    unamen TEXT NOT NULL,
    unamer TEXT NOT NULL,
    unames TEXT NOT NULL,
    unamev TEXT NOT NULL,
    unamehash TEXT NOT NULL,
    projunamehash TEXT NOT NULL,
    fetchhead TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_report_project ON report(project_id, ctime DESC);
CREATE INDEX IF NOT EXISTS idx_report_unamehash ON report(unamehash, ctime DESC);
CREATE INDEX IF NOT EXISTS idx_report_ctime ON report(ctime DESC);
"#;

/// Columns every report query selects, with the owning project joined
/// in so rows map straight onto `models::Report`.
const REPORT_SELECT: &str = r#"
SELECT report.id, report.project_id,
       project.name AS project_name, project.repo AS project_repo,
       report.user_id, report.start, report.env, report.depend,
       report.build, report.test, report.install, report.distcheck,
       report.ctime, report.log,
       report.unamem, report.unamen, report.unamer, report.unames,
       report.unamev, report.unamehash, report.projunamehash,
       report.fetchhead
FROM report JOIN project ON project.id = report.project_id
WHERE 1=1
"#;

pub async fn init_db(url: &str) -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await?;

    sqlx::query(INIT_SQL).execute(&pool).await?;
    Ok(pool)
}

/// The ways the report history may be narrowed before iteration.
#[derive(Debug, Clone)]
pub enum ReportFilter {
    All,
    ProjectName(String),
    MachineHash(String),
    /// Acceptance time in `[from, to)`.
    CtimeRange(i64, i64),
    MostRecentPerProject,
}

/// Fetch reports matching `filter`, newest acceptance first.
pub async fn list_reports(pool: &Pool<Sqlite>, filter: &ReportFilter) -> Result<Vec<Report>> {
    let mut qb = sqlx::QueryBuilder::new(REPORT_SELECT);

    match filter {
        ReportFilter::All => {}
        ReportFilter::ProjectName(name) => {
            qb.push(" AND project.name = ");
            qb.push_bind(name.clone());
        }
        ReportFilter::MachineHash(hash) => {
            qb.push(" AND report.unamehash = ");
            qb.push_bind(hash.clone());
        }
        ReportFilter::CtimeRange(from, to) => {
            qb.push(" AND report.ctime >= ");
            qb.push_bind(*from);
            qb.push(" AND report.ctime < ");
            qb.push_bind(*to);
        }
        ReportFilter::MostRecentPerProject => {
            qb.push(
                " AND report.id = (SELECT r2.id FROM report r2 \
                 WHERE r2.project_id = report.project_id \
                 ORDER BY r2.ctime DESC, r2.id DESC LIMIT 1)",
            );
        }
    }

    qb.push(" ORDER BY report.ctime DESC, report.id DESC");

    let reports = qb.build_query_as::<Report>().fetch_all(pool).await?;
    Ok(reports)
}

pub async fn get_report_by_id(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Report>> {
    let mut qb = sqlx::QueryBuilder::new(REPORT_SELECT);
    qb.push(" AND report.id = ");
    qb.push_bind(id);
    let report = qb.build_query_as::<Report>().fetch_optional(pool).await?;
    Ok(report)
}

pub async fn get_project_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>("SELECT id, name, repo FROM project WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(project)
}

pub async fn get_user_by_apikey(pool: &Pool<Sqlite>, apikey: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, apikey, apisecret, email FROM user WHERE apikey = ?",
    )
    .bind(apikey)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Everything one accepted submission persists. `ctime` is the
/// server's acceptance time, never client-supplied.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub project_id: i64,
    pub user_id: i64,
    pub start: i64,
    pub env: i64,
    pub depend: i64,
    pub build: i64,
    pub test: i64,
    pub install: i64,
    pub distcheck: i64,
    pub ctime: i64,
    pub log: String,
    pub unamem: String,
    pub unamen: String,
    pub unamer: String,
    pub unames: String,
    pub unamev: String,
    pub unamehash: String,
    pub projunamehash: String,
    pub fetchhead: String,
}

pub async fn insert_report(pool: &Pool<Sqlite>, report: &NewReport) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO report (
            project_id, user_id,
            start, env, depend, build, test, install, distcheck,
            ctime, log,
            unamem, unamen, unamer, unames, unamev,
            unamehash, projunamehash, fetchhead
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(report.project_id)
    .bind(report.user_id)
    .bind(report.start)
    .bind(report.env)
    .bind(report.depend)
    .bind(report.build)
    .bind(report.test)
    .bind(report.install)
    .bind(report.distcheck)
    .bind(report.ctime)
    .bind(&report.log)
    .bind(&report.unamem)
    .bind(&report.unamen)
    .bind(&report.unamer)
    .bind(&report.unames)
    .bind(&report.unamev)
    .bind(&report.unamehash)
    .bind(&report.projunamehash)
    .bind(&report.fetchhead)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}
