//! Report submission: field validation, stage consistency,
//! identity resolution, signature verification, and the single insert.

use crate::auth::{self, ReportDigest, SignedFields};
use crate::db::{self, NewReport};
use crate::stages::{self, StageError, StageTimes};
use anyhow::Result;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use std::fmt;
use tracing::info;

/// The raw submission form exactly as a runner posts it. Every member
/// is optional here; `Submission::parse` is the single place that
/// decides what was missing or mistyped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSubmission {
    #[serde(rename = "project-name")]
    pub project_name: Option<String>,
    #[serde(rename = "report-start")]
    pub start: Option<String>,
    #[serde(rename = "report-env")]
    pub env: Option<String>,
    #[serde(rename = "report-depend")]
    pub depend: Option<String>,
    #[serde(rename = "report-build")]
    pub build: Option<String>,
    #[serde(rename = "report-test")]
    pub test: Option<String>,
    #[serde(rename = "report-install")]
    pub install: Option<String>,
    #[serde(rename = "report-distcheck")]
    pub distcheck: Option<String>,
    #[serde(rename = "report-log")]
    pub log: Option<String>,
    #[serde(rename = "report-fetchhead")]
    pub fetchhead: Option<String>,
    #[serde(rename = "report-unamem")]
    pub unamem: Option<String>,
    #[serde(rename = "report-unamen")]
    pub unamen: Option<String>,
    #[serde(rename = "report-unamer")]
    pub unamer: Option<String>,
    #[serde(rename = "report-unames")]
    pub unames: Option<String>,
    #[serde(rename = "report-unamev")]
    pub unamev: Option<String>,
    #[serde(rename = "user-apikey")]
    pub apikey: Option<String>,
    /// Out-of-band: not part of the signed payload.
    pub signature: Option<String>,
}

/// A submission after the validation pass: all fields present and
/// typed. `log` and `fetchhead` may be empty strings.
#[derive(Debug, Clone)]
pub struct Submission {
    pub project_name: String,
    pub stages: StageTimes,
    pub log: String,
    pub fetchhead: String,
    pub unamem: String,
    pub unamen: String,
    pub unamer: String,
    pub unames: String,
    pub unamev: String,
    pub apikey: i64,
    pub signature: String,
}

/// Why a submission was refused. Externally these are all the same
/// bodiless 403; only the logs tell them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MalformedRequest,
    InvalidStageSequence(StageError),
    UnknownProject,
    UnknownUser,
    BadSignature,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MalformedRequest => write!(f, "invalid request"),
            Rejection::InvalidStageSequence(e) => write!(f, "{e}"),
            Rejection::UnknownProject => write!(f, "invalid project"),
            Rejection::UnknownUser => write!(f, "invalid user"),
            Rejection::BadSignature => write!(f, "bad signature"),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Accepted { report_id: i64 },
    Rejected(Rejection),
}

fn required<'a>(field: &'a Option<String>) -> Result<&'a str, Rejection> {
    field.as_deref().ok_or(Rejection::MalformedRequest)
}

fn required_nonempty<'a>(field: &'a Option<String>) -> Result<&'a str, Rejection> {
    match field.as_deref() {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(Rejection::MalformedRequest),
    }
}

fn required_i64(field: &Option<String>) -> Result<i64, Rejection> {
    required_nonempty(field)?
        .parse()
        .map_err(|_| Rejection::MalformedRequest)
}

impl Submission {
    /// One exhaustive pass over the raw form. Any absent, empty-where-
    /// required, or unparseable field is a malformed request; so is a
    /// signature that is not exactly the digest's hex length.
    pub fn parse(raw: &RawSubmission) -> Result<Self, Rejection> {
        let signature = required_nonempty(&raw.signature)?;
        if signature.len() != auth::signature_len::<ReportDigest>() {
            return Err(Rejection::MalformedRequest);
        }

        Ok(Submission {
            project_name: required_nonempty(&raw.project_name)?.to_owned(),
            stages: StageTimes {
                start: required_i64(&raw.start)?,
                env: required_i64(&raw.env)?,
                depend: required_i64(&raw.depend)?,
                build: required_i64(&raw.build)?,
                test: required_i64(&raw.test)?,
                install: required_i64(&raw.install)?,
                distcheck: required_i64(&raw.distcheck)?,
            },
            log: required(&raw.log)?.to_owned(),
            fetchhead: required(&raw.fetchhead)?.to_owned(),
            unamem: required_nonempty(&raw.unamem)?.to_owned(),
            unamen: required_nonempty(&raw.unamen)?.to_owned(),
            unamer: required_nonempty(&raw.unamer)?.to_owned(),
            unames: required_nonempty(&raw.unames)?.to_owned(),
            unamev: required_nonempty(&raw.unamev)?.to_owned(),
            apikey: required_i64(&raw.apikey)?,
            signature: signature.to_owned(),
        })
    }

    fn signed_fields(&self) -> SignedFields<'_> {
        SignedFields {
            project_name: &self.project_name,
            start: self.stages.start,
            env: self.stages.env,
            depend: self.stages.depend,
            build: self.stages.build,
            test: self.stages.test,
            install: self.stages.install,
            distcheck: self.stages.distcheck,
            log: &self.log,
            fetchhead: &self.fetchhead,
            unamem: &self.unamem,
            unamen: &self.unamen,
            unamer: &self.unamer,
            unames: &self.unames,
            unamev: &self.unamev,
        }
    }

    /// Stable digest of the five machine-descriptor fields.
    pub fn unamehash(&self) -> String {
        auth::hex_digest::<ReportDigest>(
            format!(
                "{}|{}|{}|{}|{}",
                self.unamem, self.unamen, self.unamer, self.unames, self.unamev
            )
            .as_bytes(),
        )
    }

    /// As `unamehash`, but keyed under the owning project as well.
    pub fn projunamehash(&self, project_id: i64) -> String {
        auth::hex_digest::<ReportDigest>(
            format!(
                "{}|{}|{}|{}|{}|{}",
                project_id, self.unamem, self.unamen, self.unamer, self.unames, self.unamev
            )
            .as_bytes(),
        )
    }
}

/// Run the full ingestion sequence for one submission, short-
/// circuiting at the first failed check. `now` becomes the stored
/// acceptance time. `Err` is reserved for store failures; every
/// client-caused refusal comes back as `Outcome::Rejected`.
pub async fn process(pool: &Pool<Sqlite>, raw: &RawSubmission, now: i64) -> Result<Outcome> {
    let sub = match Submission::parse(raw) {
        Ok(sub) => sub,
        Err(rejection) => return Ok(Outcome::Rejected(rejection)),
    };

    if let Err(e) = stages::validate(&sub.stages, &sub.log) {
        return Ok(Outcome::Rejected(Rejection::InvalidStageSequence(e)));
    }

    let Some(project) = db::get_project_by_name(pool, &sub.project_name).await? else {
        return Ok(Outcome::Rejected(Rejection::UnknownProject));
    };

    let Some(user) = db::get_user_by_apikey(pool, sub.apikey).await? else {
        return Ok(Outcome::Rejected(Rejection::UnknownUser));
    };

    if !auth::verify::<ReportDigest>(&sub.signed_fields(), &user.apisecret, &sub.signature) {
        return Ok(Outcome::Rejected(Rejection::BadSignature));
    }

    let report = NewReport {
        project_id: project.id,
        user_id: user.id,
        start: sub.stages.start,
        env: sub.stages.env,
        depend: sub.stages.depend,
        build: sub.stages.build,
        test: sub.stages.test,
        install: sub.stages.install,
        distcheck: sub.stages.distcheck,
        ctime: now,
        log: sub.log.clone(),
        unamehash: sub.unamehash(),
        projunamehash: sub.projunamehash(project.id),
        unamem: sub.unamem,
        unamen: sub.unamen,
        unamer: sub.unamer,
        unames: sub.unames,
        unamev: sub.unamev,
        fetchhead: sub.fetchhead,
    };
    let report_id = db::insert_report(pool, &report).await?;

    info!(email = %user.email, project = %project.name, "report submitted");
    Ok(Outcome::Accepted { report_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawSubmission {
        RawSubmission {
            project_name: Some("libfoo".into()),
            start: Some("100".into()),
            env: Some("110".into()),
            depend: Some("120".into()),
            build: Some("130".into()),
            test: Some("140".into()),
            install: Some("150".into()),
            distcheck: Some("160".into()),
            log: Some(String::new()),
            fetchhead: Some("deadbeef".into()),
            unamem: Some("amd64".into()),
            unamen: Some("box".into()),
            unamer: Some("14.1".into()),
            unames: Some("FreeBSD".into()),
            unamev: Some("FreeBSD 14.1-RELEASE".into()),
            apikey: Some("12345".into()),
            signature: Some("0".repeat(32)),
        }
    }

    #[test]
    fn complete_form_parses() {
        let sub = Submission::parse(&raw()).unwrap();
        assert_eq!(sub.project_name, "libfoo");
        assert_eq!(sub.stages.distcheck, 160);
        assert_eq!(sub.apikey, 12345);
    }

    #[test]
    fn missing_field_is_malformed() {
        let mut form = raw();
        form.unamer = None;
        assert_eq!(
            Submission::parse(&form).unwrap_err(),
            Rejection::MalformedRequest
        );
    }

    #[test]
    fn empty_required_string_is_malformed() {
        let mut form = raw();
        form.project_name = Some(String::new());
        assert_eq!(
            Submission::parse(&form).unwrap_err(),
            Rejection::MalformedRequest
        );
    }

    #[test]
    fn unparseable_timestamp_is_malformed() {
        let mut form = raw();
        form.build = Some("soon".into());
        assert_eq!(
            Submission::parse(&form).unwrap_err(),
            Rejection::MalformedRequest
        );
    }

    #[test]
    fn short_signature_is_malformed() {
        let mut form = raw();
        form.signature = Some("abc123".into());
        assert_eq!(
            Submission::parse(&form).unwrap_err(),
            Rejection::MalformedRequest
        );
    }

    #[test]
    fn empty_log_and_fetchhead_are_allowed() {
        let mut form = raw();
        form.log = Some(String::new());
        form.fetchhead = Some(String::new());
        assert!(Submission::parse(&form).is_ok());
    }

    #[test]
    fn machine_hashes_are_stable_and_distinct() {
        let sub = Submission::parse(&raw()).unwrap();
        assert_eq!(sub.unamehash(), sub.unamehash());
        assert_ne!(sub.unamehash(), sub.projunamehash(1));
        assert_ne!(sub.projunamehash(1), sub.projunamehash(2));
    }
}
