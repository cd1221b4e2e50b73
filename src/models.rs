use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One accepted CI run, joined with its project's name and repository
/// base. Append-only: never updated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Report {
    pub id: i64,
    pub project_id: i64,
    pub project_name: String,
    pub project_repo: String,
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

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub repo: String,
}

/// A CI-runner identity. The apisecret never leaves the server; the
/// email is used only when logging accepted submissions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub apikey: i64,
    pub apisecret: String,
    pub email: String,
}
