pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod ingest;
pub mod models;
pub mod stages;
pub mod state;
