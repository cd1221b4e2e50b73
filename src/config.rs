use config::{Config as ConfigLoader, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub repo: RepoConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Full sqlx URL, e.g. "sqlite:reports.db?mode=rwc".
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepoConfig {
    /// Default base commit links are built under, used for projects
    /// without a repo of their own:
    /// {commit_base}/{project}/tree/{fetchhead}
    pub commit_base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub ttl_seconds: Option<u64>,
    pub capacity: Option<u64>,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        let s = ConfigLoader::builder()
            .add_source(File::with_name("config"))
            .build()?;

        s.try_deserialize()
    }
}
