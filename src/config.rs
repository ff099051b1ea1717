use std::path::PathBuf;

use crate::kt::config::EngineConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub file_logs: bool,
    pub log_dir: PathBuf,
    pub database_url: String,
    pub curriculum_path: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let file_logs = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let log_dir = std::env::var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./logs"));

        let database_url =
            std::env::var("KT_DATABASE_URL").unwrap_or_else(|_| default_database_url());

        let curriculum_path = std::env::var("KT_CURRICULUM_PATH").ok().map(PathBuf::from);

        Self {
            log_level,
            file_logs,
            log_dir,
            database_url,
            curriculum_path,
            engine: EngineConfig::from_env(),
        }
    }
}

pub fn default_sqlite_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tutor-core")
        .join("knowledge.db")
}

fn default_database_url() -> String {
    format!("sqlite:{}?mode=rwc", default_sqlite_path().display())
}
