use std::path::PathBuf;

// Config is the one place runtime settings are read from the environment.
// Everything downstream takes the typed struct instead of raw strings.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub addr: String,
    pub env_file: PathBuf,
    pub model: String,
    pub api_base: String,
    pub migrate_on_startup: bool,
    pub failure_ratio: f64,
    pub max_upload_bytes: usize,
}

pub const DEFAULT_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let data_dir = PathBuf::from(
            env_or_fallback("IMAGEBATCH_DATA_DIR", "DATA_DIR").unwrap_or_else(|| "data".to_string()),
        );

        // sqlite file lives next to the blobs unless told otherwise
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("sqlite://{}?mode=rwc", data_dir.join("jobs.db").display()));

        if !database_url.starts_with("sqlite:") {
            anyhow::bail!("DATABASE_URL must be a sqlite url, got {database_url}");
        }

        let addr =
            env_or_fallback("IMAGEBATCH_ADDR", "ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string());

        let env_file = PathBuf::from(
            env_or_fallback("IMAGEBATCH_ENV_FILE", "ENV_FILE")
                .unwrap_or_else(|| ".env.local".to_string()),
        );

        let model = env_or_fallback("IMAGEBATCH_MODEL", "GEMINI_MODEL")
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let api_base = env_or_fallback("IMAGEBATCH_API_BASE", "GEMINI_API_BASE")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let migrate_on_startup = env_bool("IMAGEBATCH_MIGRATE_ON_STARTUP").unwrap_or(true);

        let failure_ratio = std::env::var("IMAGEBATCH_FAILURE_RATIO")
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(1.0);

        let max_upload_bytes = env_or_fallback("IMAGEBATCH_MAX_UPLOAD_BYTES", "MAX_UPLOAD_BYTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10 * 1024 * 1024);

        Ok(Self {
            database_url,
            data_dir,
            addr,
            env_file,
            model,
            api_base,
            migrate_on_startup,
            failure_ratio,
            max_upload_bytes,
        })
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
