use imagebatch::config::{Config, DEFAULT_API_BASE, DEFAULT_MODEL};
use serial_test::serial;

const VARS: &[&str] = &[
    "DATABASE_URL",
    "IMAGEBATCH_DATA_DIR",
    "DATA_DIR",
    "IMAGEBATCH_ADDR",
    "ADDR",
    "IMAGEBATCH_ENV_FILE",
    "ENV_FILE",
    "IMAGEBATCH_MODEL",
    "GEMINI_MODEL",
    "IMAGEBATCH_API_BASE",
    "GEMINI_API_BASE",
    "IMAGEBATCH_MIGRATE_ON_STARTUP",
    "IMAGEBATCH_FAILURE_RATIO",
    "IMAGEBATCH_MAX_UPLOAD_BYTES",
    "MAX_UPLOAD_BYTES",
];

fn clear_env() {
    for v in VARS {
        std::env::remove_var(v);
    }
}

#[test]
#[serial]
fn defaults() {
    clear_env();
    let cfg = Config::from_env().unwrap();

    assert_eq!(cfg.data_dir, std::path::PathBuf::from("data"));
    assert!(cfg.database_url.starts_with("sqlite://"));
    assert!(cfg.database_url.contains("jobs.db"));
    assert_eq!(cfg.addr, "127.0.0.1:3000");
    assert_eq!(cfg.env_file, std::path::PathBuf::from(".env.local"));
    assert_eq!(cfg.model, DEFAULT_MODEL);
    assert_eq!(cfg.api_base, DEFAULT_API_BASE);
    assert!(cfg.migrate_on_startup);
    assert_eq!(cfg.failure_ratio, 1.0);
    assert_eq!(cfg.max_upload_bytes, 10 * 1024 * 1024);
    assert_eq!(cfg.results_dir(), std::path::PathBuf::from("data/results"));
}

#[test]
#[serial]
fn primary_names_win_over_fallbacks() {
    clear_env();
    std::env::set_var("IMAGEBATCH_ADDR", "0.0.0.0:8080");
    std::env::set_var("ADDR", "127.0.0.1:1");
    std::env::set_var("GEMINI_MODEL", "some-model");
    std::env::set_var("IMAGEBATCH_API_BASE", "http://localhost:9999/");
    std::env::set_var("IMAGEBATCH_MIGRATE_ON_STARTUP", "false");
    std::env::set_var("IMAGEBATCH_FAILURE_RATIO", "0.5");
    std::env::set_var("MAX_UPLOAD_BYTES", "1024");
    std::env::set_var("DATA_DIR", "/srv/imagebatch");

    let cfg = Config::from_env().unwrap();
    assert_eq!(cfg.addr, "0.0.0.0:8080");
    assert_eq!(cfg.model, "some-model");
    assert_eq!(cfg.api_base, "http://localhost:9999");
    assert!(!cfg.migrate_on_startup);
    assert_eq!(cfg.failure_ratio, 0.5);
    assert_eq!(cfg.max_upload_bytes, 1024);
    assert_eq!(cfg.data_dir, std::path::PathBuf::from("/srv/imagebatch"));
    assert!(cfg.database_url.contains("/srv/imagebatch/jobs.db"));

    clear_env();
}

#[test]
#[serial]
fn non_sqlite_database_url_is_rejected() {
    clear_env();
    std::env::set_var("DATABASE_URL", "postgres://localhost/db");
    assert!(Config::from_env().is_err());
    clear_env();
}
