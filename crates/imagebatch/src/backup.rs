//! Backup and restore of the job database, used by `imagebatchctl`.
//!
//! A backup is a consistent copy made with `VACUUM INTO` plus a readable
//! JSON export of every job and item next to it. Restore works on the file
//! and expects no pool to be open on it.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use crate::error::ImageBatchError;
use crate::jobs::model::{Job, JobItem};
use crate::jobs::repo::JobsRepo;

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub db_path: PathBuf,
    pub json_path: PathBuf,
    pub jobs: usize,
    pub items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub restored_from: PathBuf,
    /// Copy of the database as it was before the restore, if there was one.
    pub safety_copy: Option<PathBuf>,
}

#[derive(Serialize)]
struct Export<'a> {
    jobs: &'a [Job],
    items: &'a [JobItem],
}

pub fn default_backup_name() -> String {
    format!("backup-{}", Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ"))
}

pub async fn backup(
    pool: &SqlitePool,
    backups_dir: &Path,
    name: Option<&str>,
) -> anyhow::Result<BackupReport> {
    let name = match name {
        Some(n) => checked_name(n)?.to_string(),
        None => default_backup_name(),
    };
    tokio::fs::create_dir_all(backups_dir).await?;

    let db_path = backups_dir.join(format!("{name}.db"));
    // VACUUM INTO refuses to overwrite
    if tokio::fs::try_exists(&db_path).await? {
        tokio::fs::remove_file(&db_path).await?;
    }
    sqlx::query("VACUUM INTO ?1")
        .bind(db_path.to_string_lossy().into_owned())
        .execute(pool)
        .await?;

    let (jobs, items) = JobsRepo::new(pool.clone()).export_all().await?;
    let json_path = backups_dir.join(format!("{name}.json"));
    let json = serde_json::to_vec_pretty(&Export {
        jobs: &jobs,
        items: &items,
    })?;
    tokio::fs::write(&json_path, json).await?;

    tracing::info!(path = %db_path.display(), jobs = jobs.len(), items = items.len(), "backup written");

    Ok(BackupReport {
        db_path,
        json_path,
        jobs: jobs.len(),
        items: items.len(),
    })
}

/// `.db` backups in the directory, newest name first.
pub async fn list_backups(backups_dir: &Path) -> anyhow::Result<Vec<BackupEntry>> {
    let mut out = Vec::new();
    let mut rd = match tokio::fs::read_dir(backups_dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("db") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let meta = entry.metadata().await?;
        out.push(BackupEntry {
            name: stem.to_string(),
            size_bytes: meta.len(),
        });
    }

    out.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(out)
}

/// Replace `db_file` with the named backup. The current file is copied to
/// `pre-restore-<millis>.db` in the backups directory first.
pub async fn restore(
    db_file: &Path,
    backups_dir: &Path,
    name: &str,
) -> anyhow::Result<RestoreReport> {
    let name = checked_name(name)?;
    let source = backups_dir.join(format!("{name}.db"));
    if !tokio::fs::try_exists(&source).await? {
        return Err(ImageBatchError::NotFound(format!("Backup {name}")).into());
    }

    let safety_copy = if tokio::fs::try_exists(db_file).await? {
        let dest = backups_dir.join(format!("pre-restore-{}.db", Utc::now().timestamp_millis()));
        tokio::fs::copy(db_file, &dest).await?;
        Some(dest)
    } else {
        None
    };

    if let Some(parent) = db_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(&source, db_file).await?;

    // stale WAL pages would be replayed over the restored file
    for suffix in ["-wal", "-shm"] {
        let mut side = db_file.as_os_str().to_owned();
        side.push(suffix);
        crate::store::remove_file_quietly(Path::new(&side)).await;
    }

    tracing::info!(from = %source.display(), to = %db_file.display(), "database restored");

    Ok(RestoreReport {
        restored_from: source,
        safety_copy,
    })
}

fn checked_name(name: &str) -> Result<&str, ImageBatchError> {
    let name = name.trim();
    if name.is_empty()
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(ImageBatchError::InvalidFilename);
    }
    Ok(name)
}
