use base64::prelude::*;
use chrono::Utc;
use std::env;
use std::io::BufReader;

use imagebatch::backup;
use imagebatch::config::Config;
use imagebatch::db;
use imagebatch::jobs::results::{ItemOutcome, ResultRecords};
use imagebatch::store::{remove_file_quietly, BlobStore, KeyStore};
use imagebatch::vendor::{BatchApi, BatchState, GeminiBatchClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "imagebatchctl <command>\n\
             Commands:\n\
             - backup [name]\n\
             - restore [name]\n\
             - list-batches\n\
             - download-batch <batch_name>\n\
             \n\
             Reads DATABASE_URL / IMAGEBATCH_* settings and the API key file.\n"
        );
        std::process::exit(2);
    }

    let cfg = Config::from_env()?;

    match args[1].as_str() {
        "backup" => run_backup(&cfg, args.get(2).map(String::as_str)).await?,
        "restore" => run_restore(&cfg, args.get(2).map(String::as_str)).await?,
        "list-batches" => list_batches(&cfg).await?,
        "download-batch" => {
            let Some(handle) = args.get(2) else {
                eprintln!("usage: imagebatchctl download-batch <batch_name>");
                std::process::exit(2);
            };
            download_batch(&cfg, handle).await?;
        }
        other => {
            eprintln!("Unknown command: {other}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn client(cfg: &Config) -> anyhow::Result<GeminiBatchClient> {
    let keys = KeyStore::new(&cfg.env_file);
    if keys.get().is_none() {
        anyhow::bail!("no API key in {}", cfg.env_file.display());
    }
    Ok(GeminiBatchClient::new(&cfg.api_base, &cfg.model, keys)?)
}

async fn run_backup(cfg: &Config, name: Option<&str>) -> anyhow::Result<()> {
    let Some(db_file) = db::sqlite_file_path(&cfg.database_url) else {
        anyhow::bail!("DATABASE_URL does not point at a file");
    };
    if !db_file.exists() {
        println!("No database file to back up");
        return Ok(());
    }

    let pool = db::make_pool(&cfg.database_url).await?;
    let report = backup::backup(&pool, &cfg.backups_dir(), name).await;
    pool.close().await;
    let report = report?;

    println!("Database backed up to: {}", report.db_path.display());
    println!("JSON export saved to: {}", report.json_path.display());
    println!(
        "\nBackup complete: {} jobs, {} items",
        report.jobs, report.items
    );
    Ok(())
}

async fn run_restore(cfg: &Config, name: Option<&str>) -> anyhow::Result<()> {
    let backups_dir = cfg.backups_dir();

    let Some(name) = name else {
        println!("Available backups:\n");
        let entries = backup::list_backups(&backups_dir).await?;
        if entries.is_empty() {
            println!("  (no backups found)");
        } else {
            for e in &entries {
                println!("  {}  ({:.1} KB)", e.name, e.size_bytes as f64 / 1024.0);
            }
            println!("\nUsage: imagebatchctl restore <backup-name>");
        }
        return Ok(());
    };

    let Some(db_file) = db::sqlite_file_path(&cfg.database_url) else {
        anyhow::bail!("DATABASE_URL does not point at a file");
    };

    let report = backup::restore(&db_file, &backups_dir, name).await?;
    if let Some(copy) = &report.safety_copy {
        println!("Current DB backed up to: {}", copy.display());
    }
    println!("Database restored from: {}", report.restored_from.display());
    Ok(())
}

async fn list_batches(cfg: &Config) -> anyhow::Result<()> {
    let client = client(cfg)?;
    println!("Fetching batches...\n");

    let batches = client.list_batches().await?;
    for (i, b) in batches.iter().enumerate() {
        println!("--- Batch {} ---", i + 1);
        println!("Name: {}", b.name);
        println!("State: {}", b.status.state.as_str());
        println!(
            "Display Name: {}",
            b.display_name.as_deref().unwrap_or("N/A")
        );
        if let Some(stats) = &b.status.stats {
            println!(
                "Stats: total={} succeeded={} failed={}",
                fmt_count(stats.total),
                fmt_count(stats.succeeded),
                fmt_count(stats.failed)
            );
        }
        if let Some(file) = &b.status.result_file {
            println!("Results File: {file}");
        }
        println!();
    }

    if batches.is_empty() {
        println!("No batches found");
    } else {
        println!("Total: {} batches", batches.len());
    }
    Ok(())
}

fn fmt_count(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}

async fn download_batch(cfg: &Config, handle: &str) -> anyhow::Result<()> {
    let client = client(cfg)?;
    let blobs = BlobStore::new(&cfg.data_dir);
    blobs.ensure_dirs().await?;

    println!("Fetching batch: {handle}\n");
    let status = client.status(handle).await?;
    println!("State: {}", status.state.as_str());

    if status.state != BatchState::Succeeded {
        anyhow::bail!("batch not succeeded: {}", status.state.as_str());
    }
    let Some(result_file) = status.result_file.as_deref() else {
        anyhow::bail!("no results file found");
    };
    println!("Results File: {result_file}");

    let dest = cfg
        .data_dir
        .join(format!("results-{}.jsonl", Utc::now().timestamp_millis()));
    println!("\nDownloading to: {}", dest.display());
    client.download(result_file, &dest).await?;
    println!("Download complete!\n");

    let file = std::fs::File::open(&dest)?;
    let mut count = 0usize;
    let mut saved = 0usize;

    for rec in ResultRecords::new(BufReader::new(file)) {
        count += 1;
        match rec.outcome {
            ItemOutcome::Image(data) => {
                let stored = match BASE64_STANDARD.decode(data.trim()) {
                    Ok(bytes) => blobs.write_result(&rec.key, &bytes).await,
                    Err(e) => Err(e.into()),
                };
                match stored {
                    Ok(path) => {
                        saved += 1;
                        println!("[{count}] {}: SAVED -> {}", rec.key, path.display());
                    }
                    Err(e) => println!("[{count}] {}: ERROR - {e}", rec.key),
                }
            }
            ItemOutcome::Failed(msg) => println!("[{count}] {}: ERROR - {msg}", rec.key),
        }
    }

    remove_file_quietly(&dest).await;

    println!(
        "\nTotal: {count} results, {saved} images saved to {}",
        blobs.results_dir().display()
    );
    Ok(())
}
