// crates/imagebatch/src/jobs/materializer.rs

use base64::prelude::*;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::jobs::model::{ItemStatus, Job, JobStatus};
use crate::jobs::policy::CompletionPolicy;
use crate::jobs::repo::JobsRepo;
use crate::jobs::results::{ItemOutcome, ResultRecords};
use crate::store::{remove_file_quietly, BlobStore};
use crate::vendor::{BatchApi, BatchStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeSummary {
    pub completed: i64,
    pub failed: i64,
    pub status: JobStatus,
}

#[derive(Clone)]
pub struct ResultMaterializer {
    jobs: JobsRepo,
    vendor: Arc<dyn BatchApi>,
    blobs: BlobStore,
    policy: CompletionPolicy,
    data_dir: PathBuf,
}

impl ResultMaterializer {
    pub fn new(
        jobs: JobsRepo,
        vendor: Arc<dyn BatchApi>,
        blobs: BlobStore,
        policy: CompletionPolicy,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            jobs,
            vendor,
            blobs,
            policy,
            data_dir: data_dir.into(),
        }
    }

    /// Pull the results of a succeeded batch into blob storage and settle
    /// every item of the job.
    pub async fn materialize(
        &self,
        job: &Job,
        status: &BatchStatus,
    ) -> anyhow::Result<MaterializeSummary> {
        let results = match self.fetch_results(job, status).await {
            Ok(r) => r,
            Err(msg) => {
                tracing::error!(job_id = %job.id, error = %msg, "could not fetch batch results");
                self.jobs.update_job_status(job.id, JobStatus::Failed).await?;
                self.jobs.fail_processing_items(job.id, &msg).await?;
                let (completed, failed) = self.jobs.sync_counts_from_items(job.id).await?;
                return Ok(MaterializeSummary {
                    completed,
                    failed,
                    status: JobStatus::Failed,
                });
            }
        };

        let items = self.jobs.get_items(job.id).await?;
        let mut completed = 0i64;
        let mut failed = 0i64;

        for item in &items {
            // items that never made it into the batch keep their own error
            if item.item_status() == Some(ItemStatus::Failed) {
                failed += 1;
                continue;
            }

            let key = item.id.to_string();
            match results.get(&key) {
                Some(ItemOutcome::Image(data)) => match self.store_image(&key, data).await {
                    Ok(path) => {
                        self.jobs.complete_item(item.id, &path).await?;
                        completed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(item_id = %item.id, error = %e, "could not store result image");
                        self.jobs.fail_item(item.id, &e.to_string()).await?;
                        failed += 1;
                    }
                },
                Some(ItemOutcome::Failed(msg)) => {
                    self.jobs.fail_item(item.id, msg).await?;
                    failed += 1;
                }
                None => {
                    self.jobs.fail_item(item.id, "No result found").await?;
                    failed += 1;
                }
            }
        }

        let total = items.len() as i64;
        self.jobs.update_progress(job.id, completed, failed).await?;
        let status = self.policy.final_status(failed, total);
        self.jobs.update_job_status(job.id, status).await?;

        tracing::info!(
            job_id = %job.id,
            completed,
            failed,
            status = status.as_str(),
            "batch results materialized"
        );

        Ok(MaterializeSummary {
            completed,
            failed,
            status,
        })
    }

    /// Download the results artifact and index it by item key. The local
    /// copy is removed once read.
    async fn fetch_results(
        &self,
        job: &Job,
        status: &BatchStatus,
    ) -> Result<HashMap<String, ItemOutcome>, String> {
        let result_file = status
            .result_file
            .as_deref()
            .ok_or_else(|| "No results file found".to_string())?;

        let dest = self
            .data_dir
            .join(format!("results-{}-{}.jsonl", job.id, Utc::now().timestamp_millis()));

        if let Err(e) = self.vendor.download(result_file, &dest).await {
            remove_file_quietly(&dest).await;
            return Err(format!("Failed to download results: {e}"));
        }

        let parsed = tokio::task::spawn_blocking({
            let dest = dest.clone();
            move || -> std::io::Result<HashMap<String, ItemOutcome>> {
                let file = std::fs::File::open(&dest)?;
                let reader = std::io::BufReader::new(file);
                Ok(ResultRecords::new(reader)
                    .map(|r| (r.key, r.outcome))
                    .collect())
            }
        })
        .await;

        remove_file_quietly(&dest).await;

        match parsed {
            Ok(Ok(map)) => Ok(map),
            Ok(Err(e)) => Err(format!("Failed to read results: {e}")),
            Err(e) => Err(format!("Failed to read results: {e}")),
        }
    }

    async fn store_image(&self, key: &str, data: &str) -> anyhow::Result<String> {
        let bytes = BASE64_STANDARD.decode(data.trim())?;
        let path = self.blobs.write_result(key, &bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }
}
