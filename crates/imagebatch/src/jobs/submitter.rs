// crates/imagebatch/src/jobs/submitter.rs

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ImageBatchError;
use crate::jobs::model::{Job, JobItem, JobMode, JobStatus};
use crate::jobs::repo::JobsRepo;
use crate::jobs::request::{write_jsonl, BatchLine, GenerationInput};
use crate::store::remove_file_quietly;
use crate::vendor::BatchApi;

/// An image item left out of the batch because its source file is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub item_id: Uuid,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub handle: String,
    pub scratch_path: PathBuf,
    pub warnings: Vec<SkippedItem>,
}

#[derive(Debug, Clone)]
pub enum SubmitResult {
    Submitted(SubmissionOutcome),
    /// Submission did not happen; the job and its items are already marked failed.
    Failed(String),
}

#[derive(Clone)]
pub struct BatchSubmitter {
    jobs: JobsRepo,
    vendor: Arc<dyn BatchApi>,
    data_dir: PathBuf,
}

impl BatchSubmitter {
    pub fn new(jobs: JobsRepo, vendor: Arc<dyn BatchApi>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs,
            vendor,
            data_dir: data_dir.into(),
        }
    }

    /// Turn the job's items into one vendor batch.
    ///
    /// Only store errors while recording a failure come back as `Err`;
    /// anything that goes wrong with the submission itself is recorded on
    /// the job and reported as [`SubmitResult::Failed`].
    pub async fn submit(&self, job: &Job, items: &[JobItem]) -> anyhow::Result<SubmitResult> {
        let mut scratch: Option<PathBuf> = None;

        match self.try_submit(job, items, &mut scratch).await {
            Ok(outcome) => Ok(SubmitResult::Submitted(outcome)),
            Err(e) => {
                let msg = e.to_string();
                tracing::error!(job_id = %job.id, error = %msg, "batch submission failed");

                if let Some(path) = &scratch {
                    remove_file_quietly(path).await;
                }

                self.jobs.update_job_status(job.id, JobStatus::Failed).await?;
                self.jobs.fail_processing_items(job.id, &msg).await?;
                self.jobs.update_progress(job.id, 0, job.total_items).await?;

                Ok(SubmitResult::Failed(msg))
            }
        }
    }

    async fn try_submit(
        &self,
        job: &Job,
        items: &[JobItem],
        scratch: &mut Option<PathBuf>,
    ) -> anyhow::Result<SubmissionOutcome> {
        let mode = job.job_mode()?;
        let output = job.output_config()?;

        self.jobs.mark_items_processing(job.id).await?;

        let mut lines = Vec::with_capacity(items.len());
        let mut skipped = Vec::new();

        for item in items {
            let input = match mode {
                JobMode::TextToImage => GenerationInput::Text {
                    prompt: item.input_prompt.clone().unwrap_or_default(),
                },
                JobMode::ImageToImage => {
                    let path = item.input_image_path.clone().unwrap_or_default();
                    if !source_exists(&path).await {
                        tracing::warn!(job_id = %job.id, item_id = %item.id, path = %path, "skipping missing source image");
                        skipped.push(SkippedItem {
                            item_id: item.id,
                            path,
                        });
                        continue;
                    }
                    GenerationInput::Image {
                        prompt: job.prompt.clone(),
                        path,
                    }
                }
            };

            lines.push(BatchLine {
                key: item.id.to_string(),
                request: input.to_request(&output).await?,
            });
        }

        if lines.is_empty() {
            return Err(ImageBatchError::NoValidItems.into());
        }

        let millis = Utc::now().timestamp_millis();
        let tag = mode.short_tag();
        let scratch_path = self
            .data_dir
            .join(format!("batch-{tag}-{}-{millis}.jsonl", job.id));
        *scratch = Some(scratch_path.clone());
        write_jsonl(&scratch_path, &lines).await?;

        let handle = self
            .vendor
            .submit(&scratch_path, &format!("imagebatch-{tag}-{millis}"))
            .await?;

        if let Err(e) = self.record(job, &handle, &scratch_path, &skipped).await {
            // nothing would ever poll this batch
            if let Err(cancel_err) = self.vendor.cancel(&handle).await {
                tracing::warn!(job_id = %job.id, handle = %handle, error = %cancel_err, "vendor cancel failed");
            }
            return Err(e);
        }

        tracing::info!(
            job_id = %job.id,
            handle = %handle,
            requests = lines.len(),
            skipped = skipped.len(),
            "batch submitted"
        );

        Ok(SubmissionOutcome {
            handle,
            scratch_path,
            warnings: skipped,
        })
    }

    async fn record(
        &self,
        job: &Job,
        handle: &str,
        scratch_path: &Path,
        skipped: &[SkippedItem],
    ) -> anyhow::Result<()> {
        self.jobs
            .record_submission(job.id, handle, &scratch_path.to_string_lossy())
            .await?;

        for s in skipped {
            self.jobs
                .fail_item(s.item_id, &format!("source image not found: {}", s.path))
                .await?;
        }
        if !skipped.is_empty() {
            self.jobs
                .update_progress(job.id, 0, skipped.len() as i64)
                .await?;
        }
        Ok(())
    }
}

async fn source_exists(path: &str) -> bool {
    !path.is_empty() && tokio::fs::try_exists(Path::new(path)).await.unwrap_or(false)
}
