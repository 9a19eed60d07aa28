use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ImageBatchError;
use crate::jobs::materializer::ResultMaterializer;
use crate::jobs::model::{Job, JobItem, JobMode, JobStatus, NewJob, OutputConfig};
use crate::jobs::policy::CompletionPolicy;
use crate::jobs::reconciler::{ReconcileOutcome, StatusReconciler};
use crate::jobs::repo::JobsRepo;
use crate::jobs::submitter::{BatchSubmitter, SubmitResult};
use crate::store::{remove_file_quietly, BlobStore, KeyStore};
use crate::vendor::BatchApi;

/// Validated input for a new job.
#[derive(Debug, Clone)]
pub enum CreateJob {
    Text {
        prompts: Vec<String>,
        output: OutputConfig,
    },
    Image {
        prompt: String,
        image_paths: Vec<String>,
        output: OutputConfig,
    },
}

/// Ties the job store, blob store, key store and vendor client together.
/// Cheap to clone; handlers get one through axum state.
#[derive(Clone)]
pub struct JobRunner {
    jobs: JobsRepo,
    keys: KeyStore,
    blobs: BlobStore,
    vendor: Arc<dyn BatchApi>,
    submitter: BatchSubmitter,
    reconciler: StatusReconciler,
}

impl JobRunner {
    pub fn new(
        pool: SqlitePool,
        vendor: Arc<dyn BatchApi>,
        keys: KeyStore,
        blobs: BlobStore,
        data_dir: impl Into<PathBuf>,
        policy: CompletionPolicy,
    ) -> Self {
        let data_dir = data_dir.into();
        let jobs = JobsRepo::new(pool);

        let submitter = BatchSubmitter::new(jobs.clone(), vendor.clone(), data_dir.clone());
        let materializer = ResultMaterializer::new(
            jobs.clone(),
            vendor.clone(),
            blobs.clone(),
            policy,
            data_dir,
        );
        let reconciler = StatusReconciler::new(jobs.clone(), vendor.clone(), materializer);

        Self {
            jobs,
            keys,
            blobs,
            vendor,
            submitter,
            reconciler,
        }
    }

    pub fn jobs(&self) -> &JobsRepo {
        &self.jobs
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn reconciler(&self) -> &StatusReconciler {
        &self.reconciler
    }

    // ----------------------------
    // Create / submit
    // ----------------------------

    /// Validate and insert a job with all its items. Nothing is sent to the
    /// vendor here; call [`JobRunner::submit`] afterwards.
    pub async fn create_job(&self, req: CreateJob) -> anyhow::Result<(Job, Vec<JobItem>)> {
        if self.keys.get().is_none() {
            return Err(ImageBatchError::MissingApiKey.into());
        }

        let new_job = match req {
            CreateJob::Text { prompts, output } => {
                let prompts: Vec<String> = prompts
                    .into_iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect();
                let Some(first) = prompts.first().cloned() else {
                    return Err(ImageBatchError::Validation(
                        "At least one prompt is required".to_string(),
                    )
                    .into());
                };
                NewJob {
                    mode: JobMode::TextToImage,
                    prompt: first,
                    output,
                    inputs: prompts,
                }
            }
            CreateJob::Image {
                prompt,
                image_paths,
                output,
            } => {
                let prompt = prompt.trim().to_string();
                if prompt.is_empty() {
                    return Err(ImageBatchError::Validation("Prompt is required".to_string()).into());
                }
                let image_paths: Vec<String> = image_paths
                    .into_iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect();
                if image_paths.is_empty() {
                    return Err(ImageBatchError::Validation(
                        "At least one image is required".to_string(),
                    )
                    .into());
                }
                NewJob {
                    mode: JobMode::ImageToImage,
                    prompt,
                    output,
                    inputs: image_paths,
                }
            }
        };

        let (job, items) = self.jobs.create_job(&new_job).await?;
        tracing::info!(job_id = %job.id, mode = %job.mode, items = items.len(), "job created");
        Ok((job, items))
    }

    /// Submit a pending job to the vendor.
    pub async fn submit(&self, job_id: Uuid) -> anyhow::Result<SubmitResult> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| ImageBatchError::NotFound("Job".to_string()))?;
        let items = self.jobs.get_items(job_id).await?;
        self.submitter.submit(&job, &items).await
    }

    // ----------------------------
    // Reads
    // ----------------------------

    /// Read a job with its items. A processing job is reconciled against the
    /// vendor first, so the returned state reflects the latest poll.
    pub async fn get_job(&self, job_id: Uuid) -> anyhow::Result<Option<(Job, Vec<JobItem>)>> {
        let Some(mut job) = self.jobs.get_job(job_id).await? else {
            return Ok(None);
        };

        if job.job_status() == Some(JobStatus::Processing) && job.batch_job_name.is_some() {
            match self.reconciler.reconcile(&job).await {
                Ok(ReconcileOutcome::Finished(status)) => {
                    tracing::info!(job_id = %job.id, status = status.as_str(), "job finished");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "reconcile failed");
                }
            }
            match self.jobs.get_job(job_id).await? {
                Some(fresh) => job = fresh,
                // deleted while we were polling
                None => return Ok(None),
            }
        }

        let items = self.jobs.get_items(job_id).await?;
        Ok(Some((job, items)))
    }

    pub async fn list_jobs(&self, limit: i64) -> anyhow::Result<Vec<Job>> {
        self.jobs.list_jobs(limit).await
    }

    /// The most recent pending or processing job, with its items.
    pub async fn active_job(&self) -> anyhow::Result<Option<(Job, Vec<JobItem>)>> {
        let Some(job) = self.jobs.find_active_job().await? else {
            return Ok(None);
        };
        let items = self.jobs.get_items(job.id).await?;
        Ok(Some((job, items)))
    }

    // ----------------------------
    // Cancel
    // ----------------------------

    /// Delete a job, its items and its result images. The vendor batch is
    /// cancelled on a best-effort basis. Returns false when the job did not exist.
    pub async fn cancel_job(&self, job_id: Uuid) -> anyhow::Result<bool> {
        let Some(job) = self.jobs.get_job(job_id).await? else {
            return Ok(false);
        };

        if job.is_active() {
            if let Some(handle) = job.batch_job_name.as_deref() {
                if let Err(e) = self.vendor.cancel(handle).await {
                    tracing::warn!(job_id = %job.id, handle, error = %e, "vendor cancel failed");
                }
            }
        }

        if let Some(scratch) = job.batch_temp_file.as_deref() {
            remove_file_quietly(Path::new(scratch)).await;
        }

        let items = self.jobs.get_items(job_id).await?;
        for path in items.iter().filter_map(|i| i.output_image_path.as_deref()) {
            self.blobs.delete(Path::new(path)).await;
        }

        let deleted = self.jobs.delete_job(job_id).await?;
        if deleted {
            tracing::info!(job_id = %job.id, "job deleted");
        }
        Ok(deleted)
    }
}
