// crates/imagebatch/src/jobs/reconciler.rs

use std::path::Path;
use std::sync::Arc;

use crate::jobs::materializer::ResultMaterializer;
use crate::jobs::model::{Job, JobStatus};
use crate::jobs::repo::JobsRepo;
use crate::store::remove_file_quietly;
use crate::vendor::{BatchApi, BatchState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Job is not processing or has no vendor handle.
    Skipped,
    /// Vendor status could not be read; nothing changed.
    StatusUnavailable,
    InProgress,
    Finished(JobStatus),
}

#[derive(Clone)]
pub struct StatusReconciler {
    jobs: JobsRepo,
    vendor: Arc<dyn BatchApi>,
    materializer: ResultMaterializer,
}

impl StatusReconciler {
    pub fn new(
        jobs: JobsRepo,
        vendor: Arc<dyn BatchApi>,
        materializer: ResultMaterializer,
    ) -> Self {
        Self {
            jobs,
            vendor,
            materializer,
        }
    }

    /// Poll the vendor once for a processing job and apply what it reports.
    pub async fn reconcile(&self, job: &Job) -> anyhow::Result<ReconcileOutcome> {
        if job.job_status() != Some(JobStatus::Processing) {
            return Ok(ReconcileOutcome::Skipped);
        }
        let Some(handle) = job.batch_job_name.as_deref() else {
            return Ok(ReconcileOutcome::Skipped);
        };

        let status = match self.vendor.status(handle).await {
            Ok(s) => s,
            Err(e) => {
                // retried on the next read
                tracing::warn!(job_id = %job.id, handle, error = %e, "batch status check failed");
                return Ok(ReconcileOutcome::StatusUnavailable);
            }
        };

        if let Some(stats) = &status.stats {
            if stats.succeeded.is_some() || stats.failed.is_some() {
                // items failed before submission never reach the vendor's counts
                let (_, failed_locally) = self.jobs.count_items(job.id).await?;
                let failed = match stats.failed {
                    Some(f) => f + failed_locally,
                    None => job.failed_items,
                };
                self.jobs
                    .update_progress(
                        job.id,
                        stats.succeeded.unwrap_or(job.completed_items),
                        failed,
                    )
                    .await?;
            }
        }

        if !status.state.is_terminal() {
            tracing::debug!(job_id = %job.id, state = status.state.as_str(), "batch still running");
            return Ok(ReconcileOutcome::InProgress);
        }

        let final_status = match &status.state {
            BatchState::Succeeded => self.materializer.materialize(job, &status).await?.status,
            other => {
                let msg = status
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("Batch {}", other.as_str()));
                tracing::warn!(job_id = %job.id, state = other.as_str(), error = %msg, "batch ended without results");

                self.jobs.update_job_status(job.id, JobStatus::Failed).await?;
                self.jobs.fail_processing_items(job.id, &msg).await?;
                self.jobs.sync_counts_from_items(job.id).await?;
                JobStatus::Failed
            }
        };

        if let Some(scratch) = job.batch_temp_file.as_deref() {
            remove_file_quietly(Path::new(scratch)).await;
        }

        Ok(ReconcileOutcome::Finished(final_status))
    }
}
