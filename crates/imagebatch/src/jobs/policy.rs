use crate::jobs::model::JobStatus;

/// Decides whether a finished batch counts as a completed or failed job.
///
/// With the default ratio of 1.0 a job only fails when every item failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionPolicy {
    failure_ratio: f64,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self { failure_ratio: 1.0 }
    }
}

impl CompletionPolicy {
    /// `failure_ratio` is clamped to (0, 1]; non-finite values fall back to 1.0.
    pub fn new(failure_ratio: f64) -> Self {
        let failure_ratio = if failure_ratio.is_finite() && failure_ratio > 0.0 {
            failure_ratio.min(1.0)
        } else {
            1.0
        };
        Self { failure_ratio }
    }

    pub fn failure_ratio(&self) -> f64 {
        self.failure_ratio
    }

    pub fn final_status(&self, failed: i64, total: i64) -> JobStatus {
        if total <= 0 {
            return JobStatus::Failed;
        }
        if failed <= 0 {
            return JobStatus::Completed;
        }
        if failed as f64 / total as f64 >= self.failure_ratio {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        }
    }
}
