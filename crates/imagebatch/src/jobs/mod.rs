pub mod materializer;
pub mod model;
pub mod policy;
pub mod reconciler;
pub mod repo;
pub mod request;
pub mod results;
pub mod runner;
pub mod submitter;

pub use materializer::{MaterializeSummary, ResultMaterializer};
pub use model::{ItemStatus, Job, JobItem, JobMode, JobStatus, NewJob, OutputConfig};
pub use policy::CompletionPolicy;
pub use reconciler::{ReconcileOutcome, StatusReconciler};
pub use repo::JobsRepo;
pub use runner::{CreateJob, JobRunner};
pub use submitter::{BatchSubmitter, SkippedItem, SubmissionOutcome, SubmitResult};
