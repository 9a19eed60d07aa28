// crates/imagebatch/src/api/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::model::{Job, JobItem};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub mode: String,
    pub prompts: Option<Vec<String>>,
    pub prompt: Option<String>,
    pub image_paths: Option<Vec<String>>,
    pub output_size: Option<String>,
    pub temperature: Option<f64>,
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWithItems {
    pub job: Job,
    pub items: Vec<JobItem>,
}

/// Answer to `GET /api/jobs?status=active`; `job` is null when nothing runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveJobResponse {
    pub job: Option<Job>,
    pub items: Vec<JobItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: Uuid,
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub has_key: bool,
    pub masked: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
