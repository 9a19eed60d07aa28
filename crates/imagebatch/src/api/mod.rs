use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::api::models::{
    ActiveJobResponse, ConfigResponse, CreateJobRequest, ErrorBody, JobWithItems,
    ListJobsQuery, ListJobsResponse, SetKeyRequest, SuccessResponse, UploadResponse,
    UploadedFile,
};
use crate::error::ImageBatchError;
use crate::jobs::model::OutputConfig;
use crate::jobs::runner::{CreateJob, JobRunner};
use crate::jobs::submitter::SubmitResult;
use crate::store::blobs::validate_upload;

pub mod models;

/// Upper bound on files accepted by a single upload request.
pub const MAX_FILES_PER_UPLOAD: usize = 20;

const DEFAULT_LIST_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct ApiState {
    pub runner: JobRunner,
    pub max_upload_bytes: usize,
}

pub fn router(state: ApiState) -> Router {
    let body_limit = state
        .max_upload_bytes
        .saturating_mul(MAX_FILES_PER_UPLOAD)
        .saturating_add(1024 * 1024);

    Router::new()
        // Jobs
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/:id", get(get_job).delete(delete_job))
        // Blobs
        .route("/api/upload", axum::routing::post(upload))
        .route("/api/download/:filename", get(download))
        // API key
        .route(
            "/api/config",
            get(get_config).post(set_config).delete(delete_config),
        )
        // Health
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody { error: msg.into() }),
    )
}

// Domain errors carry their own status; anything else is a 500.
fn api_err(e: anyhow::Error) -> ApiError {
    let status = match e.downcast_ref::<ImageBatchError>() {
        Some(ImageBatchError::NotFound(_)) => StatusCode::NOT_FOUND,
        Some(
            ImageBatchError::Validation(_)
            | ImageBatchError::InvalidApiKey(_)
            | ImageBatchError::MissingApiKey
            | ImageBatchError::InvalidFilename
            | ImageBatchError::NoValidItems,
        ) => StatusCode::BAD_REQUEST,
        None => {
            tracing::error!(error = %e, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

fn job_not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: ImageBatchError::NotFound("Job".to_string()).to_string(),
        }),
    )
}

// ----------------------------
// Jobs
// ----------------------------

pub async fn create_job(
    State(state): State<ApiState>,
    Json(body): Json<CreateJobRequest>,
) -> Result<Json<JobWithItems>, ApiError> {
    let output = OutputConfig::from_parts(
        body.output_size.as_deref(),
        body.aspect_ratio.as_deref(),
        body.temperature,
    )
    .map_err(|e| bad_request(e.to_string()))?;

    let req = match body.mode.as_str() {
        "text-to-image" => CreateJob::Text {
            prompts: body.prompts.unwrap_or_default(),
            output,
        },
        "image-to-image" => CreateJob::Image {
            prompt: body.prompt.unwrap_or_default(),
            image_paths: body.image_paths.unwrap_or_default(),
            output,
        },
        _ => return Err(bad_request("Invalid mode")),
    };

    let (job, items) = state.runner.create_job(req).await.map_err(api_err)?;

    // submission runs detached; the client polls GET /api/jobs/:id
    let runner = state.runner.clone();
    let job_id = job.id;
    tokio::spawn(async move {
        match runner.submit(job_id).await {
            Ok(SubmitResult::Submitted(_)) => {}
            Ok(SubmitResult::Failed(msg)) => {
                tracing::warn!(job_id = %job_id, error = %msg, "job failed at submission");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "could not record submission failure");
            }
        }
    });

    Ok(Json(JobWithItems { job, items }))
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Response, ApiError> {
    if q.status.as_deref() == Some("active") {
        let active = state.runner.active_job().await.map_err(api_err)?;
        let body = match active {
            Some((job, items)) => ActiveJobResponse {
                job: Some(job),
                items,
            },
            None => ActiveJobResponse {
                job: None,
                items: Vec::new(),
            },
        };
        return Ok(Json(body).into_response());
    }

    let jobs = state
        .runner
        .list_jobs(q.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await
        .map_err(api_err)?;
    Ok(Json(ListJobsResponse { jobs }).into_response())
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobWithItems>, ApiError> {
    match state.runner.get_job(id).await.map_err(api_err)? {
        Some((job, items)) => Ok(Json(JobWithItems { job, items })),
        None => Err(job_not_found()),
    }
}

pub async fn delete_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if state.runner.cancel_job(id).await.map_err(api_err)? {
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(job_not_found())
    }
}

// ----------------------------
// Blobs
// ----------------------------

pub async fn upload(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut received = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.to_string()))?;

        validate_upload(content_type.as_deref(), data.len(), state.max_upload_bytes)
            .map_err(|e| bad_request(e.to_string()))?;

        received.push((name, data));
        if received.len() > MAX_FILES_PER_UPLOAD {
            return Err(bad_request(format!(
                "Too many files (max {MAX_FILES_PER_UPLOAD})"
            )));
        }
    }

    if received.is_empty() {
        return Err(bad_request("No files provided"));
    }

    // nothing is written until every file passed validation
    let mut files = Vec::with_capacity(received.len());
    for (name, data) in received {
        let stored = state
            .runner
            .blobs()
            .write_upload(&name, &data)
            .await
            .map_err(api_err)?;
        files.push(UploadedFile {
            id: stored.id,
            path: stored.path.to_string_lossy().into_owned(),
            name: stored.name,
        });
    }

    tracing::info!(count = files.len(), "files uploaded");
    Ok(Json(UploadResponse { files }))
}

pub async fn download(
    State(state): State<ApiState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let dl = state
        .runner
        .blobs()
        .read_for_download(&filename)
        .await
        .map_err(api_err)?;

    let headers = [
        (header::CONTENT_TYPE, dl.mime.to_string()),
        (header::CONTENT_LENGTH, dl.bytes.len().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", dl.filename),
        ),
        (
            header::CACHE_CONTROL,
            "public, max-age=31536000, immutable".to_string(),
        ),
    ];
    Ok((headers, dl.bytes).into_response())
}

// ----------------------------
// API key
// ----------------------------

pub async fn get_config(State(state): State<ApiState>) -> Json<ConfigResponse> {
    let masked = state.runner.keys().masked();
    Json(ConfigResponse {
        has_key: masked.is_some(),
        masked,
    })
}

pub async fn set_config(
    State(state): State<ApiState>,
    Json(body): Json<SetKeyRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.runner.keys().set(&body.api_key).map_err(api_err)?;
    tracing::info!("api key updated");
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn delete_config(
    State(state): State<ApiState>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.runner.keys().delete().map_err(api_err)?;
    tracing::info!("api key removed");
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
