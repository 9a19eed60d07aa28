#![allow(dead_code)]

use async_trait::async_trait;
use base64::prelude::*;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

use imagebatch::db;
use imagebatch::jobs::model::OutputConfig;
use imagebatch::jobs::policy::CompletionPolicy;
use imagebatch::jobs::runner::{CreateJob, JobRunner};
use imagebatch::jobs::{Job, JobItem};
use imagebatch::store::{BlobStore, KeyStore};
use imagebatch::vendor::{BatchApi, BatchState, BatchStats, BatchStatus, VendorError};

pub const TEST_KEY: &str = "AIzaTESTKEY12345678";

/// Scripted behaviour and recorded calls of [`FakeVendor`].
pub struct FakeState {
    pub handle: String,
    pub submit_error: Option<String>,
    /// Popped one per `status` call; when empty the batch reports running.
    pub statuses: VecDeque<Result<BatchStatus, String>>,
    /// Written to `dest` on `download`.
    pub results: String,
    pub download_error: Option<String>,
    pub cancel_fails: bool,
    pub calls: Vec<String>,
    /// Contents of every artifact handed to `submit`.
    pub submitted: Vec<String>,
    /// Closed right after a successful `submit`, so recording it fails.
    pub close_after_submit: Option<SqlitePool>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            handle: "batches/test-batch-1".to_string(),
            submit_error: None,
            statuses: VecDeque::new(),
            results: String::new(),
            download_error: None,
            cancel_fails: false,
            calls: Vec::new(),
            submitted: Vec::new(),
            close_after_submit: None,
        }
    }
}

#[derive(Default)]
pub struct FakeVendor {
    pub state: Mutex<FakeState>,
}

impl FakeVendor {
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(op)).count()
    }

    pub fn push_status(&self, status: BatchStatus) {
        self.state.lock().unwrap().statuses.push_back(Ok(status));
    }

    pub fn push_status_error(&self, msg: &str) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .push_back(Err(msg.to_string()));
    }

    pub fn set_results(&self, body: impl Into<String>) {
        self.state.lock().unwrap().results = body.into();
    }

    pub fn fail_submit(&self, msg: &str) {
        self.state.lock().unwrap().submit_error = Some(msg.to_string());
    }

    pub fn fail_download(&self, msg: &str) {
        self.state.lock().unwrap().download_error = Some(msg.to_string());
    }

    pub fn fail_cancel(&self) {
        self.state.lock().unwrap().cancel_fails = true;
    }

    pub fn close_pool_after_submit(&self, pool: &SqlitePool) {
        self.state.lock().unwrap().close_after_submit = Some(pool.clone());
    }

    pub fn submitted(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }
}

fn api_error(msg: &str) -> VendorError {
    VendorError::Api {
        status: 500,
        body: msg.to_string(),
    }
}

#[async_trait]
impl BatchApi for FakeVendor {
    async fn submit(&self, artifact: &Path, display_name: &str) -> Result<String, VendorError> {
        // let concurrent submissions interleave before the artifact is read
        tokio::task::yield_now().await;
        let content = std::fs::read_to_string(artifact)?;
        let (result, close) = {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("submit {display_name}"));
            st.submitted.push(content);
            match &st.submit_error {
                Some(msg) => (Err(api_error(msg)), None),
                None => (Ok(st.handle.clone()), st.close_after_submit.take()),
            }
        };
        if let Some(pool) = close {
            pool.close().await;
        }
        result
    }

    async fn status(&self, handle: &str) -> Result<BatchStatus, VendorError> {
        let mut st = self.state.lock().unwrap();
        st.calls.push(format!("status {handle}"));
        match st.statuses.pop_front() {
            Some(Ok(s)) => Ok(s),
            Some(Err(msg)) => Err(api_error(&msg)),
            None => Ok(status(BatchState::Running)),
        }
    }

    async fn download(&self, result_file: &str, dest: &Path) -> Result<(), VendorError> {
        let (body, err) = {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("download {result_file}"));
            (st.results.clone(), st.download_error.clone())
        };
        if let Some(msg) = err {
            return Err(api_error(&msg));
        }
        std::fs::write(dest, body)?;
        Ok(())
    }

    async fn cancel(&self, handle: &str) -> Result<(), VendorError> {
        let mut st = self.state.lock().unwrap();
        st.calls.push(format!("cancel {handle}"));
        if st.cancel_fails {
            return Err(api_error("cancel rejected"));
        }
        Ok(())
    }
}

pub fn status(state: BatchState) -> BatchStatus {
    BatchStatus {
        state,
        stats: None,
        error: None,
        result_file: None,
    }
}

pub fn succeeded() -> BatchStatus {
    BatchStatus {
        state: BatchState::Succeeded,
        stats: None,
        error: None,
        result_file: Some("files/results-1".to_string()),
    }
}

pub fn running_with_stats(succeeded: i64, failed: i64) -> BatchStatus {
    BatchStatus {
        state: BatchState::Running,
        stats: Some(BatchStats {
            total: None,
            succeeded: Some(succeeded),
            failed: Some(failed),
        }),
        error: None,
        result_file: None,
    }
}

pub fn image_line(key: impl std::fmt::Display, bytes: &[u8]) -> String {
    serde_json::json!({
        "key": key.to_string(),
        "response": {
            "candidates": [{
                "content": { "parts": [{ "inlineData": { "data": BASE64_STANDARD.encode(bytes), "mimeType": "image/png" } }] }
            }]
        }
    })
    .to_string()
}

pub fn error_line(key: impl std::fmt::Display, msg: &str) -> String {
    serde_json::json!({ "key": key.to_string(), "error": { "message": msg } }).to_string()
}

pub struct TestEnv {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub vendor: Arc<FakeVendor>,
    pub keys: KeyStore,
    pub blobs: BlobStore,
    pub runner: JobRunner,
}

impl TestEnv {
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub async fn job(&self, id: Uuid) -> Job {
        self.runner.jobs().get_job(id).await.unwrap().unwrap()
    }

    pub async fn items(&self, id: Uuid) -> Vec<JobItem> {
        self.runner.jobs().get_items(id).await.unwrap()
    }

    /// Create a text-to-image job with the given prompts.
    pub async fn text_job(&self, prompts: &[&str]) -> (Job, Vec<JobItem>) {
        self.runner
            .create_job(CreateJob::Text {
                prompts: prompts.iter().map(|p| p.to_string()).collect(),
                output: OutputConfig::default(),
            })
            .await
            .unwrap()
    }

    /// Create an image-to-image job over the given source paths.
    pub async fn image_job(&self, prompt: &str, paths: &[PathBuf]) -> (Job, Vec<JobItem>) {
        self.runner
            .create_job(CreateJob::Image {
                prompt: prompt.to_string(),
                image_paths: paths
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect(),
                output: OutputConfig::default(),
            })
            .await
            .unwrap()
    }

    /// Create and submit a text job so it sits in `processing`.
    pub async fn processing_job(&self, prompts: &[&str]) -> (Job, Vec<JobItem>) {
        let (job, _) = self.text_job(prompts).await;
        self.runner.submit(job.id).await.unwrap();
        let job = self.job(job.id).await;
        let items = self.items(job.id).await;
        (job, items)
    }
}

pub async fn setup() -> TestEnv {
    setup_with(CompletionPolicy::default(), true).await
}

pub async fn setup_without_key() -> TestEnv {
    setup_with(CompletionPolicy::default(), false).await
}

pub async fn setup_with(policy: CompletionPolicy, with_key: bool) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();

    let url = format!("sqlite://{}?mode=rwc", data_dir.join("jobs.db").display());
    let pool = db::make_pool(&url).await.expect("failed to open test database");
    db::run_migrations(&pool).await.expect("migrations failed");

    let keys = KeyStore::new(dir.path().join(".env.local"));
    if with_key {
        keys.set(TEST_KEY).unwrap();
    }

    let blobs = BlobStore::new(&data_dir);
    blobs.ensure_dirs().await.unwrap();

    let vendor = Arc::new(FakeVendor::default());
    let runner = JobRunner::new(
        pool.clone(),
        vendor.clone(),
        keys.clone(),
        blobs.clone(),
        data_dir,
        policy,
    );

    TestEnv {
        dir,
        pool,
        vendor,
        keys,
        blobs,
        runner,
    }
}

/// Write a small fake image file and return its path.
pub fn write_source_image(env: &TestEnv, name: &str) -> PathBuf {
    let path = env.dir.path().join(name);
    std::fs::write(&path, b"\x89PNG fake image bytes").unwrap();
    path
}
