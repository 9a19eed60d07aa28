use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ImageBatchError;

pub const ALLOWED_UPLOAD_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Uploaded source images and generated results on local disk.
#[derive(Clone, Debug)]
pub struct BlobStore {
    uploads_dir: PathBuf,
    results_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub id: Uuid,
    pub path: PathBuf,
    pub name: String,
}

#[derive(Debug)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub filename: String,
}

impl BlobStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            uploads_dir: data_dir.join("uploads"),
            results_dir: data_dir.join("results"),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        tokio::fs::create_dir_all(&self.results_dir).await?;
        Ok(())
    }

    /// Store an uploaded image under a fresh id, keeping the original extension.
    pub async fn write_upload(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredUpload> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "png".to_string());

        let id = Uuid::new_v4();
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        let path = self.uploads_dir.join(format!("{id}.{ext}"));
        tokio::fs::write(&path, bytes).await?;

        Ok(StoredUpload {
            id,
            path,
            name: original_name.to_string(),
        })
    }

    /// Write a generated image as `results/{key}.png`.
    pub async fn write_result(&self, key: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        if !is_bare_filename(key) {
            return Err(ImageBatchError::InvalidFilename.into());
        }
        tokio::fs::create_dir_all(&self.results_dir).await?;
        let path = self.results_dir.join(format!("{key}.png"));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Read a result image for serving. Only bare filenames inside the
    /// results directory are accepted.
    pub async fn read_for_download(&self, filename: &str) -> anyhow::Result<Download> {
        if !is_bare_filename(filename) {
            return Err(ImageBatchError::InvalidFilename.into());
        }

        let path = self.results_dir.join(filename);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ImageBatchError::NotFound("File".to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };

        let mime = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension)
            .unwrap_or("application/octet-stream");

        Ok(Download {
            bytes,
            mime,
            filename: filename.to_string(),
        })
    }

    /// Best-effort removal of a stored blob.
    pub async fn delete(&self, path: &Path) {
        super::remove_file_quietly(path).await;
    }
}

pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Reject anything that is not an allowed image type or is over `max_bytes`.
pub fn validate_upload(
    content_type: Option<&str>,
    size: usize,
    max_bytes: usize,
) -> Result<(), ImageBatchError> {
    let ct = content_type.unwrap_or("");
    if !ALLOWED_UPLOAD_TYPES.contains(&ct) {
        return Err(ImageBatchError::Validation(format!(
            "Invalid file type: {}",
            if ct.is_empty() { "unknown" } else { ct }
        )));
    }
    if size > max_bytes {
        return Err(ImageBatchError::Validation(format!(
            "File too large: {size} bytes (max {max_bytes})"
        )));
    }
    Ok(())
}

fn is_bare_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
