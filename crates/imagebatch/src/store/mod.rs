pub mod blobs;
pub mod keys;

pub use blobs::{BlobStore, Download, StoredUpload};
pub use keys::KeyStore;

use std::path::Path;

/// Delete a file if it is there. Failures are logged, never returned.
pub async fn remove_file_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}
