//! Directory-backed object store
//!
//! Emulates a bucket-scoped object store on the local filesystem:
//!
//! ```text
//! {root}/
//! └── {bucket}/
//!     └── {tenant}/
//!         ├── {file}.webm
//!         └── {file}.webm.metadata.json
//! ```
//!
//! Buckets are directories that must already exist, as they would on a real
//! provider. Used for development setups without cloud credentials.

use super::remote::{ClientFactory, ObjectStoreClient, PutObject, RemoteConfig};
use super::types::ProviderError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

const METADATA_SUFFIX: &str = ".metadata.json";

#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: PathBuf,
}

impl DirectoryObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn bucket_path(&self, bucket: &str) -> Result<PathBuf, ProviderError> {
        let path = self.root.join(bucket);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            _ => Err(ProviderError::new(
                "NoSuchBucket",
                format!("The specified bucket does not exist: {}", bucket),
            )),
        }
    }
}

fn io_error(e: std::io::Error) -> ProviderError {
    let code = if e.kind() == std::io::ErrorKind::PermissionDenied {
        "AccessDenied"
    } else {
        "InternalError"
    };
    ProviderError::new(code, e.to_string())
}

/// Keys must stay inside their bucket
fn validate_key(key: &str) -> Result<(), ProviderError> {
    let path = Path::new(key);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if key.is_empty() || escapes {
        return Err(ProviderError::new(
            "InvalidObjectName",
            format!("Object key is not allowed: {}", key),
        ));
    }
    Ok(())
}

#[async_trait]
impl ObjectStoreClient for DirectoryObjectStore {
    async fn list_objects(&self, bucket: &str, max_keys: u32) -> Result<Vec<String>, ProviderError> {
        let bucket_path = self.bucket_path(bucket).await?;

        let mut keys = Vec::new();
        let mut pending = vec![bucket_path.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(io_error)?;
            while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
                if keys.len() >= max_keys as usize {
                    return Ok(keys);
                }
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(io_error)?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if !path.to_string_lossy().ends_with(METADATA_SUFFIX) {
                    if let Ok(relative) = path.strip_prefix(&bucket_path) {
                        keys.push(relative.to_string_lossy().replace('\\', "/"));
                    }
                }
            }
        }
        Ok(keys)
    }

    async fn put_object(&self, request: PutObject<'_>) -> Result<(), ProviderError> {
        validate_key(request.key)?;
        let object_path = self.bucket_path(request.bucket).await?.join(request.key);

        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        fs::write(&object_path, request.body).await.map_err(io_error)?;

        let sidecar = serde_json::json!({
            "contentType": request.content_type,
            "contentLength": request.body.len(),
            "metadata": request.metadata,
        });
        let sidecar_path = PathBuf::from(format!("{}{}", object_path.display(), METADATA_SUFFIX));
        let content = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| ProviderError::new("InternalError", e.to_string()))?;
        fs::write(&sidecar_path, content).await.map_err(io_error)?;

        tracing::debug!("Stored object {}/{}", request.bucket, request.key);
        Ok(())
    }
}

/// Creates [`DirectoryObjectStore`] clients rooted at one directory
#[derive(Debug, Clone)]
pub struct DirectoryStoreFactory {
    root: PathBuf,
}

impl DirectoryStoreFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ClientFactory for DirectoryStoreFactory {
    fn create(&self, config: &RemoteConfig) -> Result<Arc<dyn ObjectStoreClient>, ProviderError> {
        tracing::debug!(
            "Opening directory object store at {:?} for bucket '{}'",
            self.root,
            config.bucket
        );
        Ok(Arc::new(DirectoryObjectStore::new(self.root.clone())))
    }
}
