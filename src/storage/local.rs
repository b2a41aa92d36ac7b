//! Local filesystem sink
//!
//! Recordings are written next to their final name under a temporary name and
//! linked into place, so a reader never observes a partial file and an
//! existing recording is never replaced.

use super::naming::generate_file_name;
use super::types::{LocalErrorKind, StorageError, StorageResult};
use super::validation::validate_artifact;
use crate::recorder::state::RecordingArtifact;
use async_trait::async_trait;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Destination for recordings on a local filesystem.
///
/// Implemented by [`FileSystemStore`]; other implementations wrap or replace
/// it (e.g. for tests).
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Persist `artifact` under `directory`, returning the absolute file path
    async fn save(&self, artifact: &RecordingArtifact, directory: &Path) -> StorageResult<PathBuf>;
}

/// Writes recordings directly to the filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemStore;

#[async_trait]
impl LocalStore for FileSystemStore {
    async fn save(&self, artifact: &RecordingArtifact, directory: &Path) -> StorageResult<PathBuf> {
        save_local(artifact, directory).await
    }
}

/// Save a recording into `directory`
pub async fn save_local(artifact: &RecordingArtifact, directory: &Path) -> StorageResult<PathBuf> {
    validate_artifact(artifact)?;

    let directory = prepare_directory(directory).await?;
    let final_path = directory.join(generate_file_name(&artifact.metadata));

    match fs::try_exists(&final_path).await {
        Ok(false) => {}
        Ok(true) => {
            return Err(StorageError::local(
                LocalErrorKind::AlreadyExists,
                format!("{} already exists", final_path.display()),
            ));
        }
        Err(e) => {
            return Err(StorageError::local_io(
                LocalErrorKind::WriteFailed,
                format!("cannot check {}", final_path.display()),
                e,
            ));
        }
    }

    if artifact.payload.is_empty() {
        return Err(StorageError::local(
            LocalErrorKind::EmptyPayload,
            "recording payload is empty",
        ));
    }

    write_atomic(&final_path, &artifact.payload, link_into_place).await?;

    let written = fs::metadata(&final_path)
        .await
        .map_err(|e| {
            StorageError::local_io(
                LocalErrorKind::WriteFailed,
                format!("cannot stat {}", final_path.display()),
                e,
            )
        })?
        .len();
    if written != artifact.payload.len() as u64 {
        return Err(StorageError::local(
            LocalErrorKind::SizeMismatch,
            format!(
                "{} is {} bytes, expected {}",
                final_path.display(),
                written,
                artifact.payload.len()
            ),
        ));
    }

    tracing::info!("Saved recording {} to {:?}", artifact.metadata.id, final_path);
    Ok(final_path)
}

/// Ensure `directory` exists, is a directory and is writable.
///
/// Returns the canonical absolute path.
async fn prepare_directory(directory: &Path) -> StorageResult<PathBuf> {
    match fs::metadata(directory).await {
        Ok(meta) if !meta.is_dir() => {
            return Err(StorageError::local(
                LocalErrorKind::NotADirectory,
                format!("{} is not a directory", directory.display()),
            ));
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("Creating recordings directory {:?}", directory);
            fs::create_dir_all(directory).await.map_err(|e| {
                let kind = if e.kind() == ErrorKind::PermissionDenied {
                    LocalErrorKind::PermissionDenied
                } else {
                    LocalErrorKind::CannotCreateDirectory
                };
                StorageError::local_io(kind, format!("cannot create {}", directory.display()), e)
            })?;
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(StorageError::local_io(
                LocalErrorKind::PermissionDenied,
                format!("cannot access {}", directory.display()),
                e,
            ));
        }
        Err(e) => {
            return Err(StorageError::local_io(
                LocalErrorKind::CannotCreateDirectory,
                format!("cannot access {}", directory.display()),
                e,
            ));
        }
    }

    let directory = fs::canonicalize(directory).await.map_err(|e| {
        StorageError::local_io(
            LocalErrorKind::CannotCreateDirectory,
            format!("cannot resolve {}", directory.display()),
            e,
        )
    })?;

    let probe = directory.join(format!(".write-probe-{}", Uuid::new_v4().simple()));
    if let Err(e) = fs::write(&probe, b"").await {
        let kind = if e.kind() == ErrorKind::PermissionDenied {
            LocalErrorKind::PermissionDenied
        } else {
            LocalErrorKind::WriteFailed
        };
        return Err(StorageError::local_io(
            kind,
            format!("{} is not writable", directory.display()),
            e,
        ));
    }
    if let Err(e) = fs::remove_file(&probe).await {
        tracing::warn!("Failed to remove write probe {:?}: {}", probe, e);
    }

    Ok(directory)
}

/// Temporary sibling of `final_path`
fn temp_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

/// Move `from` to `to` without replacing an existing `to`
async fn link_into_place(from: PathBuf, to: PathBuf) -> std::io::Result<()> {
    fs::hard_link(&from, &to).await?;
    if let Err(e) = fs::remove_file(&from).await {
        tracing::warn!("Failed to remove temporary file {:?}: {}", from, e);
    }
    Ok(())
}

/// Write `payload` to a temporary sibling and move it onto `final_path` with
/// `publish`. The temporary file is removed if any step fails.
pub(crate) async fn write_atomic<F, Fut>(final_path: &Path, payload: &[u8], publish: F) -> StorageResult<()>
where
    F: FnOnce(PathBuf, PathBuf) -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let temp_path = temp_path_for(final_path);

    let result = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(payload).await?;
        file.sync_all().await?;
        drop(file);
        publish(temp_path.clone(), final_path.to_path_buf()).await
    }
    .await;

    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&temp_path).await {
            if cleanup.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove temporary file {:?}: {}", temp_path, cleanup);
            }
        }
        if e.kind() == ErrorKind::AlreadyExists {
            return Err(StorageError::local_io(
                LocalErrorKind::AlreadyExists,
                format!("{} already exists", final_path.display()),
                e,
            ));
        }
        return Err(StorageError::local_io(
            LocalErrorKind::WriteFailed,
            format!("failed to write {}", final_path.display()),
            e,
        ));
    }
    Ok(())
}
