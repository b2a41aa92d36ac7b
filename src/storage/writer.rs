//! Storage writer
//!
//! Fans a finished recording out to the local and remote sinks concurrently,
//! publishes per-sink progress to status observers and aggregates the result.

use super::local::{FileSystemStore, LocalStore};
use super::remote::{probe_and_upload, translate_provider_error, ClientFactory, ObjectStoreClient, RemoteConfig, RetryPolicy};
use super::types::{
    SinkError, SinkKind, SinkStatus, StorageError, StorageOperationStatus, StorageOutcome, StorageResult,
};
use super::validation::validate_artifact;
use crate::recorder::state::RecordingArtifact;
use crate::utils::callbacks::{CallbackId, CallbackList};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct StorageWriter {
    local: Arc<dyn LocalStore>,
    client_factory: Option<Arc<dyn ClientFactory>>,
    /// Created on first upload, reused until `clear_client`
    client: Mutex<Option<Arc<dyn ObjectStoreClient>>>,
    retry: RetryPolicy,
    status: Mutex<StorageOperationStatus>,
    observers: CallbackList<StorageOperationStatus>,
}

impl StorageWriter {
    /// Writer that uploads through clients built by `client_factory`
    pub fn new(client_factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            client_factory: Some(client_factory),
            ..Self::local_only()
        }
    }

    /// Writer without an object store; remote uploads fail validation
    pub fn local_only() -> Self {
        Self {
            local: Arc::new(FileSystemStore),
            client_factory: None,
            client: Mutex::new(None),
            retry: RetryPolicy::default(),
            status: Mutex::new(StorageOperationStatus::default()),
            observers: CallbackList::new("storage status"),
        }
    }

    pub fn with_local_store(mut self, local: Arc<dyn LocalStore>) -> Self {
        self.local = local;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Save a recording into `directory`, returning the absolute path
    pub async fn save_local(&self, artifact: &RecordingArtifact, directory: &Path) -> StorageResult<PathBuf> {
        self.local.save(artifact, directory).await
    }

    /// Upload a recording, returning its `s3://bucket/key` URI
    pub async fn upload_to_remote(&self, artifact: &RecordingArtifact, config: &RemoteConfig) -> StorageResult<String> {
        validate_artifact(artifact)?;
        if artifact.payload.is_empty() {
            return Err(StorageError::validation("recording payload is empty"));
        }
        config.validate()?;

        let client = self.client_for(config)?;
        probe_and_upload(client.as_ref(), artifact, config, &self.retry).await
    }

    fn client_for(&self, config: &RemoteConfig) -> StorageResult<Arc<dyn ObjectStoreClient>> {
        let mut cached = self.client.lock();
        if let Some(client) = cached.as_ref() {
            return Ok(client.clone());
        }

        let factory = self
            .client_factory
            .as_ref()
            .ok_or_else(|| StorageError::validation("no object store is configured"))?;
        let client = factory
            .create(config)
            .map_err(|e| translate_provider_error(e, config))?;
        tracing::debug!("Created object store client for bucket '{}'", config.bucket);

        *cached = Some(client.clone());
        Ok(client)
    }

    /// Drop the cached client; the next upload creates a new one
    pub fn clear_client(&self) {
        if self.client.lock().take().is_some() {
            tracing::info!("Object store client cleared");
        }
    }

    /// Save to every configured sink concurrently.
    ///
    /// Never fails as a whole; per-sink errors are collected in the outcome.
    pub async fn save_recording(
        &self,
        artifact: &RecordingArtifact,
        local_dir: Option<&Path>,
        remote: Option<&RemoteConfig>,
    ) -> StorageOutcome {
        if local_dir.is_none() && remote.is_none() {
            tracing::warn!("Recording {} has no storage destination", artifact.metadata.id);
            return StorageOutcome::rejected(StorageError::validation(
                "no storage destination is configured",
            ));
        }

        // Saves may overlap; each one publishes only its own snapshot
        let operation = Mutex::new(StorageOperationStatus {
            recording_id: Some(artifact.metadata.id.clone()),
            local: SinkStatus {
                enabled: local_dir.is_some(),
                ..SinkStatus::default()
            },
            remote: SinkStatus {
                enabled: remote.is_some(),
                ..SinkStatus::default()
            },
        });

        let local = async {
            let directory = local_dir?;
            self.update_status(&operation, SinkKind::Local, SinkStatus::started());
            let result = self.save_local(artifact, directory).await;
            self.finish_sink(&operation, SinkKind::Local, result.as_ref().map(|p| p.display().to_string()));
            Some(result)
        };
        let remote = async {
            let config = remote?;
            self.update_status(&operation, SinkKind::Remote, SinkStatus::started());
            let result = self.upload_to_remote(artifact, config).await;
            self.finish_sink(&operation, SinkKind::Remote, result.as_ref().cloned());
            Some(result)
        };

        let (local, remote) = tokio::join!(local, remote);

        let mut outcome = StorageOutcome::default();
        match local {
            Some(Ok(path)) => outcome.local_path = Some(path),
            Some(Err(error)) => outcome.errors.push(SinkError {
                sink: Some(SinkKind::Local),
                error,
            }),
            None => {}
        }
        match remote {
            Some(Ok(uri)) => outcome.remote_path = Some(uri),
            Some(Err(error)) => outcome.errors.push(SinkError {
                sink: Some(SinkKind::Remote),
                error,
            }),
            None => {}
        }
        outcome.success = outcome.errors.is_empty();

        if outcome.success {
            tracing::info!("Recording {} stored", artifact.metadata.id);
        } else {
            for failure in &outcome.errors {
                tracing::error!(
                    "Recording {} failed on {:?} sink: {}",
                    artifact.metadata.id,
                    failure.sink,
                    failure.error
                );
            }
        }
        outcome
    }

    fn finish_sink(
        &self,
        operation: &Mutex<StorageOperationStatus>,
        sink: SinkKind,
        result: Result<String, &StorageError>,
    ) {
        let status = match result {
            Ok(path) => SinkStatus::succeeded(path),
            Err(e) => SinkStatus::failed(e.to_string()),
        };
        self.update_status(operation, sink, status);
    }

    /// Record a sink's new status in its operation and publish that snapshot
    /// as the latest one
    fn update_status(&self, operation: &Mutex<StorageOperationStatus>, sink: SinkKind, status: SinkStatus) {
        let snapshot = {
            let mut current = operation.lock();
            *current.sink_mut(sink) = status;
            current.clone()
        };
        *self.status.lock() = snapshot.clone();
        self.observers.notify(&snapshot);
    }

    /// Register a status observer
    pub fn on_status_update<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&StorageOperationStatus) + Send + Sync + 'static,
    {
        self.observers.add(callback)
    }

    pub fn remove_status_callback(&self, id: CallbackId) -> bool {
        self.observers.remove(id)
    }

    /// Snapshot most recently published by any save
    pub fn get_storage_status(&self) -> StorageOperationStatus {
        self.status.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::naming::fixtures;
    use crate::storage::remote::testing::{config, MockFactory, MockObjectStore};
    use crate::storage::types::{RemoteErrorKind, StorageErrorKind};
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::tempdir;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay_ms: 1,
        }
    }

    fn writer_with(client: Arc<MockObjectStore>) -> (StorageWriter, Arc<MockFactory>) {
        let factory = Arc::new(MockFactory::new(client));
        let writer = StorageWriter::new(factory.clone()).with_retry_policy(fast_retry());
        (writer, factory)
    }

    /// Local store that only waits
    struct SlowLocalStore(Duration);

    #[async_trait]
    impl LocalStore for SlowLocalStore {
        async fn save(&self, _artifact: &RecordingArtifact, directory: &Path) -> StorageResult<PathBuf> {
            tokio::time::sleep(self.0).await;
            Ok(directory.join("clip.webm"))
        }
    }

    #[tokio::test]
    async fn test_no_destination_is_validation_error() {
        let (writer, _) = writer_with(Arc::new(MockObjectStore::default()));
        let notified = Arc::new(Mutex::new(0));
        let n = notified.clone();
        writer.on_status_update(move |_| *n.lock() += 1);

        let outcome = writer
            .save_recording(&fixtures::artifact("PKG-1", vec![1]), None, None)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].sink, None);
        assert_eq!(outcome.errors[0].error.kind(), StorageErrorKind::Validation);
        assert_eq!(*notified.lock(), 0);
    }

    #[tokio::test]
    async fn test_local_only_emits_start_and_completion() {
        let dir = tempdir().unwrap();
        let writer = StorageWriter::local_only();
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let s = snapshots.clone();
        writer.on_status_update(move |status| s.lock().push(status.clone()));

        let outcome = writer
            .save_recording(&fixtures::artifact("PKG-1", vec![1, 2]), Some(dir.path()), None)
            .await;

        assert!(outcome.success);
        assert!(outcome.local_path.is_some());
        assert!(outcome.remote_path.is_none());

        let snapshots = snapshots.lock();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[0].local.in_progress);
        assert!(!snapshots[0].remote.enabled);
        assert!(snapshots[1].local.completed);
        assert!(!snapshots[1].local.in_progress);
        assert_eq!(writer.get_storage_status(), snapshots[1]);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_local_result() {
        let dir = tempdir().unwrap();
        let client = Arc::new(MockObjectStore::failing_every_put());
        let (writer, _) = writer_with(client.clone());
        let remote = config();

        let outcome = writer
            .save_recording(
                &fixtures::artifact("PKG-1", vec![1, 2, 3]),
                Some(dir.path()),
                Some(&remote),
            )
            .await;

        assert!(!outcome.success);
        assert!(outcome.local_path.as_ref().unwrap().exists());
        assert!(outcome.remote_path.is_none());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].sink, Some(SinkKind::Remote));
        assert_eq!(outcome.errors[0].error.remote_kind(), Some(RemoteErrorKind::Other));
        assert_eq!(client.probes.load(Ordering::SeqCst), 1);
        assert_eq!(client.puts.load(Ordering::SeqCst), 4);

        let status = writer.get_storage_status();
        assert!(status.local.completed);
        assert!(status.remote.error.is_some());
        assert!(!status.remote.in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sinks_run_concurrently() {
        let delay = Duration::from_millis(200);
        let client = Arc::new(MockObjectStore::default());
        *client.put_delay.lock() = Some(delay);
        let (writer, _) = writer_with(client);
        let writer = writer.with_local_store(Arc::new(SlowLocalStore(delay)));
        let remote = config();
        let started = tokio::time::Instant::now();

        let outcome = writer
            .save_recording(
                &fixtures::artifact("PKG-1", vec![1]),
                Some(Path::new("/recordings")),
                Some(&remote),
            )
            .await;

        assert!(outcome.success);
        assert_eq!(started.elapsed(), delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_saves_publish_separate_snapshots() {
        let client = Arc::new(MockObjectStore::default());
        *client.put_delay.lock() = Some(Duration::from_millis(500));
        let (writer, _) = writer_with(client);
        let writer = writer.with_local_store(Arc::new(SlowLocalStore(Duration::from_millis(10))));
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let s = snapshots.clone();
        writer.on_status_update(move |status| s.lock().push(status.clone()));

        let mut first = fixtures::artifact("PKG-1", vec![1]);
        first.metadata.id = "rec_1".to_string();
        let mut second = fixtures::artifact("PKG-2", vec![2]);
        second.metadata.id = "rec_2".to_string();
        let remote = config();
        let directory = Path::new("/recordings");

        let (first_outcome, second_outcome) = tokio::join!(
            writer.save_recording(&first, Some(directory), Some(&remote)),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                writer.save_recording(&second, Some(directory), None).await
            }
        );
        assert!(first_outcome.success);
        assert!(second_outcome.success);

        for status in snapshots.lock().iter() {
            match status.recording_id.as_deref() {
                Some("rec_1") => assert!(status.remote.enabled),
                Some("rec_2") => {
                    assert!(!status.remote.enabled);
                    assert_eq!(status.remote.path, None);
                }
                other => panic!("snapshot without its recording: {:?}", other),
            }
        }

        // The remote upload of the first save finishes last
        let latest = writer.get_storage_status();
        assert_eq!(latest.recording_id.as_deref(), Some("rec_1"));
        assert!(latest.remote.completed);
        assert!(latest.local.completed);
    }

    #[tokio::test]
    async fn test_panicking_observer_is_isolated() {
        let dir = tempdir().unwrap();
        let (writer, _) = writer_with(Arc::new(MockObjectStore::default()));
        let seen = Arc::new(Mutex::new(0));

        writer.on_status_update(|_| panic!("observer bug"));
        let s = seen.clone();
        writer.on_status_update(move |_| *s.lock() += 1);

        let remote = config();
        let outcome = writer
            .save_recording(
                &fixtures::artifact("PKG-1", vec![1]),
                Some(dir.path()),
                Some(&remote),
            )
            .await;

        assert!(outcome.success);
        // start + completion per sink
        assert_eq!(*seen.lock(), 4);
    }

    #[tokio::test]
    async fn test_removed_observer_is_not_called() {
        let dir = tempdir().unwrap();
        let writer = StorageWriter::local_only();
        let seen = Arc::new(Mutex::new(0));
        let s = seen.clone();
        let id = writer.on_status_update(move |_| *s.lock() += 1);

        assert!(writer.remove_status_callback(id));
        writer
            .save_recording(&fixtures::artifact("PKG-1", vec![1]), Some(dir.path()), None)
            .await;
        assert_eq!(*seen.lock(), 0);
    }

    #[tokio::test]
    async fn test_client_is_cached_until_cleared() {
        let (writer, factory) = writer_with(Arc::new(MockObjectStore::default()));
        let remote = config();

        writer
            .upload_to_remote(&fixtures::artifact("PKG-1", vec![1]), &remote)
            .await
            .unwrap();
        writer
            .upload_to_remote(&fixtures::artifact("PKG-2", vec![1]), &remote)
            .await
            .unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        writer.clear_client();
        writer
            .upload_to_remote(&fixtures::artifact("PKG-3", vec![1]), &remote)
            .await
            .unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_remote_config_skips_network() {
        let client = Arc::new(MockObjectStore::default());
        let (writer, factory) = writer_with(client.clone());
        let mut remote = config();
        remote.bucket = "No_Such_Format".to_string();

        let err = writer
            .upload_to_remote(&fixtures::artifact("PKG-1", vec![1]), &remote)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), StorageErrorKind::Validation);
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
        assert_eq!(client.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_payload_is_not_uploaded() {
        let client = Arc::new(MockObjectStore::default());
        let (writer, _) = writer_with(client.clone());

        let err = writer
            .upload_to_remote(&fixtures::artifact("PKG-1", Vec::new()), &config())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), StorageErrorKind::Validation);
        assert_eq!(client.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_local_only_writer_rejects_remote() {
        let writer = StorageWriter::local_only();

        let err = writer
            .upload_to_remote(&fixtures::artifact("PKG-1", vec![1]), &config())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Validation);
    }
}
