//! Recording orchestrator
//!
//! Binds accepted barcodes to capture session transitions: each new barcode
//! stops the recording in progress, hands its artifact to the storage writer
//! and starts a fresh recording for the new code.
//!
//! Transitions are serialized, so the recording for barcode N+1 starts only
//! after the artifact for barcode N has been assembled. Storage of that
//! artifact continues in the background.

use super::session::{CaptureSession, RecordingError, SessionEvent};
use super::state::{RecordingArtifact, RecordingMetadata, RecordingStateSnapshot, RecordingStatus};
use crate::capture::traits::MediaSource;
use crate::detector::{DetectorDebouncer, VideoTarget};
use crate::storage::{RemoteConfig, StorageOutcome, StorageWriter};
use crate::utils::callbacks::CallbackId;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Orchestrator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Orchestrator is already active")]
    AlreadyActive,

    #[error("Orchestrator is not active")]
    NotActive,

    #[error("Barcode must not be empty")]
    EmptyBarcode,

    #[error(transparent)]
    Recording(#[from] RecordingError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Where finished recordings go
#[derive(Debug, Clone, Default)]
pub struct StorageTargets {
    pub local_directory: Option<PathBuf>,
    pub remote: Option<RemoteConfig>,
}

/// Summary of one background save
#[derive(Debug, Clone)]
pub struct StorageReport {
    pub recording_id: String,
    pub barcode: String,
    pub success: bool,
    pub local_path: Option<PathBuf>,
    pub remote_path: Option<String>,
    pub errors: Vec<String>,
}

impl StorageReport {
    fn new(metadata: &RecordingMetadata, outcome: StorageOutcome) -> Self {
        Self {
            recording_id: metadata.id.clone(),
            barcode: metadata.barcode.clone(),
            success: outcome.success,
            local_path: outcome.local_path,
            remote_path: outcome.remote_path,
            errors: outcome.errors.iter().map(|e| e.error.to_string()).collect(),
        }
    }
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    RecordingStarted {
        barcode: String,
    },
    RecordingStopped {
        recording_id: String,
        barcode: String,
        duration_ms: u64,
        size: usize,
    },
    /// A background save finished, successfully or not
    StorageFinished(StorageReport),
    /// The detector could not be initialized; manual triggers still work
    DetectionUnavailable(String),
    Error(String),
}

struct ActiveState {
    source: Arc<dyn MediaSource>,
    callback: CallbackId,
    worker: JoinHandle<()>,
    failure_watch: JoinHandle<()>,
}

#[derive(Default)]
struct OrchestratorState {
    active: Option<ActiveState>,
    last_barcode: Option<String>,
}

struct Inner {
    debouncer: DetectorDebouncer,
    session: CaptureSession,
    writer: Arc<StorageWriter>,
    targets: StorageTargets,
    /// Held for the whole of every transition
    transitions: tokio::sync::Mutex<()>,
    state: Mutex<OrchestratorState>,
    pending_storage: Mutex<Vec<JoinHandle<()>>>,
    event_tx: broadcast::Sender<OrchestratorEvent>,
}

/// Drives one capture session from a debounced barcode stream
pub struct RecordingOrchestrator {
    inner: Arc<Inner>,
}

impl RecordingOrchestrator {
    pub fn new(
        debouncer: DetectorDebouncer,
        session: CaptureSession,
        writer: Arc<StorageWriter>,
        targets: StorageTargets,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(Inner {
                debouncer,
                session,
                writer,
                targets,
                transitions: tokio::sync::Mutex::new(()),
                state: Mutex::new(OrchestratorState::default()),
                pending_storage: Mutex::new(Vec::new()),
                event_tx,
            }),
        }
    }

    /// Subscribe to orchestrator events
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn is_orchestrator_active(&self) -> bool {
        self.inner.state.lock().active.is_some()
    }

    pub fn writer(&self) -> &Arc<StorageWriter> {
        &self.inner.writer
    }

    /// Elapsed time of the recording in progress, 0 when idle
    pub fn recording_duration_ms(&self) -> u64 {
        self.inner.session.duration_ms()
    }

    pub fn get_recording_state(&self) -> RecordingStateSnapshot {
        let (is_active, last_detected_barcode) = {
            let state = self.inner.state.lock();
            (state.active.is_some(), state.last_barcode.clone())
        };
        let status = self.inner.session.status();
        RecordingStateSnapshot {
            is_active,
            is_recording: status.is_recording(),
            is_paused: status == RecordingStatus::Paused,
            last_detected_barcode,
            detection_active: self.inner.debouncer.is_active(),
        }
    }

    /// Start listening for barcodes on `target`.
    ///
    /// No recording begins until the first barcode is accepted. Recordings are
    /// captured from sinks created by `source`.
    pub async fn start(&self, target: &VideoTarget, source: Arc<dyn MediaSource>) -> OrchestratorResult<()> {
        let _transition = self.inner.transitions.lock().await;
        if self.is_orchestrator_active() {
            return Err(OrchestratorError::AlreadyActive);
        }

        tracing::info!("Starting recording orchestrator");

        let (barcode_tx, barcode_rx) = mpsc::unbounded_channel();
        let callback = self.inner.debouncer.on_detected(move |barcode| {
            let _ = barcode_tx.send(barcode.clone());
        });
        let worker = tokio::spawn(run_worker(Arc::downgrade(&self.inner), barcode_rx));
        let failure_watch = tokio::spawn(watch_failures(
            Arc::downgrade(&self.inner),
            self.inner.session.subscribe(),
        ));

        {
            let mut state = self.inner.state.lock();
            state.active = Some(ActiveState {
                source,
                callback,
                worker,
                failure_watch,
            });
            state.last_barcode = None;
        }

        self.inner.debouncer.start(target).await;
        if !self.inner.debouncer.is_active() {
            let reason = self
                .inner
                .debouncer
                .last_init_error()
                .unwrap_or_else(|| "detector failed to start".to_string());
            tracing::warn!("Barcode detection unavailable: {}", reason);
            self.inner.emit(OrchestratorEvent::DetectionUnavailable(reason));
        }

        tracing::info!("Recording orchestrator started");
        Ok(())
    }

    /// Stop detection, finish the recording in progress and wait for all
    /// pending saves. No-op when inactive.
    pub async fn stop(&self) {
        {
            let _transition = self.inner.transitions.lock().await;
            let active = self.inner.state.lock().active.take();
            let Some(active) = active else {
                return;
            };
            tracing::info!("Stopping recording orchestrator");
            self.inner.debouncer.stop();
            self.inner.debouncer.remove_callback(active.callback);

            // Neither task can be inside a transition while the lock is held;
            // barcodes still queued are dropped
            active.worker.abort();
            active.failure_watch.abort();

            match self.inner.finish_current().await {
                Ok(_) | Err(RecordingError::NotActive) => {}
                Err(e) => tracing::error!("Failed to finish recording: {}", e),
            }
            self.inner.state.lock().last_barcode = None;
        }

        self.inner.drain_storage().await;
        tracing::info!("Recording orchestrator stopped");
    }

    pub async fn pause_recording(&self) -> OrchestratorResult<()> {
        let _transition = self.inner.transitions.lock().await;
        self.inner.session.pause()?;
        Ok(())
    }

    pub async fn resume_recording(&self) -> OrchestratorResult<()> {
        let _transition = self.inner.transitions.lock().await;
        self.inner.session.resume()?;
        Ok(())
    }

    /// Finish the recording in progress and hand it to storage.
    ///
    /// Detection keeps running; the same barcode is not picked up again until
    /// a different one has been seen.
    pub async fn stop_recording(&self) -> OrchestratorResult<RecordingMetadata> {
        let _transition = self.inner.transitions.lock().await;
        Ok(self.inner.finish_current().await?)
    }

    /// Record `barcode` now, as if it had just been detected
    pub async fn force_start_recording(&self, barcode: &str) -> OrchestratorResult<()> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return Err(OrchestratorError::EmptyBarcode);
        }

        let _transition = self.inner.transitions.lock().await;
        let source = self.inner.active_source().ok_or(OrchestratorError::NotActive)?;

        tracing::info!("Forcing recording for barcode {}", barcode);
        self.inner.state.lock().last_barcode = Some(barcode.to_string());
        self.inner.switch_to(barcode, source).await?;
        Ok(())
    }
}

impl Inner {
    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }

    fn active_source(&self) -> Option<Arc<dyn MediaSource>> {
        self.state.lock().active.as_ref().map(|a| a.source.clone())
    }

    /// Handle one accepted barcode; called with no transition in progress
    async fn handle_barcode(&self, barcode: String) {
        let _transition = self.transitions.lock().await;
        let Some(source) = self.active_source() else {
            tracing::debug!("Orchestrator inactive, ignoring barcode {}", barcode);
            return;
        };

        {
            let mut state = self.state.lock();
            if state.last_barcode.as_deref() == Some(barcode.as_str()) {
                tracing::debug!("Barcode {} is already being recorded", barcode);
                return;
            }
            state.last_barcode = Some(barcode.clone());
        }

        tracing::info!("New barcode detected: {}", barcode);
        if let Err(e) = self.switch_to(&barcode, source).await {
            self.emit(OrchestratorEvent::Error(format!(
                "Failed to start recording for {}: {}",
                barcode, e
            )));
        }
    }

    /// Finish the recording in progress, if any, then start one for `barcode`
    async fn switch_to(&self, barcode: &str, source: Arc<dyn MediaSource>) -> Result<(), RecordingError> {
        match self.finish_current().await {
            Ok(_) | Err(RecordingError::NotActive) => {}
            Err(e) => {
                tracing::error!("Previous recording was lost: {}", e);
                self.emit(OrchestratorEvent::Error(e.to_string()));
            }
        }

        let started = source
            .create_sink()
            .map_err(RecordingError::from)
            .and_then(|sink| self.session.start(sink, barcode));

        match started {
            Ok(()) => {
                self.emit(OrchestratorEvent::RecordingStarted {
                    barcode: barcode.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to start recording for {}: {}", barcode, e);
                // Let the next detection of this code try again
                let mut state = self.state.lock();
                if state.last_barcode.as_deref() == Some(barcode) {
                    state.last_barcode = None;
                }
                Err(e)
            }
        }
    }

    /// Stop the session and hand its artifact to storage
    async fn finish_current(&self) -> Result<RecordingMetadata, RecordingError> {
        let artifact = self.session.stop().await?;
        let metadata = artifact.metadata.clone();

        self.emit(OrchestratorEvent::RecordingStopped {
            recording_id: metadata.id.clone(),
            barcode: metadata.barcode.clone(),
            duration_ms: metadata.duration_ms,
            size: artifact.size(),
        });
        self.hand_off(artifact);
        Ok(metadata)
    }

    fn hand_off(&self, artifact: RecordingArtifact) {
        let writer = self.writer.clone();
        let targets = self.targets.clone();
        let event_tx = self.event_tx.clone();

        tracing::debug!(
            "Handing recording {} ({} bytes) to storage",
            artifact.metadata.id,
            artifact.size()
        );
        let task = tokio::spawn(async move {
            let outcome = writer
                .save_recording(&artifact, targets.local_directory.as_deref(), targets.remote.as_ref())
                .await;
            let report = StorageReport::new(&artifact.metadata, outcome);
            let _ = event_tx.send(OrchestratorEvent::StorageFinished(report));
        });

        let mut pending = self.pending_storage.lock();
        pending.retain(|task| !task.is_finished());
        pending.push(task);
    }

    /// Report a recording the session discarded after a capture failure.
    ///
    /// The barcode may be picked up again unless a newer recording has
    /// already replaced it.
    async fn discard_failed(&self, barcode: &str, message: &str) {
        let _transition = self.transitions.lock().await;
        tracing::error!(
            "Recording for {} discarded after capture failure: {}",
            barcode,
            message
        );

        if !self.session.is_recording() {
            let mut state = self.state.lock();
            if state.last_barcode.as_deref() == Some(barcode) {
                state.last_barcode = None;
            }
        }
        self.emit(OrchestratorEvent::Error(format!(
            "Recording for {} discarded: {}",
            barcode, message
        )));
    }

    async fn drain_storage(&self) {
        let pending = std::mem::take(&mut *self.pending_storage.lock());
        if pending.is_empty() {
            return;
        }
        tracing::info!("Waiting for {} pending save(s)", pending.len());
        for task in pending {
            if let Err(e) = task.await {
                tracing::error!("Storage task failed: {}", e);
            }
        }
    }
}

async fn run_worker(inner: Weak<Inner>, mut barcodes: mpsc::UnboundedReceiver<String>) {
    while let Some(barcode) = barcodes.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_barcode(barcode).await;
    }
    tracing::debug!("Barcode worker finished");
}

/// Report capture failures and let the failed barcode be picked up again
async fn watch_failures(inner: Weak<Inner>, mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Failed { barcode, message }) => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                inner.discard_failed(&barcode, &message).await;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} session events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
