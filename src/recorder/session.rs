//! Capture session
//!
//! Owns one recording at a time: subscribes to the capture sink's event
//! stream, buffers chunks under a memory ceiling, and assembles the finished
//! artifact on stop.

use super::state::{
    generate_recording_id, CaptureConfig, RecordingArtifact, RecordingMetadata, RecordingStatus,
    SessionIdentity,
};
use crate::capture::buffer::ChunkBuffer;
use crate::capture::traits::{CaptureError, CaptureEvent, CaptureSink, Resolution};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Recording errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("A recording is already active")]
    AlreadyActive,

    #[error("No recording is active")]
    NotActive,

    #[error("Recording is already paused")]
    AlreadyPaused,

    #[error("Recording is not paused")]
    NotPaused,

    #[error("Capture failed: {0}")]
    Capture(String),
}

impl RecordingError {
    /// Whether this error reports a call made in the wrong state
    pub fn is_state_error(&self) -> bool {
        !matches!(self, RecordingError::Capture(_))
    }
}

impl From<CaptureError> for RecordingError {
    fn from(error: CaptureError) -> Self {
        RecordingError::Capture(error.to_string())
    }
}

pub type RecordingResult<T> = Result<T, RecordingError>;

/// Events emitted by a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started { barcode: String },
    Paused,
    Resumed,
    Stopped { recording_id: String },
    /// The capture sink failed and the recording for `barcode` was discarded.
    /// Not sent when the failure surfaces through `stop()` instead.
    Failed { barcode: String, message: String },
    /// The buffer ceiling dropped this many of the oldest bytes
    ChunksEvicted(usize),
}

/// How the chunk pump finished
#[derive(Debug)]
enum PumpExit {
    Stopped,
    Closed,
    Failed(String),
}

/// A recording in progress
struct Recording {
    generation: u64,
    barcode: String,
    started_at: DateTime<Utc>,
    started: Instant,
    buffer: Arc<Mutex<ChunkBuffer>>,
    sink: Arc<dyn CaptureSink>,
    pump: Option<JoinHandle<PumpExit>>,
    ticker: JoinHandle<()>,
}

impl Drop for Recording {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

enum SessionState {
    Idle,
    Active(Recording),
    Paused(Recording),
}

impl SessionState {
    fn status(&self) -> RecordingStatus {
        match self {
            SessionState::Idle => RecordingStatus::Idle,
            SessionState::Active(_) => RecordingStatus::Active,
            SessionState::Paused(_) => RecordingStatus::Paused,
        }
    }

    fn recording(&self) -> Option<&Recording> {
        match self {
            SessionState::Idle => None,
            SessionState::Active(recording) | SessionState::Paused(recording) => Some(recording),
        }
    }
}

/// Records one barcode-keyed clip at a time
pub struct CaptureSession {
    identity: SessionIdentity,
    config: CaptureConfig,
    state: Arc<Mutex<SessionState>>,
    generation: AtomicU64,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CaptureSession {
    pub fn new(identity: SessionIdentity, config: CaptureConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            identity,
            config,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            generation: AtomicU64::new(0),
            event_tx,
        }
    }

    pub fn status(&self) -> RecordingStatus {
        self.state.lock().status()
    }

    pub fn is_recording(&self) -> bool {
        self.status().is_recording()
    }

    pub fn is_paused(&self) -> bool {
        self.status() == RecordingStatus::Paused
    }

    /// Barcode of the recording in progress
    pub fn current_barcode(&self) -> Option<String> {
        self.state.lock().recording().map(|r| r.barcode.clone())
    }

    /// Bytes currently held in the chunk buffer
    pub fn buffered_bytes(&self) -> usize {
        self.state
            .lock()
            .recording()
            .map(|r| r.buffer.lock().total_bytes())
            .unwrap_or(0)
    }

    /// Elapsed recording time in milliseconds, 0 when idle
    pub fn duration_ms(&self) -> u64 {
        self.state
            .lock()
            .recording()
            .map(|r| r.started.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Start recording `barcode` from `sink`.
    ///
    /// Must be called from within a Tokio runtime: the chunk pump and the
    /// periodic chunk requests run as tasks.
    pub fn start(&self, sink: Arc<dyn CaptureSink>, barcode: &str) -> RecordingResult<()> {
        let mut state = self.state.lock();
        if !matches!(*state, SessionState::Idle) {
            return Err(RecordingError::AlreadyActive);
        }

        let interval = Duration::from_millis(self.config.chunk_interval_ms.max(1));
        let events = sink.start(interval)?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let buffer = Arc::new(Mutex::new(ChunkBuffer::new(self.config.max_buffer_bytes)));

        let pump = tokio::spawn(pump_events(
            events,
            buffer.clone(),
            Arc::downgrade(&self.state),
            generation,
            barcode.to_string(),
            self.event_tx.clone(),
        ));
        let ticker = tokio::spawn(request_chunks(sink.clone(), interval));

        *state = SessionState::Active(Recording {
            generation,
            barcode: barcode.to_string(),
            started_at: Utc::now(),
            started: Instant::now(),
            buffer,
            sink,
            pump: Some(pump),
            ticker,
        });
        drop(state);

        tracing::info!("Recording started for barcode {}", barcode);
        let _ = self.event_tx.send(SessionEvent::Started {
            barcode: barcode.to_string(),
        });
        Ok(())
    }

    /// Pause recording
    pub fn pause(&self) -> RecordingResult<()> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SessionState::Idle) {
            SessionState::Idle => Err(RecordingError::NotActive),
            SessionState::Paused(recording) => {
                *state = SessionState::Paused(recording);
                Err(RecordingError::AlreadyPaused)
            }
            SessionState::Active(recording) => {
                recording.sink.pause();
                *state = SessionState::Paused(recording);
                drop(state);

                tracing::info!("Recording paused");
                let _ = self.event_tx.send(SessionEvent::Paused);
                Ok(())
            }
        }
    }

    /// Resume a paused recording
    pub fn resume(&self) -> RecordingResult<()> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SessionState::Idle) {
            SessionState::Idle => Err(RecordingError::NotActive),
            SessionState::Active(recording) => {
                *state = SessionState::Active(recording);
                Err(RecordingError::NotPaused)
            }
            SessionState::Paused(recording) => {
                recording.sink.resume();
                *state = SessionState::Active(recording);
                drop(state);

                tracing::info!("Recording resumed");
                let _ = self.event_tx.send(SessionEvent::Resumed);
                Ok(())
            }
        }
    }

    /// Stop recording and assemble the artifact.
    ///
    /// The session is idle as soon as this is called, whether or not the
    /// artifact can be assembled.
    pub async fn stop(&self) -> RecordingResult<RecordingArtifact> {
        let mut recording = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SessionState::Idle) {
                SessionState::Idle => return Err(RecordingError::NotActive),
                SessionState::Active(recording) | SessionState::Paused(recording) => recording,
            }
        };

        let elapsed = recording.started.elapsed();
        tracing::info!("Stopping recording for barcode {}", recording.barcode);

        recording.ticker.abort();
        recording.sink.stop();

        let exit = match recording.pump.take() {
            Some(mut pump) => {
                let timeout = Duration::from_millis(self.config.finalize_timeout_ms);
                match tokio::time::timeout(timeout, &mut pump).await {
                    Ok(Ok(exit)) => exit,
                    Ok(Err(e)) => {
                        tracing::warn!("Chunk pump ended abnormally: {}", e);
                        PumpExit::Closed
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Capture sink did not finish flushing within {:?}, using buffered chunks",
                            timeout
                        );
                        pump.abort();
                        PumpExit::Closed
                    }
                }
            }
            None => PumpExit::Closed,
        };

        if let PumpExit::Failed(message) = exit {
            return Err(RecordingError::Capture(message));
        }

        let payload = recording.buffer.lock().take_payload();
        let duration_ms = elapsed.as_millis() as u64;
        let metadata = RecordingMetadata {
            id: generate_recording_id(),
            tenant_id: self.identity.tenant_id.clone(),
            barcode: recording.barcode.clone(),
            start_time: recording.started_at,
            end_time: recording.started_at + chrono::Duration::milliseconds(duration_ms as i64),
            duration_ms,
            device_id: self.identity.device_id.clone(),
            resolution: recording
                .sink
                .video_resolution()
                .unwrap_or(Resolution::FALLBACK),
            has_audio: recording.sink.has_audio(),
        };

        tracing::info!(
            "Recording stopped. Barcode: {}, duration: {}ms, size: {} bytes",
            metadata.barcode,
            metadata.duration_ms,
            payload.len()
        );
        let _ = self.event_tx.send(SessionEvent::Stopped {
            recording_id: metadata.id.clone(),
        });

        Ok(RecordingArtifact { payload, metadata })
    }
}

/// Ask the sink for a chunk every `interval`
async fn request_chunks(sink: Arc<dyn CaptureSink>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    loop {
        ticker.tick().await;
        sink.request_data();
    }
}

/// Move sink events into the buffer until the sink stops or fails
async fn pump_events(
    mut events: mpsc::UnboundedReceiver<CaptureEvent>,
    buffer: Arc<Mutex<ChunkBuffer>>,
    state: Weak<Mutex<SessionState>>,
    generation: u64,
    barcode: String,
    event_tx: broadcast::Sender<SessionEvent>,
) -> PumpExit {
    while let Some(event) = events.recv().await {
        match event {
            CaptureEvent::Chunk(chunk) => {
                let evicted = buffer.lock().push(chunk);
                if evicted > 0 {
                    tracing::warn!("Chunk buffer over its ceiling, dropped {} bytes", evicted);
                    let _ = event_tx.send(SessionEvent::ChunksEvicted(evicted));
                }
            }
            CaptureEvent::Stopped => return PumpExit::Stopped,
            CaptureEvent::Error(message) => {
                tracing::error!("Capture sink failed: {}", message);

                // Only discard the recording this pump belongs to
                let failed = state.upgrade().and_then(|state| {
                    let mut state = state.lock();
                    let owned = state.recording().map(|r| r.generation) == Some(generation);
                    owned.then(|| std::mem::replace(&mut *state, SessionState::Idle))
                });
                let discarded = failed.is_some();
                drop(failed);
                buffer.lock().clear();

                if discarded {
                    let _ = event_tx.send(SessionEvent::Failed {
                        barcode,
                        message: message.clone(),
                    });
                }
                return PumpExit::Failed(message);
            }
        }
    }
    PumpExit::Closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::synthetic::SyntheticCaptureSink;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            tenant_id: "tenant-1".to_string(),
            device_id: "device-1".to_string(),
        }
    }

    fn session() -> CaptureSession {
        CaptureSession::new(identity(), CaptureConfig::default())
    }

    #[tokio::test]
    async fn test_second_start_rejected_without_corrupting_buffer() {
        let session = session();
        let sink = Arc::new(SyntheticCaptureSink::new(4));
        session.start(sink.clone(), "A").unwrap();
        sink.push_chunk(vec![7, 7]);

        let other = Arc::new(SyntheticCaptureSink::new(4));
        assert_eq!(
            session.start(other, "B").unwrap_err(),
            RecordingError::AlreadyActive
        );
        assert_eq!(session.current_barcode().as_deref(), Some("A"));

        let artifact = session.stop().await.unwrap();
        assert_eq!(artifact.metadata.barcode, "A");
        assert_eq!(&artifact.payload[..2], &[7, 7]);
    }

    #[tokio::test]
    async fn test_idle_session_rejects_transitions() {
        let session = session();
        assert_eq!(session.stop().await.unwrap_err(), RecordingError::NotActive);
        assert_eq!(session.pause().unwrap_err(), RecordingError::NotActive);
        assert_eq!(session.resume().unwrap_err(), RecordingError::NotActive);
        assert!(RecordingError::NotActive.is_state_error());
    }

    #[tokio::test]
    async fn test_pause_resume_state_machine() {
        let session = session();
        let sink = Arc::new(SyntheticCaptureSink::new(4));
        session.start(sink.clone(), "A").unwrap();

        assert_eq!(session.resume().unwrap_err(), RecordingError::NotPaused);

        session.pause().unwrap();
        assert!(sink.is_paused());
        assert_eq!(session.status(), RecordingStatus::Paused);
        assert!(session.is_recording());
        assert_eq!(session.pause().unwrap_err(), RecordingError::AlreadyPaused);

        session.resume().unwrap();
        assert!(!sink.is_paused());
        assert_eq!(session.status(), RecordingStatus::Active);

        session.stop().await.unwrap();
        assert_eq!(session.status(), RecordingStatus::Idle);
    }

    #[tokio::test]
    async fn test_stop_assembles_artifact() {
        let session = session();
        let sink = Arc::new(SyntheticCaptureSink::new(3));
        session.start(sink.clone(), "PKG-42").unwrap();
        sink.push_chunk(vec![1, 2, 3]);
        sink.push_chunk(Vec::new());
        sink.push_chunk(vec![4]);

        let artifact = session.stop().await.unwrap();

        // Two pushed chunks plus the final flush
        assert_eq!(&artifact.payload[..4], &[1, 2, 3, 4]);
        assert_eq!(artifact.size(), 7);
        assert_eq!(artifact.metadata.barcode, "PKG-42");
        assert_eq!(artifact.metadata.tenant_id, "tenant-1");
        assert_eq!(artifact.metadata.device_id, "device-1");
        assert_eq!(artifact.metadata.resolution, Resolution { width: 1920, height: 1080 });
        assert!(artifact.metadata.has_audio);
        assert!(artifact.metadata.end_time >= artifact.metadata.start_time);
        assert!(!session.is_recording());
        assert_eq!(session.buffered_bytes(), 0);
    }

    #[tokio::test]
    async fn test_resolution_falls_back_without_track_info() {
        let session = session();
        let sink = Arc::new(SyntheticCaptureSink::new(3).without_track_info());
        session.start(sink, "A").unwrap();

        let artifact = session.stop().await.unwrap();
        assert_eq!(artifact.metadata.resolution, Resolution::FALLBACK);
        assert!(!artifact.metadata.has_audio);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_requested_on_interval() {
        let session = session();
        let sink = Arc::new(SyntheticCaptureSink::new(10));
        session.start(sink.clone(), "A").unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(sink.chunks_emitted(), 2);
        assert_eq!(session.buffered_bytes(), 20);

        let artifact = session.stop().await.unwrap();
        assert_eq!(artifact.size(), 30);
        assert_eq!(artifact.metadata.duration_ms, 2500);
    }

    #[tokio::test]
    async fn test_sink_error_resets_to_idle() {
        let session = session();
        let mut events = session.subscribe();
        let sink = Arc::new(SyntheticCaptureSink::new(4));
        session.start(sink.clone(), "A").unwrap();
        sink.push_chunk(vec![1; 4]);
        sink.fail("camera unplugged");

        loop {
            match events.recv().await.unwrap() {
                SessionEvent::Failed { barcode, message } => {
                    assert_eq!(barcode, "A");
                    assert_eq!(message, "camera unplugged");
                    break;
                }
                _ => continue,
            }
        }

        assert!(!session.is_recording());
        assert_eq!(session.stop().await.unwrap_err(), RecordingError::NotActive);

        // A fresh recording can start after the failure
        let sink = Arc::new(SyntheticCaptureSink::new(4));
        session.start(sink, "B").unwrap();
        assert_eq!(session.current_barcode().as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_failure_during_stop_is_returned_not_broadcast() {
        let session = session();
        let mut events = session.subscribe();
        let sink = Arc::new(SyntheticCaptureSink::new(4));
        session.start(sink.clone(), "A").unwrap();

        // The pump has not run yet, so stop() owns the recording when the error lands
        sink.fail("encoder crashed");
        assert_eq!(
            session.stop().await.unwrap_err(),
            RecordingError::Capture("encoder crashed".to_string())
        );

        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SessionEvent::Failed { .. }), "unexpected {:?}", event);
        }
        assert!(!session.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sink_bounded_by_finalize_timeout() {
        let config = CaptureConfig {
            finalize_timeout_ms: 500,
            ..CaptureConfig::default()
        };
        let session = CaptureSession::new(identity(), config);
        let sink = Arc::new(SyntheticCaptureSink::new(4).stalling_on_stop());
        session.start(sink.clone(), "A").unwrap();
        sink.push_chunk(vec![5; 4]);
        tokio::task::yield_now().await;

        let artifact = session.stop().await.unwrap();
        assert_eq!(artifact.payload, vec![5; 4]);
        assert!(!session.is_recording());
    }

    #[tokio::test]
    async fn test_buffer_ceiling_evicts_oldest() {
        let config = CaptureConfig {
            max_buffer_bytes: 8,
            ..CaptureConfig::default()
        };
        let session = CaptureSession::new(identity(), config);
        let mut events = session.subscribe();
        let sink = Arc::new(SyntheticCaptureSink::new(4));
        session.start(sink.clone(), "A").unwrap();

        sink.push_chunk(vec![1; 4]);
        sink.push_chunk(vec![2; 4]);
        sink.push_chunk(vec![3; 4]);

        let artifact = session.stop().await.unwrap();
        // Final 4-byte flush also lands, so only the two newest chunks survive
        assert_eq!(artifact.size(), 8);
        assert!(!artifact.payload.contains(&1));

        let mut evicted = 0;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::ChunksEvicted(bytes) = event {
                evicted += bytes;
            }
        }
        assert_eq!(evicted, 8);
    }
}
