//! Synthetic capture sink
//!
//! Produces deterministic placeholder chunks instead of encoded video. Used by
//! the host binary when no real encoder is attached, and by tests to drive a
//! capture session through its whole lifecycle (including sink failures).

use super::traits::{CaptureError, CaptureEvent, CaptureSink, MediaSource, Resolution};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default size of one synthetic chunk
pub const DEFAULT_CHUNK_BYTES: usize = 4096;

pub struct SyntheticCaptureSink {
    chunk_bytes: usize,
    resolution: Option<Resolution>,
    has_audio: bool,
    stall_on_stop: bool,
    tx: Mutex<Option<mpsc::UnboundedSender<CaptureEvent>>>,
    started: AtomicBool,
    paused: AtomicBool,
    chunks_emitted: AtomicU64,
}

impl SyntheticCaptureSink {
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            chunk_bytes,
            resolution: Some(Resolution {
                width: 1920,
                height: 1080,
            }),
            has_audio: true,
            stall_on_stop: false,
            tx: Mutex::new(None),
            started: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            chunks_emitted: AtomicU64::new(0),
        }
    }

    /// Report no video track information, as a sink without introspection would
    pub fn without_track_info(mut self) -> Self {
        self.resolution = None;
        self.has_audio = false;
        self
    }

    /// Never acknowledge `stop()`, as a hung encoder would
    pub fn stalling_on_stop(mut self) -> Self {
        self.stall_on_stop = true;
        self
    }

    /// Number of chunks handed out so far
    pub fn chunks_emitted(&self) -> u64 {
        self.chunks_emitted.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Push an externally supplied chunk, bypassing the paused flag
    pub fn push_chunk(&self, chunk: Vec<u8>) {
        self.send(CaptureEvent::Chunk(chunk));
    }

    /// Simulate a hardware failure: emit an error and close the stream
    pub fn fail(&self, message: &str) {
        self.send(CaptureEvent::Error(message.to_string()));
        self.tx.lock().take();
    }

    fn next_chunk(&self) -> Vec<u8> {
        let index = self.chunks_emitted.fetch_add(1, Ordering::SeqCst);
        vec![(index % 251) as u8; self.chunk_bytes]
    }

    fn send(&self, event: CaptureEvent) {
        if let Some(tx) = self.tx.lock().as_ref() {
            if tx.send(event).is_err() {
                tracing::debug!("Synthetic sink has no listener, dropping event");
            }
        }
    }
}

impl Default for SyntheticCaptureSink {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_BYTES)
    }
}

impl CaptureSink for SyntheticCaptureSink {
    fn start(&self, timeslice: Duration) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, CaptureError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyStarted);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock() = Some(tx);

        tracing::debug!("Synthetic sink started (timeslice {:?})", timeslice);
        Ok(rx)
    }

    fn request_data(&self) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }
        let chunk = self.next_chunk();
        self.send(CaptureEvent::Chunk(chunk));
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        if self.stall_on_stop {
            return;
        }
        if !self.paused.load(Ordering::SeqCst) {
            let chunk = self.next_chunk();
            self.send(CaptureEvent::Chunk(chunk));
        }
        self.send(CaptureEvent::Stopped);
        self.tx.lock().take();
    }

    fn video_resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    fn has_audio(&self) -> bool {
        self.has_audio
    }
}

/// Media source handing out synthetic sinks.
///
/// Keeps the most recently created sink reachable so callers can inject
/// chunks or failures into the running recording.
pub struct SyntheticMediaSource {
    chunk_bytes: usize,
    last_sink: Mutex<Option<Arc<SyntheticCaptureSink>>>,
    sinks_created: AtomicU64,
    unavailable: AtomicBool,
}

impl SyntheticMediaSource {
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            chunk_bytes,
            last_sink: Mutex::new(None),
            sinks_created: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn last_sink(&self) -> Option<Arc<SyntheticCaptureSink>> {
        self.last_sink.lock().clone()
    }

    pub fn sinks_created(&self) -> u64 {
        self.sinks_created.load(Ordering::SeqCst)
    }

    /// Make subsequent `create_sink` calls fail, as an unplugged camera would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl Default for SyntheticMediaSource {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_BYTES)
    }
}

impl MediaSource for SyntheticMediaSource {
    fn create_sink(&self) -> Result<Arc<dyn CaptureSink>, CaptureError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CaptureError::Unavailable(
                "synthetic source disabled".to_string(),
            ));
        }

        let sink = Arc::new(SyntheticCaptureSink::new(self.chunk_bytes));
        *self.last_sink.lock() = Some(sink.clone());
        self.sinks_created.fetch_add(1, Ordering::SeqCst);
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_flushes_then_signals_stopped() {
        let sink = SyntheticCaptureSink::new(8);
        let mut rx = sink.start(Duration::from_millis(100)).unwrap();

        sink.request_data();
        sink.stop();

        assert_eq!(rx.recv().await, Some(CaptureEvent::Chunk(vec![0; 8])));
        assert_eq!(rx.recv().await, Some(CaptureEvent::Chunk(vec![1; 8])));
        assert_eq!(rx.recv().await, Some(CaptureEvent::Stopped));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_paused_sink_emits_nothing() {
        let sink = SyntheticCaptureSink::new(8);
        let mut rx = sink.start(Duration::from_millis(100)).unwrap();

        sink.pause();
        sink.request_data();
        sink.stop();

        assert_eq!(rx.recv().await, Some(CaptureEvent::Stopped));
        assert_eq!(sink.chunks_emitted(), 0);
    }

    #[test]
    fn test_double_start_rejected() {
        let sink = SyntheticCaptureSink::default();
        let _rx = sink.start(Duration::from_secs(1)).unwrap();
        assert_eq!(
            sink.start(Duration::from_secs(1)).unwrap_err(),
            CaptureError::AlreadyStarted
        );
    }

    #[test]
    fn test_unavailable_source() {
        let source = SyntheticMediaSource::default();
        source.set_unavailable(true);
        assert!(source.create_sink().is_err());
        assert_eq!(source.sinks_created(), 0);
    }
}
