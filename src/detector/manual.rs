//! Manually fed detector
//!
//! A `BarcodeDetector` whose detections are pushed by the host (a handheld
//! scanner wedge, a terminal, a test). Detections emitted while the detector
//! is not running are dropped, as a camera-based decoder would drop them.

use super::traits::{
    BarcodeDetector, DetectionHandler, DetectorConfig, DetectorInitError, HandlerId, RawDetection,
    VideoTarget,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct ManualDetector {
    handlers: RwLock<Vec<(HandlerId, DetectionHandler)>>,
    next_id: AtomicU64,
    running: AtomicBool,
    init_failure: Mutex<Option<String>>,
    target: Mutex<Option<VideoTarget>>,
}

impl ManualDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `init` fail with `message`
    pub fn fail_init_with(&self, message: &str) {
        *self.init_failure.lock() = Some(message.to_string());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Target the detector was last bound to
    pub fn target(&self) -> Option<VideoTarget> {
        self.target.lock().clone()
    }

    /// Deliver a detection to every registered handler
    pub fn emit(&self, detection: RawDetection) {
        if !self.is_running() {
            tracing::trace!("Detector not running, dropping detection");
            return;
        }
        let handlers: Vec<DetectionHandler> =
            self.handlers.read().iter().map(|(_, h)| h.clone()).collect();
        for handler in handlers {
            handler(&detection);
        }
    }

    /// Convenience for `emit` with a full-confidence code
    pub fn emit_code(&self, code: &str) {
        self.emit(RawDetection::new(code, Some(100.0)));
    }
}

#[async_trait]
impl BarcodeDetector for ManualDetector {
    async fn init(&self, target: &VideoTarget, _config: &DetectorConfig) -> Result<(), DetectorInitError> {
        if let Some(message) = self.init_failure.lock().clone() {
            return Err(DetectorInitError(message));
        }
        *self.target.lock() = Some(target.clone());
        Ok(())
    }

    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn on_detected(&self, handler: DetectionHandler) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers.write().push((id, handler));
        id
    }

    fn off_detected(&self, id: HandlerId) {
        self.handlers.write().retain(|(handler_id, _)| *handler_id != id);
    }
}
