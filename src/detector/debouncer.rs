//! Detector debouncer
//!
//! Turns the detector's noisy, high-frequency candidate stream into a clean
//! sequence of accepted barcodes. A candidate is accepted when its code is
//! long enough, its confidence (if reported) is strictly above the threshold,
//! and the same code was not accepted within the debounce window.

use super::traits::{BarcodeDetector, DetectorConfig, HandlerId, RawDetection, VideoTarget};
use crate::utils::callbacks::{CallbackId, CallbackList};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Acceptance policy for raw detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebounceConfig {
    /// Shortest code accepted
    pub min_code_length: usize,

    /// Confidence must be strictly greater than this to be accepted
    pub confidence_threshold: f64,

    /// Minimum time between two acceptances of the same code
    pub debounce_window_ms: u64,

    /// Settings passed through to the detector
    pub detector: DetectorConfig,
}

impl DebounceConfig {
    /// Relaxed threshold used when testing with poor print quality
    pub fn debug() -> Self {
        Self {
            confidence_threshold: 50.0,
            ..Self::default()
        }
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            min_code_length: 3,
            confidence_threshold: 75.0,
            debounce_window_ms: 1000,
            detector: DetectorConfig::default(),
        }
    }
}

/// Why a detection was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingCode,
    TooShort,
    LowConfidence,
    Debounced,
}

/// State shared with the handler registered on the detector
struct Filter {
    config: DebounceConfig,
    last_accepted: Mutex<Option<(String, Instant)>>,
    callbacks: CallbackList<String>,
}

impl Filter {
    fn evaluate(&self, detection: &RawDetection) -> Result<String, Rejection> {
        let result = &detection.code_result;
        let code = match result.code.as_deref() {
            Some(code) if !code.is_empty() => code,
            _ => return Err(Rejection::MissingCode),
        };
        if code.chars().count() < self.config.min_code_length {
            return Err(Rejection::TooShort);
        }
        if let Some(confidence) = result.confidence {
            if !(confidence > self.config.confidence_threshold) {
                return Err(Rejection::LowConfidence);
            }
        }

        let now = Instant::now();
        let mut last = self.last_accepted.lock();
        if let Some((last_code, accepted_at)) = last.as_ref() {
            if last_code == code && now.duration_since(*accepted_at) < self.config.window() {
                return Err(Rejection::Debounced);
            }
        }
        *last = Some((code.to_string(), now));
        Ok(code.to_string())
    }

    fn handle(&self, detection: &RawDetection) {
        match self.evaluate(detection) {
            Ok(code) => {
                tracing::debug!("Accepted barcode {}", code);
                self.callbacks.notify(&code);
            }
            Err(reason) => {
                tracing::trace!("Rejected detection {:?}: {:?}", detection.code_result.code, reason);
            }
        }
    }
}

struct Subscription {
    handler: Option<HandlerId>,
}

/// Debounces an opaque barcode detector and fans accepted codes out to callbacks
pub struct DetectorDebouncer {
    detector: Arc<dyn BarcodeDetector>,
    filter: Arc<Filter>,
    subscription: Mutex<Subscription>,
    last_init_error: Mutex<Option<String>>,
}

impl DetectorDebouncer {
    pub fn new(detector: Arc<dyn BarcodeDetector>, config: DebounceConfig) -> Self {
        Self {
            detector,
            filter: Arc::new(Filter {
                config,
                last_accepted: Mutex::new(None),
                callbacks: CallbackList::new("barcode"),
            }),
            subscription: Mutex::new(Subscription { handler: None }),
            last_init_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.filter.config
    }

    pub fn is_active(&self) -> bool {
        self.subscription.lock().handler.is_some()
    }

    /// Diagnostic from the most recent failed `start`
    pub fn last_init_error(&self) -> Option<String> {
        self.last_init_error.lock().clone()
    }

    /// Bind the detector to `target` and begin filtering its detections.
    ///
    /// An init failure is not returned: it is logged, kept for
    /// `last_init_error`, and leaves the debouncer inactive.
    pub async fn start(&self, target: &VideoTarget) {
        if self.is_active() {
            tracing::debug!("Barcode detection already active");
            return;
        }

        tracing::info!("Starting barcode detection on {:?}", target);
        if let Err(e) = self.detector.init(target, &self.filter.config.detector).await {
            tracing::error!("{}", e);
            *self.last_init_error.lock() = Some(e.0);
            return;
        }

        let filter = self.filter.clone();
        let handler = self
            .detector
            .on_detected(Arc::new(move |detection: &RawDetection| filter.handle(detection)));

        let mut subscription = self.subscription.lock();
        if subscription.handler.is_some() {
            // Lost a race with a concurrent start
            self.detector.off_detected(handler);
            return;
        }
        subscription.handler = Some(handler);
        drop(subscription);

        self.detector.start();
        *self.last_init_error.lock() = None;
        tracing::info!("Barcode detection started");
    }

    /// Stop detection. No-op when inactive.
    pub fn stop(&self) {
        let Some(handler) = self.subscription.lock().handler.take() else {
            return;
        };
        self.detector.off_detected(handler);
        self.detector.stop();
        *self.filter.last_accepted.lock() = None;
        tracing::info!("Barcode detection stopped");
    }

    /// Register a callback for accepted barcodes
    pub fn on_detected<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.filter.callbacks.add(callback)
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        self.filter.callbacks.remove(id)
    }

    pub fn clear_callbacks(&self) {
        self.filter.callbacks.clear();
    }

    /// Apply the acceptance policy to one detection, as if the detector had
    /// reported it
    pub fn process(&self, detection: &RawDetection) {
        self.filter.handle(detection);
    }
}

impl Drop for DetectorDebouncer {
    fn drop(&mut self) {
        self.stop();
    }
}
