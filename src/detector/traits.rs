//! Barcode detector trait definitions
//!
//! The optical decoder is external. It is bound to a video target, started,
//! and reports every candidate it decodes to the handlers registered on it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Opaque handle to the video-frame source a detector scans
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoTarget(pub String);

impl VideoTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Decoded barcode candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeResult {
    pub code: Option<String>,

    /// Decoder confidence, 0-100, when the decoder reports one
    pub confidence: Option<f64>,

    /// Symbology (e.g. "code_128")
    pub format: Option<String>,
}

/// One raw detection as emitted by the detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDetection {
    pub code_result: CodeResult,
}

impl RawDetection {
    pub fn new(code: &str, confidence: Option<f64>) -> Self {
        Self {
            code_result: CodeResult {
                code: Some(code.to_string()),
                confidence,
                format: None,
            },
        }
    }
}

/// Decoder settings passed to `init`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    /// Symbologies to decode
    pub formats: Vec<String>,

    /// Scans per second
    pub frequency: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            formats: ["code_128", "ean", "ean_8", "code_39", "upc"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            frequency: 10,
        }
    }
}

/// Detector failed to initialize (no camera, unsupported target, ...)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Barcode detector failed to initialize: {0}")]
pub struct DetectorInitError(pub String);

/// Identifies a handler registered on a detector
pub type HandlerId = u64;

/// Handler invoked for every raw detection
pub type DetectionHandler = Arc<dyn Fn(&RawDetection) + Send + Sync>;

#[async_trait]
pub trait BarcodeDetector: Send + Sync {
    /// Bind the detector to `target`
    async fn init(&self, target: &VideoTarget, config: &DetectorConfig) -> Result<(), DetectorInitError>;

    fn start(&self);

    fn stop(&self);

    fn on_detected(&self, handler: DetectionHandler) -> HandlerId;

    fn off_detected(&self, id: HandlerId);
}
