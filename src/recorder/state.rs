//! Recording state management
//!
//! Defines the recording state machine states, session configuration and the
//! artifact produced when a recording completes.

use crate::capture::buffer::DEFAULT_MAX_BUFFER_BYTES;
use crate::capture::traits::Resolution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// No recording in progress
    #[default]
    Idle,
    /// Currently recording
    Active,
    /// Recording is paused
    Paused,
}

impl RecordingStatus {
    pub fn is_recording(&self) -> bool {
        !matches!(self, RecordingStatus::Idle)
    }
}

/// Who is recording: stamped into every artifact's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub tenant_id: String,
    pub device_id: String,
}

/// Configuration for capture sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// How often chunks are requested from the sink
    pub chunk_interval_ms: u64,

    /// Memory ceiling for one recording's buffered chunks
    pub max_buffer_bytes: usize,

    /// Upper bound on waiting for the sink's final flush during stop
    pub finalize_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 1000,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            finalize_timeout_ms: 10_000,
        }
    }
}

/// Metadata describing a completed recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    /// Unique recording ID
    pub id: String,

    pub tenant_id: String,

    /// Barcode the recording is keyed to
    pub barcode: String,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    /// Duration in milliseconds
    pub duration_ms: u64,

    pub device_id: String,

    pub resolution: Resolution,

    pub has_audio: bool,
}

/// Generate a recording ID: creation time in unix millis plus a random suffix
pub fn generate_recording_id() -> String {
    format!(
        "rec_{}_{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// Result of a completed recording: the encoded media plus its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingArtifact {
    pub payload: Vec<u8>,
    pub metadata: RecordingMetadata,
}

impl RecordingArtifact {
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Snapshot of the orchestrator's recording state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStateSnapshot {
    pub is_active: bool,
    pub is_recording: bool,
    pub is_paused: bool,
    pub last_detected_barcode: Option<String>,
    pub detection_active: bool,
}
