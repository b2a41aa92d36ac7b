//! Recording system module
//!
//! - `CaptureSession` records one barcode-keyed clip at a time
//! - `RecordingOrchestrator` switches recordings as barcodes change
//! - `state` holds the shared recording types

pub mod orchestrator;
pub mod session;
pub mod state;

pub use orchestrator::{
    OrchestratorError, OrchestratorEvent, OrchestratorResult, RecordingOrchestrator, StorageReport, StorageTargets,
};
pub use session::{CaptureSession, RecordingError, RecordingResult, SessionEvent};
pub use state::{
    CaptureConfig, RecordingArtifact, RecordingMetadata, RecordingStateSnapshot, RecordingStatus, SessionIdentity,
};
