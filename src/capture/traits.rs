//! Capture trait definitions
//!
//! Encoder-agnostic traits for the media capture sink that feeds a recording.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Resolution reported when the sink cannot introspect its video track
    pub const FALLBACK: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FALLBACK
    }
}

/// Events emitted by a capture sink while it is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A block of encoded media
    Chunk(Vec<u8>),
    /// The sink finished flushing after `stop()`; no further events follow
    Stopped,
    /// The sink failed (hardware loss, encoder crash, ...)
    Error(String),
}

/// Errors raised synchronously by a capture sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Capture sink already started")]
    AlreadyStarted,

    #[error("Capture source unavailable: {0}")]
    Unavailable(String),

    #[error("Capture sink error: {0}")]
    Sink(String),
}

/// An opaque encoder producing binary chunks for one recording.
///
/// The sink is driven by the capture session: `start` hands back the event
/// stream, `request_data` asks for the pending chunk, and `stop` asks the
/// sink to flush its last chunk and then emit [`CaptureEvent::Stopped`].
pub trait CaptureSink: Send + Sync {
    /// Begin encoding. Chunks may also be emitted on the sink's own schedule
    /// every `timeslice`.
    fn start(&self, timeslice: Duration) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, CaptureError>;

    /// Ask the sink to emit whatever it has encoded so far
    fn request_data(&self);

    fn pause(&self);

    fn resume(&self);

    /// Ask the sink to finalize. The final chunk and `Stopped` arrive on the
    /// event stream.
    fn stop(&self);

    /// Resolution of the video track, if the sink can tell
    fn video_resolution(&self) -> Option<Resolution>;

    /// Whether the source carries an audio track
    fn has_audio(&self) -> bool;
}

/// A live media source that can open a fresh capture sink per recording
pub trait MediaSource: Send + Sync {
    fn create_sink(&self) -> Result<std::sync::Arc<dyn CaptureSink>, CaptureError>;
}
