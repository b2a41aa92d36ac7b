//! Media capture
//!
//! The encoder itself is external; this module defines the sink interface a
//! recording consumes, the bounded chunk buffer, and a synthetic sink.

pub mod buffer;
pub mod synthetic;
pub mod traits;

pub use buffer::ChunkBuffer;
pub use synthetic::{SyntheticCaptureSink, SyntheticMediaSource};
pub use traits::{CaptureError, CaptureEvent, CaptureSink, MediaSource, Resolution};
