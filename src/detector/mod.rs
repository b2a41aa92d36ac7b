//! Barcode detection
//!
//! The optical decoder is consumed through the [`BarcodeDetector`] trait; the
//! [`DetectorDebouncer`] turns its raw output into accepted barcodes.

pub mod debouncer;
pub mod manual;
pub mod traits;

pub use debouncer::{DebounceConfig, DetectorDebouncer, Rejection};
pub use manual::ManualDetector;
pub use traits::{BarcodeDetector, DetectorConfig, DetectorInitError, RawDetection, VideoTarget};
