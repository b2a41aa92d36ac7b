//! Barcode Recorder - barcode-triggered clip recording.
//!
//! A camera watches a packing station. Every time a new barcode is accepted,
//! the clip for the previous barcode is closed and persisted to a local
//! directory and/or an object store, and a new clip starts.

pub mod capture;
pub mod detector;
pub mod recorder;
pub mod settings;
pub mod storage;
pub mod utils;

pub use recorder::{RecordingOrchestrator, StorageTargets};
pub use settings::Settings;
pub use storage::StorageWriter;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "barcode_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
