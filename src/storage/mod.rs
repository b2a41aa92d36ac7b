//! Durable storage for finished recordings
//!
//! A recording is written to a local directory, an object store, or both.

pub mod directory;
pub mod local;
pub mod naming;
pub mod remote;
pub mod types;
pub mod validation;
pub mod writer;

/// Content type of every stored recording
pub const RECORDING_CONTENT_TYPE: &str = "video/webm";

pub use directory::{DirectoryObjectStore, DirectoryStoreFactory};
pub use local::{FileSystemStore, LocalStore};
pub use naming::{generate_file_name, generate_remote_key};
pub use remote::{ClientFactory, ObjectStoreClient, PutObject, RemoteConfig, RetryPolicy};
pub use types::{
    LocalErrorKind, ProviderError, RemoteErrorKind, SinkError, SinkKind, SinkStatus, StorageError, StorageErrorKind,
    StorageOperationStatus, StorageOutcome, StorageResult,
};
pub use writer::StorageWriter;
