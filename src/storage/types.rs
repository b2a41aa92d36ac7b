//! Storage types
//!
//! Error taxonomy, per-sink progress snapshots and the aggregate outcome of a
//! save operation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// What went wrong on the local filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocalErrorKind {
    PermissionDenied,
    NotADirectory,
    CannotCreateDirectory,
    AlreadyExists,
    EmptyPayload,
    WriteFailed,
    SizeMismatch,
}

/// What went wrong talking to the object store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteErrorKind {
    BucketNotFound,
    InvalidCredentials,
    SignatureMismatch,
    AccessDenied,
    Other,
}

impl RemoteErrorKind {
    /// Map a provider error code to a kind
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "NoSuchBucket" => RemoteErrorKind::BucketNotFound,
            "InvalidAccessKeyId" => RemoteErrorKind::InvalidCredentials,
            "SignatureDoesNotMatch" => RemoteErrorKind::SignatureMismatch,
            "AccessDenied" => RemoteErrorKind::AccessDenied,
            _ => RemoteErrorKind::Other,
        }
    }

    /// Whether fixing credentials is the likely remedy
    pub fn is_credential_problem(&self) -> bool {
        matches!(
            self,
            RemoteErrorKind::InvalidCredentials | RemoteErrorKind::SignatureMismatch
        )
    }
}

/// Error reported by an object-store client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// Provider error code, e.g. `NoSuchBucket`
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Coarse error category, for callers that branch on kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageErrorKind {
    Validation,
    Local,
    Remote,
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Bad input, caught before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Local storage error: {message}")]
    Local {
        kind: LocalErrorKind,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Remote storage error: {message}")]
    Remote {
        kind: RemoteErrorKind,
        message: String,
        #[source]
        source: Option<ProviderError>,
    },
}

impl StorageError {
    pub fn validation(message: impl Into<String>) -> Self {
        StorageError::Validation(message.into())
    }

    pub fn local(kind: LocalErrorKind, message: impl Into<String>) -> Self {
        StorageError::Local {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn local_io(kind: LocalErrorKind, message: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Local {
            kind,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>, source: Option<ProviderError>) -> Self {
        StorageError::Remote {
            kind,
            message: message.into(),
            source,
        }
    }

    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::Validation(_) => StorageErrorKind::Validation,
            StorageError::Local { .. } => StorageErrorKind::Local,
            StorageError::Remote { .. } => StorageErrorKind::Remote,
        }
    }

    pub fn local_kind(&self) -> Option<LocalErrorKind> {
        match self {
            StorageError::Local { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            StorageError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Which sink an error or status belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Local,
    Remote,
}

/// An error tagged with the sink that produced it
#[derive(Debug)]
pub struct SinkError {
    /// `None` when the error is not tied to one sink (nothing configured)
    pub sink: Option<SinkKind>,
    pub error: StorageError,
}

/// Aggregate result of `save_recording`
#[derive(Debug, Default)]
pub struct StorageOutcome {
    /// True only if every enabled sink succeeded
    pub success: bool,
    pub local_path: Option<PathBuf>,
    pub remote_path: Option<String>,
    pub errors: Vec<SinkError>,
}

impl StorageOutcome {
    pub(crate) fn rejected(error: StorageError) -> Self {
        Self {
            success: false,
            local_path: None,
            remote_path: None,
            errors: vec![SinkError { sink: None, error }],
        }
    }

    pub fn errors_for(&self, sink: SinkKind) -> impl Iterator<Item = &StorageError> {
        self.errors
            .iter()
            .filter(move |e| e.sink == Some(sink))
            .map(|e| &e.error)
    }
}

/// Progress of one sink during a save
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkStatus {
    pub enabled: bool,
    pub in_progress: bool,
    pub completed: bool,
    pub error: Option<String>,
    pub path: Option<String>,
}

impl SinkStatus {
    pub(crate) fn started() -> Self {
        Self {
            enabled: true,
            in_progress: true,
            ..Self::default()
        }
    }

    pub(crate) fn succeeded(path: String) -> Self {
        Self {
            enabled: true,
            completed: true,
            path: Some(path),
            ..Self::default()
        }
    }

    pub(crate) fn failed(error: String) -> Self {
        Self {
            enabled: true,
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Live snapshot of both sinks for one save, emitted to status observers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageOperationStatus {
    /// Recording the save belongs to; `None` before the first save
    pub recording_id: Option<String>,
    pub local: SinkStatus,
    pub remote: SinkStatus,
}

impl StorageOperationStatus {
    pub fn sink(&self, kind: SinkKind) -> &SinkStatus {
        match kind {
            SinkKind::Local => &self.local,
            SinkKind::Remote => &self.remote,
        }
    }

    pub(crate) fn sink_mut(&mut self, kind: SinkKind) -> &mut SinkStatus {
        match kind {
            SinkKind::Local => &mut self.local,
            SinkKind::Remote => &mut self.remote,
        }
    }
}
