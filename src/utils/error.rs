//! Error types and handling
//!
//! Aggregates the module errors for hosts and maps each to a stable code and
//! an actionable hint.

use crate::detector::DetectorInitError;
use crate::recorder::{OrchestratorError, RecordingError};
use crate::settings::SettingsError;
use crate::storage::{LocalErrorKind, RemoteErrorKind, StorageError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Detector(#[from] DetectorInitError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Error response for hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub hint: Option<String>,
}

fn recording_code(error: &RecordingError) -> &'static str {
    match error {
        RecordingError::AlreadyActive => "RECORDING_ALREADY_ACTIVE",
        RecordingError::NotActive => "RECORDING_NOT_ACTIVE",
        RecordingError::AlreadyPaused => "RECORDING_ALREADY_PAUSED",
        RecordingError::NotPaused => "RECORDING_NOT_PAUSED",
        RecordingError::Capture(_) => "CAPTURE_ERROR",
    }
}

fn storage_code_and_hint(error: &StorageError) -> (&'static str, Option<&'static str>) {
    match error {
        StorageError::Validation(_) => ("STORAGE_VALIDATION_ERROR", None),
        StorageError::Local { kind, .. } => {
            let hint = match kind {
                LocalErrorKind::AlreadyExists => "a recording with this name already exists",
                LocalErrorKind::EmptyPayload => "the recording captured no data; check the camera",
                _ => "check folder permissions",
            };
            ("LOCAL_STORAGE_ERROR", Some(hint))
        }
        StorageError::Remote { kind, .. } => {
            let hint = match kind {
                k if k.is_credential_problem() => "check credentials",
                RemoteErrorKind::BucketNotFound => "check the bucket name and region",
                RemoteErrorKind::AccessDenied => "check the bucket permissions for these credentials",
                _ => "check network connectivity",
            };
            ("REMOTE_STORAGE_ERROR", Some(hint))
        }
    }
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let (code, hint) = match &error {
            AppError::Recording(e) | AppError::Orchestrator(OrchestratorError::Recording(e)) => {
                (recording_code(e), None)
            }
            AppError::Orchestrator(OrchestratorError::AlreadyActive) => ("ORCHESTRATOR_ALREADY_ACTIVE", None),
            AppError::Orchestrator(OrchestratorError::NotActive) => ("ORCHESTRATOR_NOT_ACTIVE", None),
            AppError::Orchestrator(OrchestratorError::EmptyBarcode) => ("INVALID_BARCODE", None),
            AppError::Storage(e) => storage_code_and_hint(e),
            AppError::Detector(_) => (
                "DETECTOR_UNAVAILABLE",
                Some("check the camera; recordings can still be started manually"),
            ),
            AppError::Settings(_) => ("SETTINGS_ERROR", Some("check the settings file")),
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
            hint: hint.map(str::to_string),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ProviderError;

    #[test]
    fn test_state_errors_have_distinct_codes() {
        let codes: Vec<String> = [
            RecordingError::AlreadyActive,
            RecordingError::NotActive,
            RecordingError::AlreadyPaused,
            RecordingError::NotPaused,
        ]
        .into_iter()
        .map(|e| ErrorResponse::from(AppError::from(e)).code)
        .collect();

        let mut unique = codes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_orchestrator_wraps_recording_codes() {
        let response = ErrorResponse::from(AppError::from(OrchestratorError::Recording(
            RecordingError::NotPaused,
        )));
        assert_eq!(response.code, "RECORDING_NOT_PAUSED");
        assert_eq!(response.message, "Recording is not paused");
    }

    #[test]
    fn test_storage_hints() {
        let local = ErrorResponse::from(AppError::from(StorageError::local(
            LocalErrorKind::PermissionDenied,
            "denied",
        )));
        assert_eq!(local.code, "LOCAL_STORAGE_ERROR");
        assert_eq!(local.hint.as_deref(), Some("check folder permissions"));

        let remote = ErrorResponse::from(AppError::from(StorageError::remote(
            RemoteErrorKind::SignatureMismatch,
            "bad signature",
            Some(ProviderError::new("SignatureDoesNotMatch", "no")),
        )));
        assert_eq!(remote.code, "REMOTE_STORAGE_ERROR");
        assert_eq!(remote.hint.as_deref(), Some("check credentials"));

        let validation = ErrorResponse::from(AppError::from(StorageError::validation("bad")));
        assert_eq!(validation.hint, None);
    }
}
