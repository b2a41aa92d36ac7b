//! Station settings
//!
//! Read from a camelCase JSON file. A missing file yields the defaults, so a
//! fresh station can start without any configuration.

use crate::detector::DebounceConfig;
use crate::recorder::{CaptureConfig, SessionIdentity, StorageTargets};
use crate::storage::{RemoteConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Where recordings are stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    pub local_enabled: bool,
    pub local_directory: PathBuf,
    pub remote_enabled: bool,
    pub remote: RemoteConfig,
    pub retry: RetryPolicy,

    /// Root of the directory-backed object store used in place of a cloud
    /// provider
    pub object_store_directory: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_directory: PathBuf::from("recordings"),
            remote_enabled: false,
            remote: RemoteConfig::default(),
            retry: RetryPolicy::default(),
            object_store_directory: PathBuf::from("object-store"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub tenant_id: String,
    pub device_id: String,
    pub detection: DebounceConfig,
    pub capture: CaptureConfig,
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tenant_id: "default".to_string(),
            device_id: "station-1".to_string(),
            detection: DebounceConfig::default(),
            capture: CaptureConfig::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::info!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;

        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Write settings to `path` as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        tracing::debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.tenant_id.trim().is_empty() {
            return Err(SettingsError::Invalid("tenantId is required".to_string()));
        }
        if self.device_id.trim().is_empty() {
            return Err(SettingsError::Invalid("deviceId is required".to_string()));
        }

        let detection = &self.detection;
        if detection.min_code_length == 0 {
            return Err(SettingsError::Invalid(
                "detection.minCodeLength must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&detection.confidence_threshold) {
            return Err(SettingsError::Invalid(
                "detection.confidenceThreshold must be between 0 and 100".to_string(),
            ));
        }

        if self.capture.chunk_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "capture.chunkIntervalMs must be positive".to_string(),
            ));
        }
        if self.capture.max_buffer_bytes == 0 {
            return Err(SettingsError::Invalid(
                "capture.maxBufferBytes must be positive".to_string(),
            ));
        }

        let storage = &self.storage;
        if !storage.local_enabled && !storage.remote_enabled {
            return Err(SettingsError::Invalid(
                "enable local or remote storage".to_string(),
            ));
        }
        if storage.remote_enabled {
            storage
                .remote
                .validate()
                .map_err(|e| SettingsError::Invalid(format!("storage.remote: {}", e)))?;
        }
        Ok(())
    }

    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            tenant_id: self.tenant_id.clone(),
            device_id: self.device_id.clone(),
        }
    }

    /// Sinks enabled by these settings
    pub fn storage_targets(&self) -> StorageTargets {
        StorageTargets {
            local_directory: self
                .storage
                .local_enabled
                .then(|| self.storage.local_directory.clone()),
            remote: self
                .storage
                .remote_enabled
                .then(|| self.storage.remote.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn remote() -> RemoteConfig {
        RemoteConfig {
            bucket: "recordings".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            endpoint: None,
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config").join("settings.json");

        let mut settings = Settings::default();
        settings.tenant_id = "acme".to_string();
        settings.storage.remote_enabled = true;
        settings.storage.remote = remote();
        settings.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"tenantId\": \"acme\""));
        assert!(raw.contains("\"remoteEnabled\": true"));

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"tenantId": "acme", "detection": {"confidenceThreshold": 50}}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.tenant_id, "acme");
        assert_eq!(settings.detection.confidence_threshold, 50.0);
        assert_eq!(settings.detection.debounce_window_ms, 1000);
        assert!(settings.storage.local_enabled);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Settings::load(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.tenant_id = " ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.storage.local_enabled = false;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.storage.remote_enabled = true;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("storage.remote"));

        settings.storage.remote = remote();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_storage_targets_follow_flags() {
        let mut settings = Settings::default();
        let targets = settings.storage_targets();
        assert_eq!(targets.local_directory, Some(PathBuf::from("recordings")));
        assert!(targets.remote.is_none());

        settings.storage.local_enabled = false;
        settings.storage.remote_enabled = true;
        settings.storage.remote = remote();
        let targets = settings.storage_targets();
        assert!(targets.local_directory.is_none());
        assert_eq!(targets.remote, Some(remote()));
    }
}
