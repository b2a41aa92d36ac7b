//! Remote object-store sink
//!
//! The object-store client is external and consumed through
//! [`ObjectStoreClient`]. Uploads are preceded by one connectivity probe and
//! retried with exponential backoff; the probe itself is not retried.

use super::naming::generate_remote_key;
use super::types::{ProviderError, RemoteErrorKind, StorageError, StorageResult};
use super::validation::{validate_bucket_name, validate_credential, validate_endpoint, validate_region};
use super::RECORDING_CONTENT_TYPE;
use crate::recorder::state::{RecordingArtifact, RecordingMetadata};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Connection settings for the object store
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,

    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,
}

impl RemoteConfig {
    /// Check every field before any network call
    pub fn validate(&self) -> StorageResult<()> {
        validate_bucket_name(&self.bucket)?;
        validate_region(&self.region)?;
        validate_credential("access key id", &self.access_key_id)?;
        validate_credential("secret access key", &self.secret_access_key)?;
        if let Some(endpoint) = &self.endpoint {
            validate_endpoint(endpoint)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Backoff schedule for the upload step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

/// One object upload
#[derive(Debug, Clone, Copy)]
pub struct PutObject<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub body: &'a [u8],
    pub content_type: &'a str,
    pub metadata: &'a BTreeMap<String, String>,
}

/// Bucket-scoped object-store operations
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// List up to `max_keys` object keys in `bucket`
    async fn list_objects(&self, bucket: &str, max_keys: u32) -> Result<Vec<String>, ProviderError>;

    async fn put_object(&self, request: PutObject<'_>) -> Result<(), ProviderError>;
}

/// Builds object-store clients from connection settings
pub trait ClientFactory: Send + Sync {
    fn create(&self, config: &RemoteConfig) -> Result<Arc<dyn ObjectStoreClient>, ProviderError>;
}

/// Translate a provider error into a `RemoteError` with an actionable message
pub fn translate_provider_error(error: ProviderError, config: &RemoteConfig) -> StorageError {
    let kind = RemoteErrorKind::from_provider_code(&error.code);
    let message = match kind {
        RemoteErrorKind::BucketNotFound => format!("bucket '{}' does not exist", config.bucket),
        RemoteErrorKind::InvalidCredentials => "access key id is not recognized".to_string(),
        RemoteErrorKind::SignatureMismatch => {
            "request signature does not match; check the secret access key".to_string()
        }
        RemoteErrorKind::AccessDenied => {
            format!("access to bucket '{}' was denied", config.bucket)
        }
        RemoteErrorKind::Other => format!("object store request failed: {}", error),
    };
    StorageError::remote(kind, message, Some(error))
}

/// Object metadata attached to every upload.
///
/// Values are percent-encoded, since object-store metadata must be ASCII.
pub fn object_metadata(metadata: &RecordingMetadata) -> BTreeMap<String, String> {
    let entries = [
        ("recording-id", metadata.id.clone()),
        ("tenant-id", metadata.tenant_id.clone()),
        ("barcode", metadata.barcode.clone()),
        (
            "start-time",
            metadata.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        (
            "end-time",
            metadata.end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        ("duration-ms", metadata.duration_ms.to_string()),
        ("device-id", metadata.device_id.clone()),
        (
            "resolution",
            format!("{}x{}", metadata.resolution.width, metadata.resolution.height),
        ),
        ("has-audio", metadata.has_audio.to_string()),
    ];

    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), urlencoding::encode(&value).into_owned()))
        .collect()
}

pub fn remote_uri(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key)
}

/// Probe the bucket once, then upload with retries.
///
/// Inputs must already be validated. Returns the object URI.
pub(crate) async fn probe_and_upload(
    client: &dyn ObjectStoreClient,
    artifact: &RecordingArtifact,
    config: &RemoteConfig,
    retry: &RetryPolicy,
) -> StorageResult<String> {
    client
        .list_objects(&config.bucket, 1)
        .await
        .map_err(|e| translate_provider_error(e, config))?;
    tracing::debug!("Object store reachable, bucket '{}'", config.bucket);

    let key = generate_remote_key(&artifact.metadata);
    let metadata = object_metadata(&artifact.metadata);
    let request = PutObject {
        bucket: &config.bucket,
        key: &key,
        body: &artifact.payload,
        content_type: RECORDING_CONTENT_TYPE,
        metadata: &metadata,
    };

    let mut attempt = 0;
    loop {
        match client.put_object(request).await {
            Ok(()) => {
                let uri = remote_uri(&config.bucket, &key);
                tracing::info!("Uploaded recording {} to {}", artifact.metadata.id, uri);
                return Ok(uri);
            }
            Err(e) if attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                attempt += 1;
                tracing::warn!(
                    "Upload attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt,
                    retry.total_attempts(),
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    "Upload failed after {} attempts: {}",
                    retry.total_attempts(),
                    e
                );
                return Err(translate_provider_error(e, config));
            }
        }
    }
}
