//! Input validation
//!
//! Everything here runs before any filesystem or network access and fails
//! with `StorageError::Validation`.

use super::types::{StorageError, StorageResult};
use crate::recorder::state::RecordingArtifact;
use once_cell::sync::Lazy;
use regex::Regex;

static BUCKET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("valid bucket regex"));

static IPV4_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").expect("valid ipv4 regex"));

static REGION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d{1,2}$").expect("valid region regex"));

static ENDPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/?#]+(/\S*)?$").expect("valid endpoint regex"));

/// Check that an artifact carries the metadata every sink relies on
pub fn validate_artifact(artifact: &RecordingArtifact) -> StorageResult<()> {
    let metadata = &artifact.metadata;
    if metadata.id.trim().is_empty() {
        return Err(StorageError::validation("recording id is missing"));
    }
    if metadata.tenant_id.trim().is_empty() {
        return Err(StorageError::validation("tenant id is missing"));
    }
    if metadata.barcode.trim().is_empty() {
        return Err(StorageError::validation("barcode is missing"));
    }
    if metadata.end_time < metadata.start_time {
        return Err(StorageError::validation("recording ends before it starts"));
    }
    Ok(())
}

pub fn validate_bucket_name(bucket: &str) -> StorageResult<()> {
    if !BUCKET_NAME.is_match(bucket) || bucket.contains("..") || IPV4_LIKE.is_match(bucket) {
        return Err(StorageError::validation(format!(
            "invalid bucket name '{}': use 3-63 lowercase letters, digits, dots or hyphens",
            bucket
        )));
    }
    Ok(())
}

pub fn validate_region(region: &str) -> StorageResult<()> {
    if !REGION.is_match(region) {
        return Err(StorageError::validation(format!(
            "invalid region '{}': expected a form like 'us-east-1'",
            region
        )));
    }
    Ok(())
}

pub fn validate_endpoint(endpoint: &str) -> StorageResult<()> {
    if !ENDPOINT.is_match(endpoint) {
        return Err(StorageError::validation(format!(
            "invalid endpoint '{}': expected an http(s) URL",
            endpoint
        )));
    }
    Ok(())
}

pub fn validate_credential(name: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::validation(format!("{} is missing", name)));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(StorageError::validation(format!("{} contains whitespace", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::naming::fixtures;

    #[test]
    fn test_bucket_names() {
        assert!(validate_bucket_name("recordings").is_ok());
        assert!(validate_bucket_name("my.bucket-01").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("Uppercase").is_err());
        assert!(validate_bucket_name("-leading").is_err());
        assert!(validate_bucket_name("double..dot").is_err());
        assert!(validate_bucket_name("192.168.1.1").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_regions() {
        assert!(validate_region("us-east-1").is_ok());
        assert!(validate_region("eu-central-1").is_ok());
        assert!(validate_region("us-gov-west-1").is_ok());
        assert!(validate_region("useast1").is_err());
        assert!(validate_region("US-EAST-1").is_err());
        assert!(validate_region("").is_err());
    }

    #[test]
    fn test_endpoints() {
        assert!(validate_endpoint("https://s3.example.com").is_ok());
        assert!(validate_endpoint("http://localhost:9000").is_ok());
        assert!(validate_endpoint("ftp://example.com").is_err());
        assert!(validate_endpoint("https://").is_err());
    }

    #[test]
    fn test_credentials() {
        assert!(validate_credential("access key id", "AKIAEXAMPLE").is_ok());
        assert!(validate_credential("access key id", "").is_err());
        assert!(validate_credential("secret", "has space").is_err());
    }

    #[test]
    fn test_artifact_validation() {
        let artifact = fixtures::artifact("PKG-1", vec![1]);
        assert!(validate_artifact(&artifact).is_ok());

        let mut missing_barcode = artifact.clone();
        missing_barcode.metadata.barcode = "  ".to_string();
        assert!(matches!(
            validate_artifact(&missing_barcode),
            Err(StorageError::Validation(_))
        ));

        let mut missing_tenant = artifact;
        missing_tenant.metadata.tenant_id.clear();
        assert!(validate_artifact(&missing_tenant).is_err());
    }
}
