//! Recording file naming
//!
//! Local files and remote keys share one deterministic name:
//! `<tenant>_<barcode>_<start time>.webm`, where tenant and barcode have every
//! character outside `[A-Za-z0-9]` replaced by `_`, and the start time is the
//! ISO-8601 UTC timestamp with millisecond precision with `:` and `.` replaced
//! by `-`.

use crate::recorder::state::RecordingMetadata;
use chrono::SecondsFormat;

/// File extension of stored recordings
pub const RECORDING_EXTENSION: &str = "webm";

/// Replace every character outside `[A-Za-z0-9]` with `_`
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Start time as used in file names, e.g. `2024-01-15T10-30-00-000Z`
pub fn file_timestamp(metadata: &RecordingMetadata) -> String {
    metadata
        .start_time
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

pub fn generate_file_name(metadata: &RecordingMetadata) -> String {
    format!(
        "{}_{}_{}.{}",
        sanitize(&metadata.tenant_id),
        sanitize(&metadata.barcode),
        file_timestamp(metadata),
        RECORDING_EXTENSION
    )
}

/// Object key for a recording: the file name namespaced by tenant
pub fn generate_remote_key(metadata: &RecordingMetadata) -> String {
    format!(
        "{}/{}",
        sanitize(&metadata.tenant_id),
        generate_file_name(metadata)
    )
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_format() {
        let metadata = fixtures::metadata("test@tenant.com", "TEST-123/ABC");
        let name = generate_file_name(&metadata);
        assert_eq!(name, "test_tenant_com_TEST_123_ABC_2024-01-15T10-30-00-000Z.webm");
    }

    #[test]
    fn test_file_name_is_deterministic() {
        let metadata = fixtures::metadata("acme", "PKG-1");
        assert_eq!(generate_file_name(&metadata), generate_file_name(&metadata));
    }

    #[test]
    fn test_sanitize_non_ascii() {
        assert_eq!(sanitize("café 1"), "caf__1");
        assert_eq!(sanitize("../etc"), "___etc");
    }

    #[test]
    fn test_remote_key_namespaced_by_tenant() {
        let metadata = fixtures::metadata("acme corp", "X1");
        assert_eq!(
            generate_remote_key(&metadata),
            "acme_corp/acme_corp_X1_2024-01-15T10-30-00-000Z.webm"
        );
    }
}
