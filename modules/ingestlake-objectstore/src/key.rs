use ingestlake_common::IngestError;

const MAX_SEGMENT_LEN: usize = 255;
const MAX_KEY_LEN: usize = 4096;

/// Rejects absolute paths, `.`/`..` traversal, backslashes and overlong
/// segments before a key is handed to a backend.
pub fn validate_object_key(key: &str) -> Result<(), IngestError> {
    if key.is_empty() {
        return Err(IngestError::ConfigInvalid("object key must not be empty".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(IngestError::ConfigInvalid("object key exceeds length limit".into()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(IngestError::ConfigInvalid(
            "object key must be relative and use forward slashes".into(),
        ));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(IngestError::ConfigInvalid(format!(
                "object key segment '{segment}' is invalid"
            )));
        }
        if segment.len() > MAX_SEGMENT_LEN {
            return Err(IngestError::ConfigInvalid("object key segment too long".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_and_absolute_keys() {
        assert!(validate_object_key("../secrets").is_err());
        assert!(validate_object_key("/etc/passwd").is_err());
        assert!(validate_object_key("a/../b").is_err());
        assert!(validate_object_key("a\\b").is_err());
    }

    #[test]
    fn accepts_ordinary_staging_keys() {
        assert!(validate_object_key("ingestion/ws-1/ep-1/run-1/0000.ndjson").is_ok());
    }
}
