use thiserror::Error;

/// Core error taxonomy shared by every ingestlake crate.
///
/// Each variant is tagged with `retryable()` so the orchestrator's
/// propagation policy (spec §7) can classify failures without
/// re-deriving the rule at every call site.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("capability missing: endpoint does not advertise `{0}`")]
    CapabilityMissing(String),

    #[error("transport error (transient): {0}")]
    TransportTransient(String),

    #[error("transport error (fatal): {0}")]
    TransportFatal(String),

    #[error("checkpoint conflict: expected version {expected}, stored version was {actual}")]
    CheckpointConflict { expected: i64, actual: i64 },

    #[error("sink rejected batch: {0}")]
    SinkRejected(String),

    #[error("signal dsl parse error: {0}")]
    DslParseError(String),

    #[error("unsupported definitionSpec type: {0}")]
    UnsupportedSpecType(String),

    #[error("cdm model mismatch: {0}")]
    CdmModelMismatch(String),

    #[error("field not allowed: {0}")]
    FieldNotAllowed(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IngestError {
    /// Whether the workflow engine's retry policy should retry this
    /// activity, per spec §7's propagation policy.
    pub fn retryable(&self) -> bool {
        matches!(self, IngestError::TransportTransient(_))
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Truncate an error message to the checkpoint's stored `lastError` budget
/// (spec §4.3 step 6: "truncate err message to 500 chars").
pub fn truncate_error_message(msg: &str) -> String {
    const MAX: usize = 500;
    if msg.chars().count() <= MAX {
        return msg.to_string();
    }
    msg.chars().take(MAX).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_unchanged() {
        assert_eq!(truncate_error_message("boom"), "boom");
    }

    #[test]
    fn long_message_is_truncated_to_500_chars() {
        let long = "x".repeat(900);
        let truncated = truncate_error_message(&long);
        assert_eq!(truncated.chars().count(), 500);
    }

    #[test]
    fn transient_transport_is_retryable() {
        assert!(IngestError::TransportTransient("timeout".into()).retryable());
        assert!(!IngestError::TransportFatal("401".into()).retryable());
        assert!(!IngestError::CapabilityMissing("metadata".into()).retryable());
    }
}
