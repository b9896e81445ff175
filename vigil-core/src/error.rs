/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the detection-to-event pipeline
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("LLM timeout: {0}")]
    LlmTimeout(String),

    #[error("LLM connection error: {0}")]
    LlmConnection(String),

    #[error("LLM server error: {0}")]
    LlmServer(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Batch has no detections: {0}")]
    NoDetections(String),

    #[error("Malformed queue item: {0}")]
    MalformedItem(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key-value store error: {0}")]
    KeyValue(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is recoverable (can retry with backoff)
    ///
    /// Recoverable errors are transient upstream or infrastructure failures.
    /// Everything else is a permanent client error and retrying would only
    /// reproduce the failure.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::DetectorUnavailable(_) => true,
            Error::LlmTimeout(_) => true,
            Error::LlmConnection(_) => true,
            Error::LlmServer(_) => true,
            Error::BatchNotFound(_) => false,
            Error::NoDetections(_) => false,
            Error::MalformedItem(_) => false,
            Error::InvalidInput(_) => false,
            Error::Parse(_) => false,
            Error::Validation(_) => false,
            Error::KeyValue(_) => true,
            Error::Queue(_) => true,
            Error::Storage(_) => true,
            Error::Serialization(_) => false,
            Error::Io(_) => true,
        }
    }

    /// Check if this error indicates an infrastructure outage
    ///
    /// Infrastructure failures pause the consuming worker rather than
    /// burning retry budget on individual items.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Error::KeyValue(_) | Error::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_upstream_errors_are_recoverable() {
        assert!(Error::DetectorUnavailable("down".into()).is_recoverable());
        assert!(Error::LlmTimeout("60s".into()).is_recoverable());
        assert!(Error::LlmConnection("refused".into()).is_recoverable());
        assert!(Error::LlmServer("500".into()).is_recoverable());
    }

    #[test]
    fn permanent_client_errors_are_not_recoverable() {
        assert!(!Error::BatchNotFound("b1".into()).is_recoverable());
        assert!(!Error::NoDetections("b1".into()).is_recoverable());
        assert!(!Error::MalformedItem("{".into()).is_recoverable());
        assert!(!Error::Parse("no json".into()).is_recoverable());
    }

    #[test]
    fn infrastructure_errors_pause_workers() {
        assert!(Error::KeyValue("unreachable".into()).is_infrastructure());
        assert!(Error::Storage("connect".into()).is_infrastructure());
        assert!(!Error::LlmTimeout("60s".into()).is_infrastructure());
    }
}
