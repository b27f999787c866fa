use thiserror::Error;

/// Errors from lock, queue, and registry operations.
///
/// Expected race outcomes are not represented here: a lock attempt that does
/// not obtain ownership is `Ok(None)`, a refresh/unlock on a lost lock is
/// `Ok(false)`, and a dequeue from an empty queue is `Ok(None)`. Only real
/// failures (transport, backend, serialization, caller bugs) become errors.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("instance not registered: {0}")]
    InstanceNotFound(String),

    #[error("instance already registered: {0}")]
    InstanceExists(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Reject blank keys and values up front. A blank argument is a caller bug,
/// never a store condition, so it fails fast instead of silently no-opping.
pub fn require_non_empty(name: &str, value: &str) -> Result<(), CoordError> {
    if value.is_empty() {
        return Err(CoordError::InvalidArgument(format!(
            "{name} must not be empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_argument_is_rejected() {
        let err = require_non_empty("key", "").unwrap_err();
        assert!(matches!(err, CoordError::InvalidArgument(_)));
        assert_eq!(err.to_string(), "invalid argument: key must not be empty");
    }

    #[test]
    fn non_empty_argument_passes() {
        assert!(require_non_empty("key", "jobs").is_ok());
    }
}
