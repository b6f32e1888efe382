use thiserror::Error;

/// Unified error type for the collective coordination layer.
///
/// Every asynchronous API in this crate delivers failures as an `Err` value
/// of the completion future; nothing panics across an await point. The
/// variants mirror the failure classes of the resolution protocol: a backend
/// that lacks a capability, a protocol invariant violated by inconsistent
/// participants, cooperative cancellation, and a resolver-wide abort.
#[derive(Debug, Clone, Error)]
pub enum ColexError {
    /// The selected backend does not provide this capability.
    #[error("unimplemented capability: {capability}")]
    Unimplemented { capability: String },

    /// A protocol invariant was violated (e.g. participants disagree on
    /// group cardinality or instance parameters).
    #[error("internal protocol error: {message}")]
    Internal {
        message: String,
        group_key: Option<i64>,
        instance_key: Option<i64>,
    },

    /// The cancellation token fired before the operation completed.
    #[error("operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// The resolver was aborted; all pending and future calls fail.
    #[error("resolution aborted: {message}")]
    Aborted { message: String },

    /// Programmer/configuration error detected before any protocol work.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

impl ColexError {
    /// Create an unimplemented-capability error
    pub fn unimplemented<S: Into<String>>(capability: S) -> Self {
        Self::Unimplemented {
            capability: capability.into(),
        }
    }

    /// Create an internal protocol error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            group_key: None,
            instance_key: None,
        }
    }

    /// Create an internal protocol error scoped to a group
    pub fn internal_group<S: Into<String>>(group_key: i64, message: S) -> Self {
        Self::Internal {
            message: message.into(),
            group_key: Some(group_key),
            instance_key: None,
        }
    }

    /// Create an internal protocol error scoped to an instance within a group
    pub fn internal_instance<S: Into<String>>(
        group_key: i64,
        instance_key: i64,
        message: S,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            group_key: Some(group_key),
            instance_key: Some(instance_key),
        }
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an abort error
    pub fn aborted<S: Into<String>>(message: S) -> Self {
        Self::Aborted {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unimplemented { .. } => "unimplemented",
            Self::Internal { .. } => "internal",
            Self::Cancelled { .. } => "cancelled",
            Self::Aborted { .. } => "aborted",
            Self::Configuration { .. } => "configuration",
        }
    }

    /// Whether a caller may reasonably retry the operation.
    ///
    /// Cancellation and abort are terminal for the current attempt but the
    /// surrounding scheduler may re-issue the collective; internal and
    /// configuration errors indicate a bug and retrying cannot help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ColexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ColexError::internal_group(7, "size mismatch");
        assert!(matches!(
            err,
            ColexError::Internal {
                group_key: Some(7),
                ..
            }
        ));
        assert_eq!(err.category(), "internal");
    }

    #[test]
    fn test_retryability() {
        assert!(ColexError::cancelled("complete_group").is_retryable());
        assert!(!ColexError::internal("bad").is_retryable());
        assert!(!ColexError::configuration("bad").is_retryable());
    }

    #[test]
    fn test_clone_preserves_status() {
        let err = ColexError::aborted("peer failure");
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
