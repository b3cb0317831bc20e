use thiserror::Error;

/// Canonical error type shared by stores, gateways and search strategies.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity was not found in the mail store.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"mail"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// Entity already exists and cannot be created again.
    #[error("{entity} `{id}` already exists")]
    AlreadyExists {
        /// Entity type name (e.g. `"mail"`).
        entity: &'static str,
        /// Identifier that conflicts.
        id: String,
    },

    /// A definition with the same name but different shape is already registered.
    #[error("conflict: {message}")]
    Conflict {
        /// Human-readable description of the conflicting definitions.
        message: String,
    },

    /// Operation violates current state machine rules.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Storage backend error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Validation error for input data.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Remote mail service answered with a non-success status.
    #[error("API error: status code {status}, body: {body}")]
    Remote {
        /// HTTP status code returned by the service.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// Request never produced a response (connect, timeout, decode).
    #[error("transport error: {0}")]
    TransportError(String),
}

impl CoreError {
    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an `AlreadyExists` variant.
    #[must_use]
    pub fn already_exists(entity: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    /// Creates a `Conflict` variant.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `Remote` variant.
    #[must_use]
    pub fn remote(status: u16, body: impl Into<String>) -> Self {
        Self::Remote {
            status,
            body: body.into(),
        }
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_message_carries_status_and_body() {
        let err = CoreError::remote(503, "overloaded");
        assert_eq!(
            err.to_string(),
            "API error: status code 503, body: overloaded"
        );
    }

    #[test]
    fn test_helpers_build_matching_variants() {
        assert!(matches!(
            CoreError::not_found("mail", "m-1"),
            CoreError::NotFound { entity: "mail", .. }
        ));
        assert!(matches!(
            CoreError::conflict("index `a` differs"),
            CoreError::Conflict { .. }
        ));
        assert_eq!(
            CoreError::invalid_state("already ran").to_string(),
            "invalid state: already ran"
        );
    }
}
