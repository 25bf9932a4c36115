//! Dispatch Error Taxonomy
//!
//! The four error kinds the dispatcher can surface, their wire mapping,
//! and level-appropriate logging. All of them are captured at the dispatch
//! boundary and rendered as Failure outcomes; none propagate as faults.

use crate::protocol::{CapabilityKind, CorrelationId, ErrorKind, ResponseEnvelope};
use thiserror::Error;
use tracing::{error, warn};

/// Errors produced by the registry, the validator, or handler invocation
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unknown capability: {kind} '{name}'")]
    UnknownCapability { name: String, kind: CapabilityKind },

    #[error("Duplicate capability: {kind} '{name}' is already registered")]
    DuplicateCapability { name: String, kind: CapabilityKind },

    #[error("Schema mismatch on field '{field}': expected {expected}, got {actual}")]
    SchemaMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Handler fault: {message}")]
    HandlerFault { message: String },
}

impl DispatchError {
    /// Wire classification of this error
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownCapability { .. } => ErrorKind::UnknownCapability,
            Self::DuplicateCapability { .. } => ErrorKind::DuplicateCapability,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::HandlerFault { .. } => ErrorKind::HandlerFault,
        }
    }

    /// The offending field, present for schema mismatches only
    #[inline]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::SchemaMismatch { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Render this error as the Failure response for a request
    #[inline]
    pub fn to_response(&self, correlation_id: CorrelationId) -> ResponseEnvelope {
        ResponseEnvelope::failure(
            correlation_id,
            self.kind(),
            self.to_string(),
            self.field().map(str::to_owned),
        )
    }

    /// Log the error with appropriate level
    #[inline]
    pub fn log(&self) {
        match self {
            Self::UnknownCapability { .. } | Self::SchemaMismatch { .. } => {
                warn!("Client error: {}", self);
            }
            Self::DuplicateCapability { .. } => {
                error!("Registration error: {}", self);
            }
            Self::HandlerFault { .. } => {
                error!("Handler error: {}", self);
            }
        }
    }
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_mapping() {
        let error = DispatchError::UnknownCapability {
            name: "missing".to_string(),
            kind: CapabilityKind::Tool,
        };
        assert_eq!(error.kind(), ErrorKind::UnknownCapability);

        let error = DispatchError::HandlerFault {
            message: "boom".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::HandlerFault);
    }

    #[test]
    fn schema_mismatch_carries_field() {
        let error = DispatchError::SchemaMismatch {
            field: "text".to_string(),
            expected: "string".to_string(),
            actual: "missing".to_string(),
        };

        assert_eq!(error.field(), Some("text"));
        assert!(error.to_string().contains("text"));
        assert!(error.to_string().contains("string"));
    }

    #[test]
    fn non_schema_errors_have_no_field() {
        let error = DispatchError::DuplicateCapability {
            name: "echo".to_string(),
            kind: CapabilityKind::Tool,
        };
        assert_eq!(error.field(), None);
    }

    #[test]
    fn failure_response_preserves_correlation_id() {
        let error = DispatchError::UnknownCapability {
            name: "missing".to_string(),
            kind: CapabilityKind::Prompt,
        };
        let response = error.to_response(CorrelationId::new("42"));

        assert_eq!(response.correlation_id, CorrelationId::new("42"));
        assert!(!response.outcome.is_success());
    }
}
