//! Dispatch Protocol Types
//!
//! This module defines the request/response envelope types exchanged with
//! transport adapters, independent of any particular wire transport.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload for a capability invocation: a mapping from field name to value.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// The kind of a registered capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

/// Opaque correlation token copied from request to response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

/// Classification of a failure outcome, stable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    UnknownCapability,
    DuplicateCapability,
    SchemaMismatch,
    HandlerFault,
}

/// A fully-decoded invocation request, created per call by the transport
/// adapter and consumed exactly once by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "capabilityName")]
    pub capability_name: String,
    pub kind: CapabilityKind,
    #[serde(default)]
    pub payload: Payload,
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,
}

/// The single response produced for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,
    pub outcome: Outcome,
}

/// Result of processing one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success {
        value: serde_json::Value,
    },
    Failure {
        #[serde(rename = "errorKind")]
        error_kind: ErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
}

impl CapabilityKind {
    /// Wire name of the kind
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::Prompt => "prompt",
        }
    }
}

impl fmt::Display for CapabilityKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CorrelationId {
    /// Wrap an existing token supplied by a caller
    #[inline]
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    /// Generate a fresh token for callers that do not supply one
    #[inline]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Token used when a request was too malformed to carry one
    #[inline]
    pub fn unknown() -> Self {
        Self(String::new())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ErrorKind {
    /// Wire tag of the error kind
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownCapability => "unknownCapability",
            Self::DuplicateCapability => "duplicateCapability",
            Self::SchemaMismatch => "schemaMismatch",
            Self::HandlerFault => "handlerFault",
        }
    }
}

impl fmt::Display for ErrorKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RequestEnvelope {
    /// Create a new request envelope
    #[inline]
    pub fn new(
        capability_name: String,
        kind: CapabilityKind,
        payload: Payload,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            capability_name,
            kind,
            payload,
            correlation_id,
        }
    }
}

impl ResponseEnvelope {
    /// Create a success response carrying the handler's validated result
    #[inline]
    pub fn success(correlation_id: CorrelationId, value: serde_json::Value) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::Success { value },
        }
    }

    /// Create a failure response
    #[inline]
    pub fn failure(
        correlation_id: CorrelationId,
        error_kind: ErrorKind,
        message: String,
        field: Option<String>,
    ) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::Failure {
                error_kind,
                message,
                field,
            },
        }
    }
}

impl Outcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
