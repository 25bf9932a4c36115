//! Request Dispatcher
//!
//! Resolves a decoded request against the registry, validates its payload,
//! invokes the handler, validates the result, and packages the outcome
//! into a response envelope. Failures never escape this boundary: every
//! request produces exactly one well-formed response.

#[cfg(test)]
mod tests;

use crate::errors::DispatchError;
use crate::protocol::{RequestEnvelope, ResponseEnvelope};
use crate::registry::CapabilityRegistry;
use crate::schema;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::debug;

/// Lifecycle of a single request inside the dispatcher. `Completed` and
/// `Failed` are terminal; `Failed` is reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Received,
    Resolved,
    Validated,
    Invoked,
    Completed,
    Failed,
}

impl DispatchPhase {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Resolved => "resolved",
            Self::Validated => "validated",
            Self::Invoked => "invoked",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DispatchPhase {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless request dispatcher over a frozen registry. Cheap to clone and
/// share; concurrent `handle` calls run independently.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry that is done registering.
    #[inline]
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Process one request to completion and produce its single response.
    ///
    /// The returned future holds no state that outlives it; a transport
    /// that stops awaiting it (client disconnect) drops it and no response
    /// is relayed.
    #[inline]
    pub async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let correlation_id = request.correlation_id.clone();
        let capability = request.capability_name.clone();

        match self.process(request).await {
            Ok(value) => {
                debug!(
                    "Request {} for '{}' {}",
                    correlation_id,
                    capability,
                    DispatchPhase::Completed
                );
                ResponseEnvelope::success(correlation_id, value)
            }
            Err((phase, error)) => {
                error.log();
                debug!(
                    "Request {} for '{}' {} after {}",
                    correlation_id,
                    capability,
                    DispatchPhase::Failed,
                    phase
                );
                error.to_response(correlation_id)
            }
        }
    }

    /// Steps 1-4 of request processing. On error, reports the last phase
    /// the request had reached before the failing check.
    async fn process(
        &self,
        request: RequestEnvelope,
    ) -> Result<serde_json::Value, (DispatchPhase, DispatchError)> {
        let entry = self
            .registry
            .lookup(&request.capability_name, request.kind)
            .map_err(|e| (DispatchPhase::Received, e))?;
        let descriptor = entry.descriptor();

        schema::check(&request.payload, &descriptor.input_schema)
            .map_err(|e| (DispatchPhase::Resolved, e))?;

        // Handler failures and panics are both contained here; a
        // misbehaving handler must never take down the dispatch loop.
        let invocation = AssertUnwindSafe(entry.handler().handle(request.payload)).catch_unwind();
        let result = match invocation.await {
            Ok(Ok(value)) => value,
            Ok(Err(error)) => {
                return Err((
                    DispatchPhase::Validated,
                    DispatchError::HandlerFault {
                        message: error.to_string(),
                    },
                ));
            }
            Err(panic) => {
                return Err((
                    DispatchPhase::Validated,
                    DispatchError::HandlerFault {
                        message: panic_message(panic.as_ref()),
                    },
                ));
            }
        };

        // A handler violating its own declared output schema is a
        // programming error; report it instead of forwarding bad data.
        let Some(output) = result.as_object() else {
            return Err((
                DispatchPhase::Invoked,
                DispatchError::SchemaMismatch {
                    field: "$".to_string(),
                    expected: "object".to_string(),
                    actual: schema::value_type_name(&result).to_string(),
                },
            ));
        };
        schema::check(output, &descriptor.output_schema)
            .map_err(|e| (DispatchPhase::Invoked, e))?;

        Ok(result)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}
