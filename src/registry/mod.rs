//! Capability Registry
//!
//! Maps capability names to registered handlers and their declared
//! input/output schemas. The registry is built once at startup through
//! `&mut` registration, then frozen behind an `Arc` for the serving
//! lifetime; concurrent lookups need no locking.


use crate::errors::{DispatchError, DispatchResult};
use crate::protocol::{CapabilityKind, Payload};
use crate::schema::Schema;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::debug;

/// Immutable description of a registered capability.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub kind: CapabilityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Schema,
    #[serde(rename = "outputSchema")]
    pub output_schema: Schema,
}

/// Uniform invocation interface for capability handlers.
///
/// The payload has already passed the input-schema check when `handle` is
/// called; the returned value is checked against the output schema by the
/// dispatcher before it reaches any client.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn handle(&self, payload: Payload) -> anyhow::Result<serde_json::Value>;
}

/// A descriptor paired with its handler. Owned exclusively by the registry.
pub struct RegisteredCapability {
    descriptor: CapabilityDescriptor,
    handler: Box<dyn CapabilityHandler>,
}

impl std::fmt::Debug for RegisteredCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCapability")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl RegisteredCapability {
    #[inline]
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn handler(&self) -> &dyn CapabilityHandler {
        self.handler.as_ref()
    }
}

/// Registry of tools, resources, and prompts, keyed by name within each
/// kind. Name uniqueness is per kind: a tool and a prompt may share a name.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: HashMap<String, RegisteredCapability>,
    resources: HashMap<String, RegisteredCapability>,
    prompts: HashMap<String, RegisteredCapability>,
}

impl CapabilityRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. Fails with `DuplicateCapability` if the
    /// (name, kind) pair is already present; never silently overwrites.
    #[inline]
    pub fn register<H>(
        &mut self,
        descriptor: CapabilityDescriptor,
        handler: H,
    ) -> DispatchResult<()>
    where
        H: CapabilityHandler + 'static,
    {
        let name = descriptor.name.clone();
        let kind = descriptor.kind;

        match self.entries_mut(kind).entry(name.clone()) {
            Entry::Occupied(_) => Err(DispatchError::DuplicateCapability { name, kind }),
            Entry::Vacant(slot) => {
                slot.insert(RegisteredCapability {
                    descriptor,
                    handler: Box::new(handler),
                });
                debug!("Registered {}: {}", kind, name);
                Ok(())
            }
        }
    }

    /// Resolve a capability by name and kind.
    #[inline]
    pub fn lookup(&self, name: &str, kind: CapabilityKind) -> DispatchResult<&RegisteredCapability> {
        self.entries(kind)
            .get(name)
            .ok_or_else(|| DispatchError::UnknownCapability {
                name: name.to_string(),
                kind,
            })
    }

    /// Descriptors of all capabilities of one kind, sorted by name.
    #[inline]
    pub fn list(&self, kind: CapabilityKind) -> Vec<&CapabilityDescriptor> {
        let mut descriptors: Vec<&CapabilityDescriptor> = self
            .entries(kind)
            .values()
            .map(RegisteredCapability::descriptor)
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Total number of registered capabilities across all kinds.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len() + self.resources.len() + self.prompts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self, kind: CapabilityKind) -> &HashMap<String, RegisteredCapability> {
        match kind {
            CapabilityKind::Tool => &self.tools,
            CapabilityKind::Resource => &self.resources,
            CapabilityKind::Prompt => &self.prompts,
        }
    }

    fn entries_mut(&mut self, kind: CapabilityKind) -> &mut HashMap<String, RegisteredCapability> {
        match kind {
            CapabilityKind::Tool => &mut self.tools,
            CapabilityKind::Resource => &mut self.resources,
            CapabilityKind::Prompt => &mut self.prompts,
        }
    }
}
