//! Structured Schemas and Payload Validation
//!
//! Schemas are explicit immutable value objects: an ordered list of named,
//! typed, required-or-optional fields. A single validator function checks a
//! payload against a schema in strict mode, failing fast on the first
//! violation.


use crate::errors::{DispatchError, DispatchResult};
use crate::protocol::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
}

/// One named field in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
}

/// Ordered set of field descriptors. Immutable once attached to a
/// capability descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
}

/// Builder for [`Schema`]. Field order is declaration order.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDescriptor>,
}

impl FieldType {
    /// Wire name of the type
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Whether a payload value satisfies this type. Integer and Float are
    /// distinct: an integer field rejects fractional values, a float field
    /// accepts any number.
    #[inline]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                }
                _ => false,
            },
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// Describe a payload value for error reporting
#[inline]
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "float"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Schema {
    /// A schema with no fields; only the empty payload satisfies it
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Fields in declaration order
    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by name
    #[inline]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl SchemaBuilder {
    /// Add a required field. Field names must be unique within a schema.
    #[inline]
    pub fn required<S: Into<String>>(self, name: S, field_type: FieldType) -> Self {
        self.field(name.into(), field_type, true)
    }

    /// Add an optional field. Field names must be unique within a schema.
    #[inline]
    pub fn optional<S: Into<String>>(self, name: S, field_type: FieldType) -> Self {
        self.field(name.into(), field_type, false)
    }

    fn field(mut self, name: String, field_type: FieldType, required: bool) -> Self {
        debug_assert!(
            self.fields.iter().all(|f| f.name != name),
            "duplicate schema field: {}",
            name
        );
        self.fields.push(FieldDescriptor {
            name,
            field_type,
            required,
        });
        self
    }

    #[inline]
    pub fn build(self) -> Schema {
        Schema {
            fields: self.fields,
        }
    }
}

/// Validate a payload against a schema in strict mode.
///
/// Every required field must be present with its declared type, optional
/// fields must match their type when present, and fields absent from the
/// schema are rejected. Schema fields are checked in declaration order,
/// then payload keys are scanned for unknowns, so the first reported
/// violation is deterministic for a given payload.
#[inline]
pub fn check(payload: &Payload, schema: &Schema) -> DispatchResult<()> {
    for descriptor in schema.fields() {
        match payload.get(&descriptor.name) {
            Some(value) => {
                if !descriptor.field_type.matches(value) {
                    return Err(DispatchError::SchemaMismatch {
                        field: descriptor.name.clone(),
                        expected: descriptor.field_type.as_str().to_string(),
                        actual: value_type_name(value).to_string(),
                    });
                }
            }
            None => {
                if descriptor.required {
                    return Err(DispatchError::SchemaMismatch {
                        field: descriptor.name.clone(),
                        expected: descriptor.field_type.as_str().to_string(),
                        actual: "missing".to_string(),
                    });
                }
            }
        }
    }

    for (name, value) in payload {
        if schema.field(name).is_none() {
            return Err(DispatchError::SchemaMismatch {
                field: name.clone(),
                expected: "no such field".to_string(),
                actual: value_type_name(value).to_string(),
            });
        }
    }

    Ok(())
}
