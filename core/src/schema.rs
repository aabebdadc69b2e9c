//! Validation of decoded JSON responses.
//!
//! # Design
//! The pipeline only knows the [`Schema`] trait: it hands over the decoded
//! value and gets back either the validated value or a [`ValidationError`]
//! whose message is surfaced to the caller verbatim. [`ObjectSchema`] is the
//! built-in implementation, a flat map of keys to expected [`FieldType`]s.
//! Any `Fn(Value) -> Result<Value, ValidationError>` is a schema too.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// A schema mismatch. The message is complete and user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Validates a decoded JSON value.
pub trait Schema: Send + Sync {
    fn validate(&self, value: Value) -> Result<Value, ValidationError>;
}

impl<F> Schema for F
where
    F: Fn(Value) -> Result<Value, ValidationError> + Send + Sync,
{
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        self(value)
    }
}

/// Expected type of a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
    /// The key may be absent or `null`; otherwise it must match the inner type.
    Optional(Box<FieldType>),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => true,
            FieldType::Optional(inner) => value.is_null() || inner.matches(value),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => f.write_str("string"),
            FieldType::Number => f.write_str("number"),
            FieldType::Integer => f.write_str("integer"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Array => f.write_str("array"),
            FieldType::Object => f.write_str("object"),
            FieldType::Any => f.write_str("any"),
            FieldType::Optional(inner) => write!(f, "optional {inner}"),
        }
    }
}

/// A JSON object schema: every listed key must be present with the given
/// type. Keys not listed are accepted as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSchema {
    fields: Vec<(String, FieldType)>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push((key.into(), ty));
        self
    }
}

impl Schema for ObjectSchema {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let Some(object) = value.as_object() else {
            return Err(ValidationError::new(format!(
                "Validation failed: expected 'object', but received '{}'.",
                type_name(&value)
            )));
        };

        for (key, ty) in &self.fields {
            match object.get(key) {
                None if matches!(ty, FieldType::Optional(_)) => {}
                None => {
                    return Err(ValidationError::new(format!(
                        "Validation failed: key '{key}' is missing, but '{ty}' type is required."
                    )));
                }
                Some(found) if !ty.matches(found) => {
                    return Err(ValidationError::new(format!(
                        "Validation failed: key '{key}' is '{}', but '{ty}' type is required.",
                        type_name(found)
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(value)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
