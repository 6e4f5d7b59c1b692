//! Identity keys for the identity map.

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::metadata::EntityType;
use crate::value::Value;

/// Hashable form of one key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float by bit pattern.
    Float(u64),
    /// Text.
    String(SmolStr),
    /// Blob.
    Bytes(Vec<u8>),
    /// Any other value, by its JSON text.
    Other(String),
}

impl KeyValue {
    /// Convert a value; `None` for null.
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => return None,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Self::Int(*f as i64),
            Value::Float(f) => Self::Float(f.to_bits()),
            Value::String(s) => Self::String(SmolStr::new(s)),
            Value::Bytes(b) => Self::Bytes(b.clone()),
            other => Self::Other(serde_json::to_string(other).unwrap_or_default()),
        })
    }
}

/// Entity type plus primary key values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    entity_type: SmolStr,
    values: SmallVec<[KeyValue; 2]>,
}

impl EntityKey {
    /// Build a key from key values in key order; `None` when any part is null.
    pub fn new<'a>(entity_type: &str, values: impl IntoIterator<Item = &'a Value>) -> Option<Self> {
        let values = values
            .into_iter()
            .map(KeyValue::from_value)
            .collect::<Option<SmallVec<_>>>()?;
        Some(Self {
            entity_type: SmolStr::new(entity_type),
            values,
        })
    }

    /// Build a key from values laid out in property order.
    pub fn from_row(entity_type: &EntityType, values: &[Value]) -> Option<Self> {
        let key_values = entity_type
            .primary_key_indices()
            .iter()
            .map(|i| values.get(*i).unwrap_or(&Value::Null));
        Self::new(entity_type.name(), key_values)
    }

    /// Entity type name.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }
}
