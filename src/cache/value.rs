//! Cache Value Module
//!
//! The tagged union of value shapes a cache record can hold, and the
//! `value_type` tag persisted next to the payload.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{CacheError, Result};

// == Value Kind ==
/// Shape tag stored as `value_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Int,
    Float,
    Bool,
    Array,
    Object,
    Null,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Null => "null",
        }
    }

    /// Parses a stored tag; unknown tags yield `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "string" => ValueKind::String,
            "int" => ValueKind::Int,
            "float" => ValueKind::Float,
            "bool" => ValueKind::Bool,
            "array" => ValueKind::Array,
            "object" => ValueKind::Object,
            "null" => ValueKind::Null,
            _ => return None,
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Cache Value ==
/// A value that can be stored in the cache.
///
/// `Array` and `Map` are stored structurally inside the record and both carry
/// the `array` tag. `Object` is an opaque composite that goes through the
/// engine's object codec and is persisted as an encoded string.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<CacheValue>),
    Map(BTreeMap<String, CacheValue>),
    Object(Value),
}

impl CacheValue {
    /// Wraps any serializable composite as an `Object` value.
    ///
    /// Fails with [`CacheError::UnsupportedValue`] if `value` has no JSON
    /// representation (e.g. a map with non-string keys).
    pub fn object<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(CacheValue::Object)
            .map_err(|e| CacheError::UnsupportedValue(e.to_string()))
    }

    /// Returns the shape tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            CacheValue::Null => ValueKind::Null,
            CacheValue::Bool(_) => ValueKind::Bool,
            CacheValue::Int(_) => ValueKind::Int,
            CacheValue::Float(_) => ValueKind::Float,
            CacheValue::String(_) => ValueKind::String,
            CacheValue::Array(_) | CacheValue::Map(_) => ValueKind::Array,
            CacheValue::Object(_) => ValueKind::Object,
        }
    }

    /// Converts a JSON tree into structural cache values.
    ///
    /// Numbers that fit `i64` become `Int`, all others `Float`. Integers
    /// above `i64::MAX` lose precision that way; [`CacheValue::try_from_json`]
    /// rejects them instead.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => CacheValue::Null,
            Value::Bool(b) => CacheValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CacheValue::Int(i),
                None => CacheValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => CacheValue::String(s),
            Value::Array(items) => {
                CacheValue::Array(items.into_iter().map(CacheValue::from_json).collect())
            }
            Value::Object(map) => CacheValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, CacheValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Like [`CacheValue::from_json`], but fails with
    /// [`CacheError::UnsupportedValue`] on an integer that does not fit `i64`.
    pub fn try_from_json(value: Value) -> Result<Self> {
        Ok(match value {
            Value::Number(n) if n.as_i64().is_none() && n.is_u64() => {
                return Err(CacheError::UnsupportedValue(format!(
                    "integer {n} does not fit a signed 64-bit int"
                )));
            }
            Value::Array(items) => CacheValue::Array(
                items
                    .into_iter()
                    .map(CacheValue::try_from_json)
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => CacheValue::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, CacheValue::try_from_json(v)?)))
                    .collect::<Result<_>>()?,
            ),
            other => CacheValue::from_json(other),
        })
    }

    /// Converts this value into a JSON tree. `Object` yields its inner tree.
    ///
    /// Non-finite floats have no JSON form and become `null`; the codec
    /// rejects them before they reach this point.
    pub fn to_json(&self) -> Value {
        match self {
            CacheValue::Null => Value::Null,
            CacheValue::Bool(b) => Value::Bool(*b),
            CacheValue::Int(i) => Value::Number((*i).into()),
            CacheValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            CacheValue::String(s) => Value::String(s.clone()),
            CacheValue::Array(items) => Value::Array(items.iter().map(CacheValue::to_json).collect()),
            CacheValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
            CacheValue::Object(value) => value.clone(),
        }
    }

    /// Deserializes this value into a concrete type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|e| CacheError::CorruptValue(e.to_string()))
    }

    /// Fails with [`CacheError::UnsupportedValue`] if any float in the tree
    /// is NaN or infinite.
    pub fn ensure_representable(&self) -> Result<()> {
        match self {
            CacheValue::Float(f) if !f.is_finite() => Err(CacheError::UnsupportedValue(format!(
                "non-finite float {f}"
            ))),
            CacheValue::Array(items) => items.iter().try_for_each(CacheValue::ensure_representable),
            CacheValue::Map(map) => map.values().try_for_each(CacheValue::ensure_representable),
            _ => Ok(()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CacheValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CacheValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CacheValue::Float(f) => Some(*f),
            CacheValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CacheValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

// == Conversions ==
impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::String(value.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::String(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Int(value)
    }
}

impl From<i32> for CacheValue {
    fn from(value: i32) -> Self {
        CacheValue::Int(value.into())
    }
}

impl From<u32> for CacheValue {
    fn from(value: u32) -> Self {
        CacheValue::Int(value.into())
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        CacheValue::Float(value)
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Bool(value)
    }
}

impl From<Vec<CacheValue>> for CacheValue {
    fn from(value: Vec<CacheValue>) -> Self {
        CacheValue::Array(value)
    }
}

impl From<BTreeMap<String, CacheValue>> for CacheValue {
    fn from(value: BTreeMap<String, CacheValue>) -> Self {
        CacheValue::Map(value)
    }
}

impl<T: Into<CacheValue>> From<Option<T>> for CacheValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CacheValue::Null)
    }
}
