//! Response flattening
//!
//! Natural Language API responses nest their useful fields inside wrapper
//! objects (`text`, `sentiment`, `partOfSpeech`, ...). Flattening hoists the
//! fields of every nested object into its parent so a response can be
//! projected onto a flat output schema.
//!
//! ```text
//! {"text": {"content": "hi", "beginOffset": 0}, "type": "FOO"}
//!   => {"content": "hi", "beginOffset": 0, "type": "FOO"}
//! ```
//!
//! Arrays are never hoisted: each object element is flattened on its own and
//! the array keeps its position. Objects under an opaque key (by default only
//! `metadata`) stay nested, because their keys are data rather than field
//! names.
//!
//! When two sibling objects hoist the same key, the one that comes later in
//! the source object wins and the key keeps its first position.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Key whose object value is kept nested instead of hoisted
pub const METADATA_KEY: &str = "metadata";

/// A scalar leaf of a flattened record
///
/// Integers and fractions are kept apart: `beginOffset` stays an exact `i64`
/// and scores stay `f64`. Widening to double happens only at projection time.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// JSON string
    String(String),
    /// JSON number without a fractional part that fits in `i64`
    Integer(i64),
    /// Any other JSON number
    Float(f64),
    /// JSON boolean
    Boolean(bool),
}

impl Scalar {
    /// Name of the scalar's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
        }
    }
}

/// A value in a flattened record
#[derive(Debug, Clone, PartialEq)]
pub enum FlatValue {
    /// A scalar leaf
    Scalar(Scalar),
    /// A nested record: an opaque object or an object inside an array
    Record(FlatRecord),
    /// An array, with object elements flattened
    List(Vec<FlatValue>),
}

impl FlatValue {
    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar(s) => s.type_name(),
            Self::Record(_) => "record",
            Self::List(_) => "array",
        }
    }

    /// Convert back to plain JSON
    pub fn to_json(&self) -> Value {
        match self {
            Self::Scalar(Scalar::String(s)) => Value::String(s.clone()),
            Self::Scalar(Scalar::Integer(i)) => Value::from(*i),
            Self::Scalar(Scalar::Float(f)) => Value::from(*f),
            Self::Scalar(Scalar::Boolean(b)) => Value::Bool(*b),
            Self::Record(record) => record.to_json(),
            Self::List(items) => Value::Array(items.iter().map(FlatValue::to_json).collect()),
        }
    }
}

impl From<Scalar> for FlatValue {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

impl From<&str> for FlatValue {
    fn from(s: &str) -> Self {
        Self::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<i64> for FlatValue {
    fn from(i: i64) -> Self {
        Self::Scalar(Scalar::Integer(i))
    }
}

impl From<f64> for FlatValue {
    fn from(f: f64) -> Self {
        Self::Scalar(Scalar::Float(f))
    }
}

/// An ordered map of field name to flattened value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRecord {
    fields: Vec<(String, FlatValue)>,
}

impl FlatRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field. An existing field keeps its position and gets the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: FlatValue) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Look up a field by name
    pub fn get(&self, key: &str) -> Option<&FlatValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Field names in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlatValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert back to a JSON object, preserving field order
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }
}

impl<K: Into<String>> FromIterator<(K, FlatValue)> for FlatRecord {
    fn from_iter<I: IntoIterator<Item = (K, FlatValue)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Recursive flattener with a configurable set of opaque keys
#[derive(Debug, Clone)]
pub struct Flattener {
    opaque_keys: Vec<String>,
}

impl Default for Flattener {
    fn default() -> Self {
        Self::with_opaque_keys([METADATA_KEY])
    }
}

impl Flattener {
    /// Create a flattener that keeps objects under `keys` nested
    pub fn with_opaque_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            opaque_keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether objects under `key` are kept nested
    pub fn is_opaque(&self, key: &str) -> bool {
        self.opaque_keys.iter().any(|k| k == key)
    }

    /// Flatten a JSON object
    pub fn flatten(&self, object: &Map<String, Value>) -> FlatRecord {
        let mut record = FlatRecord::new();
        self.flatten_into(object, &mut record);
        record
    }

    /// Flatten a JSON value that must be an object
    pub fn flatten_value(&self, value: &Value) -> Result<FlatRecord> {
        match value {
            Value::Object(object) => Ok(self.flatten(object)),
            other => Err(Error::UnexpectedResponse {
                message: format!("expected a JSON object, found {}", json_type(other)),
            }),
        }
    }

    fn flatten_into(&self, object: &Map<String, Value>, out: &mut FlatRecord) {
        for (key, value) in object {
            match value {
                Value::Null => {}
                Value::Object(nested) if self.is_opaque(key) => {
                    out.insert(key.as_str(), FlatValue::Record(self.flatten(nested)));
                }
                Value::Object(nested) => self.flatten_into(nested, out),
                Value::Array(items) => {
                    out.insert(key.as_str(), FlatValue::List(self.flatten_array(items)));
                }
                scalar => {
                    if let Some(scalar) = to_scalar(scalar) {
                        out.insert(key.as_str(), FlatValue::Scalar(scalar));
                    }
                }
            }
        }
    }

    fn flatten_array(&self, items: &[Value]) -> Vec<FlatValue> {
        items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::Object(object) => Some(FlatValue::Record(self.flatten(object))),
                Value::Array(inner) => Some(FlatValue::List(self.flatten_array(inner))),
                scalar => to_scalar(scalar).map(FlatValue::Scalar),
            })
            .collect()
    }
}

/// Flatten with the default opaque key set (`metadata`)
pub fn flatten(object: &Map<String, Value>) -> FlatRecord {
    Flattener::default().flatten(object)
}

/// Flatten a value with the default opaque key set, rejecting non-objects
pub fn flatten_value(value: &Value) -> Result<FlatRecord> {
    Flattener::default().flatten_value(value)
}

fn to_scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::String(s) => Some(Scalar::String(s.clone())),
        Value::Bool(b) => Some(Scalar::Boolean(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Scalar::Integer(i)),
            None => n.as_f64().map(Scalar::Float),
        },
        _ => None,
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
