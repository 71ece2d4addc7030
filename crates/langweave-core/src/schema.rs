//! Output schemas and projection
//!
//! A flattened response is projected onto a predeclared [`OutputSchema`]:
//! fields come out in schema order, unknown keys are dropped, and a missing
//! non-nullable field or a type mismatch is an [`Error::Projection`].
//!
//! Numbers: `Double` fields accept integers and fractions (integers are
//! widened), `Long` fields accept integers only.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::flatten::{FlatRecord, FlatValue, Scalar};

/// Semantic type of a schema field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// 64-bit integer
    Long,
    /// 64-bit float
    Double,
    /// Boolean
    Boolean,
    /// Map of string to string
    Map,
    /// Array of the element type
    Array(Box<FieldType>),
    /// Nested record
    Record(OutputSchema),
}

impl FieldType {
    /// Array of records with the given schema
    pub fn records(schema: OutputSchema) -> Self {
        Self::Array(Box::new(Self::Record(schema)))
    }
}

/// A named, typed schema field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Whether the field may be absent
    pub nullable: bool,
}

impl Field {
    /// A field that must be present
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
        }
    }

    /// A field that projects to null when absent
    pub fn nullable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
        }
    }
}

/// An ordered set of fields describing an output record
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    /// Record name
    pub name: String,
    /// Fields in output order
    pub fields: Vec<Field>,
}

impl OutputSchema {
    /// Create a schema
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Project a flattened record onto this schema
    pub fn project(&self, record: &FlatRecord) -> Result<OutputRecord> {
        self.project_at(record, "")
    }

    fn project_at(&self, record: &FlatRecord, prefix: &str) -> Result<OutputRecord> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{}.{}", prefix, field.name)
            };
            let value = match record.get(&field.name) {
                Some(value) => project_value(value, &field.field_type, &path)?,
                None if field.nullable => OutputValue::Null,
                None => return Err(Error::projection(path, "required field is missing")),
            };
            fields.push((field.name.clone(), value));
        }
        Ok(OutputRecord {
            name: self.name.clone(),
            fields,
        })
    }
}

fn project_value(value: &FlatValue, field_type: &FieldType, path: &str) -> Result<OutputValue> {
    let mismatch = || {
        Error::projection(
            path,
            format!("expected {}, found {}", type_label(field_type), value.type_name()),
        )
    };

    match (field_type, value) {
        (FieldType::String, FlatValue::Scalar(Scalar::String(s))) => {
            Ok(OutputValue::String(s.clone()))
        }
        (FieldType::Long, FlatValue::Scalar(Scalar::Integer(i))) => Ok(OutputValue::Long(*i)),
        (FieldType::Double, FlatValue::Scalar(Scalar::Integer(i))) => {
            Ok(OutputValue::Double(*i as f64))
        }
        (FieldType::Double, FlatValue::Scalar(Scalar::Float(f))) => Ok(OutputValue::Double(*f)),
        (FieldType::Boolean, FlatValue::Scalar(Scalar::Boolean(b))) => {
            Ok(OutputValue::Boolean(*b))
        }
        (FieldType::Map, FlatValue::Record(record)) => {
            let mut map = BTreeMap::new();
            for (key, entry) in record.iter() {
                match entry {
                    FlatValue::Scalar(Scalar::String(s)) => {
                        map.insert(key.to_string(), s.clone());
                    }
                    other => {
                        return Err(Error::projection(
                            format!("{}.{}", path, key),
                            format!("map values must be strings, found {}", other.type_name()),
                        ));
                    }
                }
            }
            Ok(OutputValue::Map(map))
        }
        (FieldType::Array(element_type), FlatValue::List(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| project_value(item, element_type, &format!("{}[{}]", path, i)))
            .collect::<Result<Vec<_>>>()
            .map(OutputValue::Array),
        (FieldType::Record(schema), FlatValue::Record(record)) => {
            schema.project_at(record, path).map(OutputValue::Record)
        }
        _ => Err(mismatch()),
    }
}

fn type_label(field_type: &FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::Long => "long",
        FieldType::Double => "double",
        FieldType::Boolean => "boolean",
        FieldType::Map => "map",
        FieldType::Array(_) => "array",
        FieldType::Record(_) => "record",
    }
}

/// A projected value
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    /// Absent nullable field
    Null,
    /// String value
    String(String),
    /// Integer value
    Long(i64),
    /// Floating point value
    Double(f64),
    /// Boolean value
    Boolean(bool),
    /// String to string map
    Map(BTreeMap<String, String>),
    /// Array value
    Array(Vec<OutputValue>),
    /// Nested record
    Record(OutputRecord),
}

impl OutputValue {
    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value as `f64`, for longs and doubles
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Long(i) => Some(*i as f64),
            Self::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer value, if this is a long
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Long(i) => Some(*i),
            _ => None,
        }
    }

    /// Elements, if this is an array
    pub fn as_array(&self) -> Option<&[OutputValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Nested record, if this is a record
    pub fn as_record(&self) -> Option<&OutputRecord> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Whether this is the null value
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert to plain JSON
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::String(s) => Value::String(s.clone()),
            Self::Long(i) => Value::from(*i),
            Self::Double(f) => Value::from(*f),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            Self::Array(items) => Value::Array(items.iter().map(OutputValue::to_json).collect()),
            Self::Record(record) => record.to_json(),
        }
    }
}

impl Serialize for OutputValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::String(s) => serializer.serialize_str(s),
            Self::Long(i) => serializer.serialize_i64(*i),
            Self::Double(f) => serializer.serialize_f64(*f),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Map(map) => map.serialize(serializer),
            Self::Array(items) => items.serialize(serializer),
            Self::Record(record) => record.serialize(serializer),
        }
    }
}

/// A record conforming to an [`OutputSchema`]
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    name: String,
    fields: Vec<(String, OutputValue)>,
}

impl OutputRecord {
    /// Name of the schema this record was projected onto
    pub fn schema_name(&self) -> &str {
        &self.name
    }

    /// Look up a field value by name
    pub fn get(&self, name: &str) -> Option<&OutputValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Fields in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Convert to a JSON object with keys in schema order
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl Serialize for OutputRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::flatten_value;
    use serde_json::json;

    fn mention_schema() -> OutputSchema {
        OutputSchema::new(
            "mentionsRecord",
            vec![
                Field::required("content", FieldType::String),
                Field::nullable("beginOffset", FieldType::Long),
            ],
        )
    }

    #[test]
    fn test_unknown_keys_dropped() {
        let schema = OutputSchema::new("r", vec![Field::required("a", FieldType::Long)]);
        let record = flatten_value(&json!({"a": 1, "b": 2})).unwrap();
        let projected = schema.project(&record).unwrap();
        assert_eq!(projected.to_json(), json!({"a": 1}));
    }

    #[test]
    fn test_fields_follow_schema_order() {
        let schema = OutputSchema::new(
            "r",
            vec![
                Field::required("b", FieldType::String),
                Field::required("a", FieldType::String),
            ],
        );
        let record = flatten_value(&json!({"a": "x", "b": "y"})).unwrap();
        let projected = schema.project(&record).unwrap();
        let keys: Vec<_> = projected.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(
            serde_json::to_string(&projected).unwrap(),
            r#"{"b":"y","a":"x"}"#
        );
    }

    #[test]
    fn test_missing_required_field_errors() {
        let schema = OutputSchema::new("r", vec![Field::required("language", FieldType::String)]);
        let err = schema.project(&FlatRecord::new()).unwrap_err();
        match err {
            Error::Projection { path, message } => {
                assert_eq!(path, "language");
                assert!(message.contains("missing"));
            }
            other => panic!("Expected projection error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_nullable_field_is_null() {
        let schema = OutputSchema::new("r", vec![Field::nullable("score", FieldType::Double)]);
        let projected = schema.project(&FlatRecord::new()).unwrap();
        assert_eq!(projected.get("score"), Some(&OutputValue::Null));
        assert_eq!(projected.to_json(), json!({"score": null}));
    }

    #[test]
    fn test_double_widens_integer() {
        let schema = OutputSchema::new("r", vec![Field::required("salience", FieldType::Double)]);
        let record = flatten_value(&json!({"salience": 1})).unwrap();
        let projected = schema.project(&record).unwrap();
        assert_eq!(projected.get("salience"), Some(&OutputValue::Double(1.0)));
    }

    #[test]
    fn test_long_rejects_fraction() {
        let schema = OutputSchema::new("r", vec![Field::required("beginOffset", FieldType::Long)]);
        let record = flatten_value(&json!({"beginOffset": 1.5})).unwrap();
        let err = schema.project(&record).unwrap_err();
        assert!(err.to_string().contains("expected long, found float"));
    }

    #[test]
    fn test_type_mismatch_errors() {
        let schema = OutputSchema::new("r", vec![Field::required("name", FieldType::String)]);
        let record = flatten_value(&json!({"name": 42})).unwrap();
        let err = schema.project(&record).unwrap_err();
        assert!(matches!(err, Error::Projection { .. }));
    }

    #[test]
    fn test_nested_array_of_records() {
        let schema = OutputSchema::new(
            "r",
            vec![Field::required(
                "mentions",
                FieldType::records(mention_schema()),
            )],
        );
        let record = flatten_value(&json!({
            "mentions": [
                {"text": {"content": "a", "beginOffset": 0}, "type": "PROPER"},
                {"text": {"content": "b"}}
            ]
        }))
        .unwrap();
        let projected = schema.project(&record).unwrap();
        assert_eq!(
            projected.to_json(),
            json!({"mentions": [
                {"content": "a", "beginOffset": 0},
                {"content": "b", "beginOffset": null}
            ]})
        );
    }

    #[test]
    fn test_nested_error_reports_path() {
        let schema = OutputSchema::new(
            "r",
            vec![Field::required(
                "mentions",
                FieldType::records(mention_schema()),
            )],
        );
        let record = flatten_value(&json!({"mentions": [{"text": {"content": "a"}}, {}]})).unwrap();
        match schema.project(&record).unwrap_err() {
            Error::Projection { path, .. } => assert_eq!(path, "mentions[1].content"),
            other => panic!("Expected projection error, got {other:?}"),
        }
    }

    #[test]
    fn test_map_field() {
        let schema = OutputSchema::new("r", vec![Field::nullable("metadata", FieldType::Map)]);
        let record = flatten_value(&json!({"metadata": {"mid": "/m/0", "wikipedia_url": "u"}})).unwrap();
        let projected = schema.project(&record).unwrap();
        match projected.get("metadata") {
            Some(OutputValue::Map(map)) => {
                assert_eq!(map.get("mid"), Some(&"/m/0".to_string()));
                assert_eq!(map.len(), 2);
            }
            other => panic!("Expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_map_rejects_non_string_values() {
        let schema = OutputSchema::new("r", vec![Field::nullable("metadata", FieldType::Map)]);
        let record = flatten_value(&json!({"metadata": {"count": 3}})).unwrap();
        match schema.project(&record).unwrap_err() {
            Error::Projection { path, .. } => assert_eq!(path, "metadata.count"),
            other => panic!("Expected projection error, got {other:?}"),
        }
    }

    #[test]
    fn test_array_of_scalars() {
        let schema = OutputSchema::new(
            "r",
            vec![Field::required("tags", FieldType::Array(Box::new(FieldType::String)))],
        );
        let record = flatten_value(&json!({"tags": ["a", "b"]})).unwrap();
        let projected = schema.project(&record).unwrap();
        assert_eq!(projected.to_json(), json!({"tags": ["a", "b"]}));
    }

    #[test]
    fn test_output_value_accessors() {
        assert_eq!(OutputValue::Long(3).as_f64(), Some(3.0));
        assert_eq!(OutputValue::Double(0.5).as_i64(), None);
        assert_eq!(OutputValue::String("x".into()).as_str(), Some("x"));
        assert!(OutputValue::Null.is_null());
    }
}
