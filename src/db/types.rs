//! Value and row types for db-steward.
//!
//! Defines the structures used to represent materialized query results.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Row buffering mode of a result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultMode {
    /// Fully buffered: row count and random seek available, must be released.
    #[default]
    Store,
    /// Streamed: forward-only, no row count, no seek.
    Use,
}

impl ResultMode {
    /// Returns true for the streamed mode.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Use)
    }
}

impl fmt::Display for ResultMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => write!(f, "store"),
            Self::Use => write!(f, "use"),
        }
    }
}

/// Shape of each materialized row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Ordered column-name to value mapping.
    #[default]
    Array,
    /// Structured record sharing column names across the result set.
    Object,
}

impl FetchMode {
    /// Parses a fetch mode from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "array" | "assoc" => Some(Self::Array),
            "object" | "record" => Some(Self::Object),
            _ => None,
        }
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column data type.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Attempts to convert the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// A structured record: values addressed by the column names of its result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Creates a record over shared column names.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Returns the value of the named column.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// A materialized row, shaped according to the active [`FetchMode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Ordered column-name to value mapping.
    Assoc(Vec<(String, Value)>),
    /// Structured record.
    Record(Record),
}

impl Row {
    /// Shapes raw driver values into a row.
    pub fn shape(mode: FetchMode, columns: &Arc<[String]>, values: Vec<Value>) -> Self {
        match mode {
            FetchMode::Array => Row::Assoc(
                columns
                    .iter()
                    .cloned()
                    .zip(values)
                    .collect(),
            ),
            FetchMode::Object => Row::Record(Record::new(Arc::clone(columns), values)),
        }
    }

    /// Returns the value of the named column.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Row::Assoc(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            Row::Record(record) => record.get(name),
        }
    }

    /// Returns the values in column order.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Row::Assoc(fields) => fields.iter().map(|(_, v)| v).collect(),
            Row::Record(record) => record.values().iter().collect(),
        }
    }

    /// Returns the number of fields in the row.
    pub fn len(&self) -> usize {
        match self {
            Row::Assoc(fields) => fields.len(),
            Row::Record(record) => record.values().len(),
        }
    }

    /// Returns true if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        match self {
            Row::Assoc(fields) => {
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
            }
            Row::Record(record) => {
                for (name, value) in record.columns().iter().zip(record.values()) {
                    map.serialize_entry(name, value)?;
                }
            }
        }
        map.end()
    }
}
