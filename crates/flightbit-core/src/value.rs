// Values decoded by the host agent
//
// The host hands over each record as an ordered list of (name, value) pairs
// whose values carry no schema. `DecodedValue` is the closed set of shapes the
// decoder can produce; the router matches on it exhaustively.

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// Raw byte string, the usual encoding for text coming out of msgpack.
    Bytes(Vec<u8>),
    Str(String),
    Float(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
    Null,
    Array(Vec<DecodedValue>),
    Map(Vec<(String, DecodedValue)>),
}

impl DecodedValue {
    /// Short name of the value kind, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedValue::Bytes(_) => "bytes",
            DecodedValue::Str(_) => "string",
            DecodedValue::Float(_) => "float",
            DecodedValue::Int(_) => "int",
            DecodedValue::UInt(_) => "uint",
            DecodedValue::Bool(_) => "bool",
            DecodedValue::Null => "null",
            DecodedValue::Array(_) => "array",
            DecodedValue::Map(_) => "map",
        }
    }

    /// JSON rendering, used when nested values are stringified.
    pub fn to_json(&self) -> JsonValue {
        match self {
            DecodedValue::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
            DecodedValue::Str(s) => JsonValue::String(s.clone()),
            DecodedValue::Float(f) => JsonNumber::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DecodedValue::Int(i) => JsonValue::Number((*i).into()),
            DecodedValue::UInt(u) => JsonValue::Number((*u).into()),
            DecodedValue::Bool(b) => JsonValue::Bool(*b),
            DecodedValue::Null => JsonValue::Null,
            DecodedValue::Array(values) => {
                JsonValue::Array(values.iter().map(DecodedValue::to_json).collect())
            }
            DecodedValue::Map(entries) => {
                let mut map = JsonMap::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json());
                }
                JsonValue::Object(map)
            }
        }
    }
}

/// Generic formatter: scalars print bare, nested values print as JSON.
impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            DecodedValue::Str(s) => f.write_str(s),
            DecodedValue::Float(v) => write!(f, "{v}"),
            DecodedValue::Int(v) => write!(f, "{v}"),
            DecodedValue::UInt(v) => write!(f, "{v}"),
            DecodedValue::Bool(v) => write!(f, "{v}"),
            DecodedValue::Null => Ok(()),
            DecodedValue::Array(_) | DecodedValue::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<JsonValue> for DecodedValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => DecodedValue::Null,
            JsonValue::Bool(b) => DecodedValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DecodedValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    DecodedValue::UInt(u)
                } else {
                    DecodedValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => DecodedValue::Str(s),
            JsonValue::Array(values) => {
                DecodedValue::Array(values.into_iter().map(DecodedValue::from).collect())
            }
            JsonValue::Object(map) => DecodedValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, DecodedValue::from(value)))
                    .collect(),
            ),
        }
    }
}

/// One decoded record: event time plus its fields in decode order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// Event time in fractional Unix seconds, when the host supplied one.
    pub timestamp: Option<f64>,
    pub fields: Vec<(String, DecodedValue)>,
}

impl Record {
    pub fn new(fields: Vec<(String, DecodedValue)>) -> Self {
        Self {
            timestamp: None,
            fields,
        }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DecodedValue> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

impl<K: Into<String>> FromIterator<(K, DecodedValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, DecodedValue)>>(iter: T) -> Self {
        Record::new(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
