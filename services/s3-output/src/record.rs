//! Schema-free log records and their JSON line encoding.
//!
//! Records arrive from the host as untyped key/value maps. Every value the
//! host decoder can produce is one of the [`Value`] shapes, so encoding is a
//! plain recursive walk with no reflection. Object keys are written in sorted
//! order so the same record always produces the same line.

use crate::error::OutputError;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use std::collections::BTreeMap;

/// A dynamically typed value inside a log record
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Raw bytes (msgpack `bin`). Written as text when valid UTF-8.
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Nested map; keys may be any scalar.
    Map(Vec<(Value, Value)>),
}

/// One log record: an unordered set of key/value pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(Value, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style
    pub fn with(mut self, key: impl Into<Value>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<Value>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Encode a record as a single compact JSON object, without trailing newline
pub fn normalize(record: &Record) -> Result<Vec<u8>, OutputError> {
    let object = encode_map(&record.entries)?;
    serde_json::to_vec(&JsonValue::Object(object))
        .map_err(|e| OutputError::Encoding(e.to_string()))
}

fn encode_map(entries: &[(Value, Value)]) -> Result<JsonMap<String, JsonValue>, OutputError> {
    let mut sorted = BTreeMap::new();
    for (key, value) in entries {
        sorted.insert(encode_key(key)?, encode_value(value)?);
    }
    Ok(sorted.into_iter().collect())
}

fn encode_key(key: &Value) -> Result<String, OutputError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Bytes(bytes) => utf8_text(bytes),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::UInt(u) => Ok(u.to_string()),
        Value::Float(f) if f.is_finite() => Ok(f.to_string()),
        Value::Float(f) => Err(OutputError::Encoding(format!(
            "non-finite float {f} used as map key"
        ))),
        Value::Null => Err(OutputError::Encoding("null used as map key".to_string())),
        Value::Array(_) | Value::Map(_) => Err(OutputError::Encoding(
            "container used as map key".to_string(),
        )),
    }
}

fn encode_value(value: &Value) -> Result<JsonValue, OutputError> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::UInt(u) => JsonValue::from(*u),
        Value::Float(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or_else(|| OutputError::Encoding(format!("non-finite float {f}")))?,
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Bytes(bytes) => JsonValue::String(utf8_text(bytes)?),
        Value::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(encode_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Map(entries) => JsonValue::Object(encode_map(entries)?),
    })
}

fn utf8_text(bytes: &[u8]) -> Result<String, OutputError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| OutputError::Encoding(format!("binary value is not UTF-8: {e}")))
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u64::from(u))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Map(record.entries)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (Value::String(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<JsonMap<String, JsonValue>> for Record {
    fn from(map: JsonMap<String, JsonValue>) -> Self {
        map.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(line: &[u8]) -> JsonValue {
        serde_json::from_slice(line).unwrap()
    }

    #[test]
    fn test_normalize_scalars() {
        let record = Record::new().with("key", "value").with("number", 8);

        let line = normalize(&record).unwrap();
        let parsed = decode(&line);

        assert_eq!(parsed["key"], "value");
        assert_eq!(parsed["number"], 8);
    }

    #[test]
    fn test_normalize_is_compact_without_newline() {
        let record = Record::new().with("mykey", "myvalue");
        let line = normalize(&record).unwrap();
        assert_eq!(line, br#"{"mykey":"myvalue"}"#.to_vec());
    }

    #[test]
    fn test_normalize_nested_map_round_trip() {
        let nested = Record::new()
            .with("pod", "api-7d9f")
            .with("labels", Record::new().with("app", "api").with("tier", "web"));
        let record = Record::new()
            .with("log", "GET /healthz 200")
            .with("kubernetes", nested)
            .with("latency_ms", 12.5)
            .with("ok", true)
            .with("trace", Value::Null)
            .with("tags", vec![Value::from("a"), Value::from(2)]);

        let parsed = decode(&normalize(&record).unwrap());

        assert_eq!(
            parsed,
            json!({
                "log": "GET /healthz 200",
                "kubernetes": {
                    "pod": "api-7d9f",
                    "labels": {"app": "api", "tier": "web"}
                },
                "latency_ms": 12.5,
                "ok": true,
                "trace": null,
                "tags": ["a", 2]
            })
        );
    }

    #[test]
    fn test_bytes_written_as_text() {
        let record = Record::new().with(b"message".to_vec(), b"disk full".to_vec());
        let line = normalize(&record).unwrap();
        assert_eq!(line, br#"{"message":"disk full"}"#.to_vec());
    }

    #[test]
    fn test_scalar_keys_stringified() {
        let record = Record::new().with(1, "one").with(true, "yes");
        let parsed = decode(&normalize(&record).unwrap());
        assert_eq!(parsed, json!({"1": "one", "true": "yes"}));
    }

    #[test]
    fn test_keys_sorted() {
        let record = Record::new().with("b", 2).with("a", 1).with("c", 3);
        let line = normalize(&record).unwrap();
        assert_eq!(line, br#"{"a":1,"b":2,"c":3}"#.to_vec());
    }

    #[test]
    fn test_large_unsigned_preserved() {
        let record = Record::new().with("offset", u64::MAX);
        let parsed = decode(&normalize(&record).unwrap());
        assert_eq!(parsed["offset"].as_u64(), Some(u64::MAX));
    }

    #[test]
    fn test_invalid_utf8_bytes_rejected() {
        let record = Record::new().with("payload", vec![0xff, 0xfe, 0x00]);
        assert!(matches!(normalize(&record), Err(OutputError::Encoding(_))));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let record = Record::new().with("ratio", f64::NAN);
        assert!(matches!(normalize(&record), Err(OutputError::Encoding(_))));
    }

    #[test]
    fn test_container_key_rejected() {
        let mut record = Record::new();
        record.insert(Value::Array(vec![]), "x");
        assert!(matches!(normalize(&record), Err(OutputError::Encoding(_))));

        let record = Record::new().with(Value::Null, "x");
        assert!(matches!(normalize(&record), Err(OutputError::Encoding(_))));
    }

    #[test]
    fn test_from_json_value() {
        let json = json!({"level": "warn", "count": 3, "neg": -1, "nested": {"k": [1.5]}});
        let JsonValue::Object(map) = json.clone() else {
            panic!("expected object");
        };

        let record = Record::from(map);
        assert_eq!(record.len(), 4);
        assert_eq!(decode(&normalize(&record).unwrap()), json);
    }

    #[test]
    fn test_empty_record() {
        let record = Record::new();
        assert!(record.is_empty());
        assert_eq!(normalize(&record).unwrap(), b"{}".to_vec());
    }
}
