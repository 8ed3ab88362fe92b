//! Dynamically typed property values and `a.b[0].c` paths.

use crate::error::TenError;
use std::collections::BTreeMap;

/// A property value.
///
/// Mirrors JSON with two additions: integers and floats are distinct,
/// and raw byte buffers are a first class variant.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent or JSON `null`.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Buf(Vec<u8>),
    /// Ordered list.
    Array(Vec<Value>),
    /// String keyed map.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// An empty object.
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    /// Name of the variant, used in type mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Buf(_) => "buf",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Convert from a JSON tree. Integers that fit `i64` stay integers.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a JSON tree. Buffers become arrays of byte values;
    /// non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Buf(bytes) => {
                serde_json::Value::Array(bytes.iter().map(|b| serde_json::Value::from(*b)).collect())
            }
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Look up a path. The empty path is the value itself.
    pub fn get_path(&self, path: &str) -> Result<Option<&Value>, TenError> {
        let mut current = self;
        for segment in parse_path(path)? {
            let next = match (&segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(*key),
                (Segment::Index(i), Value::Array(items)) => items.get(*i),
                _ => None,
            };
            match next {
                Some(v) => current = v,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Store `value` at `path`, creating intermediate objects and arrays.
    ///
    /// Arrays are padded with `Null` up to the requested index. Walking
    /// through an existing scalar is an error.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), TenError> {
        let segments = parse_path(path)?;
        let mut current = self;
        for segment in &segments {
            current = match segment {
                Segment::Key(key) => {
                    if matches!(current, Value::Null) {
                        *current = Value::object();
                    }
                    match current {
                        Value::Object(map) => map.entry((*key).to_owned()).or_default(),
                        other => {
                            return Err(TenError::InvalidArgument(format!(
                                "cannot index {} with key '{key}' in path '{path}'",
                                other.type_name()
                            )));
                        }
                    }
                }
                Segment::Index(i) => {
                    if matches!(current, Value::Null) {
                        *current = Value::Array(Vec::new());
                    }
                    match current {
                        Value::Array(items) => {
                            if *i >= items.len() {
                                if *i - items.len() > MAX_ARRAY_PADDING {
                                    return Err(TenError::InvalidArgument(format!(
                                        "index [{i}] in path '{path}' is too far past the end of an array of {}",
                                        items.len()
                                    )));
                                }
                                items.resize_with(*i + 1, || Value::Null);
                            }
                            &mut items[*i]
                        }
                        other => {
                            return Err(TenError::InvalidArgument(format!(
                                "cannot index {} with [{i}] in path '{path}'",
                                other.type_name()
                            )));
                        }
                    }
                }
            };
        }
        *current = value;
        Ok(())
    }
}

/// How many `Null`s `set_path` may pad an array with.
const MAX_ARRAY_PADDING: usize = 1024;

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment<'_>>, TenError> {
    let invalid = || TenError::InvalidArgument(format!("invalid property path '{path}'"));
    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if key.is_empty() && (rest.is_empty() || segments.is_empty()) {
            return Err(invalid());
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(invalid)?;
            if !rest.starts_with('[') {
                return Err(invalid());
            }
            let index = rest[1..close].parse::<usize>().map_err(|_| invalid())?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }
    Ok(segments)
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Buf(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json(v)
    }
}
