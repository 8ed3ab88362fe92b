//! Property bags owned by apps, extensions and envelopes.

use crate::error::TenError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    /// `bool`
    Bool,
    /// Any integer width.
    #[serde(alias = "int8", alias = "int16", alias = "int32", alias = "int64")]
    #[serde(alias = "uint8", alias = "uint16", alias = "uint32", alias = "uint64")]
    Int,
    /// Any float width.
    #[serde(alias = "float32", alias = "float64")]
    Float,
    /// `string`
    String,
    /// `buf`
    Buf,
    /// `array`
    Array,
    /// `object`
    Object,
}

impl PropertyType {
    fn admits(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (PropertyType::Bool, Value::Bool(_))
                | (PropertyType::Int, Value::Int(_))
                | (PropertyType::Float, Value::Float(_) | Value::Int(_))
                | (PropertyType::String, Value::String(_))
                | (PropertyType::Buf, Value::Buf(_))
                | (PropertyType::Array, Value::Array(_))
                | (PropertyType::Object, Value::Object(_))
        )
    }

    fn name(self) -> &'static str {
        match self {
            PropertyType::Bool => "bool",
            PropertyType::Int => "int",
            PropertyType::Float => "float",
            PropertyType::String => "string",
            PropertyType::Buf => "buf",
            PropertyType::Array => "array",
            PropertyType::Object => "object",
        }
    }
}

/// One declared property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    /// Declared type.
    #[serde(rename = "type")]
    pub ty: PropertyType,
    /// Value returned by getters while the property is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// Declared properties, keyed by top level path.
///
/// Parsed from `{"property": {"name": {"type": "int64", "default": 3}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// Declarations.
    #[serde(default)]
    pub property: BTreeMap<String, PropertyDecl>,
}

impl PropertySchema {
    /// Parse a schema document.
    pub fn from_json(json: &str) -> Result<Self, TenError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Declare a property.
    pub fn declare(
        mut self,
        path: impl Into<String>,
        ty: PropertyType,
        default: Option<serde_json::Value>,
    ) -> Self {
        self.property.insert(path.into(), PropertyDecl { ty, default });
        self
    }

    fn decl(&self, path: &str) -> Option<&PropertyDecl> {
        self.property.get(path)
    }
}

/// A tree of [`Value`]s addressed by `a.b[0].c` paths, with an optional
/// schema supplying types and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyStore {
    root: Value,
    schema: PropertySchema,
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! typed_getter {
    ($(#[$doc:meta])* $fn_name:ident, $ty:ty, $expected:literal, $pat:pat => $out:expr) => {
        $(#[$doc])*
        pub fn $fn_name(&self, path: &str) -> Result<$ty, TenError> {
            match self.get(path)? {
                $pat => Ok($out),
                _ => Err(TenError::TypeMismatch {
                    path: path.to_owned(),
                    expected: $expected,
                }),
            }
        }
    };
}

impl PropertyStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            root: Value::object(),
            schema: PropertySchema::default(),
        }
    }

    /// Attach a schema. Values already stored are not re-checked.
    pub fn set_schema(&mut self, schema: PropertySchema) {
        self.schema = schema;
    }

    /// The attached schema.
    pub fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    /// Borrow the stored value at `path`, ignoring schema defaults.
    pub fn get_ref(&self, path: &str) -> Option<&Value> {
        self.root
            .get_path(path)
            .ok()
            .flatten()
            .filter(|v| !matches!(v, Value::Null))
    }

    /// The value at `path`, or its declared default.
    ///
    /// Fails with [`TenError::UnresolvedProperty`] when neither exists.
    pub fn get(&self, path: &str) -> Result<Value, TenError> {
        match self.root.get_path(path)? {
            Some(Value::Null) | None => {}
            Some(v) => return Ok(v.clone()),
        }
        self.schema
            .decl(path)
            .and_then(|decl| decl.default.clone())
            .map(Value::from_json)
            .ok_or_else(|| TenError::UnresolvedProperty(path.to_owned()))
    }

    /// Store a value, checking it against the declared type if any.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), TenError> {
        let value = value.into();
        if let Some(decl) = self.schema.decl(path) {
            if !decl.ty.admits(&value) {
                return Err(TenError::TypeMismatch {
                    path: path.to_owned(),
                    expected: decl.ty.name(),
                });
            }
        }
        if path.is_empty() && !matches!(value, Value::Object(_)) {
            return Err(TenError::InvalidArgument(
                "the property root must be an object".into(),
            ));
        }
        self.root.set_path(path, value)
    }

    /// Whether `path` has a value or a declared default.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    typed_getter!(
        /// Get a `bool`.
        get_bool, bool, "bool", Value::Bool(b) => b
    );
    typed_getter!(
        /// Get an integer.
        get_int, i64, "int", Value::Int(i) => i
    );
    typed_getter!(
        /// Get a string.
        get_string, String, "string", Value::String(s) => s
    );
    typed_getter!(
        /// Get a byte buffer.
        get_buf, Vec<u8>, "buf", Value::Buf(b) => b
    );

    /// Get a float. Integers are widened.
    pub fn get_float(&self, path: &str) -> Result<f64, TenError> {
        match self.get(path)? {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            _ => Err(TenError::TypeMismatch {
                path: path.to_owned(),
                expected: "float",
            }),
        }
    }

    /// Serialize the value at `path` as JSON.
    pub fn get_json(&self, path: &str) -> Result<String, TenError> {
        Ok(serde_json::to_string(&self.get(path)?.to_json())?)
    }

    /// Parse `json` and store it at `path`.
    pub fn set_json(&mut self, path: &str, json: &str) -> Result<(), TenError> {
        let parsed: serde_json::Value = serde_json::from_str(json)?;
        self.set(path, Value::from_json(parsed))
    }

    /// Merge the top level keys of a JSON object into the store.
    pub fn init_from_json(&mut self, json: &str) -> Result<(), TenError> {
        let parsed: serde_json::Value = serde_json::from_str(json)?;
        self.merge_json(parsed)
    }

    /// Merge the top level keys of an already parsed JSON object.
    pub fn merge_json(&mut self, json: serde_json::Value) -> Result<(), TenError> {
        match json {
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    self.set(&key, Value::from_json(value))?;
                }
                Ok(())
            }
            serde_json::Value::Null => Ok(()),
            other => Err(TenError::InvalidArgument(format!(
                "property document must be an object, got {other}"
            ))),
        }
    }

    /// The whole tree as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        self.root.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_round_trip() {
        let mut props = PropertyStore::new();
        props.set("flag", true).unwrap();
        props.set("count", 42i64).unwrap();
        props.set("ratio", 0.25).unwrap();
        props.set("label", "hi").unwrap();
        props.set("blob", vec![1u8, 2, 3]).unwrap();

        assert!(props.get_bool("flag").unwrap());
        assert_eq!(props.get_int("count").unwrap(), 42);
        assert_eq!(props.get_float("ratio").unwrap(), 0.25);
        assert_eq!(props.get_string("label").unwrap(), "hi");
        assert_eq!(props.get_buf("blob").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn missing_key_is_unresolved() {
        let props = PropertyStore::new();
        let err = props.get_int("nope").unwrap_err();
        assert!(matches!(err, TenError::UnresolvedProperty(ref p) if p == "nope"));
        assert!(!props.contains("nope"));
    }

    #[test]
    fn wrong_type_is_mismatch() {
        let mut props = PropertyStore::new();
        props.set("label", "hi").unwrap();
        let err = props.get_int("label").unwrap_err();
        assert!(matches!(err, TenError::TypeMismatch { expected: "int", .. }));
    }

    #[test]
    fn schema_default_fills_unset_key() {
        let schema = PropertySchema::from_json(
            r#"{"property": {"timeout": {"type": "int64", "default": 30}, "name": {"type": "string"}}}"#,
        )
        .unwrap();
        let mut props = PropertyStore::new();
        props.set_schema(schema);

        assert_eq!(props.get_int("timeout").unwrap(), 30);
        assert!(props.contains("timeout"));
        assert!(props.get_string("name").is_err());

        props.set("timeout", 5i64).unwrap();
        assert_eq!(props.get_int("timeout").unwrap(), 5);

        let err = props.set("name", 1i64).unwrap_err();
        assert!(matches!(err, TenError::TypeMismatch { expected: "string", .. }));
    }

    #[test]
    fn huge_index_is_an_invalid_argument() {
        let mut props = PropertyStore::new();
        let err = props.set("a[18446744073709551615]", 1i64).unwrap_err();
        assert!(matches!(err, TenError::InvalidArgument(_)));
        assert!(props.get_int("a[0]").is_err());
    }

    #[test]
    fn json_paths() {
        let mut props = PropertyStore::new();
        props
            .init_from_json(r#"{"a": {"b": [1, {"c": "x"}]}, "n": 1}"#)
            .unwrap();
        assert_eq!(props.get_string("a.b[1].c").unwrap(), "x");
        assert_eq!(props.get_json("a.b[0]").unwrap(), "1");

        props.set_json("a.d", r#"{"k": [true]}"#).unwrap();
        assert!(props.get_bool("a.d.k[0]").unwrap());
        assert_eq!(props.to_json()["n"], json!(1));

        assert!(props.init_from_json("[1, 2]").is_err());
        assert!(props.set_json("a", "{not json").is_err());
    }
}
