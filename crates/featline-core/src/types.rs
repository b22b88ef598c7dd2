//! Core data types for featline
//!
//! Values, value types, entity keys and per-value status codes. These types
//! are kept small and serializable so every crate can share them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One request row: entity join keys plus any request-time data fields,
/// keyed by name.
pub type EntityRow = BTreeMap<String, FeatureValue>;

/// Identifies one entity instance, e.g. `driver_id = 1001`.
///
/// # Examples
///
/// ```
/// use featline_core::EntityKey;
///
/// let key = EntityKey::new("driver_id", "1001");
/// assert_eq!(key.name, "driver_id");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    /// The entity (join key) name, e.g. "driver_id"
    pub name: String,

    /// The entity value rendered canonically as a string
    pub value: String,
}

impl EntityKey {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Declared type of a feature or request-data field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Int32,
    Int64,
    Float,
    Double,
    String,
    Bytes,
    Bool,
    UnixTimestamp,
    Int64List,
    DoubleList,
    StringList,
    BoolList,
    Json,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Bytes => "BYTES",
            Self::Bool => "BOOL",
            Self::UnixTimestamp => "UNIX_TIMESTAMP",
            Self::Int64List => "INT64_LIST",
            Self::DoubleList => "DOUBLE_LIST",
            Self::StringList => "STRING_LIST",
            Self::BoolList => "BOOL_LIST",
            Self::Json => "JSON",
        };
        f.write_str(name)
    }
}

/// A feature value of any supported type
///
/// Uses `#[serde(untagged)]` so values read and write as plain JSON:
/// `Int(42)` is `42`, `String("a")` is `"a"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Null/missing value
    /// Must be first so JSON `null` does not land in `Json`.
    #[default]
    Null,

    Int(i64),

    Float(f64),

    String(String),

    Bool(bool),

    ArrayInt(Vec<i64>),

    ArrayFloat(Vec<f64>),

    ArrayString(Vec<String>),

    ArrayBool(Vec<bool>),

    /// Arbitrary JSON. Must be last: it matches everything.
    Json(serde_json::Value),
}

impl FeatureValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Renders the value as an entity key component.
    ///
    /// Only scalar integer, string and bool values can identify an entity.
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            Self::Int(v) => Some(v.to_string()),
            Self::String(v) => Some(v.clone()),
            Self::Bool(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Checks whether this value can be served as `value_type`.
    ///
    /// `Null` conforms to every type. Integers are accepted where floating
    /// point is declared, since JSON does not distinguish `1` from `1.0`.
    pub fn conforms_to(&self, value_type: ValueType) -> bool {
        match (self, value_type) {
            (Self::Null, _) | (_, ValueType::Json) => true,
            (Self::Int(v), ValueType::Int32) => i32::try_from(*v).is_ok(),
            (Self::Int(_), ValueType::Int64 | ValueType::UnixTimestamp) => true,
            (Self::Int(_) | Self::Float(_), ValueType::Float | ValueType::Double) => true,
            (Self::String(_), ValueType::String | ValueType::Bytes) => true,
            (Self::Bool(_), ValueType::Bool) => true,
            (Self::ArrayInt(_), ValueType::Int64List | ValueType::DoubleList) => true,
            (Self::ArrayFloat(_), ValueType::DoubleList) => true,
            (Self::ArrayString(_), ValueType::StringList) => true,
            (Self::ArrayBool(_), ValueType::BoolList) => true,
            _ => false,
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Per-value outcome attached to every returned value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldStatus {
    /// A fresh value was found (or supplied by the caller)
    Present,
    /// A fresh row exists but holds no value for this feature
    NullValue,
    /// No row exists for the entity key
    NotFound,
    /// A row exists but is older than the view's ttl; its value is withheld
    OutsideTtl,
}

impl FieldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "PRESENT",
            Self::NullValue => "NULL_VALUE",
            Self::NotFound => "NOT_FOUND",
            Self::OutsideTtl => "OUTSIDE_TTL",
        }
    }
}

impl fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serde helper: `Option<Duration>` as whole seconds. Zero reads back as
/// `None`.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<u64>::deserialize(d)?;
        Ok(secs.filter(|s| *s != 0).map(Duration::from_secs))
    }
}
