#![forbid(unsafe_code)]

//! Dynamic data values held in component stores.
//!
//! [`DataValue`] is the closed set of shapes a component's data may take.
//! Absence is never a variant: reads return `Option<DataValue>` and `None`
//! means "no value at that location".
//!
//! Equality is structural. Stores use it to decide whether a write is a
//! change worth logging.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::path::Key;

/// Keyed mapping inside a [`DataValue`].
pub type DataMap = BTreeMap<String, DataValue>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Seq(Vec<DataValue>),
    Map(DataMap),
}

impl DataValue {
    /// An empty mapping.
    #[must_use]
    pub fn map() -> Self {
        Self::Map(DataMap::new())
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_seq(&self) -> Option<&[DataValue]> {
        match self {
            Self::Seq(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&DataMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Child at `key`, if this value is a container holding one.
    #[must_use]
    pub fn child(&self, key: &Key) -> Option<&DataValue> {
        match (self, key) {
            (Self::Map(map), Key::Name(name)) => map.get(name),
            (Self::Seq(items), Key::Index(idx)) => items.get(*idx),
            _ => None,
        }
    }

    /// Number of items for sequences, `None` otherwise.
    #[must_use]
    pub fn seq_len(&self) -> Option<usize> {
        match self {
            Self::Seq(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Boolean interpretation used by guards and logical operators.
    ///
    /// `Null`, `false`, `0`, `NaN` and `""` are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Seq(_) | Self::Map(_) => true,
        }
    }

    /// Numeric coercion. Strings are parsed after trimming; the empty string is 0.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Self::Seq(_) | Self::Map(_) => f64::NAN,
        }
    }

    /// Text form written into rendered output.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Seq(items) => items
                .iter()
                .map(DataValue::to_text)
                .collect::<Vec<_>>()
                .join(","),
            Self::Map(_) => "[object]".to_owned(),
        }
    }
}

/// Text form of an optional value; absence renders as the empty string.
#[must_use]
pub fn text_of(value: Option<&DataValue>) -> String {
    value.map(DataValue::to_text).unwrap_or_default()
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for DataValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<DataValue>> for DataValue {
    fn from(items: Vec<DataValue>) -> Self {
        Self::Seq(items)
    }
}

impl From<DataMap> for DataValue {
    fn from(map: DataMap) -> Self {
        Self::Map(map)
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Seq(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<DataValue> for serde_json::Value {
    fn from(value: DataValue) -> Self {
        use serde_json::Value;
        match value {
            DataValue::Null => Value::Null,
            DataValue::Bool(b) => Value::Bool(b),
            DataValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DataValue::String(s) => Value::String(s),
            DataValue::Seq(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            DataValue::Map(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_matches_guard_rules() {
        assert!(!DataValue::Null.is_truthy());
        assert!(!DataValue::from(0).is_truthy());
        assert!(!DataValue::from(f64::NAN).is_truthy());
        assert!(!DataValue::from("").is_truthy());
        assert!(DataValue::from(1).is_truthy());
        assert!(DataValue::from("0").is_truthy());
        assert!(DataValue::Seq(vec![]).is_truthy());
    }

    #[test]
    fn integers_render_without_fraction() {
        assert_eq!(DataValue::from(3).to_text(), "3");
        assert_eq!(DataValue::from(-2.5).to_text(), "-2.5");
        assert_eq!(DataValue::Null.to_text(), "");
        assert_eq!(
            DataValue::from(vec![DataValue::from("a"), DataValue::from(2)]).to_text(),
            "a,2"
        );
    }

    #[test]
    fn json_conversion_preserves_shape() {
        let value = DataValue::from(json!({"user": {"name": "erik", "tags": [1, 2]}}));
        let user = value.child(&Key::Name("user".into())).expect("user");
        assert_eq!(
            user.child(&Key::Name("name".into())),
            Some(&DataValue::from("erik"))
        );
        let back = serde_json::Value::from(value);
        assert_eq!(back, json!({"user": {"name": "erik", "tags": [1.0, 2.0]}}));
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(DataValue::from(" 12 ").to_number(), 12.0);
        assert_eq!(DataValue::from("").to_number(), 0.0);
        assert!(DataValue::from("x").to_number().is_nan());
        assert_eq!(DataValue::from(true).to_number(), 1.0);
    }

    #[test]
    fn serde_untagged_round_trip() {
        let text = r#"{"a":[true,null,"x",1.5]}"#;
        let value: DataValue = serde_json::from_str(text).expect("parse");
        assert_eq!(serde_json::to_string(&value).expect("write"), text);
    }
}
