//! # SQL Values
//!
//! Owned, typed column values exchanged with sources and the destination store.
//!
//! Every variant carries an `Option` so a NULL keeps its column type; PostgreSQL
//! will not assign an untyped text NULL to a `NUMERIC` column inside a multi-row
//! `VALUES` list.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Numeric(Option<BigDecimal>),
    Text(Option<String>),
    Json(Option<JsonValue>),
    Timestamp(Option<DateTime<Utc>>),
    /// A source column the decoder could not represent; carries the reason
    Unsupported(String),
}

impl SqlValue {
    /// SQL type name, used in mapping error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "bigint",
            SqlValue::Float(_) => "double precision",
            SqlValue::Numeric(_) => "numeric",
            SqlValue::Text(_) => "text",
            SqlValue::Json(_) => "jsonb",
            SqlValue::Timestamp(_) => "timestamptz",
            SqlValue::Unsupported(_) => "unsupported",
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Bool(v) => v.is_none(),
            SqlValue::Int(v) => v.is_none(),
            SqlValue::Float(v) => v.is_none(),
            SqlValue::Numeric(v) => v.is_none(),
            SqlValue::Text(v) => v.is_none(),
            SqlValue::Json(v) => v.is_none(),
            SqlValue::Timestamp(v) => v.is_none(),
            SqlValue::Unsupported(_) => false,
        }
    }

    /// Canonical text form used when a value takes part in a composite key.
    ///
    /// NULL renders as `∅` so it cannot collide with an empty string.
    pub fn key_fragment(&self) -> String {
        match self {
            SqlValue::Bool(Some(v)) => v.to_string(),
            SqlValue::Int(Some(v)) => v.to_string(),
            SqlValue::Float(Some(v)) => v.to_string(),
            SqlValue::Numeric(Some(v)) => v.normalized().to_string(),
            SqlValue::Text(Some(v)) => v.clone(),
            SqlValue::Json(Some(v)) => v.to_string(),
            SqlValue::Timestamp(Some(v)) => v.to_rfc3339(),
            SqlValue::Unsupported(reason) => format!("unsupported:{reason}"),
            _ => "∅".to_string(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "NULL");
        }
        write!(f, "{}", self.key_fragment())
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(Some(value))
    }
}

impl From<Option<bool>> for SqlValue {
    fn from(value: Option<bool>) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(Some(value))
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(value: Option<i64>) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(Some(value))
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(value: Option<f64>) -> Self {
        SqlValue::Float(value)
    }
}

impl From<BigDecimal> for SqlValue {
    fn from(value: BigDecimal) -> Self {
        SqlValue::Numeric(Some(value))
    }
}

impl From<Option<BigDecimal>> for SqlValue {
    fn from(value: Option<BigDecimal>) -> Self {
        SqlValue::Numeric(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(Some(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(Some(value.to_string()))
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        SqlValue::Text(value)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        SqlValue::Json(Some(value))
    }
}

impl From<Option<JsonValue>> for SqlValue {
    fn from(value: Option<JsonValue>) -> Self {
        SqlValue::Json(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(Some(value))
    }
}

impl From<Option<DateTime<Utc>>> for SqlValue {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        SqlValue::Timestamp(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_key_fragment_distinguishes_null_from_empty() {
        assert_eq!(SqlValue::Text(None).key_fragment(), "∅");
        assert_eq!(SqlValue::from("").key_fragment(), "");
        assert!(SqlValue::Numeric(None).is_null());
    }

    #[test]
    fn test_numeric_fragment_is_normalized() {
        let a = SqlValue::from(BigDecimal::from_str("100.00").unwrap());
        let b = SqlValue::from(BigDecimal::from_str("100").unwrap());
        assert_eq!(a.key_fragment(), b.key_fragment());
    }

    #[test]
    fn test_display_renders_null() {
        assert_eq!(SqlValue::Int(None).to_string(), "NULL");
        assert_eq!(SqlValue::from(42_i64).to_string(), "42");
    }
}
