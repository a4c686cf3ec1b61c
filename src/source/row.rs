//! # Source Rows
//!
//! An owned result row fetched from a source, plus the typed accessors dataset
//! mappers use to build records. Accessors are lenient about numeric
//! representation (an `INT8` can be read as `NUMERIC` and vice versa when lossless)
//! and strict about presence and NULLs.

use crate::database::SqlValue;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use thiserror::Error;

/// Row-level mapping failure; the offending row is skipped, the fetch continues
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("column '{column}' is NULL")]
    UnexpectedNull { column: String },
    #[error("column '{column}' expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid value in column '{column}': {message}")]
    InvalidValue { column: String, message: String },
}

impl MappingError {
    pub fn invalid(column: &str, message: impl Into<String>) -> Self {
        MappingError::InvalidValue {
            column: column.to_string(),
            message: message.into(),
        }
    }
}

/// One result row in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    columns: Vec<(String, SqlValue)>,
}

impl SourceRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column set; replaces an existing column of the same name
    pub fn with(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        match self.columns.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.push(name, value),
        }
        self
    }

    pub fn push(&mut self, name: &str, value: SqlValue) {
        self.columns.push((name.to_string(), value));
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    fn value(&self, column: &str) -> Result<&SqlValue, MappingError> {
        match self.get(column) {
            Some(SqlValue::Unsupported(reason)) => Err(MappingError::invalid(column, reason.clone())),
            Some(value) => Ok(value),
            None => Err(MappingError::MissingColumn(column.to_string())),
        }
    }

    fn required<T>(column: &str, value: Option<T>) -> Result<T, MappingError> {
        value.ok_or_else(|| MappingError::UnexpectedNull {
            column: column.to_string(),
        })
    }

    fn mismatch(column: &str, expected: &'static str, found: &SqlValue) -> MappingError {
        MappingError::TypeMismatch {
            column: column.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    pub fn opt_i64(&self, column: &str) -> Result<Option<i64>, MappingError> {
        match self.value(column)? {
            SqlValue::Int(v) => Ok(*v),
            SqlValue::Numeric(None) => Ok(None),
            SqlValue::Numeric(Some(n)) if n.is_integer() => n
                .to_i64()
                .map(Some)
                .ok_or_else(|| MappingError::invalid(column, format!("{n} overflows i64"))),
            other => Err(Self::mismatch(column, "bigint", other)),
        }
    }

    pub fn i64(&self, column: &str) -> Result<i64, MappingError> {
        Self::required(column, self.opt_i64(column)?)
    }

    pub fn opt_f64(&self, column: &str) -> Result<Option<f64>, MappingError> {
        match self.value(column)? {
            SqlValue::Float(v) => Ok(*v),
            SqlValue::Int(v) => Ok(v.map(|i| i as f64)),
            SqlValue::Numeric(v) => Ok(v.as_ref().and_then(ToPrimitive::to_f64)),
            other => Err(Self::mismatch(column, "double precision", other)),
        }
    }

    pub fn opt_numeric(&self, column: &str) -> Result<Option<BigDecimal>, MappingError> {
        match self.value(column)? {
            SqlValue::Numeric(v) => Ok(v.clone()),
            SqlValue::Int(v) => Ok(v.map(BigDecimal::from)),
            SqlValue::Text(None) => Ok(None),
            SqlValue::Text(Some(s)) => BigDecimal::from_str(s)
                .map(Some)
                .map_err(|e| MappingError::invalid(column, e.to_string())),
            other => Err(Self::mismatch(column, "numeric", other)),
        }
    }

    pub fn numeric(&self, column: &str) -> Result<BigDecimal, MappingError> {
        Self::required(column, self.opt_numeric(column)?)
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, MappingError> {
        match self.value(column)? {
            SqlValue::Text(v) => Ok(v.clone()),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    pub fn text(&self, column: &str) -> Result<String, MappingError> {
        Self::required(column, self.opt_text(column)?)
    }

    pub fn opt_bool(&self, column: &str) -> Result<Option<bool>, MappingError> {
        match self.value(column)? {
            SqlValue::Bool(v) => Ok(*v),
            other => Err(Self::mismatch(column, "bool", other)),
        }
    }

    pub fn bool(&self, column: &str) -> Result<bool, MappingError> {
        Self::required(column, self.opt_bool(column)?)
    }

    /// JSON column; a text column holding JSON is parsed
    pub fn opt_json(&self, column: &str) -> Result<Option<JsonValue>, MappingError> {
        match self.value(column)? {
            SqlValue::Json(v) => Ok(v.clone()),
            SqlValue::Text(None) => Ok(None),
            SqlValue::Text(Some(s)) => serde_json::from_str(s)
                .map(Some)
                .map_err(|e| MappingError::invalid(column, e.to_string())),
            other => Err(Self::mismatch(column, "jsonb", other)),
        }
    }

    pub fn opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>, MappingError> {
        match self.value(column)? {
            SqlValue::Timestamp(v) => Ok(*v),
            // Unix seconds, as several source functions expose block_time
            SqlValue::Int(None) => Ok(None),
            SqlValue::Int(Some(secs)) => DateTime::from_timestamp(*secs, 0)
                .map(Some)
                .ok_or_else(|| MappingError::invalid(column, format!("{secs} is out of range"))),
            other => Err(Self::mismatch(column, "timestamptz", other)),
        }
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>, MappingError> {
        Self::required(column, self.opt_timestamp(column)?)
    }
}
