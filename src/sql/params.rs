//! Bound parameter bookkeeping
//!
//! Every value that reaches a generated statement goes through [`Params`].
//! Placeholders are numbered from a single counter per statement, so two
//! fragments compiled against the same `Params` can never collide.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::Arguments;
use sqlx::postgres::PgArguments;

use crate::error::{EngineError, Result};

/// A typed value bound to a statement placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    fn add_to(&self, args: &mut PgArguments) -> std::result::Result<(), sqlx::error::BoxDynError> {
        match self {
            // Placeholders always carry an explicit cast, so an untyped text NULL is enough
            SqlValue::Null => args.add(None::<String>),
            SqlValue::Text(s) => args.add(s.clone()),
            SqlValue::Integer(i) => args.add(*i),
            SqlValue::Decimal(d) => args.add(*d),
            SqlValue::Boolean(b) => args.add(*b),
            SqlValue::Date(d) => args.add(*d),
            SqlValue::Timestamp(ts) => args.add(*ts),
            SqlValue::Json(v) => args.add(v.clone()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Boolean(value)
    }
}

/// Ordered parameter list of one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<SqlValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value and return its placeholder, cast to `sql_type`
    pub fn push(&mut self, value: SqlValue, sql_type: &str) -> String {
        self.values.push(value);
        format!("${}::{}", self.values.len(), sql_type)
    }

    pub fn push_text(&mut self, value: impl Into<String>) -> String {
        self.push(SqlValue::Text(value.into()), "TEXT")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Encode all values for the driver
    pub fn to_arguments(&self, table: &str) -> Result<PgArguments> {
        let mut args = PgArguments::default();
        for (idx, value) in self.values.iter().enumerate() {
            value.add_to(&mut args).map_err(|e| EngineError::Encode {
                table: table.to_string(),
                reason: format!("parameter ${}: {}", idx + 1, e),
            })?;
        }
        Ok(args)
    }
}

/// SQL text plus the parameters it references
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_sequential() {
        let mut params = Params::new();
        assert_eq!(params.push(SqlValue::Integer(1), "BIGINT"), "$1::BIGINT");
        assert_eq!(params.push_text("open"), "$2::TEXT");
        assert_eq!(params.push(SqlValue::Null, "DATE"), "$3::DATE");
        assert_eq!(params.len(), 3);
        assert_eq!(params.values()[1], SqlValue::Text("open".to_string()));
    }

    #[test]
    fn test_to_arguments_encodes_every_value() {
        let mut params = Params::new();
        params.push(SqlValue::Boolean(true), "BOOLEAN");
        params.push(SqlValue::Json(serde_json::json!({"en": "x"})), "JSONB");
        params.push(SqlValue::Null, "TEXT");
        assert!(params.to_arguments("order").is_ok());
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(SqlValue::from("a"), SqlValue::Text("a".to_string()));
        assert_eq!(SqlValue::from(7_i64), SqlValue::Integer(7));
        assert!(SqlValue::Null.is_null());
    }
}
