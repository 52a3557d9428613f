//! Core type definitions for the engine
//!
//! Includes declared column types, column kinds, column descriptors and the
//! per-table metadata snapshot the compilers work from.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::sql::params::SqlValue;

// ============================================================================
// Declared Types
// ============================================================================

/// Declared type of a column as recorded in the metadata store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeclaredType {
    /// Text (maps to TEXT)
    String,

    /// 64-bit integer (maps to BIGINT)
    Integer,

    /// Fixed-point number (maps to NUMERIC)
    Decimal {
        #[serde(default = "default_precision")]
        precision: u8,
        #[serde(default = "default_scale")]
        scale: u8,
    },

    /// Boolean (maps to BOOLEAN)
    Boolean,

    /// Calendar date without time (maps to DATE)
    Date,

    /// Point in time, always UTC (maps to TIMESTAMPTZ)
    Timestamp,

    /// Arbitrary JSON document (maps to JSONB)
    Json,
}

fn default_precision() -> u8 {
    19
}

fn default_scale() -> u8 {
    4
}

impl DeclaredType {
    pub fn decimal(precision: u8, scale: u8) -> Self {
        DeclaredType::Decimal { precision, scale }
    }

    /// Parse the loosely spelled type names found in metadata rows
    ///
    /// Accepts PostgreSQL and SQL Server spellings (`nvarchar`, `bit`,
    /// `datetime2`, `numeric(10,2)`, ...). Returns `None` for unknown names.
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        let (base, args) = match lowered.split_once('(') {
            Some((base, rest)) => (base.trim(), Some(rest.trim_end_matches(')'))),
            None => (lowered.as_str(), None),
        };

        let parsed = match base {
            "string" | "text" | "varchar" | "nvarchar" | "char" | "nchar" | "character varying"
            | "uuid" | "uniqueidentifier" => DeclaredType::String,
            "integer" | "int" | "bigint" | "smallint" | "tinyint" | "long" | "int4" | "int8" => {
                DeclaredType::Integer
            }
            "decimal" | "numeric" | "money" | "float" | "double" | "real" => {
                let mut precision = default_precision();
                let mut scale = default_scale();
                if let Some(args) = args {
                    let mut parts = args.split(',').map(|p| p.trim().parse::<u8>());
                    if let Some(Ok(p)) = parts.next() {
                        precision = p;
                    }
                    if let Some(Ok(s)) = parts.next() {
                        scale = s;
                    }
                }
                DeclaredType::Decimal { precision, scale }
            }
            "boolean" | "bool" | "bit" => DeclaredType::Boolean,
            "date" => DeclaredType::Date,
            "timestamp" | "timestamptz" | "datetime" | "datetime2" | "datetimeoffset" => {
                DeclaredType::Timestamp
            }
            "json" | "jsonb" => DeclaredType::Json,
            _ => return None,
        };
        Some(parsed)
    }

    /// PostgreSQL type used for placeholder casts and staging tables
    pub fn to_sql_type(&self) -> String {
        match self {
            DeclaredType::String => "TEXT".to_string(),
            DeclaredType::Integer => "BIGINT".to_string(),
            DeclaredType::Decimal { precision, scale } => {
                format!("NUMERIC({},{})", precision, scale)
            }
            DeclaredType::Boolean => "BOOLEAN".to_string(),
            DeclaredType::Date => "DATE".to_string(),
            DeclaredType::Timestamp => "TIMESTAMPTZ".to_string(),
            DeclaredType::Json => "JSONB".to_string(),
        }
    }

    /// Coerce a JSON payload value into a typed bind value
    pub fn coerce(&self, value: &Value) -> Result<SqlValue, String> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        match (self, value) {
            (DeclaredType::String, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
            (DeclaredType::String, Value::Number(n)) => Ok(SqlValue::Text(n.to_string())),
            (DeclaredType::String, Value::Bool(b)) => Ok(SqlValue::Text(b.to_string())),

            (DeclaredType::Integer, Value::Number(n)) => n
                .as_i64()
                .map(SqlValue::Integer)
                .ok_or_else(|| format!("Cannot convert '{}' to integer", n)),
            // CSV-style imports send numbers as strings
            (DeclaredType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(SqlValue::Integer)
                .map_err(|_| format!("Cannot convert '{}' to integer", s)),

            (DeclaredType::Decimal { .. }, Value::Number(n)) => {
                parse_decimal(&n.to_string()).map(SqlValue::Decimal)
            }
            (DeclaredType::Decimal { .. }, Value::String(s)) => {
                parse_decimal(s.trim()).map(SqlValue::Decimal)
            }

            (DeclaredType::Boolean, Value::Bool(b)) => Ok(SqlValue::Boolean(*b)),
            (DeclaredType::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(SqlValue::Boolean(false)),
                Some(1) => Ok(SqlValue::Boolean(true)),
                _ => Err(format!("Cannot convert '{}' to boolean", n)),
            },
            (DeclaredType::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(SqlValue::Boolean(true)),
                "false" | "0" | "no" => Ok(SqlValue::Boolean(false)),
                _ => Err(format!("Cannot convert '{}' to boolean", s)),
            },

            (DeclaredType::Date, Value::String(s)) => parse_date(s).map(SqlValue::Date),
            (DeclaredType::Timestamp, Value::String(s)) => {
                parse_timestamp(s).map(SqlValue::Timestamp)
            }

            (DeclaredType::Json, other) => Ok(SqlValue::Json(other.clone())),

            _ => Err(format!("Type mismatch: expected {:?}, got {}", self, value)),
        }
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| format!("Cannot convert '{}' to decimal", raw))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| parse_timestamp(raw).map(|ts| ts.date_naive()))
        .map_err(|_| format!("Invalid date format: '{}'", raw))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("Invalid timestamp format: '{}'", raw))
}

// ============================================================================
// Column Kinds and Descriptors
// ============================================================================

/// How a column's value is projected by the nested-structure compiler
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ColumnKind {
    /// Passed through unchanged
    #[default]
    Plain,
    /// Locale-keyed JSON object, projected through locale extraction
    Localized,
    /// Id of a row in exactly one target table
    SingleReference,
    /// Id of a row in one of several target tables, chosen by the discriminator
    PolymorphicListReference,
}

impl ColumnKind {
    /// Parse the kind names stored in metadata rows
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "" | "plain" | "scalar" => Some(ColumnKind::Plain),
            "localized" | "localised" | "translation" | "translatable" => {
                Some(ColumnKind::Localized)
            }
            "singlereference" | "reference" | "lookup" | "foreign" => {
                Some(ColumnKind::SingleReference)
            }
            "polymorphiclistreference" | "polymorphic" | "listreference" => {
                Some(ColumnKind::PolymorphicListReference)
            }
            _ => None,
        }
    }

    pub fn is_reference(self) -> bool {
        matches!(
            self,
            ColumnKind::SingleReference | ColumnKind::PolymorphicListReference
        )
    }
}

/// Column metadata for one column of a logical table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,

    #[serde(flatten)]
    pub declared_type: DeclaredType,

    #[serde(default)]
    pub kind: ColumnKind,

    /// Target table (single reference) or lookup list name (polymorphic)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,

    #[serde(default)]
    pub is_required: bool,

    #[serde(default)]
    pub is_unique: bool,

    #[serde(default)]
    pub sort_index: i32,

    /// Default value (SQL expression, as recorded in metadata)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            kind: ColumnKind::Plain,
            data_source: None,
            is_required: false,
            is_unique: false,
            sort_index: 0,
            default_value: None,
        }
    }

    /// Mark the column as a locale-keyed text column
    pub fn localized(mut self) -> Self {
        self.kind = ColumnKind::Localized;
        self.declared_type = DeclaredType::Json;
        self
    }

    /// Mark the column as a single reference into `table`
    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.kind = ColumnKind::SingleReference;
        self.data_source = Some(table.into());
        self
    }

    /// Mark the column as a polymorphic reference resolved through `list`
    pub fn polymorphic(mut self, list: impl Into<String>) -> Self {
        self.kind = ColumnKind::PolymorphicListReference;
        self.data_source = Some(list.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn sort_index(mut self, index: i32) -> Self {
        self.sort_index = index;
        self
    }

    /// SQL type used when casting parameters bound to this column
    pub fn sql_type(&self) -> String {
        match self.kind {
            ColumnKind::Localized => DeclaredType::Json.to_sql_type(),
            _ => self.declared_type.to_sql_type(),
        }
    }

    /// Coerce a payload value for this column
    ///
    /// Localized columns accept either a locale map or plain text, which is
    /// stored under `default_locale`.
    pub fn coerce(&self, value: &Value, default_locale: &str) -> Result<SqlValue, String> {
        match (self.kind, value) {
            (ColumnKind::Localized, Value::Null) => Ok(SqlValue::Null),
            (ColumnKind::Localized, Value::Object(_)) => Ok(SqlValue::Json(value.clone())),
            (ColumnKind::Localized, Value::String(text)) => {
                let mut map = serde_json::Map::new();
                map.insert(default_locale.to_string(), Value::String(text.clone()));
                Ok(SqlValue::Json(Value::Object(map)))
            }
            (ColumnKind::Localized, other) => Err(format!(
                "Localized column expects a locale map or text, got {}",
                other
            )),
            _ => self.declared_type.coerce(value),
        }
    }
}

// ============================================================================
// Table Metadata
// ============================================================================

/// Immutable snapshot of one logical table's live column metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Resolved type information for any addressable field of a table
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub declared_type: DeclaredType,
    pub kind: ColumnKind,
}

impl TableMetadata {
    pub fn new(table: impl Into<String>, mut columns: Vec<ColumnDescriptor>) -> Self {
        columns.sort_by_key(|c| c.sort_index);
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn has_polymorphic(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.kind == ColumnKind::PolymorphicListReference)
    }

    /// Resolve a field name, including the engine-maintained system columns
    pub fn field(&self, config: &EngineConfig, name: &str) -> Option<FieldInfo> {
        if let Some(col) = self.column(name) {
            return Some(FieldInfo {
                name: col.name.clone(),
                declared_type: col.declared_type.clone(),
                kind: col.kind,
            });
        }

        let audit = &config.audit_columns;
        let declared_type = if name == config.id_column {
            DeclaredType::Integer
        } else if name == audit.created_by || name == audit.modified_by {
            DeclaredType::String
        } else if name == config.deleted_column {
            DeclaredType::Boolean
        } else if audit.modified_at.as_deref() == Some(name) {
            DeclaredType::Timestamp
        } else if name == config.discriminator_column && self.has_polymorphic() {
            DeclaredType::String
        } else {
            return None;
        };

        Some(FieldInfo {
            name: name.to_string(),
            declared_type,
            kind: ColumnKind::Plain,
        })
    }

    /// Columns callers may write, in metadata order
    pub fn writable_columns<'a>(
        &'a self,
        config: &'a EngineConfig,
    ) -> impl Iterator<Item = &'a ColumnDescriptor> + 'a {
        self.columns.iter().filter(|c| !config.is_reserved(&c.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =========================================================================
    // DeclaredType Parsing
    // =========================================================================

    #[test]
    fn test_parse_declared_type_spellings() {
        assert_eq!(DeclaredType::parse("nvarchar(50)"), Some(DeclaredType::String));
        assert_eq!(DeclaredType::parse("TEXT"), Some(DeclaredType::String));
        assert_eq!(DeclaredType::parse("bigint"), Some(DeclaredType::Integer));
        assert_eq!(DeclaredType::parse("bit"), Some(DeclaredType::Boolean));
        assert_eq!(DeclaredType::parse("date"), Some(DeclaredType::Date));
        assert_eq!(DeclaredType::parse("datetime2"), Some(DeclaredType::Timestamp));
        assert_eq!(DeclaredType::parse("jsonb"), Some(DeclaredType::Json));
        assert_eq!(DeclaredType::parse("geometry"), None);
    }

    #[test]
    fn test_parse_decimal_precision() {
        assert_eq!(
            DeclaredType::parse("numeric(10, 2)"),
            Some(DeclaredType::decimal(10, 2))
        );
        assert_eq!(
            DeclaredType::parse("decimal"),
            Some(DeclaredType::decimal(19, 4))
        );
    }

    #[test]
    fn test_sql_types() {
        assert_eq!(DeclaredType::String.to_sql_type(), "TEXT");
        assert_eq!(DeclaredType::Integer.to_sql_type(), "BIGINT");
        assert_eq!(DeclaredType::decimal(10, 2).to_sql_type(), "NUMERIC(10,2)");
        assert_eq!(DeclaredType::Date.to_sql_type(), "DATE");
        assert_eq!(DeclaredType::Timestamp.to_sql_type(), "TIMESTAMPTZ");
        assert_eq!(DeclaredType::Json.to_sql_type(), "JSONB");
    }

    // =========================================================================
    // Value Coercion
    // =========================================================================

    #[test]
    fn test_coerce_integer_from_string() {
        assert_eq!(
            DeclaredType::Integer.coerce(&json!("42")).unwrap(),
            SqlValue::Integer(42)
        );
        assert!(DeclaredType::Integer.coerce(&json!("4x2")).is_err());
        assert!(DeclaredType::Integer.coerce(&json!(1.5)).is_err());
    }

    #[test]
    fn test_coerce_decimal() {
        let value = DeclaredType::decimal(10, 2).coerce(&json!(19.99)).unwrap();
        assert_eq!(value, SqlValue::Decimal(Decimal::from_str("19.99").unwrap()));

        let value = DeclaredType::decimal(10, 2).coerce(&json!("7.5")).unwrap();
        assert_eq!(value, SqlValue::Decimal(Decimal::from_str("7.5").unwrap()));
    }

    #[test]
    fn test_coerce_boolean_variants() {
        assert_eq!(
            DeclaredType::Boolean.coerce(&json!("yes")).unwrap(),
            SqlValue::Boolean(true)
        );
        assert_eq!(
            DeclaredType::Boolean.coerce(&json!(0)).unwrap(),
            SqlValue::Boolean(false)
        );
        assert!(DeclaredType::Boolean.coerce(&json!("maybe")).is_err());
    }

    #[test]
    fn test_coerce_date_and_timestamp() {
        let date = DeclaredType::Date.coerce(&json!("2025-10-15")).unwrap();
        assert_eq!(
            date,
            SqlValue::Date(NaiveDate::from_ymd_opt(2025, 10, 15).unwrap())
        );

        let ts = DeclaredType::Timestamp
            .coerce(&json!("2025-10-15T08:30:00Z"))
            .unwrap();
        assert!(matches!(ts, SqlValue::Timestamp(_)));

        // Date-only strings are accepted as midnight UTC
        let ts = DeclaredType::Timestamp.coerce(&json!("2025-10-15")).unwrap();
        assert!(matches!(ts, SqlValue::Timestamp(_)));

        assert!(DeclaredType::Date.coerce(&json!("15/10/2025")).is_err());
    }

    #[test]
    fn test_coerce_null_for_every_type() {
        for declared in [
            DeclaredType::String,
            DeclaredType::Integer,
            DeclaredType::Boolean,
            DeclaredType::Json,
        ] {
            assert_eq!(declared.coerce(&Value::Null).unwrap(), SqlValue::Null);
        }
    }

    #[test]
    fn test_coerce_type_mismatch() {
        let err = DeclaredType::String.coerce(&json!({"a": 1})).unwrap_err();
        assert!(err.contains("Type mismatch"));
    }

    #[test]
    fn test_localized_coercion_wraps_text() {
        let col = ColumnDescriptor::new("title", DeclaredType::String).localized();
        assert_eq!(col.sql_type(), "JSONB");

        let value = col.coerce(&json!("Hello"), "en").unwrap();
        assert_eq!(value, SqlValue::Json(json!({"en": "Hello"})));

        let value = col.coerce(&json!({"de": "Hallo"}), "en").unwrap();
        assert_eq!(value, SqlValue::Json(json!({"de": "Hallo"})));

        assert!(col.coerce(&json!(5), "en").is_err());
    }

    // =========================================================================
    // ColumnKind / Metadata
    // =========================================================================

    #[test]
    fn test_parse_column_kind() {
        assert_eq!(ColumnKind::parse("plain"), Some(ColumnKind::Plain));
        assert_eq!(ColumnKind::parse("Localized"), Some(ColumnKind::Localized));
        assert_eq!(
            ColumnKind::parse("single_reference"),
            Some(ColumnKind::SingleReference)
        );
        assert_eq!(
            ColumnKind::parse("polymorphicListReference"),
            Some(ColumnKind::PolymorphicListReference)
        );
        assert_eq!(ColumnKind::parse("mystery"), None);
    }

    #[test]
    fn test_table_metadata_orders_by_sort_index() {
        let meta = TableMetadata::new(
            "order",
            vec![
                ColumnDescriptor::new("amount", DeclaredType::decimal(10, 2)).sort_index(3),
                ColumnDescriptor::new("customerId", DeclaredType::Integer).sort_index(1),
            ],
        );
        assert_eq!(meta.columns[0].name, "customerId");
        assert_eq!(meta.columns[1].name, "amount");
    }

    #[test]
    fn test_field_resolves_system_columns() {
        let config = EngineConfig::default();
        let meta = TableMetadata::new(
            "order",
            vec![ColumnDescriptor::new("amount", DeclaredType::decimal(10, 2))],
        );

        assert_eq!(
            meta.field(&config, "id").unwrap().declared_type,
            DeclaredType::Integer
        );
        assert_eq!(
            meta.field(&config, "deleted").unwrap().declared_type,
            DeclaredType::Boolean
        );
        assert!(meta.field(&config, "amount").is_some());
        assert!(meta.field(&config, "missing").is_none());
        // Discriminator is only addressable on polymorphic tables
        assert!(meta.field(&config, "sourceType").is_none());
    }

    #[test]
    fn test_writable_columns_skip_reserved() {
        let config = EngineConfig::default();
        let meta = TableMetadata::new(
            "order",
            vec![
                ColumnDescriptor::new("id", DeclaredType::Integer),
                ColumnDescriptor::new("amount", DeclaredType::decimal(10, 2)),
                ColumnDescriptor::new("created_by", DeclaredType::String),
            ],
        );
        let names: Vec<&str> = meta
            .writable_columns(&config)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["amount"]);
    }

    #[test]
    fn test_descriptor_serialization() {
        let col = ColumnDescriptor::new("customerId", DeclaredType::Integer)
            .references("customer")
            .required();
        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(json["kind"], "singleReference");
        assert_eq!(json["dataSource"], "customer");
        assert_eq!(json["isRequired"], true);
        assert_eq!(json["type"], "integer");
    }
}
