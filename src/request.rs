//! Request and outcome types
//!
//! Includes SearchRequest, the mutation request shapes, RowTable and the
//! outcomes reported by the mutation engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::sql::condition::{ConditionGroup, ConditionTerm, OrderTerm};

/// One row of a mutation payload: column name to value
pub type RowPayload = serde_json::Map<String, Value>;

fn default_localize() -> bool {
    true
}

// ============================================================================
// Search
// ============================================================================

/// Declarative search over one logical table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub table: String,
    #[serde(default)]
    pub and: ConditionGroup,
    #[serde(default)]
    pub or: ConditionGroup,
    #[serde(default)]
    pub order: Vec<OrderTerm>,
    /// Allow-list of root columns (`id` and `objectType` are always returned)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_columns: Option<Vec<String>>,
    /// Allow-lists for embedded references, keyed by referenced table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_foreign_columns: Option<HashMap<String, Vec<String>>>,
    /// Project localized columns as text in `locale` instead of the raw map
    #[serde(default = "default_localize")]
    pub localize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl SearchRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            and: ConditionGroup::new(),
            or: ConditionGroup::new(),
            order: Vec::new(),
            select_columns: None,
            select_foreign_columns: None,
            localize: true,
            locale: None,
            limit: None,
            offset: None,
        }
    }

    /// Add a term to the AND group
    pub fn and(mut self, term: ConditionTerm) -> Self {
        self.and.0.push(term);
        self
    }

    /// Add a term to the OR group
    pub fn or(mut self, term: ConditionTerm) -> Self {
        self.or.0.push(term);
        self
    }

    pub fn order_by(mut self, term: OrderTerm) -> Self {
        self.order.push(term);
        self
    }

    pub fn select_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn select_foreign_columns<I, S>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_foreign_columns
            .get_or_insert_with(HashMap::new)
            .insert(table.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn localize(mut self, localize: bool) -> Self {
        self.localize = localize;
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Set pagination
    pub fn paginate(mut self, offset: i64, limit: i64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    /// Locale used for extraction, falling back to the configured default
    pub fn effective_locale<'a>(&'a self, config: &'a EngineConfig) -> &'a str {
        self.locale
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(config.default_locale.as_str())
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// Rows to insert into one table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub table: String,
    pub rows: Vec<RowPayload>,
}

impl CreateRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows: Vec::new(),
        }
    }

    /// Append a row; non-object values are ignored
    pub fn row(mut self, row: Value) -> Self {
        if let Value::Object(map) = row {
            self.rows.push(map);
        }
        self
    }
}

/// Single-row operation keyed by `primary_keys`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyedRequest {
    pub table: String,
    pub primary_keys: Vec<String>,
    pub values: RowPayload,
}

impl KeyedRequest {
    /// Build from a JSON object; anything else yields an empty payload
    pub fn new<I, S>(table: impl Into<String>, primary_keys: I, values: Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            primary_keys: primary_keys.into_iter().map(Into::into).collect(),
            values: match values {
                Value::Object(map) => map,
                _ => RowPayload::new(),
            },
        }
    }
}

/// Multi-row update or delete sharing one key set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub table: String,
    pub primary_keys: Vec<String>,
    pub rows: Vec<RowPayload>,
}

impl BatchRequest {
    pub fn new<I, S>(table: impl Into<String>, primary_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            primary_keys: primary_keys.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, row: Value) -> Self {
        if let Value::Object(map) = row {
            self.rows.push(map);
        }
        self
    }
}

/// Tabular row set used for bulk reconciliation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowTable {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; short rows are padded with nulls, long rows truncated
    pub fn push(&mut self, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Null);
        self.rows.push(values);
    }

    pub fn with_row(mut self, values: Vec<Value>) -> Self {
        self.push(values);
        self
    }

    /// Build from keyed rows; columns are the union in first-seen order
    pub fn from_rows(rows: &[RowPayload]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut table = Self {
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            let values = table
                .columns
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                .collect();
            table.rows.push(values);
        }
        table
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Staged row set reconciled against a table by key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub table: String,
    pub rows: RowTable,
    pub primary_keys: Vec<String>,
}

impl BulkRequest {
    pub fn new<I, S>(table: impl Into<String>, rows: RowTable, primary_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            rows,
            primary_keys: primary_keys.into_iter().map(Into::into).collect(),
        }
    }
}

/// Copy of key-matched rows under new key values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneRequest {
    pub table: String,
    pub old_keys: RowPayload,
    pub new_keys: RowPayload,
}

impl CloneRequest {
    pub fn new(table: impl Into<String>, old_keys: Value, new_keys: Value) -> Self {
        let to_map = |v: Value| match v {
            Value::Object(map) => map,
            _ => RowPayload::new(),
        };
        Self {
            table: table.into(),
            old_keys: to_map(old_keys),
            new_keys: to_map(new_keys),
        }
    }
}

/// How rows are removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Flip the deleted flag
    Soft,
    /// Remove the rows
    Hard,
}

impl DeleteMode {
    pub fn for_config(config: &EngineConfig) -> Self {
        if config.soft_delete {
            DeleteMode::Soft
        } else {
            DeleteMode::Hard
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Which branch of an upsert fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
    NoRowsAffected,
}

impl UpsertOutcome {
    pub fn id(&self) -> Option<i64> {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => Some(*id),
            UpsertOutcome::NoRowsAffected => None,
        }
    }
}

/// Rows touched by a keyed update or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Affected(u64),
    /// The key matched no live row
    NoRowsAffected,
}

impl WriteOutcome {
    pub fn from_count(affected: u64) -> Self {
        if affected == 0 {
            WriteOutcome::NoRowsAffected
        } else {
            WriteOutcome::Affected(affected)
        }
    }

    pub fn rows(&self) -> u64 {
        match self {
            WriteOutcome::Affected(rows) => *rows,
            WriteOutcome::NoRowsAffected => 0,
        }
    }

    pub fn is_no_rows_affected(&self) -> bool {
        matches!(self, WriteOutcome::NoRowsAffected)
    }
}

/// Row counts of one bulk reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub staged: u64,
    pub updated: u64,
    pub inserted: u64,
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_request_builder() {
        let request = SearchRequest::new("order")
            .and(ConditionTerm::eq("status", "open"))
            .or(ConditionTerm::empty("status"))
            .order_by(OrderTerm::asc("shippedDate"))
            .select_columns(["amount"])
            .select_foreign_columns("customer", ["name"])
            .locale("de")
            .paginate(10, 50);

        assert_eq!(request.and.terms().len(), 1);
        assert_eq!(request.or.terms().len(), 1);
        assert_eq!(request.select_columns, Some(vec!["amount".to_string()]));
        assert_eq!(
            request.select_foreign_columns.unwrap()["customer"],
            vec!["name".to_string()]
        );
        assert_eq!(request.offset, Some(10));
        assert_eq!(request.limit, Some(50));
        assert!(request.localize);
    }

    #[test]
    fn test_search_request_deserialization() {
        let request: SearchRequest = serde_json::from_value(json!({
            "table": "order",
            "and": [{"field": "status", "operator": "eq", "value": "open"}],
            "order": [{"field": "amount", "direction": "asc"}],
            "selectColumns": ["amount"],
            "selectForeignColumns": {"customer": ["name"]}
        }))
        .unwrap();

        assert_eq!(request.table, "order");
        assert_eq!(request.and.terms()[0].field, "status");
        assert!(request.or.is_empty());
        assert!(request.localize);
        assert!(request.locale.is_none());
    }

    #[test]
    fn test_search_request_keeps_null_comparison() {
        let request: SearchRequest = serde_json::from_value(json!({
            "table": "order",
            "and": [{"field": "status", "operator": "equals", "value": null}]
        }))
        .unwrap();
        assert_eq!(request.and.terms()[0].value, Some(Value::Null));
    }

    #[test]
    fn test_effective_locale() {
        let config = EngineConfig::default();
        assert_eq!(SearchRequest::new("t").effective_locale(&config), "en");
        assert_eq!(
            SearchRequest::new("t").locale("de").effective_locale(&config),
            "de"
        );
        assert_eq!(
            SearchRequest::new("t").locale(" ").effective_locale(&config),
            "en"
        );
    }

    #[test]
    fn test_row_table_from_rows() {
        let rows: Vec<RowPayload> = vec![
            json!({"code": "A", "amount": 1}).as_object().unwrap().clone(),
            json!({"code": "B", "note": "x"}).as_object().unwrap().clone(),
        ];
        let table = RowTable::from_rows(&rows);

        // Object keys iterate in sorted order
        assert_eq!(table.columns, vec!["amount", "code", "note"]);
        assert_eq!(table.rows[0], vec![json!(1), json!("A"), Value::Null]);
        assert_eq!(table.rows[1], vec![Value::Null, json!("B"), json!("x")]);
        assert_eq!(table.column_index("note"), Some(2));
    }

    #[test]
    fn test_row_table_pads_short_rows() {
        let table = RowTable::new(["code", "amount"])
            .with_row(vec![json!("A")])
            .with_row(vec![json!("B"), json!(2), json!("extra")]);

        assert_eq!(table.rows[0], vec![json!("A"), Value::Null]);
        assert_eq!(table.rows[1], vec![json!("B"), json!(2)]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_keyed_request_from_json() {
        let request = KeyedRequest::new("order", ["code"], json!({"code": "A", "amount": 3}));
        assert_eq!(request.primary_keys, vec!["code"]);
        assert_eq!(request.values["amount"], json!(3));

        let request = KeyedRequest::new("order", ["code"], json!([1, 2]));
        assert!(request.values.is_empty());
    }

    #[test]
    fn test_delete_mode_follows_config() {
        assert_eq!(
            DeleteMode::for_config(&EngineConfig::default()),
            DeleteMode::Soft
        );
        let config = EngineConfig::builder().soft_delete(false).build();
        assert_eq!(DeleteMode::for_config(&config), DeleteMode::Hard);
    }

    #[test]
    fn test_upsert_outcome_id() {
        assert_eq!(UpsertOutcome::Inserted(4).id(), Some(4));
        assert_eq!(UpsertOutcome::Updated(9).id(), Some(9));
        assert_eq!(UpsertOutcome::NoRowsAffected.id(), None);
    }

    #[test]
    fn test_write_outcome_from_count() {
        assert_eq!(WriteOutcome::from_count(0), WriteOutcome::NoRowsAffected);
        assert!(WriteOutcome::from_count(0).is_no_rows_affected());
        assert_eq!(WriteOutcome::from_count(3), WriteOutcome::Affected(3));
        assert_eq!(WriteOutcome::from_count(3).rows(), 3);
    }
}
