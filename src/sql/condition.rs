//! Condition building for SQL WHERE and ORDER BY clauses
//!
//! Turns the declarative AND group, OR group and order list of a request into
//! predicate text plus bound parameters.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::sql::params::{Params, SqlValue};
use crate::sql::sanitize::{quoted, sanitize_identifier};
use crate::types::{ColumnKind, DeclaredType, TableMetadata};

/// Comparison operator of a single condition term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    #[serde(alias = "eq", alias = "=", alias = "equal")]
    Equals,
    #[serde(alias = "ne", alias = "!=", alias = "<>")]
    NotEquals,
    #[serde(alias = "gt", alias = ">")]
    GreaterThan,
    #[serde(alias = "gte", alias = ">=")]
    GreaterOrEqual,
    #[serde(alias = "lt", alias = "<")]
    LessThan,
    #[serde(alias = "lte", alias = "<=")]
    LessOrEqual,
    In,
    #[serde(alias = "nin")]
    NotIn,
    Between,
    Like,
    Contains,
    StartsWith,
    EndsWith,
    #[serde(alias = "isEmpty")]
    Empty,
    #[serde(alias = "isNotEmpty")]
    NotEmpty,
}

/// How many values an operator takes
enum Arity {
    None,
    One,
    Two,
    AtLeastOne,
}

impl ConditionOperator {
    fn arity(self) -> Arity {
        match self {
            ConditionOperator::Empty | ConditionOperator::NotEmpty => Arity::None,
            ConditionOperator::Between => Arity::Two,
            ConditionOperator::In | ConditionOperator::NotIn => Arity::AtLeastOne,
            _ => Arity::One,
        }
    }
}

/// One `field operator value(s)` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionTerm {
    pub field: String,
    pub operator: ConditionOperator,
    /// Scalar for single-value operators, array for `in`/`notIn`/`between`.
    /// An explicit `null` is kept as `Some(Value::Null)`.
    #[serde(
        default,
        alias = "values",
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl ConditionTerm {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value: Some(value),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOperator::Equals, value.into())
    }

    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, ConditionOperator::In, Value::Array(values))
    }

    pub fn between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::new(
            field,
            ConditionOperator::Between,
            Value::Array(vec![low.into(), high.into()]),
        )
    }

    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(field, ConditionOperator::Contains, Value::String(text.into()))
    }

    pub fn empty(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: ConditionOperator::Empty,
            value: None,
        }
    }
}

/// Ordered terms combined by AND
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionGroup(pub Vec<ConditionTerm>);

impl ConditionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, term: ConditionTerm) -> Self {
        self.0.push(term);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn terms(&self) -> &[ConditionTerm] {
        &self.0
    }
}

impl From<Vec<ConditionTerm>> for ConditionGroup {
    fn from(terms: Vec<ConditionTerm>) -> Self {
        Self(terms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTerm {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

impl OrderTerm {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Some("ASC".to_string()),
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Some("DESC".to_string()),
        }
    }

    /// Anything other than a recognizable ascending direction sorts DESC
    pub fn direction(&self) -> SortDirection {
        match self.direction.as_deref().map(|d| d.trim().to_uppercase()) {
            Some(d) if d == "ASC" || d == "ASCENDING" => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }
}

/// Output of [`ConditionCompiler::compile`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledConditions {
    /// Predicate text without the `WHERE` keyword
    pub predicate: Option<String>,
    /// Order list without the `ORDER BY` keywords
    pub order_by: Option<String>,
}

/// Resolved field: how to reference it and how to type its parameters
struct FieldRef {
    name: String,
    expr: String,
    declared_type: DeclaredType,
    textual: bool,
}

/// Compiles condition groups and order terms against one table
///
/// Without metadata every field is compared through its text form. With
/// metadata, unknown fields are rejected and parameters are cast to the
/// column's declared type.
pub struct ConditionCompiler<'a> {
    table: &'a str,
    alias: Option<&'a str>,
    metadata: Option<(&'a EngineConfig, &'a TableMetadata)>,
    locale_placeholder: Option<&'a str>,
}

impl<'a> ConditionCompiler<'a> {
    pub fn new(table: &'a str) -> Self {
        Self {
            table,
            alias: None,
            metadata: None,
            locale_placeholder: None,
        }
    }

    /// Qualify every field with this alias
    pub fn with_alias(mut self, alias: &'a str) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn with_metadata(mut self, config: &'a EngineConfig, metadata: &'a TableMetadata) -> Self {
        self.metadata = Some((config, metadata));
        self
    }

    /// Placeholder holding the request locale; localized fields compare the
    /// value stored under that locale
    pub fn with_locale_placeholder(mut self, placeholder: &'a str) -> Self {
        self.locale_placeholder = Some(placeholder);
        self
    }

    /// Compile both groups and the ordering
    ///
    /// When the OR group is non-empty the AND predicate becomes its first
    /// disjunct: `(a AND b) OR c OR d`.
    pub fn compile(
        &self,
        and: &ConditionGroup,
        or: &ConditionGroup,
        order: &[OrderTerm],
        params: &mut Params,
    ) -> Result<CompiledConditions> {
        let and_predicate = self.compile_group(and, " AND ", params)?;
        let or_predicate = self.compile_group(or, " OR ", params)?;

        let predicate = match (and_predicate, or_predicate) {
            (Some(and), Some(or)) => Some(format!("({}) OR {}", and, or)),
            (Some(and), None) => Some(and),
            (None, Some(or)) => Some(or),
            (None, None) => None,
        };

        Ok(CompiledConditions {
            predicate,
            order_by: self.compile_order(order)?,
        })
    }

    fn compile_group(
        &self,
        group: &ConditionGroup,
        joiner: &str,
        params: &mut Params,
    ) -> Result<Option<String>> {
        if group.is_empty() {
            return Ok(None);
        }
        let clauses = group
            .terms()
            .iter()
            .map(|term| self.compile_term(term, params))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(clauses.join(joiner)))
    }

    /// Compile a single term, appending its values to `params`
    pub fn compile_term(&self, term: &ConditionTerm, params: &mut Params) -> Result<String> {
        let field = self.resolve_field(&term.field)?;
        let op = term.operator;

        let values = self.term_values(term)?;

        let text_expr = if field.textual {
            field.expr.clone()
        } else {
            format!("{}::text", field.expr)
        };

        let clause = match op {
            ConditionOperator::Empty => {
                format!("({} IS NULL OR {} = '')", field.expr, text_expr)
            }
            ConditionOperator::NotEmpty => {
                format!("({} IS NOT NULL AND {} <> '')", field.expr, text_expr)
            }
            ConditionOperator::Equals | ConditionOperator::NotEquals => {
                let value = &values[0];
                let placeholder = self.bind(&field, value, params)?;
                let sql_op = match (op, value.is_null()) {
                    (ConditionOperator::Equals, false) => "=",
                    (ConditionOperator::Equals, true) => "IS NOT DISTINCT FROM",
                    (_, false) => "<>",
                    (_, true) => "IS DISTINCT FROM",
                };
                format!("{} {} {}", field.expr, sql_op, placeholder)
            }
            ConditionOperator::GreaterThan
            | ConditionOperator::GreaterOrEqual
            | ConditionOperator::LessThan
            | ConditionOperator::LessOrEqual => {
                if values[0].is_null() {
                    return Err(self.invalid(&term.field, "ordering comparison against null"));
                }
                let placeholder = self.bind(&field, &values[0], params)?;
                let sql_op = match op {
                    ConditionOperator::GreaterThan => ">",
                    ConditionOperator::GreaterOrEqual => ">=",
                    ConditionOperator::LessThan => "<",
                    _ => "<=",
                };
                format!("{} {} {}", field.expr, sql_op, placeholder)
            }
            ConditionOperator::In | ConditionOperator::NotIn => {
                let placeholders = values
                    .iter()
                    .map(|v| self.bind(&field, v, params))
                    .collect::<Result<Vec<_>>>()?;
                let keyword = if op == ConditionOperator::In {
                    "IN"
                } else {
                    "NOT IN"
                };
                format!("{} {} ({})", field.expr, keyword, placeholders.join(", "))
            }
            ConditionOperator::Between => {
                if values.iter().any(Value::is_null) {
                    return Err(self.invalid(&term.field, "between bounds cannot be null"));
                }
                let low = self.bind(&field, &values[0], params)?;
                let high = self.bind(&field, &values[1], params)?;
                format!("{} BETWEEN {} AND {}", field.expr, low, high)
            }
            ConditionOperator::Like
            | ConditionOperator::Contains
            | ConditionOperator::StartsWith
            | ConditionOperator::EndsWith => {
                let text = scalar_text(&values[0])
                    .ok_or_else(|| self.invalid(&term.field, "pattern value must be text"))?;
                let pattern = match op {
                    ConditionOperator::Contains => format!("%{}%", text),
                    ConditionOperator::StartsWith => format!("{}%", text),
                    ConditionOperator::EndsWith => format!("%{}", text),
                    _ => text,
                };
                format!("{} ILIKE {}", text_expr, params.push_text(pattern))
            }
        };

        Ok(clause)
    }

    /// Compile order terms in sequence
    pub fn compile_order(&self, order: &[OrderTerm]) -> Result<Option<String>> {
        if order.is_empty() {
            return Ok(None);
        }
        let parts = order
            .iter()
            .map(|term| {
                let field = self.resolve_field(&term.field)?;
                Ok(format!("{} {}", field.expr, term.direction().as_sql()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(parts.join(", ")))
    }

    fn resolve_field(&self, raw: &str) -> Result<FieldRef> {
        let name = sanitize_identifier(raw);
        if name.is_empty() {
            return Err(self.invalid(raw, "field name has no usable characters"));
        }

        let column = match self.alias {
            Some(alias) => format!("{}.{}", quoted(alias), quoted(&name)),
            None => quoted(&name),
        };

        let Some((config, metadata)) = self.metadata else {
            return Ok(FieldRef {
                name,
                expr: format!("{}::text", column),
                declared_type: DeclaredType::String,
                textual: true,
            });
        };

        let info = metadata
            .field(config, &name)
            .ok_or_else(|| self.invalid(raw, "unknown column"))?;

        if info.kind == ColumnKind::Localized {
            let expr = match self.locale_placeholder {
                Some(locale) => format!("({} ->> {})", column, locale),
                None => format!("{}::text", column),
            };
            return Ok(FieldRef {
                name,
                expr,
                declared_type: DeclaredType::String,
                textual: true,
            });
        }

        let textual = info.declared_type == DeclaredType::String;
        Ok(FieldRef {
            name,
            expr: column,
            declared_type: info.declared_type,
            textual,
        })
    }

    /// Validate operator/value arity and return the values in order
    fn term_values(&self, term: &ConditionTerm) -> Result<Vec<Value>> {
        let field = &term.field;
        let value = term.value.as_ref().filter(|v| !v.is_null());

        match term.operator.arity() {
            Arity::None => match value {
                None => Ok(Vec::new()),
                Some(_) => Err(self.invalid(field, "operator takes no value")),
            },
            Arity::One => match &term.value {
                None => Err(self.invalid(field, "operator requires a value")),
                Some(Value::Array(_)) => Err(self.invalid(field, "operator takes a single value")),
                Some(v) => Ok(vec![v.clone()]),
            },
            Arity::Two => match value {
                Some(Value::Array(items)) if items.len() == 2 => Ok(items.clone()),
                Some(Value::Array(items)) => Err(self.invalid(
                    field,
                    format!("between requires exactly 2 values, got {}", items.len()),
                )),
                _ => Err(self.invalid(field, "between requires a list of 2 values")),
            },
            Arity::AtLeastOne => match value {
                Some(Value::Array(items)) if !items.is_empty() => Ok(items.clone()),
                Some(Value::Array(_)) => Err(self.invalid(field, "in list cannot be empty")),
                _ => Err(self.invalid(field, "operator requires a list value")),
            },
        }
    }

    fn bind(&self, field: &FieldRef, value: &Value, params: &mut Params) -> Result<String> {
        if field.textual {
            let bound = match value {
                Value::Null => SqlValue::Null,
                other => SqlValue::Text(
                    scalar_text(other)
                        .ok_or_else(|| self.invalid(&field.name, "value must be a scalar"))?,
                ),
            };
            return Ok(params.push(bound, "TEXT"));
        }

        let bound = field
            .declared_type
            .coerce(value)
            .map_err(|reason| self.invalid(&field.name, reason))?;
        Ok(params.push(bound, &field.declared_type.to_sql_type()))
    }

    fn invalid(&self, field: &str, reason: impl Into<String>) -> EngineError {
        EngineError::invalid_query(self.table, field, reason)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnDescriptor;
    use serde_json::json;

    fn order_metadata() -> TableMetadata {
        TableMetadata::new(
            "order",
            vec![
                ColumnDescriptor::new("customerId", DeclaredType::Integer).references("customer"),
                ColumnDescriptor::new("shippedDate", DeclaredType::Date),
                ColumnDescriptor::new("amount", DeclaredType::decimal(10, 2)),
                ColumnDescriptor::new("status", DeclaredType::String),
                ColumnDescriptor::new("title", DeclaredType::String).localized(),
            ],
        )
    }

    fn compile_and(terms: Vec<ConditionTerm>) -> (Option<String>, Params) {
        let mut params = Params::new();
        let compiled = ConditionCompiler::new("order")
            .compile(&terms.into(), &ConditionGroup::new(), &[], &mut params)
            .unwrap();
        (compiled.predicate, params)
    }

    // ==================== Operators ====================

    #[test]
    fn test_single_value_operators_take_one_parameter() {
        let ops = [
            ConditionOperator::Equals,
            ConditionOperator::NotEquals,
            ConditionOperator::GreaterThan,
            ConditionOperator::GreaterOrEqual,
            ConditionOperator::LessThan,
            ConditionOperator::LessOrEqual,
            ConditionOperator::Like,
            ConditionOperator::Contains,
            ConditionOperator::StartsWith,
            ConditionOperator::EndsWith,
        ];
        for op in ops {
            let (_, params) = compile_and(vec![ConditionTerm::new("status", op, json!("x"))]);
            assert_eq!(params.len(), 1, "{:?} should bind exactly one parameter", op);
        }
    }

    #[test]
    fn test_in_expands_one_parameter_per_value() {
        let (clause, params) = compile_and(vec![ConditionTerm::in_list(
            "status",
            vec![json!("open"), json!("closed"), json!("held")],
        )]);

        assert_eq!(
            clause.unwrap(),
            "\"status\"::text IN ($1::TEXT, $2::TEXT, $3::TEXT)"
        );
        assert_eq!(params.len(), 3);
        assert_eq!(params.values()[0], SqlValue::Text("open".to_string()));
        assert_eq!(params.values()[2], SqlValue::Text("held".to_string()));
    }

    #[test]
    fn test_empty_compiles_without_parameters() {
        let (clause, params) = compile_and(vec![ConditionTerm::empty("status")]);
        assert_eq!(
            clause.unwrap(),
            "(\"status\"::text IS NULL OR \"status\"::text = '')"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_empty_with_metadata_uses_plain_column() {
        let config = EngineConfig::default();
        let meta = order_metadata();
        let mut params = Params::new();
        let clause = ConditionCompiler::new("order")
            .with_metadata(&config, &meta)
            .compile_term(&ConditionTerm::empty("status"), &mut params)
            .unwrap();

        assert_eq!(clause, "(\"status\" IS NULL OR \"status\" = '')");
        assert!(params.is_empty());
    }

    #[test]
    fn test_between_requires_two_values() {
        let (clause, params) = compile_and(vec![ConditionTerm::between("status", "a", "m")]);
        assert_eq!(clause.unwrap(), "\"status\"::text BETWEEN $1::TEXT AND $2::TEXT");
        assert_eq!(params.len(), 2);

        let mut params = Params::new();
        let err = ConditionCompiler::new("order")
            .compile_term(
                &ConditionTerm::new("status", ConditionOperator::Between, json!(["a", "b", "c"])),
                &mut params,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuerySpec { .. }));
        assert!(err.to_string().contains("exactly 2"));
    }

    #[test]
    fn test_arity_errors() {
        let compiler = ConditionCompiler::new("order");
        let mut params = Params::new();

        let bad = [
            ConditionTerm::new("status", ConditionOperator::In, json!([])),
            ConditionTerm::new("status", ConditionOperator::In, json!("open")),
            ConditionTerm::new("status", ConditionOperator::Empty, json!("x")),
            ConditionTerm::new("status", ConditionOperator::Equals, json!(["a", "b"])),
            ConditionTerm {
                field: "status".to_string(),
                operator: ConditionOperator::Equals,
                value: None,
            },
        ];
        for term in bad {
            let err = compiler.compile_term(&term, &mut params).unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidQuerySpec { ref table, .. } if table == "order"),
                "{:?}",
                term
            );
        }
        assert!(params.is_empty());
    }

    #[test]
    fn test_equals_null_keeps_one_parameter() {
        let (clause, params) = compile_and(vec![ConditionTerm::eq("status", Value::Null)]);
        assert_eq!(
            clause.unwrap(),
            "\"status\"::text IS NOT DISTINCT FROM $1::TEXT"
        );
        assert_eq!(params.values(), &[SqlValue::Null]);
    }

    #[test]
    fn test_json_null_value_is_kept() {
        let term: ConditionTerm =
            serde_json::from_value(json!({"field": "status", "operator": "notEquals", "value": null}))
                .unwrap();
        assert_eq!(term.value, Some(Value::Null));

        let (clause, params) = compile_and(vec![term]);
        assert_eq!(clause.unwrap(), "\"status\"::text IS DISTINCT FROM $1::TEXT");
        assert_eq!(params.values(), &[SqlValue::Null]);

        // An absent value is still rejected for single-value operators
        let term: ConditionTerm =
            serde_json::from_value(json!({"field": "status", "operator": "equals"})).unwrap();
        assert_eq!(term.value, None);
        let mut params = Params::new();
        let err = ConditionCompiler::new("order")
            .compile(&vec![term].into(), &ConditionGroup::new(), &[], &mut params)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuerySpec { .. }));

        // `empty` with an explicit null still takes no value
        let term: ConditionTerm =
            serde_json::from_value(json!({"field": "status", "operator": "empty", "value": null}))
                .unwrap();
        let (_, params) = compile_and(vec![term]);
        assert!(params.is_empty());
    }

    #[test]
    fn test_pattern_operators_wrap_value() {
        let (clause, params) = compile_and(vec![ConditionTerm::contains("status", "pen")]);
        assert_eq!(clause.unwrap(), "\"status\"::text ILIKE $1::TEXT");
        assert_eq!(params.values()[0], SqlValue::Text("%pen%".to_string()));

        let (_, params) = compile_and(vec![ConditionTerm::new(
            "status",
            ConditionOperator::StartsWith,
            json!("op"),
        )]);
        assert_eq!(params.values()[0], SqlValue::Text("op%".to_string()));
    }

    // ==================== Field handling ====================

    #[test]
    fn test_field_names_are_sanitized() {
        let (clause, _) = compile_and(vec![ConditionTerm::eq("sta\"tus; --", "x")]);
        assert_eq!(clause.unwrap(), "\"status\"::text = $1::TEXT");
    }

    #[test]
    fn test_field_without_usable_characters() {
        let mut params = Params::new();
        let err = ConditionCompiler::new("order")
            .compile_term(&ConditionTerm::eq("--", "x"), &mut params)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuerySpec { .. }));
    }

    #[test]
    fn test_metadata_casts_to_declared_type() {
        let config = EngineConfig::default();
        let meta = order_metadata();
        let mut params = Params::new();
        let compiled = ConditionCompiler::new("order")
            .with_alias("order")
            .with_metadata(&config, &meta)
            .compile(
                &ConditionGroup::new()
                    .with(ConditionTerm::new(
                        "amount",
                        ConditionOperator::GreaterThan,
                        json!(100),
                    ))
                    .with(ConditionTerm::eq("shippedDate", "2025-10-15")),
                &ConditionGroup::new(),
                &[],
                &mut params,
            )
            .unwrap();

        assert_eq!(
            compiled.predicate.unwrap(),
            "\"order\".\"amount\" > $1::NUMERIC(10,2) AND \"order\".\"shippedDate\" = $2::DATE"
        );
        assert!(matches!(params.values()[0], SqlValue::Decimal(_)));
        assert!(matches!(params.values()[1], SqlValue::Date(_)));
    }

    #[test]
    fn test_metadata_rejects_unknown_field() {
        let config = EngineConfig::default();
        let meta = order_metadata();
        let mut params = Params::new();
        let err = ConditionCompiler::new("order")
            .with_metadata(&config, &meta)
            .compile_term(&ConditionTerm::eq("nope", 1), &mut params)
            .unwrap_err();
        assert!(err.to_string().contains("unknown column"));
    }

    #[test]
    fn test_metadata_rejects_uncoercible_value() {
        let config = EngineConfig::default();
        let meta = order_metadata();
        let mut params = Params::new();
        let err = ConditionCompiler::new("order")
            .with_metadata(&config, &meta)
            .compile_term(&ConditionTerm::eq("customerId", "abc"), &mut params)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuerySpec { .. }));
    }

    #[test]
    fn test_localized_field_uses_locale_placeholder() {
        let config = EngineConfig::default();
        let meta = order_metadata();
        let mut params = Params::new();
        let locale = params.push_text("de");
        let clause = ConditionCompiler::new("order")
            .with_alias("order")
            .with_metadata(&config, &meta)
            .with_locale_placeholder(&locale)
            .compile_term(&ConditionTerm::contains("title", "Rad"), &mut params)
            .unwrap();

        assert_eq!(clause, "(\"order\".\"title\" ->> $1::TEXT) ILIKE $2::TEXT");
        assert_eq!(params.len(), 2);
    }

    // ==================== Group combination ====================

    #[test]
    fn test_or_group_absorbs_and_group() {
        let mut params = Params::new();
        let compiled = ConditionCompiler::new("order")
            .compile(
                &ConditionGroup::new()
                    .with(ConditionTerm::eq("a", "1"))
                    .with(ConditionTerm::eq("b", "2")),
                &ConditionGroup::new()
                    .with(ConditionTerm::eq("c", "3"))
                    .with(ConditionTerm::eq("d", "4")),
                &[],
                &mut params,
            )
            .unwrap();

        assert_eq!(
            compiled.predicate.unwrap(),
            "(\"a\"::text = $1::TEXT AND \"b\"::text = $2::TEXT) OR \"c\"::text = $3::TEXT OR \"d\"::text = $4::TEXT"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_or_group_alone() {
        let mut params = Params::new();
        let compiled = ConditionCompiler::new("order")
            .compile(
                &ConditionGroup::new(),
                &ConditionGroup::new()
                    .with(ConditionTerm::eq("c", "3"))
                    .with(ConditionTerm::empty("d")),
                &[],
                &mut params,
            )
            .unwrap();

        assert_eq!(
            compiled.predicate.unwrap(),
            "\"c\"::text = $1::TEXT OR (\"d\"::text IS NULL OR \"d\"::text = '')"
        );
    }

    #[test]
    fn test_empty_groups_produce_no_predicate() {
        let mut params = Params::new();
        let compiled = ConditionCompiler::new("order")
            .compile(&ConditionGroup::new(), &ConditionGroup::new(), &[], &mut params)
            .unwrap();
        assert_eq!(compiled, CompiledConditions::default());
    }

    #[test]
    fn test_param_numbering_continues_from_existing() {
        let mut params = Params::new();
        params.push_text("en");
        params.push_text("x");

        let compiled = ConditionCompiler::new("order")
            .compile(
                &ConditionGroup::new().with(ConditionTerm::eq("a", "1")),
                &ConditionGroup::new(),
                &[],
                &mut params,
            )
            .unwrap();
        assert_eq!(compiled.predicate.unwrap(), "\"a\"::text = $3::TEXT");
    }

    // ==================== Ordering ====================

    #[test]
    fn test_order_terms_in_sequence() {
        let compiler = ConditionCompiler::new("order").with_alias("order");
        let order = compiler
            .compile_order(&[OrderTerm::asc("shippedDate"), OrderTerm::desc("amount")])
            .unwrap();
        assert_eq!(
            order.unwrap(),
            "\"order\".\"shippedDate\"::text ASC, \"order\".\"amount\"::text DESC"
        );
    }

    #[test]
    fn test_order_direction_coerced_to_desc() {
        let missing = OrderTerm {
            field: "amount".to_string(),
            direction: None,
        };
        let garbage = OrderTerm {
            field: "amount".to_string(),
            direction: Some("sideways".to_string()),
        };
        let lower = OrderTerm {
            field: "amount".to_string(),
            direction: Some("asc".to_string()),
        };
        assert_eq!(missing.direction(), SortDirection::Desc);
        assert_eq!(garbage.direction(), SortDirection::Desc);
        assert_eq!(lower.direction(), SortDirection::Asc);
    }

    #[test]
    fn test_order_with_metadata_rejects_unknown_field() {
        let config = EngineConfig::default();
        let meta = order_metadata();
        let err = ConditionCompiler::new("order")
            .with_metadata(&config, &meta)
            .compile_order(&[OrderTerm::asc("ghost")])
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuerySpec { .. }));
    }

    // ==================== Deserialization ====================

    #[test]
    fn test_term_deserialization_with_aliases() {
        let term: ConditionTerm =
            serde_json::from_value(json!({"field": "status", "operator": "empty"})).unwrap();
        assert_eq!(term.operator, ConditionOperator::Empty);
        assert!(term.value.is_none());

        let term: ConditionTerm =
            serde_json::from_value(json!({"field": "id", "operator": "in", "values": [1, 2]}))
                .unwrap();
        assert_eq!(term.operator, ConditionOperator::In);
        assert_eq!(term.value, Some(json!([1, 2])));

        let term: ConditionTerm =
            serde_json::from_value(json!({"field": "amount", "operator": ">=", "value": 5}))
                .unwrap();
        assert_eq!(term.operator, ConditionOperator::GreaterOrEqual);
    }
}
