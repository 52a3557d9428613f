//! SQL Identifier Sanitization Utilities
//!
//! Field and table names are the only caller-controlled text that ends up
//! inside generated SQL. They are stripped to `[A-Za-z0-9_]` and then quoted.

use std::sync::LazyLock;

use regex::Regex;

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("table name pattern"));

/// Quote a SQL identifier to make it safe for use in queries
///
/// # Example
/// ```
/// use itemtype_engine::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("order"), "\"order\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Strip every character that is not an ASCII letter, digit or underscore
///
/// # Example
/// ```
/// use itemtype_engine::sql::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("status; DROP TABLE x"), "statusDROPTABLEx");
/// ```
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Sanitize and quote in one step
pub fn quoted(name: &str) -> String {
    quote_identifier(&sanitize_identifier(name))
}

/// `alias.column`, both sides sanitized and quoted
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quoted(alias), quoted(column))
}

/// Render an identifier-derived constant as a SQL string literal
///
/// Only used for names that already passed [`sanitize_identifier`], such as
/// the `objectType` tags; caller values always travel as parameters.
pub fn string_literal(text: &str) -> String {
    format!("'{}'", sanitize_identifier(text))
}

/// Validate a table name as received from a request
///
/// Table names are checked rather than stripped: a name that needs
/// stripping cannot match any row of the metadata store.
pub fn validate_table_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Table name cannot be empty".to_string());
    }
    if !TABLE_NAME.is_match(name) {
        return Err(format!(
            "Table name '{}' is invalid. Only letters, digits and underscores are allowed, and it must not start with a digit.",
            name
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_simple() {
        assert_eq!(quote_identifier("my_table"), "\"my_table\"");
        assert_eq!(quote_identifier("customerId"), "\"customerId\"");
    }

    #[test]
    fn test_quote_identifier_with_quotes() {
        assert_eq!(
            quote_identifier("table\"with\"quotes"),
            "\"table\"\"with\"\"quotes\""
        );
    }

    #[test]
    fn test_sanitize_strips_non_alphanumeric() {
        assert_eq!(sanitize_identifier("shipped-Date"), "shippedDate");
        assert_eq!(sanitize_identifier("a.b"), "ab");
        assert_eq!(sanitize_identifier("x\" OR 1=1 --"), "xOR11");
        assert_eq!(sanitize_identifier("created_by"), "created_by");
        assert_eq!(sanitize_identifier("日本"), "");
    }

    #[test]
    fn test_qualified() {
        assert_eq!(qualified("order", "amount"), "\"order\".\"amount\"");
        assert_eq!(qualified("o'rder", "am\"ount"), "\"order\".\"amount\"");
    }

    #[test]
    fn test_string_literal_is_sanitized() {
        assert_eq!(string_literal("partA"), "'partA'");
        assert_eq!(string_literal("x'; --"), "'x'");
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("order").is_ok());
        assert!(validate_table_name("partA").is_ok());
        assert!(validate_table_name("_staging").is_ok());
        assert!(validate_table_name("order_line2").is_ok());

        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1order").is_err());
        assert!(validate_table_name("order;drop").is_err());
        assert!(validate_table_name("my table").is_err());
        assert!(validate_table_name("schema.table").is_err());
    }
}
