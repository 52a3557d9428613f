//! Error types for engine operations

use thiserror::Error;

/// Errors that can occur while compiling or executing engine operations
///
/// Compilation-stage variants (`SchemaNotFound`, `InvalidQuerySpec`,
/// `InvalidArgument`) are raised before any statement reaches the database.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Schema not found: no live column metadata for table '{table}'")]
    SchemaNotFound { table: String },

    #[error("Invalid query spec for '{table}' (field '{field}'): {reason}")]
    InvalidQuerySpec {
        table: String,
        field: String,
        reason: String,
    },

    #[error("Invalid argument for '{table}' (key '{key}'): {reason}")]
    InvalidArgument {
        table: String,
        key: String,
        reason: String,
    },

    #[error("No rows affected in '{table}'")]
    NoRowsAffected { table: String },

    #[error("Backend execution failed on '{table}': {source}")]
    BackendExecution {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Parameter encoding failed on '{table}': {reason}")]
    Encode { table: String, reason: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn schema_not_found(table: impl Into<String>) -> Self {
        Self::SchemaNotFound {
            table: table.into(),
        }
    }

    pub fn invalid_query(
        table: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidQuerySpec {
            table: table.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(
        table: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            table: table.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn no_rows_affected(table: impl Into<String>) -> Self {
        Self::NoRowsAffected {
            table: table.into(),
        }
    }

    /// Returns a mapper for `map_err` that tags a driver error with its table.
    pub fn backend(table: &str) -> impl FnOnce(sqlx::Error) -> Self + '_ {
        move |source| Self::BackendExecution {
            table: table.to_string(),
            source,
        }
    }

    /// Table the error refers to, when it has one
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::SchemaNotFound { table }
            | Self::InvalidQuerySpec { table, .. }
            | Self::InvalidArgument { table, .. }
            | Self::NoRowsAffected { table }
            | Self::BackendExecution { table, .. }
            | Self::Encode { table, .. } => Some(table),
            Self::Json(_) => None,
        }
    }

    /// `true` for errors raised before any statement was executed
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            Self::SchemaNotFound { .. } | Self::InvalidQuerySpec { .. } | Self::InvalidArgument { .. }
        )
    }

    pub fn is_no_rows_affected(&self) -> bool {
        matches!(self, Self::NoRowsAffected { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
