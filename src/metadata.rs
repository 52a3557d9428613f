//! Metadata repository
//!
//! Reads live column descriptors and polymorphic target lists from the
//! metadata tables. Every call hits the database; nothing is cached, since
//! the metadata is edited at runtime.

use sqlx::{PgConnection, Row};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::sql::sanitize::{quote_identifier, validate_table_name};
use crate::types::{ColumnDescriptor, ColumnKind, DeclaredType, TableMetadata};

/// Read-only access to the item type / property metadata store
pub struct MetadataRepository<'a> {
    config: &'a EngineConfig,
}

impl<'a> MetadataRepository<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Live column descriptors of `table`, ordered by sort index
    ///
    /// Fails with `SchemaNotFound` when the table is unknown, soft-deleted,
    /// or has no live columns.
    pub async fn get_columns(&self, conn: &mut PgConnection, table: &str) -> Result<TableMetadata> {
        validate_table_name(table).map_err(|reason| EngineError::invalid_query(table, "table", reason))?;

        let sql = format!(
            r#"
            SELECT p.name, p.declared_type, p.kind, p.data_source,
                   p.is_required, p.is_unique, p.sort_index, p.default_value
            FROM {} p
            JOIN {} t ON t.id = p.item_type_id
            WHERE t.table_name = $1 AND t.deleted = FALSE AND p.deleted = FALSE
            ORDER BY p.sort_index, p.name
            "#,
            quote_identifier(&self.config.property_table),
            quote_identifier(&self.config.item_type_table),
        );

        let rows = sqlx::query(&sql)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(EngineError::backend(table))?;

        if rows.is_empty() {
            return Err(EngineError::schema_not_found(table));
        }

        let columns = rows
            .iter()
            .map(|row| self.row_to_descriptor(table, row))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(table, columns = columns.len(), "Loaded column metadata");
        Ok(TableMetadata::new(table, columns))
    }

    /// Target tables enumerated by a polymorphic lookup list, in sort order
    pub async fn get_reference_targets(
        &self,
        conn: &mut PgConnection,
        list_name: &str,
    ) -> Result<Vec<String>> {
        let sql = format!(
            r#"
            SELECT target_table
            FROM {}
            WHERE list_name = $1 AND deleted = FALSE
            ORDER BY sort_index, target_table
            "#,
            quote_identifier(&self.config.reference_list_table),
        );

        let rows = sqlx::query(&sql)
            .bind(list_name)
            .fetch_all(&mut *conn)
            .await
            .map_err(EngineError::backend(list_name))?;

        let mut targets = Vec::with_capacity(rows.len());
        for row in &rows {
            let target: String = row
                .try_get("target_table")
                .map_err(EngineError::backend(list_name))?;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }

        tracing::debug!(list = list_name, targets = targets.len(), "Loaded reference targets");
        Ok(targets)
    }

    fn row_to_descriptor(&self, table: &str, row: &sqlx::postgres::PgRow) -> Result<ColumnDescriptor> {
        let name: String = row.try_get("name").map_err(EngineError::backend(table))?;
        let raw_type: String = row
            .try_get("declared_type")
            .map_err(EngineError::backend(table))?;
        let raw_kind: Option<String> = row.try_get("kind").map_err(EngineError::backend(table))?;

        let declared_type = DeclaredType::parse(&raw_type).unwrap_or_else(|| {
            tracing::warn!(table, column = %name, declared_type = %raw_type, "Unknown declared type, treating as text");
            DeclaredType::String
        });

        let kind = match raw_kind.as_deref() {
            None => ColumnKind::Plain,
            Some(raw) => ColumnKind::parse(raw).unwrap_or_else(|| {
                tracing::warn!(table, column = %name, kind = %raw, "Unknown column kind, treating as plain");
                ColumnKind::Plain
            }),
        };

        let data_source: Option<String> = row
            .try_get("data_source")
            .map_err(EngineError::backend(table))?;
        let data_source = data_source.filter(|s| !s.trim().is_empty());

        let kind = if kind.is_reference() && data_source.is_none() {
            tracing::warn!(table, column = %name, "Reference column without data source, treating as plain");
            ColumnKind::Plain
        } else {
            kind
        };

        let mut descriptor = ColumnDescriptor::new(name, declared_type);
        descriptor.kind = kind;
        descriptor.data_source = data_source;
        descriptor.is_required = row.try_get("is_required").map_err(EngineError::backend(table))?;
        descriptor.is_unique = row.try_get("is_unique").map_err(EngineError::backend(table))?;
        descriptor.sort_index = row.try_get("sort_index").map_err(EngineError::backend(table))?;
        descriptor.default_value = row
            .try_get("default_value")
            .map_err(EngineError::backend(table))?;

        if descriptor.kind == ColumnKind::Localized {
            descriptor.declared_type = DeclaredType::Json;
        }

        Ok(descriptor)
    }
}
