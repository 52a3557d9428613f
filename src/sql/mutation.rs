//! Statement builders for the mutation engine
//!
//! Builders validate a request against the table metadata and return
//! parameterized statements. Nothing here touches the database, so a
//! rejected request never produces a partial write.

use std::collections::BTreeSet;

use serde_json::Value;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::request::{DeleteMode, RowPayload, RowTable};
use crate::sql::params::{Params, Statement};
use crate::sql::sanitize::{qualified, quoted, sanitize_identifier};
use crate::types::{ColumnDescriptor, DeclaredType, TableMetadata};

/// PostgreSQL accepts at most this many bind parameters per statement
pub const MAX_BIND_PARAMS: usize = 65535;

/// Check the key contract of a keyed request
///
/// Runs before any metadata lookup: every key must be named, present in
/// `values` and non-null.
pub fn check_key_membership(
    table: &str,
    primary_keys: &[String],
    values: &RowPayload,
) -> Result<()> {
    if primary_keys.is_empty() {
        return Err(EngineError::invalid_argument(
            table,
            "primaryKeys",
            "primary key set cannot be empty",
        ));
    }
    for key in primary_keys {
        if sanitize_identifier(key).is_empty() {
            return Err(EngineError::invalid_argument(
                table,
                key,
                "primary key name has no usable characters",
            ));
        }
        match values.get(key) {
            None => {
                return Err(EngineError::invalid_argument(
                    table,
                    key,
                    "values are missing a primary key",
                ));
            }
            Some(Value::Null) => {
                return Err(EngineError::invalid_argument(
                    table,
                    key,
                    "primary key value cannot be null",
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Old and new key dictionaries of a clone must name the same keys,
/// identity excluded
pub fn check_clone_keys(
    table: &str,
    id_column: &str,
    old_keys: &RowPayload,
    new_keys: &RowPayload,
) -> Result<()> {
    if old_keys.is_empty() {
        return Err(EngineError::invalid_argument(
            table,
            "oldKeys",
            "no keys to select the source rows",
        ));
    }
    if let Some((key, _)) = old_keys.iter().find(|(_, v)| v.is_null()) {
        return Err(EngineError::invalid_argument(
            table,
            key,
            "primary key value cannot be null",
        ));
    }

    let old: BTreeSet<&str> = old_keys
        .keys()
        .map(String::as_str)
        .filter(|k| *k != id_column)
        .collect();
    let new: BTreeSet<&str> = new_keys
        .keys()
        .map(String::as_str)
        .filter(|k| *k != id_column)
        .collect();

    if let Some(key) = old.symmetric_difference(&new).next() {
        return Err(EngineError::invalid_argument(
            table,
            *key,
            format!(
                "old and new keys differ: [{}] vs [{}]",
                old.iter().copied().collect::<Vec<_>>().join(", "),
                new.iter().copied().collect::<Vec<_>>().join(", ")
            ),
        ));
    }
    Ok(())
}

/// Statements of one bulk reconciliation, in execution order
#[derive(Debug, Clone)]
pub struct BulkPlan {
    pub staging_table: String,
    pub create_staging: String,
    pub load: Vec<Statement>,
    /// Returns a row when two staged rows share a key
    pub duplicate_check: String,
    pub update: Statement,
    pub insert: Statement,
    pub delete: Option<Statement>,
    pub drop_staging: String,
    pub staged_rows: usize,
}

/// Builds mutation statements for one table on behalf of one principal
pub struct MutationCompiler<'a> {
    config: &'a EngineConfig,
    metadata: &'a TableMetadata,
    principal: &'a str,
    writable: Vec<ColumnDescriptor>,
}

impl<'a> MutationCompiler<'a> {
    pub fn new(config: &'a EngineConfig, metadata: &'a TableMetadata, principal: &'a str) -> Self {
        let mut writable: Vec<ColumnDescriptor> =
            metadata.writable_columns(config).cloned().collect();
        // The discriminator of a polymorphic reference is a physical column
        // that need not be described in metadata
        if metadata.has_polymorphic() && !metadata.has_column(&config.discriminator_column) {
            writable.push(ColumnDescriptor::new(
                config.discriminator_column.clone(),
                DeclaredType::String,
            ));
        }

        Self {
            config,
            metadata,
            principal,
            writable,
        }
    }

    fn table(&self) -> &str {
        &self.metadata.table
    }

    fn writable(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.writable.iter().find(|c| c.name == name)
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Multi-row INSERT returning generated ids in row order
    ///
    /// Rows are split into several statements when one statement would
    /// exceed the bind parameter limit.
    pub fn create(&self, rows: &[RowPayload]) -> Result<Vec<Statement>> {
        if rows.is_empty() {
            return Err(EngineError::invalid_argument(
                self.table(),
                "rows",
                "no rows to insert",
            ));
        }

        let mut seen = BTreeSet::new();
        for row in rows {
            for key in row.keys() {
                if seen.insert(key.as_str()) {
                    self.warn_if_ignored(key);
                }
            }
        }

        for column in self
            .writable
            .iter()
            .filter(|c| c.is_required && c.default_value.is_none())
        {
            if let Some(idx) = rows
                .iter()
                .position(|row| row.get(&column.name).is_none_or(Value::is_null))
            {
                return Err(EngineError::invalid_argument(
                    self.table(),
                    &column.name,
                    format!("required column has no value in row {}", idx),
                ));
            }
        }

        let columns: Vec<&ColumnDescriptor> = self
            .writable
            .iter()
            .filter(|c| rows.iter().any(|row| row.contains_key(&c.name)))
            .collect();

        let mut column_list: Vec<String> = columns.iter().map(|c| quoted(&c.name)).collect();
        column_list.push(quoted(&self.config.audit_columns.created_by));
        column_list.push(quoted(&self.config.audit_columns.modified_by));
        column_list.extend(self.live_flag_column());

        let per_row = column_list.len();
        let batch_rows = (MAX_BIND_PARAMS / per_row)
            .min(self.config.bulk_batch_rows)
            .max(1);

        let mut statements = Vec::new();
        for chunk in rows.chunks(batch_rows) {
            let mut params = Params::new();
            let mut tuples = Vec::with_capacity(chunk.len());
            for row in chunk {
                let mut cells = Vec::with_capacity(per_row);
                for column in &columns {
                    match row.get(&column.name) {
                        Some(value) => cells.push(self.bind(column, value, &mut params)?),
                        None => cells.push("DEFAULT".to_string()),
                    }
                }
                cells.push(params.push_text(self.principal));
                cells.push(params.push_text(self.principal));
                cells.extend(self.live_flag());
                tuples.push(format!("({})", cells.join(", ")));
            }

            let sql = format!(
                "INSERT INTO {} ({}) VALUES {} RETURNING {}",
                quoted(self.table()),
                column_list.join(", "),
                tuples.join(", "),
                quoted(&self.config.id_column)
            );
            statements.push(Statement::new(sql, params));
        }

        Ok(statements)
    }

    // =========================================================================
    // Keyed single-row operations
    // =========================================================================

    /// Atomic insert-or-update keyed on `primary_keys`
    ///
    /// The statement returns one `(action, id)` row, where `action` is
    /// `updated` or `inserted`. A matched soft-deleted row is revived.
    pub fn upsert(&self, primary_keys: &[String], values: &RowPayload) -> Result<Statement> {
        check_key_membership(self.table(), primary_keys, values)?;
        let keys = self.resolve_keys(primary_keys)?;
        let set_columns = self.payload_columns(values, primary_keys);

        let mut params = Params::new();
        let mut source = Vec::with_capacity(keys.len() + set_columns.len());
        for column in keys.iter().chain(set_columns.iter().copied()) {
            let value = values.get(&column.name).unwrap_or(&Value::Null);
            source.push(format!(
                "{} AS {}",
                self.bind(column, value, &mut params)?,
                quoted(&column.name)
            ));
        }
        let principal = params.push_text(self.principal);

        let key_match = keys
            .iter()
            .map(|k| format!("{} = {}", qualified("tgt", &k.name), qualified("src", &k.name)))
            .collect::<Vec<_>>()
            .join(" AND ");

        let mut assignments: Vec<String> = set_columns
            .iter()
            .map(|c| format!("{} = {}", quoted(&c.name), qualified("src", &c.name)))
            .collect();
        assignments.extend(self.touch(&principal));
        if self.config.soft_delete {
            assignments.push(format!("{} = FALSE", quoted(&self.config.deleted_column)));
        }

        let mut insert_columns: Vec<String> = keys
            .iter()
            .chain(set_columns.iter().copied())
            .map(|c| quoted(&c.name))
            .collect();
        let mut insert_values: Vec<String> = keys
            .iter()
            .chain(set_columns.iter().copied())
            .map(|c| qualified("src", &c.name))
            .collect();
        insert_columns.push(quoted(&self.config.audit_columns.created_by));
        insert_columns.push(quoted(&self.config.audit_columns.modified_by));
        insert_values.push(principal.clone());
        insert_values.push(principal);
        insert_columns.extend(self.live_flag_column());
        insert_values.extend(self.live_flag());

        let table = quoted(self.table());
        let id = quoted(&self.config.id_column);
        let sql = format!(
            "WITH src AS (SELECT {source}), \
             upd AS (UPDATE {table} AS tgt SET {assignments} FROM src WHERE {key_match} RETURNING tgt.{id}), \
             ins AS (INSERT INTO {table} ({insert_columns}) SELECT {insert_values} FROM src \
             WHERE NOT EXISTS (SELECT 1 FROM upd) RETURNING {id}) \
             SELECT 'updated' AS action, {id} AS id FROM upd \
             UNION ALL SELECT 'inserted' AS action, {id} AS id FROM ins",
            source = source.join(", "),
            table = table,
            assignments = assignments.join(", "),
            key_match = key_match,
            id = id,
            insert_columns = insert_columns.join(", "),
            insert_values = insert_values.join(", "),
        );

        Ok(Statement::new(sql, params))
    }

    /// Transaction-scoped advisory lock on one key of the table
    ///
    /// Concurrent upserts of the same key queue on the lock, so the second
    /// one sees the row the first inserted. Key values are hashed as text,
    /// which makes `7` and `"7"` the same key.
    pub fn upsert_lock(&self, primary_keys: &[String], values: &RowPayload) -> Result<Statement> {
        check_key_membership(self.table(), primary_keys, values)?;
        let keys = self.resolve_keys(primary_keys)?;

        let mut lock_key = vec![Value::String(self.table().to_string())];
        for key in &keys {
            let text = match values.get(&key.name) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            lock_key.push(Value::String(text));
        }

        let mut params = Params::new();
        let key = params.push_text(Value::Array(lock_key).to_string());
        Ok(Statement::new(
            format!("SELECT pg_advisory_xact_lock(hashtextextended({}, 0))", key),
            params,
        ))
    }

    /// UPDATE of the non-key columns present in `values`
    pub fn update(&self, primary_keys: &[String], values: &RowPayload) -> Result<Statement> {
        check_key_membership(self.table(), primary_keys, values)?;
        let keys = self.resolve_keys(primary_keys)?;
        let set_columns = self.payload_columns(values, primary_keys);

        let mut params = Params::new();
        let mut assignments = Vec::with_capacity(set_columns.len() + 2);
        for column in &set_columns {
            let value = values.get(&column.name).unwrap_or(&Value::Null);
            assignments.push(format!(
                "{} = {}",
                quoted(&column.name),
                self.bind(column, value, &mut params)?
            ));
        }
        let principal = params.push_text(self.principal);
        assignments.extend(self.touch(&principal));

        let predicate = self.key_predicate(None, &keys, values, &mut params)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quoted(self.table()),
            assignments.join(", "),
            predicate
        );
        Ok(Statement::new(sql, params))
    }

    /// Soft or hard delete by key equality
    pub fn delete(
        &self,
        primary_keys: &[String],
        values: &RowPayload,
        mode: DeleteMode,
    ) -> Result<Statement> {
        check_key_membership(self.table(), primary_keys, values)?;
        self.check_delete_mode(mode)?;
        let keys = self.resolve_keys(primary_keys)?;

        let mut params = Params::new();
        let sql = match mode {
            DeleteMode::Soft => {
                let principal = params.push_text(self.principal);
                let mut assignments =
                    vec![format!("{} = TRUE", quoted(&self.config.deleted_column))];
                assignments.extend(self.touch(&principal));
                let predicate = self.key_predicate(None, &keys, values, &mut params)?;
                format!(
                    "UPDATE {} SET {} WHERE {}",
                    quoted(self.table()),
                    assignments.join(", "),
                    predicate
                )
            }
            DeleteMode::Hard => {
                let predicate = self.key_predicate(None, &keys, values, &mut params)?;
                format!("DELETE FROM {} WHERE {}", quoted(self.table()), predicate)
            }
        };
        Ok(Statement::new(sql, params))
    }

    // =========================================================================
    // Clone
    // =========================================================================

    /// Copy the rows matching `old_keys` with `new_keys` substituted
    ///
    /// Copies are written with the active column set to FALSE when the table
    /// has one. The statement returns the new ids.
    pub fn clone_inactive(&self, old_keys: &RowPayload, new_keys: &RowPayload) -> Result<Statement> {
        check_clone_keys(self.table(), &self.config.id_column, old_keys, new_keys)?;

        let selectors = old_keys
            .keys()
            .map(|k| self.key_column(k))
            .collect::<Result<Vec<_>>>()?;
        for key in new_keys.keys().filter(|k| **k != self.config.id_column) {
            if self.writable(key).is_none() {
                return Err(EngineError::invalid_argument(
                    self.table(),
                    key,
                    "only writable columns can take new key values",
                ));
            }
        }

        let mut params = Params::new();
        let mut columns = Vec::with_capacity(self.writable.len() + 2);
        let mut expressions = Vec::with_capacity(self.writable.len() + 2);
        for column in &self.writable {
            columns.push(quoted(&column.name));
            if column.name == self.config.active_column {
                expressions.push("FALSE".to_string());
            } else if let Some(value) = new_keys.get(&column.name) {
                expressions.push(self.bind(column, value, &mut params)?);
            } else {
                expressions.push(qualified("src", &column.name));
            }
        }
        let principal = params.push_text(self.principal);
        columns.push(quoted(&self.config.audit_columns.created_by));
        columns.push(quoted(&self.config.audit_columns.modified_by));
        expressions.push(principal.clone());
        expressions.push(principal);
        columns.extend(self.live_flag_column());
        expressions.extend(self.live_flag());

        let predicate = self.key_predicate(Some("src"), &selectors, old_keys, &mut params)?;
        let sql = format!(
            "INSERT INTO {table} ({}) SELECT {} FROM {table} AS src WHERE {} RETURNING {}",
            columns.join(", "),
            expressions.join(", "),
            predicate,
            quoted(&self.config.id_column),
            table = quoted(self.table()),
        );
        Ok(Statement::new(sql, params))
    }

    // =========================================================================
    // Bulk reconciliation
    // =========================================================================

    /// Plan a staged reconciliation of `rows` against the table
    ///
    /// `delete_missing` selects the full-replace variant: live target rows
    /// whose key is absent from the staged set are removed.
    pub fn bulk(
        &self,
        rows: &RowTable,
        primary_keys: &[String],
        delete_missing: Option<DeleteMode>,
    ) -> Result<BulkPlan> {
        if primary_keys.is_empty() {
            return Err(EngineError::invalid_argument(
                self.table(),
                "primaryKeys",
                "primary key set cannot be empty",
            ));
        }
        for key in primary_keys {
            if rows.column_index(key).is_none() {
                return Err(EngineError::invalid_argument(
                    self.table(),
                    key,
                    "row table has no column for this primary key",
                ));
            }
        }
        if let Some(mode) = delete_missing {
            self.check_delete_mode(mode)?;
        }

        let keys = self.resolve_keys(primary_keys)?;
        for column in &rows.columns {
            if !primary_keys.contains(column) {
                self.warn_if_ignored(column);
            }
        }
        let values: Vec<&ColumnDescriptor> = self
            .writable
            .iter()
            .filter(|c| !primary_keys.contains(&c.name) && rows.column_index(&c.name).is_some())
            .collect();

        let staged: Vec<&ColumnDescriptor> = keys.iter().chain(values.iter().copied()).collect();
        let positions: Vec<usize> = staged
            .iter()
            .filter_map(|c| rows.column_index(&c.name))
            .collect();

        for (idx, row) in rows.rows.iter().enumerate() {
            for key in &keys {
                let position = rows.column_index(&key.name).unwrap_or_default();
                if row.get(position).is_none_or(Value::is_null) {
                    return Err(EngineError::invalid_argument(
                        self.table(),
                        &key.name,
                        format!("null primary key value in row {}", idx),
                    ));
                }
            }
        }

        let staging = quoted(&format!("_stage_{}", Uuid::new_v4().simple()));
        let staged_list = staged
            .iter()
            .map(|c| quoted(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let create_staging = format!(
            "CREATE TEMP TABLE {} ({})",
            staging,
            staged
                .iter()
                .map(|c| format!("{} {}", quoted(&c.name), c.sql_type()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let batch_rows = (MAX_BIND_PARAMS / staged.len())
            .min(self.config.bulk_batch_rows)
            .max(1);
        let mut load = Vec::new();
        for chunk in rows.rows.chunks(batch_rows) {
            let mut params = Params::new();
            let mut tuples = Vec::with_capacity(chunk.len());
            for row in chunk {
                let cells = staged
                    .iter()
                    .zip(&positions)
                    .map(|(column, &position)| {
                        let value = row.get(position).unwrap_or(&Value::Null);
                        self.bind(column, value, &mut params)
                    })
                    .collect::<Result<Vec<_>>>()?;
                tuples.push(format!("({})", cells.join(", ")));
            }
            load.push(Statement::new(
                format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    staging,
                    staged_list,
                    tuples.join(", ")
                ),
                params,
            ));
        }

        let key_list = keys
            .iter()
            .map(|k| quoted(&k.name))
            .collect::<Vec<_>>()
            .join(", ");
        let duplicate_check = format!(
            "SELECT {} FROM {} GROUP BY {} HAVING COUNT(*) > 1 LIMIT 1",
            key_list, staging, key_list
        );

        let key_match = keys
            .iter()
            .map(|k| format!("{} = {}", qualified("tgt", &k.name), qualified("stg", &k.name)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let table = quoted(self.table());

        let update = {
            let mut params = Params::new();
            let principal = params.push_text(self.principal);
            let mut assignments: Vec<String> = values
                .iter()
                .map(|c| format!("{} = {}", quoted(&c.name), qualified("stg", &c.name)))
                .collect();
            assignments.extend(self.touch(&principal));
            if self.config.soft_delete {
                assignments.push(format!("{} = FALSE", quoted(&self.config.deleted_column)));
            }
            Statement::new(
                format!(
                    "UPDATE {} AS tgt SET {} FROM {} AS stg WHERE {}",
                    table,
                    assignments.join(", "),
                    staging,
                    key_match
                ),
                params,
            )
        };

        let insert = {
            let mut params = Params::new();
            let principal = params.push_text(self.principal);
            let mut columns: Vec<String> = staged.iter().map(|c| quoted(&c.name)).collect();
            let mut selected: Vec<String> =
                staged.iter().map(|c| qualified("stg", &c.name)).collect();
            columns.push(quoted(&self.config.audit_columns.created_by));
            columns.push(quoted(&self.config.audit_columns.modified_by));
            selected.push(principal.clone());
            selected.push(principal);
            columns.extend(self.live_flag_column());
            selected.extend(self.live_flag());
            Statement::new(
                format!(
                    "INSERT INTO {} ({}) SELECT {} FROM {} AS stg \
                     WHERE NOT EXISTS (SELECT 1 FROM {} AS tgt WHERE {})",
                    table,
                    columns.join(", "),
                    selected.join(", "),
                    staging,
                    table,
                    key_match
                ),
                params,
            )
        };

        let delete = delete_missing.map(|mode| {
            let absent = format!("NOT EXISTS (SELECT 1 FROM {} AS stg WHERE {})", staging, key_match);
            match mode {
                DeleteMode::Soft => {
                    let mut params = Params::new();
                    let principal = params.push_text(self.principal);
                    let deleted = quoted(&self.config.deleted_column);
                    let mut assignments = vec![format!("{} = TRUE", deleted)];
                    assignments.extend(self.touch(&principal));
                    Statement::new(
                        format!(
                            "UPDATE {} AS tgt SET {} WHERE tgt.{} = FALSE AND {}",
                            table,
                            assignments.join(", "),
                            deleted,
                            absent
                        ),
                        params,
                    )
                }
                DeleteMode::Hard => Statement::new(
                    format!("DELETE FROM {} AS tgt WHERE {}", table, absent),
                    Params::new(),
                ),
            }
        });

        Ok(BulkPlan {
            drop_staging: format!("DROP TABLE IF EXISTS {}", staging),
            staging_table: staging,
            create_staging,
            load,
            duplicate_check,
            update,
            insert,
            delete,
            staged_rows: rows.len(),
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn bind(&self, column: &ColumnDescriptor, value: &Value, params: &mut Params) -> Result<String> {
        let bound = column
            .coerce(value, &self.config.default_locale)
            .map_err(|reason| EngineError::invalid_argument(self.table(), &column.name, reason))?;
        Ok(params.push(bound, &column.sql_type()))
    }

    /// Resolve a key name to a writable column or a system column such as the id
    fn key_column(&self, key: &str) -> Result<ColumnDescriptor> {
        if let Some(column) = self.writable(key) {
            return Ok(column.clone());
        }
        self.metadata
            .field(self.config, key)
            .map(|info| ColumnDescriptor::new(info.name, info.declared_type))
            .ok_or_else(|| {
                EngineError::invalid_argument(self.table(), key, "primary key is not a column of the table")
            })
    }

    fn resolve_keys(&self, primary_keys: &[String]) -> Result<Vec<ColumnDescriptor>> {
        let mut keys: Vec<ColumnDescriptor> = Vec::with_capacity(primary_keys.len());
        for key in primary_keys {
            if keys.iter().any(|k| &k.name == key) {
                continue;
            }
            keys.push(self.key_column(key)?);
        }
        Ok(keys)
    }

    /// Writable non-key columns present in `row`, in metadata order
    fn payload_columns(&self, row: &RowPayload, primary_keys: &[String]) -> Vec<&ColumnDescriptor> {
        for key in row.keys().filter(|k| !primary_keys.contains(*k)) {
            self.warn_if_ignored(key);
        }
        self.writable
            .iter()
            .filter(|c| row.contains_key(&c.name) && !primary_keys.contains(&c.name))
            .collect()
    }

    fn warn_if_ignored(&self, key: &str) {
        if self.writable(key).is_some() {
            return;
        }
        if self.config.is_reserved(key) {
            tracing::warn!(table = self.table(), field = key, "Ignoring system field in payload");
        } else {
            tracing::warn!(table = self.table(), field = key, "Ignoring unknown field in payload");
        }
    }

    /// `key = $n` for every key, plus the live-row filter under soft delete
    fn key_predicate(
        &self,
        alias: Option<&str>,
        keys: &[ColumnDescriptor],
        values: &RowPayload,
        params: &mut Params,
    ) -> Result<String> {
        let column_ref = |name: &str| match alias {
            Some(alias) => qualified(alias, name),
            None => quoted(name),
        };

        let mut parts = Vec::with_capacity(keys.len() + 1);
        for key in keys {
            let value = values.get(&key.name).unwrap_or(&Value::Null);
            parts.push(format!(
                "{} = {}",
                column_ref(&key.name),
                self.bind(key, value, params)?
            ));
        }
        if self.config.soft_delete {
            parts.push(format!("{} = FALSE", column_ref(&self.config.deleted_column)));
        }
        Ok(parts.join(" AND "))
    }

    /// Deleted-flag column written by inserts under soft delete
    fn live_flag_column(&self) -> Option<String> {
        self.config
            .soft_delete
            .then(|| quoted(&self.config.deleted_column))
    }

    fn live_flag(&self) -> Option<String> {
        self.config.soft_delete.then(|| "FALSE".to_string())
    }

    /// Audit assignments refreshed on every write
    fn touch(&self, principal: &str) -> Vec<String> {
        let audit = &self.config.audit_columns;
        let mut assignments = vec![format!("{} = {}", quoted(&audit.modified_by), principal)];
        if let Some(modified_at) = &audit.modified_at {
            assignments.push(format!("{} = NOW()", quoted(modified_at)));
        }
        assignments
    }

    fn check_delete_mode(&self, mode: DeleteMode) -> Result<()> {
        if mode == DeleteMode::Soft && !self.config.soft_delete {
            return Err(EngineError::invalid_argument(
                self.table(),
                &self.config.deleted_column,
                "soft delete is disabled for this engine",
            ));
        }
        Ok(())
    }
}
