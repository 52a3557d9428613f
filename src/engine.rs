//! Engine - Main entry point for metadata-driven data access
//!
//! Every operation reads the live metadata for its table, compiles a
//! parameterized statement and runs it on the connection supplied by the
//! caller. The engine holds no connection, cache or other shared state.

use futures::TryStreamExt;
use sqlx::{Connection, PgConnection, Row};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::metadata::MetadataRepository;
use crate::request::{
    BatchRequest, BulkOutcome, BulkRequest, CloneRequest, CreateRequest, DeleteMode, KeyedRequest,
    SearchRequest, UpsertOutcome, WriteOutcome,
};
use crate::sequence::{SequenceFormat, SequenceGenerator};
use crate::sql::mutation::{BulkPlan, MutationCompiler, check_clone_keys, check_key_membership};
use crate::sql::nested::{ChunkAssembler, NestedQueryCompiler, NestedResult, NestedSchema};
use crate::sql::params::Statement;
use crate::types::TableMetadata;

/// Metadata-driven query and mutation engine
///
/// Operations take `&mut PgConnection`; pass a pooled connection or a
/// transaction (`&mut *tx`). Multi-statement operations open a nested
/// transaction with [`Connection::begin`], which becomes a savepoint when
/// the caller already holds a transaction.
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metadata(&self) -> MetadataRepository<'_> {
        MetadataRepository::new(&self.config)
    }

    /// Live column metadata of `table`
    pub async fn get_columns(&self, conn: &mut PgConnection, table: &str) -> Result<TableMetadata> {
        self.metadata().get_columns(conn, table).await
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Run a nested search and reassemble the streamed JSON document
    ///
    /// Returns [`NestedResult::NoData`] when nothing matches.
    pub async fn search(&self, conn: &mut PgConnection, request: &SearchRequest) -> Result<NestedResult> {
        let table = request.table.as_str();
        let schema = NestedSchema::load(&self.metadata(), &mut *conn, table).await?;
        let statement = NestedQueryCompiler::new(&self.config, &schema).compile(request)?;

        tracing::debug!(table, sql = %statement.sql, params = statement.params.len(), "Running search");
        let arguments = statement.params.to_arguments(table)?;
        let mut assembler = ChunkAssembler::new();
        let mut rows = sqlx::query_with(&statement.sql, arguments).fetch(&mut *conn);
        while let Some(row) = rows.try_next().await.map_err(EngineError::backend(table))? {
            let chunk: Option<String> = row.try_get("chunk").map_err(EngineError::backend(table))?;
            assembler.push(chunk.as_deref());
        }
        drop(rows);

        let chunks = assembler.chunks();
        let result = assembler.finish()?;
        tracing::debug!(table, chunks, rows = result.rows().len(), "Search complete");
        Ok(result)
    }

    // =========================================================================
    // Single-row mutations
    // =========================================================================

    /// Insert rows, returning the generated ids in row order
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        principal: &str,
        request: &CreateRequest,
    ) -> Result<Vec<i64>> {
        let table = request.table.as_str();
        let metadata = self.get_columns(&mut *conn, table).await?;
        let statements = MutationCompiler::new(&self.config, &metadata, principal).create(&request.rows)?;

        let mut tx = conn.begin().await.map_err(EngineError::backend(table))?;
        let mut ids = Vec::with_capacity(request.rows.len());
        for statement in &statements {
            ids.extend(fetch_ids(&mut tx, table, statement).await?);
        }
        tx.commit().await.map_err(EngineError::backend(table))?;

        tracing::info!(table, rows = ids.len(), "Created rows");
        Ok(ids)
    }

    /// Update the row matching the key values, inserting it when absent
    ///
    /// Runs under a transaction-scoped advisory lock on the key, so
    /// concurrent upserts of one key resolve to one insert and one update.
    pub async fn upsert(
        &self,
        conn: &mut PgConnection,
        principal: &str,
        request: &KeyedRequest,
    ) -> Result<UpsertOutcome> {
        let table = request.table.as_str();
        check_key_membership(table, &request.primary_keys, &request.values)?;
        let metadata = self.get_columns(&mut *conn, table).await?;
        let compiler = MutationCompiler::new(&self.config, &metadata, principal);
        let lock = compiler.upsert_lock(&request.primary_keys, &request.values)?;
        let statement = compiler.upsert(&request.primary_keys, &request.values)?;

        let mut tx = conn.begin().await.map_err(EngineError::backend(table))?;
        execute(&mut tx, table, &lock).await?;
        tracing::debug!(table, sql = %statement.sql, params = statement.params.len(), "Executing upsert");
        let arguments = statement.params.to_arguments(table)?;
        let row = sqlx::query_with(&statement.sql, arguments)
            .fetch_optional(&mut *tx)
            .await
            .map_err(EngineError::backend(table))?;
        tx.commit().await.map_err(EngineError::backend(table))?;

        let outcome = match row {
            None => UpsertOutcome::NoRowsAffected,
            Some(row) => {
                let action: String = row.try_get("action").map_err(EngineError::backend(table))?;
                let id: i64 = row.try_get("id").map_err(EngineError::backend(table))?;
                if action == "inserted" {
                    UpsertOutcome::Inserted(id)
                } else {
                    UpsertOutcome::Updated(id)
                }
            }
        };

        tracing::info!(table, outcome = ?outcome, "Upserted row");
        Ok(outcome)
    }

    /// Update the rows matching the key values
    ///
    /// Reports [`WriteOutcome::NoRowsAffected`] when nothing matched.
    pub async fn update(
        &self,
        conn: &mut PgConnection,
        principal: &str,
        request: &KeyedRequest,
    ) -> Result<WriteOutcome> {
        let table = request.table.as_str();
        check_key_membership(table, &request.primary_keys, &request.values)?;
        let metadata = self.get_columns(&mut *conn, table).await?;
        let statement = MutationCompiler::new(&self.config, &metadata, principal)
            .update(&request.primary_keys, &request.values)?;

        let outcome = WriteOutcome::from_count(execute(&mut *conn, table, &statement).await?);
        tracing::info!(table, outcome = ?outcome, "Updated rows");
        Ok(outcome)
    }

    /// Soft or hard delete the rows matching the key values
    ///
    /// Reports [`WriteOutcome::NoRowsAffected`] when nothing matched.
    pub async fn delete(
        &self,
        conn: &mut PgConnection,
        principal: &str,
        request: &KeyedRequest,
        mode: DeleteMode,
    ) -> Result<WriteOutcome> {
        let table = request.table.as_str();
        check_key_membership(table, &request.primary_keys, &request.values)?;
        let metadata = self.get_columns(&mut *conn, table).await?;
        let statement = MutationCompiler::new(&self.config, &metadata, principal).delete(
            &request.primary_keys,
            &request.values,
            mode,
        )?;

        let outcome = WriteOutcome::from_count(execute(&mut *conn, table, &statement).await?);
        tracing::info!(table, outcome = ?outcome, mode = ?mode, "Deleted rows");
        Ok(outcome)
    }

    // =========================================================================
    // Batch mutations
    // =========================================================================

    /// Update every row of the batch in one transaction
    ///
    /// Returns the summed affected count; rows that match nothing add zero.
    pub async fn update_batch(
        &self,
        conn: &mut PgConnection,
        principal: &str,
        request: &BatchRequest,
    ) -> Result<u64> {
        let table = request.table.as_str();
        self.check_batch(request)?;
        let metadata = self.get_columns(&mut *conn, table).await?;
        let compiler = MutationCompiler::new(&self.config, &metadata, principal);
        let statements = request
            .rows
            .iter()
            .map(|row| compiler.update(&request.primary_keys, row))
            .collect::<Result<Vec<_>>>()?;

        let affected = execute_all(conn, table, &statements).await?;
        tracing::info!(table, rows = affected, batch = statements.len(), "Updated batch");
        Ok(affected)
    }

    /// Delete every row of the batch in one transaction
    pub async fn delete_batch(
        &self,
        conn: &mut PgConnection,
        principal: &str,
        request: &BatchRequest,
        mode: DeleteMode,
    ) -> Result<u64> {
        let table = request.table.as_str();
        self.check_batch(request)?;
        let metadata = self.get_columns(&mut *conn, table).await?;
        let compiler = MutationCompiler::new(&self.config, &metadata, principal);
        let statements = request
            .rows
            .iter()
            .map(|row| compiler.delete(&request.primary_keys, row, mode))
            .collect::<Result<Vec<_>>>()?;

        let affected = execute_all(conn, table, &statements).await?;
        tracing::info!(table, rows = affected, batch = statements.len(), mode = ?mode, "Deleted batch");
        Ok(affected)
    }

    fn check_batch(&self, request: &BatchRequest) -> Result<()> {
        if request.rows.is_empty() {
            return Err(EngineError::invalid_argument(
                &request.table,
                "rows",
                "batch cannot be empty",
            ));
        }
        request
            .rows
            .iter()
            .try_for_each(|row| check_key_membership(&request.table, &request.primary_keys, row))
    }

    // =========================================================================
    // Bulk reconciliation
    // =========================================================================

    /// Stage the rows and apply them by key: matched rows are updated,
    /// unmatched rows inserted
    pub async fn bulk_upsert(
        &self,
        conn: &mut PgConnection,
        principal: &str,
        request: &BulkRequest,
    ) -> Result<BulkOutcome> {
        self.bulk(conn, principal, request, None).await
    }

    /// Like [`Engine::bulk_upsert`], additionally removing live rows whose
    /// key is absent from the staged set
    pub async fn bulk_upsert_delete(
        &self,
        conn: &mut PgConnection,
        principal: &str,
        request: &BulkRequest,
        mode: DeleteMode,
    ) -> Result<BulkOutcome> {
        self.bulk(conn, principal, request, Some(mode)).await
    }

    async fn bulk(
        &self,
        conn: &mut PgConnection,
        principal: &str,
        request: &BulkRequest,
        delete_missing: Option<DeleteMode>,
    ) -> Result<BulkOutcome> {
        let table = request.table.as_str();
        let metadata = self.get_columns(&mut *conn, table).await?;
        let plan = MutationCompiler::new(&self.config, &metadata, principal).bulk(
            &request.rows,
            &request.primary_keys,
            delete_missing,
        )?;

        let mut tx = conn.begin().await.map_err(EngineError::backend(table))?;
        match run_bulk(&mut tx, table, &request.primary_keys, &plan).await {
            Ok(outcome) => {
                execute_raw(&mut tx, table, &plan.drop_staging).await?;
                tx.commit().await.map_err(EngineError::backend(table))?;
                tracing::info!(
                    table,
                    staged = outcome.staged,
                    updated = outcome.updated,
                    inserted = outcome.inserted,
                    deleted = outcome.deleted,
                    "Bulk reconciliation complete"
                );
                Ok(outcome)
            }
            Err(err) => {
                // Rolling back also discards the staging table
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(
                        table,
                        staging = %plan.staging_table,
                        error = %rollback,
                        "Rollback after failed bulk reconciliation failed"
                    );
                }
                Err(err)
            }
        }
    }

    // =========================================================================
    // Clone and sequences
    // =========================================================================

    /// Copy the rows matching `old_keys` as inactive drafts keyed by `new_keys`
    ///
    /// Returns the ids of the copies; fails with `NoRowsAffected` when no
    /// row matched.
    pub async fn clone_inactive_record(
        &self,
        conn: &mut PgConnection,
        principal: &str,
        request: &CloneRequest,
    ) -> Result<Vec<i64>> {
        let table = request.table.as_str();
        check_clone_keys(table, &self.config.id_column, &request.old_keys, &request.new_keys)?;
        let metadata = self.get_columns(&mut *conn, table).await?;
        let statement = MutationCompiler::new(&self.config, &metadata, principal)
            .clone_inactive(&request.old_keys, &request.new_keys)?;

        let ids = fetch_ids(&mut *conn, table, &statement).await?;
        if ids.is_empty() {
            return Err(EngineError::no_rows_affected(table));
        }
        tracing::info!(table, rows = ids.len(), "Cloned inactive records");
        Ok(ids)
    }

    /// Allocate the next document number of `format`
    ///
    /// Run inside the transaction that stores the document so a rollback
    /// returns the number.
    pub async fn next_sequence(&self, conn: &mut PgConnection, format: &SequenceFormat) -> Result<String> {
        SequenceGenerator::new(&self.config).next(conn, format).await
    }
}

// =============================================================================
// Execution helpers
// =============================================================================

async fn execute(conn: &mut PgConnection, table: &str, statement: &Statement) -> Result<u64> {
    tracing::debug!(table, sql = %statement.sql, params = statement.params.len(), "Executing statement");
    let arguments = statement.params.to_arguments(table)?;
    let result = sqlx::query_with(&statement.sql, arguments)
        .execute(&mut *conn)
        .await
        .map_err(EngineError::backend(table))?;
    Ok(result.rows_affected())
}

async fn execute_raw(conn: &mut PgConnection, table: &str, sql: &str) -> Result<u64> {
    tracing::debug!(table, sql, "Executing statement");
    let result = sqlx::query(sql)
        .execute(&mut *conn)
        .await
        .map_err(EngineError::backend(table))?;
    Ok(result.rows_affected())
}

/// Run statements in one transaction, summing affected rows
async fn execute_all(conn: &mut PgConnection, table: &str, statements: &[Statement]) -> Result<u64> {
    let mut tx = conn.begin().await.map_err(EngineError::backend(table))?;
    let mut affected = 0;
    for statement in statements {
        affected += execute(&mut tx, table, statement).await?;
    }
    tx.commit().await.map_err(EngineError::backend(table))?;
    Ok(affected)
}

async fn fetch_ids(conn: &mut PgConnection, table: &str, statement: &Statement) -> Result<Vec<i64>> {
    tracing::debug!(table, sql = %statement.sql, params = statement.params.len(), "Executing statement");
    let arguments = statement.params.to_arguments(table)?;
    let rows = sqlx::query_with(&statement.sql, arguments)
        .fetch_all(&mut *conn)
        .await
        .map_err(EngineError::backend(table))?;
    rows.iter()
        .map(|row| row.try_get::<i64, _>(0).map_err(EngineError::backend(table)))
        .collect()
}

async fn run_bulk(
    conn: &mut PgConnection,
    table: &str,
    primary_keys: &[String],
    plan: &BulkPlan,
) -> Result<BulkOutcome> {
    execute_raw(&mut *conn, table, &plan.create_staging).await?;

    let mut staged = 0;
    for load in &plan.load {
        staged += execute(&mut *conn, table, load).await?;
    }

    tracing::debug!(table, sql = %plan.duplicate_check, "Checking staged keys");
    let duplicate = sqlx::query(&plan.duplicate_check)
        .fetch_optional(&mut *conn)
        .await
        .map_err(EngineError::backend(table))?;
    if duplicate.is_some() {
        return Err(EngineError::invalid_argument(
            table,
            primary_keys.join(", "),
            "staged rows repeat a primary key",
        ));
    }

    let updated = execute(&mut *conn, table, &plan.update).await?;
    let inserted = execute(&mut *conn, table, &plan.insert).await?;
    let deleted = match &plan.delete {
        Some(statement) => execute(&mut *conn, table, statement).await?,
        None => 0,
    };

    Ok(BulkOutcome {
        staged,
        updated,
        inserted,
        deleted,
    })
}
