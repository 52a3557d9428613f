//! Configuration for the engine
//!
//! Provides a builder pattern for naming the metadata tables and the
//! system columns every data table carries.

/// Names of the audit columns maintained on every row
#[derive(Debug, Clone)]
pub struct AuditColumns {
    /// Principal that inserted the row
    pub created_by: String,
    /// Principal that last touched the row
    pub modified_by: String,
    /// Timestamp refreshed on every update (`None` disables it)
    pub modified_at: Option<String>,
}

impl Default for AuditColumns {
    fn default() -> Self {
        Self {
            created_by: "created_by".to_string(),
            modified_by: "modified_by".to_string(),
            modified_at: Some("modified_at".to_string()),
        }
    }
}

/// Configuration for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Metadata table listing logical tables (default: "item_type")
    pub item_type_table: String,
    /// Metadata table listing columns per logical table (default: "property")
    pub property_table: String,
    /// Lookup source enumerating polymorphic targets (default: "reference_list")
    pub reference_list_table: String,
    /// Identity column present on every data table (default: "id")
    pub id_column: String,
    /// Audit columns injected by the engine
    pub audit_columns: AuditColumns,
    /// Whether deletes flip the deleted flag instead of removing rows
    pub soft_delete: bool,
    /// Soft-delete flag column (default: "deleted")
    pub deleted_column: String,
    /// Discriminator column of polymorphic references (default: "sourceType")
    pub discriminator_column: String,
    /// Column cleared on cloned draft records (default: "isActive")
    pub active_column: String,
    /// Locale used when a localized value arrives as plain text
    pub default_locale: String,
    /// Maximum characters per streamed JSON chunk (default: 2033)
    pub json_chunk_size: usize,
    /// Maximum rows per staging insert batch (default: 1000)
    pub bulk_batch_rows: usize,
    /// Counter table used by the sequence helper (default: "document_sequence")
    pub sequence_table: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfigBuilder::new().build()
    }
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Column names callers may never write directly
    pub fn reserved_columns(&self) -> Vec<&str> {
        let mut reserved = vec![
            self.id_column.as_str(),
            self.audit_columns.created_by.as_str(),
            self.audit_columns.modified_by.as_str(),
            self.deleted_column.as_str(),
        ];
        if let Some(modified_at) = &self.audit_columns.modified_at {
            reserved.push(modified_at.as_str());
        }
        reserved
    }

    pub fn is_reserved(&self, column: &str) -> bool {
        self.reserved_columns().contains(&column)
    }
}

/// Builder for EngineConfig
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig {
                item_type_table: "item_type".to_string(),
                property_table: "property".to_string(),
                reference_list_table: "reference_list".to_string(),
                id_column: "id".to_string(),
                audit_columns: AuditColumns::default(),
                soft_delete: true,
                deleted_column: "deleted".to_string(),
                discriminator_column: "sourceType".to_string(),
                active_column: "isActive".to_string(),
                default_locale: "en".to_string(),
                json_chunk_size: 2033,
                bulk_batch_rows: 1000,
                sequence_table: "document_sequence".to_string(),
            },
        }
    }

    /// Set the metadata table names in one call
    pub fn metadata_tables(
        mut self,
        item_type: impl Into<String>,
        property: impl Into<String>,
        reference_list: impl Into<String>,
    ) -> Self {
        self.config.item_type_table = item_type.into();
        self.config.property_table = property.into();
        self.config.reference_list_table = reference_list.into();
        self
    }

    pub fn id_column(mut self, name: impl Into<String>) -> Self {
        self.config.id_column = name.into();
        self
    }

    pub fn audit_columns(mut self, audit: AuditColumns) -> Self {
        self.config.audit_columns = audit;
        self
    }

    /// Disable the `modified_at` timestamp refresh
    pub fn without_modified_at(mut self) -> Self {
        self.config.audit_columns.modified_at = None;
        self
    }

    /// Enable or disable soft delete (default: true)
    pub fn soft_delete(mut self, enabled: bool) -> Self {
        self.config.soft_delete = enabled;
        self
    }

    pub fn deleted_column(mut self, name: impl Into<String>) -> Self {
        self.config.deleted_column = name.into();
        self
    }

    pub fn discriminator_column(mut self, name: impl Into<String>) -> Self {
        self.config.discriminator_column = name.into();
        self
    }

    pub fn active_column(mut self, name: impl Into<String>) -> Self {
        self.config.active_column = name.into();
        self
    }

    pub fn default_locale(mut self, locale: impl Into<String>) -> Self {
        self.config.default_locale = locale.into();
        self
    }

    /// Set the streamed chunk size; zero is clamped to one
    pub fn json_chunk_size(mut self, size: usize) -> Self {
        self.config.json_chunk_size = size.max(1);
        self
    }

    pub fn bulk_batch_rows(mut self, rows: usize) -> Self {
        self.config.bulk_batch_rows = rows.max(1);
        self
    }

    pub fn sequence_table(mut self, name: impl Into<String>) -> Self {
        self.config.sequence_table = name.into();
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
