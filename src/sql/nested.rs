//! Nested-structure query compilation
//!
//! A search is compiled into one SELECT whose rows are JSON objects tagged
//! with `objectType`. Single references become embedded objects read through
//! a LEFT JOIN, polymorphic references become a CASE over the discriminator
//! with one embedded object per target table. The whole result is
//! aggregated into a JSON array and split server-side into fixed-size text
//! chunks, which the caller streams back and feeds to a [`ChunkAssembler`].

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use sqlx::PgConnection;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::metadata::MetadataRepository;
use crate::request::SearchRequest;
use crate::sql::condition::ConditionCompiler;
use crate::sql::params::{Params, SqlValue, Statement};
use crate::sql::sanitize::{qualified, quoted, sanitize_identifier, string_literal};
use crate::types::{ColumnDescriptor, ColumnKind, TableMetadata};

const OBJECT_TYPE: &str = "objectType";

// ============================================================================
// Schema
// ============================================================================

/// Metadata of a root table plus every table its references can reach
#[derive(Debug, Clone)]
pub struct NestedSchema {
    pub root: TableMetadata,
    /// Target tables of single and polymorphic references, by table name
    pub referenced: HashMap<String, TableMetadata>,
    /// Enumerated target tables, by polymorphic column name
    pub polymorphic_targets: HashMap<String, Vec<String>>,
}

impl NestedSchema {
    pub fn new(root: TableMetadata) -> Self {
        Self {
            root,
            referenced: HashMap::new(),
            polymorphic_targets: HashMap::new(),
        }
    }

    pub fn with_reference(mut self, metadata: TableMetadata) -> Self {
        self.referenced.insert(metadata.table.clone(), metadata);
        self
    }

    pub fn with_polymorphic_targets<I, S>(mut self, column: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.polymorphic_targets
            .insert(column.into(), targets.into_iter().map(Into::into).collect());
        self
    }

    /// Load the root table and one level of referenced tables
    pub async fn load(
        repository: &MetadataRepository<'_>,
        conn: &mut PgConnection,
        table: &str,
    ) -> Result<Self> {
        let root = repository.get_columns(&mut *conn, table).await?;
        let references: Vec<(String, ColumnKind, String)> = root
            .columns
            .iter()
            .filter(|c| c.kind.is_reference())
            .filter_map(|c| {
                c.data_source
                    .as_ref()
                    .map(|source| (c.name.clone(), c.kind, source.clone()))
            })
            .collect();

        let mut schema = Self::new(root);
        for (column, kind, source) in references {
            match kind {
                ColumnKind::SingleReference => {
                    schema.load_reference(repository, conn, &source).await?;
                }
                ColumnKind::PolymorphicListReference => {
                    let targets = repository.get_reference_targets(&mut *conn, &source).await?;
                    for target in &targets {
                        schema.load_reference(repository, conn, target).await?;
                    }
                    schema.polymorphic_targets.insert(column, targets);
                }
                ColumnKind::Plain | ColumnKind::Localized => {}
            }
        }
        Ok(schema)
    }

    async fn load_reference(
        &mut self,
        repository: &MetadataRepository<'_>,
        conn: &mut PgConnection,
        table: &str,
    ) -> Result<()> {
        if !self.referenced.contains_key(table) {
            let metadata = repository.get_columns(&mut *conn, table).await?;
            self.referenced.insert(table.to_string(), metadata);
        }
        Ok(())
    }

    fn reference(&self, table: &str) -> Result<&TableMetadata> {
        self.referenced
            .get(table)
            .ok_or_else(|| EngineError::schema_not_found(table))
    }

    fn targets(&self, column: &str) -> &[String] {
        self.polymorphic_targets
            .get(column)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ============================================================================
// Result and reassembly
// ============================================================================

/// Outcome of a nested read
#[derive(Debug, Clone, PartialEq)]
pub enum NestedResult {
    Rows(Vec<Value>),
    /// The query matched no rows
    NoData,
}

impl NestedResult {
    pub fn is_no_data(&self) -> bool {
        matches!(self, NestedResult::NoData)
    }

    pub fn rows(&self) -> &[Value] {
        match self {
            NestedResult::Rows(rows) => rows,
            NestedResult::NoData => &[],
        }
    }

    pub fn into_rows(self) -> Vec<Value> {
        match self {
            NestedResult::Rows(rows) => rows,
            NestedResult::NoData => Vec::new(),
        }
    }
}

/// Concatenates streamed chunks back into the JSON document
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    body: String,
    chunks: usize,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next chunk; a NULL chunk carries no text
    pub fn push(&mut self, chunk: Option<&str>) {
        self.chunks += 1;
        if let Some(text) = chunk {
            self.body.push_str(text);
        }
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn finish(self) -> Result<NestedResult> {
        if self.body.trim().is_empty() {
            return Ok(NestedResult::NoData);
        }
        let rows: Vec<Value> = serde_json::from_str(&self.body)?;
        if rows.is_empty() {
            Ok(NestedResult::NoData)
        } else {
            Ok(NestedResult::Rows(rows))
        }
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Hands out one alias per join, suffixing repeats with `_2`, `_3`, ...
#[derive(Debug, Default)]
struct AliasAllocator {
    used: HashSet<String>,
}

impl AliasAllocator {
    fn allocate(&mut self, table: &str) -> String {
        let base = sanitize_identifier(table);
        let mut alias = base.clone();
        let mut n = 1;
        while !self.used.insert(alias.clone()) {
            n += 1;
            alias = format!("{}_{}", base, n);
        }
        alias
    }
}

/// Column filter built from a request allow-list
enum AllowList {
    All,
    Only(HashSet<String>),
}

impl AllowList {
    fn allows(&self, column: &str) -> bool {
        match self {
            AllowList::All => true,
            AllowList::Only(names) => names.contains(column),
        }
    }
}

/// Compiles a [`SearchRequest`] against a loaded [`NestedSchema`]
pub struct NestedQueryCompiler<'a> {
    config: &'a EngineConfig,
    schema: &'a NestedSchema,
}

impl<'a> NestedQueryCompiler<'a> {
    pub fn new(config: &'a EngineConfig, schema: &'a NestedSchema) -> Self {
        Self { config, schema }
    }

    /// Chunked statement returning one `chunk` text column, ordered
    pub fn compile(&self, request: &SearchRequest) -> Result<Statement> {
        let select = self.compile_select(request)?;
        let size = self.config.json_chunk_size.max(1);
        let sql = format!(
            "SELECT substr(doc.body, (chunk.n - 1) * {size} + 1, {size}) AS chunk \
             FROM (SELECT json_agg(q)::text AS body FROM ({inner}) q) doc \
             CROSS JOIN LATERAL generate_series(1, GREATEST(1, CEIL(LENGTH(doc.body) / {size}::numeric)::int)) AS chunk(n) \
             ORDER BY chunk.n",
            size = size,
            inner = select.sql,
        );
        Ok(Statement::new(sql, select.params))
    }

    /// The row-producing SELECT, one row per object
    pub fn compile_select(&self, request: &SearchRequest) -> Result<Statement> {
        let root = &self.schema.root;
        let table = root.table.as_str();
        let id = self.config.id_column.as_str();
        let discriminator = self.config.discriminator_column.as_str();

        let root_allow = self.root_allow_list(request)?;
        self.check_foreign_allow_lists(request)?;

        let projected: Vec<&ColumnDescriptor> = root
            .columns
            .iter()
            .filter(|c| c.name != id && root_allow.allows(&c.name))
            .collect();

        let mut params = Params::new();
        let locale = self
            .needs_locale(request, &projected)?
            .then(|| params.push_text(request.effective_locale(self.config)));
        let locale = locale.as_deref();

        let mut aliases = AliasAllocator::default();
        let root_alias = aliases.allocate(table);

        let mut select = vec![
            format!("{} AS {}", string_literal(table), quoted(OBJECT_TYPE)),
            format!("{} AS {}", qualified(&root_alias, id), quoted(id)),
        ];
        let mut joins = Vec::new();

        for column in projected {
            let expr = match column.kind {
                ColumnKind::Plain | ColumnKind::Localized => {
                    self.column_expr(column, &root_alias, request.localize, locale)
                }
                ColumnKind::SingleReference => {
                    let source = column.data_source.as_deref().unwrap_or_default();
                    let target = self.schema.reference(source)?;
                    let alias = aliases.allocate(&target.table);
                    joins.push(self.join(
                        target,
                        &alias,
                        &qualified(&root_alias, &column.name),
                        None,
                    ));
                    self.embedded_object(target, &alias, request, locale)
                }
                ColumnKind::PolymorphicListReference => {
                    let mut branches = Vec::new();
                    for target_name in self.schema.targets(&column.name) {
                        let target = self.schema.reference(target_name)?;
                        let alias = aliases.allocate(&target.table);
                        joins.push(self.join(
                            target,
                            &alias,
                            &qualified(&root_alias, &column.name),
                            Some((
                                qualified(&root_alias, discriminator).as_str(),
                                target.table.as_str(),
                            )),
                        ));
                        branches.push(format!(
                            "WHEN {} THEN {}",
                            string_literal(&target.table),
                            self.embedded_object(target, &alias, request, locale)
                        ));
                    }
                    if branches.is_empty() {
                        "NULL".to_string()
                    } else {
                        format!(
                            "CASE {} {} END",
                            qualified(&root_alias, discriminator),
                            branches.join(" ")
                        )
                    }
                }
            };
            select.push(format!("{} AS {}", expr, quoted(&column.name)));
        }

        if root.has_polymorphic()
            && !root.has_column(discriminator)
            && root_allow.allows(discriminator)
        {
            select.push(format!(
                "{} AS {}",
                qualified(&root_alias, discriminator),
                quoted(discriminator)
            ));
        }

        let mut filters = Vec::new();
        if self.config.soft_delete {
            filters.push(format!(
                "{} = FALSE",
                qualified(&root_alias, &self.config.deleted_column)
            ));
        }
        if root.has_polymorphic() {
            filters.push(self.discriminator_filter(&root_alias, &mut params));
        }

        let conditions = ConditionCompiler::new(table)
            .with_alias(&root_alias)
            .with_metadata(self.config, root);
        let conditions = match locale {
            Some(placeholder) => conditions.with_locale_placeholder(placeholder),
            None => conditions,
        };
        let compiled = conditions.compile(&request.and, &request.or, &request.order, &mut params)?;
        if let Some(predicate) = compiled.predicate {
            filters.push(format!("({})", predicate));
        }
        let order_by = compiled
            .order_by
            .unwrap_or_else(|| format!("{} ASC", qualified(&root_alias, id)));

        let mut sql = format!(
            "SELECT {} FROM {} AS {}",
            select.join(", "),
            quoted(table),
            quoted(&root_alias)
        );
        for join in &joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filters.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_by);

        if let Some(limit) = request.limit {
            let placeholder = self.paging_param(table, "limit", limit, &mut params)?;
            sql.push_str(&format!(" LIMIT {}", placeholder));
        }
        if let Some(offset) = request.offset {
            let placeholder = self.paging_param(table, "offset", offset, &mut params)?;
            sql.push_str(&format!(" OFFSET {}", placeholder));
        }

        Ok(Statement::new(sql, params))
    }

    /// Plain or locale-extracted value of one column
    fn column_expr(
        &self,
        column: &ColumnDescriptor,
        alias: &str,
        localize: bool,
        locale: Option<&str>,
    ) -> String {
        match (column.kind, localize, locale) {
            (ColumnKind::Localized, true, Some(placeholder)) => format!(
                "COALESCE({} ->> {}, CAST({} AS TEXT))",
                qualified(alias, &column.name),
                placeholder,
                qualified(alias, &self.config.id_column)
            ),
            _ => qualified(alias, &column.name),
        }
    }

    /// Correlated sub-select building the embedded object of a joined row
    ///
    /// References of the target table are projected as raw ids; expansion
    /// stops at one level.
    fn embedded_object(
        &self,
        target: &TableMetadata,
        alias: &str,
        request: &SearchRequest,
        locale: Option<&str>,
    ) -> String {
        let id = self.config.id_column.as_str();
        let allow = self.foreign_allow_list(request, &target.table);

        let mut fields = vec![
            format!("{} AS {}", string_literal(&target.table), quoted(OBJECT_TYPE)),
            format!("{} AS {}", qualified(alias, id), quoted(id)),
        ];
        for column in target
            .columns
            .iter()
            .filter(|c| c.name != id && allow.allows(&c.name))
        {
            fields.push(format!(
                "{} AS {}",
                self.column_expr(column, alias, request.localize, locale),
                quoted(&column.name)
            ));
        }

        format!(
            "(SELECT row_to_json(obj) FROM (SELECT {}) obj WHERE {} IS NOT NULL)",
            fields.join(", "),
            qualified(alias, id)
        )
    }

    fn join(
        &self,
        target: &TableMetadata,
        alias: &str,
        source: &str,
        discriminator: Option<(&str, &str)>,
    ) -> String {
        let mut on = vec![format!(
            "{} = {}",
            qualified(alias, &self.config.id_column),
            source
        )];
        if let Some((column, value)) = discriminator {
            on.push(format!("{} = {}", column, string_literal(value)));
        }
        if self.config.soft_delete {
            on.push(format!(
                "{} = FALSE",
                qualified(alias, &self.config.deleted_column)
            ));
        }
        format!(
            "LEFT JOIN {} AS {} ON {}",
            quoted(&target.table),
            quoted(alias),
            on.join(" AND ")
        )
    }

    /// Restrict rows to discriminator values naming a known target
    fn discriminator_filter(&self, root_alias: &str, params: &mut Params) -> String {
        let mut targets: Vec<&str> = Vec::new();
        for column in self
            .schema
            .root
            .columns
            .iter()
            .filter(|c| c.kind == ColumnKind::PolymorphicListReference)
        {
            for target in self.schema.targets(&column.name) {
                if !targets.contains(&target.as_str()) {
                    targets.push(target);
                }
            }
        }

        if targets.is_empty() {
            return "FALSE".to_string();
        }
        let placeholders: Vec<String> = targets.into_iter().map(|t| params.push_text(t)).collect();
        format!(
            "{} IN ({})",
            qualified(root_alias, &self.config.discriminator_column),
            placeholders.join(", ")
        )
    }

    /// Whether any projection or condition reads a localized value
    fn needs_locale(&self, request: &SearchRequest, projected: &[&ColumnDescriptor]) -> Result<bool> {
        let root = &self.schema.root;
        let localized_field = |name: &str| {
            root.column(&sanitize_identifier(name))
                .is_some_and(|c| c.kind == ColumnKind::Localized)
        };
        if request
            .and
            .terms()
            .iter()
            .chain(request.or.terms())
            .any(|t| localized_field(&t.field))
            || request.order.iter().any(|o| localized_field(&o.field))
        {
            return Ok(true);
        }
        if !request.localize {
            return Ok(false);
        }

        for column in projected {
            let reached: Vec<&str> = match column.kind {
                ColumnKind::Localized => return Ok(true),
                ColumnKind::SingleReference => column.data_source.as_deref().into_iter().collect(),
                ColumnKind::PolymorphicListReference => self
                    .schema
                    .targets(&column.name)
                    .iter()
                    .map(String::as_str)
                    .collect(),
                ColumnKind::Plain => Vec::new(),
            };
            for table in reached {
                let target = self.schema.reference(table)?;
                let allow = self.foreign_allow_list(request, &target.table);
                if target
                    .columns
                    .iter()
                    .any(|c| c.kind == ColumnKind::Localized && allow.allows(&c.name))
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn root_allow_list(&self, request: &SearchRequest) -> Result<AllowList> {
        let Some(names) = &request.select_columns else {
            return Ok(AllowList::All);
        };
        let root = &self.schema.root;
        let mut allowed = HashSet::new();
        for name in names {
            let known = root.has_column(name)
                || name == &self.config.id_column
                || name == OBJECT_TYPE
                || (root.has_polymorphic() && name == &self.config.discriminator_column);
            if !known {
                return Err(EngineError::invalid_query(
                    &root.table,
                    name,
                    "selected column is not a column of the table",
                ));
            }
            allowed.insert(name.clone());
        }
        Ok(AllowList::Only(allowed))
    }

    fn check_foreign_allow_lists(&self, request: &SearchRequest) -> Result<()> {
        let Some(lists) = &request.select_foreign_columns else {
            return Ok(());
        };
        for (table, names) in lists {
            let target = self.schema.referenced.get(table).ok_or_else(|| {
                EngineError::invalid_query(&self.schema.root.table, table, "table is not referenced")
            })?;
            if let Some(name) = names.iter().find(|n| {
                !target.has_column(n) && **n != self.config.id_column && *n != OBJECT_TYPE
            }) {
                return Err(EngineError::invalid_query(
                    table,
                    name,
                    "selected column is not a column of the referenced table",
                ));
            }
        }
        Ok(())
    }

    fn foreign_allow_list(&self, request: &SearchRequest, table: &str) -> AllowList {
        match request
            .select_foreign_columns
            .as_ref()
            .and_then(|lists| lists.get(table))
        {
            Some(names) => AllowList::Only(names.iter().cloned().collect()),
            None => AllowList::All,
        }
    }

    fn paging_param(&self, table: &str, field: &str, value: i64, params: &mut Params) -> Result<String> {
        if value < 0 {
            return Err(EngineError::invalid_query(table, field, "must not be negative"));
        }
        Ok(params.push(SqlValue::Integer(value), "BIGINT"))
    }
}
