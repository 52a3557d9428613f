//! # itemtype-engine
//!
//! A metadata-driven query and mutation engine for PostgreSQL tables whose
//! shape is described at runtime.
//!
//! Logical tables and their columns live in a metadata store (`item_type`,
//! `property` and `reference_list` by default). The engine reads that
//! metadata on every call and compiles declarative requests into
//! parameterized SQL.
//!
//! ## Features
//!
//! - **Condition Compiler**: AND/OR groups and ordering with a fixed operator set
//! - **Nested Reads**: single and polymorphic references embedded as JSON objects,
//!   localized columns, result streamed in chunks and reassembled
//! - **Generic Mutations**: create, upsert, update, delete, batch and bulk
//!   reconciliation through a staging table, clone as inactive draft
//! - **Sequences**: gapless per-group document numbers
//! - **SQL Injection Prevention**: identifiers are sanitized and quoted, values always bound
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use itemtype_engine::{ConditionTerm, Engine, EngineConfig, KeyedRequest, OrderTerm, SearchRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = sqlx::PgPool::connect("postgres://localhost/mydb").await?;
//!     let mut conn = pool.acquire().await?;
//!     let engine = Engine::new(EngineConfig::default());
//!
//!     // Orders shipped on a given day, customer embedded
//!     let orders = engine
//!         .search(
//!             &mut conn,
//!             &SearchRequest::new("order")
//!                 .and(ConditionTerm::eq("shippedDate", "2025-10-15"))
//!                 .order_by(OrderTerm::desc("amount")),
//!         )
//!         .await?;
//!     for order in orders.rows() {
//!         println!("{} -> {}", order["id"], order["customerId"]["name"]);
//!     }
//!
//!     // Insert-or-update by business key
//!     let outcome = engine
//!         .upsert(
//!             &mut conn,
//!             "importer",
//!             &KeyedRequest::new(
//!                 "product",
//!                 ["code"],
//!                 serde_json::json!({"code": "A-1", "price": "19.90"}),
//!             ),
//!         )
//!         .await?;
//!     println!("{:?}", outcome);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use itemtype_engine::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .metadata_tables("item_type", "property", "reference_list")
//!     .soft_delete(true)             // Deletes flip the `deleted` flag (default)
//!     .discriminator_column("sourceType")
//!     .default_locale("en")
//!     .json_chunk_size(2033)         // Characters per streamed chunk
//!     .build();
//! ```
//!
//! ## Connections
//!
//! The engine never opens connections. Every operation borrows the
//! `PgConnection` it should run on; pass `&mut *tx` to run inside a
//! transaction you own.

pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod request;
pub mod sequence;
pub mod sql;
pub mod types;

// Re-export main types for convenience
pub use config::{AuditColumns, EngineConfig, EngineConfigBuilder};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use metadata::MetadataRepository;
pub use request::{
    BatchRequest, BulkOutcome, BulkRequest, CloneRequest, CreateRequest, DeleteMode, KeyedRequest,
    RowPayload, RowTable, SearchRequest, UpsertOutcome, WriteOutcome,
};
pub use sequence::{SequenceFormat, SequenceGenerator};
pub use sql::condition::{ConditionGroup, ConditionOperator, ConditionTerm, OrderTerm, SortDirection};
pub use sql::nested::NestedResult;
pub use types::{ColumnDescriptor, ColumnKind, DeclaredType, TableMetadata};

// Re-export SQL utilities for advanced users
pub use sql::sanitize::{quote_identifier, sanitize_identifier};
