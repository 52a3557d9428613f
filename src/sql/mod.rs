//! SQL generation for the engine
//!
//! Sanitization, typed parameters and the statement compilers. Nothing in
//! this module talks to the database.

pub mod condition;
pub mod mutation;
pub mod nested;
pub mod params;
pub mod sanitize;

pub use condition::{ConditionCompiler, ConditionGroup, ConditionOperator, ConditionTerm, OrderTerm};
pub use mutation::MutationCompiler;
pub use nested::{ChunkAssembler, NestedQueryCompiler, NestedResult, NestedSchema};
pub use params::{Params, SqlValue, Statement};
pub use sanitize::{quote_identifier, sanitize_identifier};
