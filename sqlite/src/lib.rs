//! SQLite storage for typed entities.
//!
//! This crate maps entities described by an
//! [`EntityConfig`](sqlcon_core::EntityConfig) onto tables of a single
//! embedded SQLite file owned by one host module. Entities are plain `serde`
//! types; values that differ between memory and storage (dates, JSON
//! documents, booleans) are converted on the way in and out.
//!
//! # Architecture
//!
//! The crate is organized into six modules:
//!
//! - **`schema`**: data type resolution and `CREATE TABLE` generation
//! - **`convert`**: special-value conversion and the entity codec
//! - **`search`**: `WHERE` clause construction from search specs
//! - **`connector`**: connection lifecycle, entity CRUD, and config records
//! - **`config`**: host module configuration and database path resolution
//! - **`error`**: the crate error type
//!
//! # Quick start
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use sqlcon_core::{
//!     ColumnMeta, Condition, DataType, EntityConfig, ListQuery, OrderBy, SearchSpec,
//! };
//! use sqlcon_sqlite::Connector;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Task {
//!     e_id: Option<i64>,
//!     title: String,
//!     done: bool,
//! }
//!
//! let mut db = Connector::with_path(":memory:", "1");
//! db.connect().unwrap();
//!
//! let tasks = EntityConfig::new("Task")
//!     .with_column("e_id", ColumnMeta::serial())
//!     .with_column("title", ColumnMeta::new(DataType::Text))
//!     .with_column("done", ColumnMeta::new(DataType::Boolean));
//! db.init_entity(&tasks).unwrap();
//!
//! for title in ["write docs", "review docs"] {
//!     db.create_entity(&tasks, &Task { e_id: None, title: title.into(), done: false })
//!         .unwrap();
//! }
//!
//! let query = ListQuery::new()
//!     .with_search(SearchSpec::new().with_condition("title", Condition::like("review")))
//!     .with_order(OrderBy::asc("title"));
//! let found: Vec<Task> = db.get_entity_list(&tasks, &query).unwrap();
//! assert_eq!(found.len(), 1);
//! assert!(!found[0].done);
//! ```
//!
//! # Identifiers
//!
//! Table and column names are interpolated into SQL and must be plain
//! identifiers (ASCII letters, digits, and underscores, not starting with a
//! digit). Every value is bound as a statement parameter.

mod config;
mod connector;
mod convert;
mod error;
mod schema;
mod search;

pub use config::{ConfigStore, DB_PATH_KEY, HostModule, ModuleConfig, resolve_db_path};
pub use connector::{ConfigRecord, Connector, DB_VERSION_KEY, DEFAULT_SCHEMA, RawQuery, RunResult};
pub use convert::{
    Encoded, Record, StoredRow, decode, decode_many, encode, from_record, from_storage,
    to_record, to_storage,
};
pub use error::{Result, SqlConError};
pub use rusqlite::types::Value as SqlValue;
pub use schema::{
    CONFIG_TABLE, compile_column, compile_inferred_column, create_table_sql,
    create_table_sql_inferred, ensure_valid, quote_identifier, resolve_db_type,
    validate_identifier,
};
pub use search::{WhereClause, build_search};
