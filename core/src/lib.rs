//! Core entity metadata and query specification types.
//!
//! This crate defines the storage-agnostic vocabulary of the sqlcon entity
//! mapper:
//!
//! - [`EntityConfig`]: table name, identity column, and ordered
//!   [`ColumnMeta`] descriptors for one entity type.
//! - [`DataType`]: the logical column type tags.
//! - [`SearchSpec`]: declarative filters built from literals and advanced
//!   [`Condition`]s.
//! - [`ListQuery`]: filter plus [`OrderBy`] entries, limit, and offset.
//! - [`EntityId`]: identity values under an [`IdentityPolicy`].
//!
//! Validation ([`validate_entity_config`]) catches structural errors such as
//! a missing identity column or competing primary keys before any SQL is
//! generated.
//!
//! # Example
//!
//! ```
//! use sqlcon_core::*;
//!
//! let config = EntityConfig::new("Person")
//!     .with_key("id")
//!     .with_column("id", ColumnMeta::serial())
//!     .with_column("name", ColumnMeta::new(DataType::Text))
//!     .with_column("born", ColumnMeta::new(DataType::Date).nullable());
//! assert!(validate_entity_config(&config).is_empty());
//!
//! let query = ListQuery::new()
//!     .with_search(SearchSpec::new().with_condition("name", Condition::like("an")))
//!     .with_order(OrderBy::asc("name"))
//!     .with_limit(5);
//! assert!(!query.search.is_empty());
//! ```

mod error;
mod query;
mod types;
mod validate;

pub use error::{ParseError, Result};
pub use query::{Condition, Direction, ListQuery, OrderBy, SearchMode, SearchSpec, SearchTerm};
pub use types::*;
pub use validate::{ValidationError, validate_entity_config};
