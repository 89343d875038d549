//! Entity configuration validation.
//!
//! Checks the structural invariants of an [`EntityConfig`] before it is used
//! to generate DDL or statements: names are present and unique, the identity
//! column exists and matches the identity policy, and serial or primary-key
//! columns do not compete with the identity column.
//!
//! # Examples
//!
//! ```
//! use sqlcon_core::*;
//!
//! let config = EntityConfig::new("Person")
//!     .with_column("e_id", ColumnMeta::serial())
//!     .with_column("name", ColumnMeta::new(DataType::Text));
//! assert!(validate_entity_config(&config).is_empty());
//!
//! // Invalid: no identity column
//! let bad = EntityConfig::new("Person").with_column("name", ColumnMeta::new(DataType::Text));
//! assert!(!validate_entity_config(&bad).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{DataType, EntityConfig, IdentityPolicy};

/// Entity configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Entity name is empty or whitespace-only.
    #[error("entity name cannot be empty")]
    EmptyEntityName,
    /// A column name is empty or whitespace-only.
    #[error("column name cannot be empty")]
    EmptyColumnName,
    /// Two columns share a name.
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
    /// The identity column has no metadata.
    #[error("identity column '{0}' is not declared")]
    MissingIdentityColumn(String),
    /// The identity column is declared only with different letter case.
    #[error("identity column '{0}' is declared with different letter case")]
    IdentityCaseMismatch(String),
    /// The identity column's data type does not fit the identity policy.
    #[error("identity column '{column}' cannot be {data_type} under the {policy:?} policy")]
    IdentityTypeMismatch {
        column: String,
        data_type: DataType,
        policy: IdentityPolicy,
    },
    /// A serial column without the primary-key flag.
    #[error("serial column '{0}' must be the primary key")]
    SerialNotPrimaryKey(String),
    /// A primary key or serial column other than the identity column.
    #[error("column '{0}' competes with the identity column for the primary key")]
    ExtraPrimaryKey(String),
}

/// Validates an entity configuration.
///
/// Returns every problem found; an empty vector means the config is usable.
///
/// # Examples
///
/// ```
/// use sqlcon_core::*;
///
/// // A serial column beside the identity column
/// let config = EntityConfig::new("Order")
///     .with_column("e_id", ColumnMeta::new(DataType::Int))
///     .with_column("seq", ColumnMeta::serial());
/// let errors = validate_entity_config(&config);
/// assert!(errors.contains(&ValidationError::ExtraPrimaryKey("seq".into())));
/// ```
pub fn validate_entity_config(config: &EntityConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.name.trim().is_empty() {
        errors.push(ValidationError::EmptyEntityName);
    }

    // SQLite column names are case-insensitive
    let mut seen: HashSet<String> = HashSet::new();
    for (name, meta) in &config.columns {
        if name.trim().is_empty() {
            errors.push(ValidationError::EmptyColumnName);
            continue;
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            errors.push(ValidationError::DuplicateColumn(name.clone()));
        }

        if meta.data_type == DataType::Serial && !meta.primary_key {
            errors.push(ValidationError::SerialNotPrimaryKey(name.clone()));
        }
        let is_key = name.eq_ignore_ascii_case(&config.key);
        if !is_key && (meta.primary_key || meta.data_type == DataType::Serial) {
            errors.push(ValidationError::ExtraPrimaryKey(name.clone()));
        }
    }

    match config.key_meta() {
        None if config.columns.iter().any(|(name, _)| name.eq_ignore_ascii_case(&config.key)) => {
            errors.push(ValidationError::IdentityCaseMismatch(config.key.clone()));
        }
        None => errors.push(ValidationError::MissingIdentityColumn(config.key.clone())),
        Some(meta) if !config.identity.accepts(meta.data_type) => {
            errors.push(ValidationError::IdentityTypeMismatch {
                column: config.key.clone(),
                data_type: meta.data_type,
                policy: config.identity,
            });
        }
        Some(_) => {}
    }

    errors
}
