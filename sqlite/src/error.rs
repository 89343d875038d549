//! Error types for entity mapping and storage operations.
//!
//! Structural problems (missing metadata, unsupported types, malformed
//! searches) are reported as distinct variants so callers can tell a
//! configuration bug from a storage failure. "Not found" is never an error;
//! operations report it as `false`, `None`, or an empty list.

use sqlcon_core::{IdentityPolicy, ParseError};
use thiserror::Error;

/// Errors that can occur while mapping entities to SQLite.
#[derive(Debug, Error)]
pub enum SqlConError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// JSON serialization failure while encoding or decoding an entity.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure of a module configuration.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// No storage directory could be resolved from the host configuration.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// A field has no column metadata in the entity config.
    #[error("No col meta: {entity}.{field}")]
    MetadataMissing { entity: String, field: String },

    /// A column type cannot be mapped to a storage type.
    #[error("TypeNotSupported: {0}")]
    TypeNotSupported(String),

    /// A search condition uses an unrecognized mode.
    #[error("Unknown mode: {0}")]
    UnknownSearchMode(String),

    /// Internal encoding produced mismatched output sequences.
    #[error("Invalid output length: {0}")]
    ConsistencyViolation(String),

    /// An insert did not yield a readable row.
    #[error("entity create failed: {0}")]
    EntityCreateFailed(String),

    /// A value cannot be converted to or from its stored form.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// A table, column, or schema name is not a plain SQL identifier.
    #[error("invalid identifier '{0}': must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier(String),

    /// The entity config failed structural validation.
    #[error("invalid entity config '{entity}': {reason}")]
    InvalidEntityConfig { entity: String, reason: String },

    /// An identity value does not match the entity's identity policy.
    #[error("identity of '{entity}' must be {expected:?}, got '{found}'")]
    IdentityMismatch {
        entity: String,
        expected: IdentityPolicy,
        found: String,
    },

    /// An operation was attempted without an open connection.
    #[error("not connected")]
    NotConnected,
}

impl From<ParseError> for SqlConError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::UnknownDataType(tag) => SqlConError::TypeNotSupported(tag),
            ParseError::UnknownSearchMode(mode) => SqlConError::UnknownSearchMode(mode),
            ParseError::InvalidSearch(reason) => SqlConError::ConversionError(reason),
        }
    }
}

/// Convenience alias for results with [`SqlConError`].
pub type Result<T> = std::result::Result<T, SqlConError>;
