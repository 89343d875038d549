//! Errors raised while parsing entity metadata and search specifications.

use thiserror::Error;

/// Errors produced when turning untyped input into metadata or search types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A column data-type tag outside the supported set.
    #[error("TypeNotSupported: {0}")]
    UnknownDataType(String),

    /// An advanced search condition with an unrecognized `mode`.
    #[error("Unknown mode: {0}")]
    UnknownSearchMode(String),

    /// A search specification that is not shaped like one.
    #[error("invalid search specification: {0}")]
    InvalidSearch(String),
}

/// Convenience alias for results with [`ParseError`].
pub type Result<T> = std::result::Result<T, ParseError>;
