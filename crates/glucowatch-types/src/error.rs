//! Error types for data parsing in glucowatch-types.

use thiserror::Error;

/// Errors that can occur when parsing glucose monitor data.
///
/// This error type is platform-agnostic and does not include
/// storage or collaborator errors (those belong in glucowatch-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A sensor alert type name was not recognized.
    #[error("Unknown alert type: {0}")]
    UnknownAlertType(String),

    /// A glucose alert type name was not recognized.
    #[error("Unknown glucose alert type: {0}")]
    UnknownGlucoseAlertType(String),

    /// A field held a value outside its valid range.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using glucowatch-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
