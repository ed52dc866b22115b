//! Domain error types

use thiserror::Error;

/// Domain-level errors that can occur during validation or parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier is invalid or empty.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A role name is not one of the known roles.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// A resource type is empty or not a valid path segment.
    #[error("invalid resource type: {0}")]
    InvalidResource(String),

    /// A sort order is not `asc` or `desc`.
    #[error("invalid sort order: {0}")]
    InvalidSortOrder(String),

    /// The HTTP method is not supported.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// A configuration value is invalid.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
