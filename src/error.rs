// src/error.rs

use thiserror::Error;

/// Core error types for the transaction engine
///
/// Anything that can be reported as a problem (unsatisfied dependencies,
/// file conflicts, disk space) is collected into a `ProblemSet` instead.
/// These variants are reserved for failures that make further progress
/// meaningless.
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Report serialization failed
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Malformed version, dependency or header data
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A collaborator lookup (database, fingerprint, filesystem) failed
    #[error("Lookup failed: {0}")]
    LookupError(String),

    /// Internal invariant broken (e.g. a missing transaction element)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A package path tried to leave the install root
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// The package database lock could not be taken
    #[error("Lock error: {0}")]
    LockError(String),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Result type alias using the engine's Error type
pub type Result<T> = std::result::Result<T, Error>;
