// src/error.rs

use thiserror::Error;

/// Core error types for Autonomix
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Malformed repository reference or unparseable data
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Network or release API failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Artifact, package or record is absent
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Native tool returned non-zero while installing
    #[error("Installation failed: {0}")]
    InstallFailed(String),

    /// Native tool returned non-zero while removing, or removal is impossible
    #[error("Uninstall failed: {0}")]
    UninstallFailed(String),

    /// No backend registered for the requested package type
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Backend exists but cannot run on this host
    #[error("Backend unavailable on this system: {0}")]
    BackendUnavailable(String),

    /// Downloaded artifact does not match the published digest
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Record already exists
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Download abandoned by the caller
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias using Autonomix's Error type
pub type Result<T> = std::result::Result<T, Error>;
