//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use exam_core::ports::PortError;

/// Everything that can go wrong in the `api` service, from startup through
/// a live exam connection.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Environment configuration was missing or malformed at startup.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A failure surfaced through one of the exam core's ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The Postgres pool or a query failed.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// The exam WebSocket channel failed mid-session.
    #[error("WebSocket Error: {0}")]
    Websocket(#[from] axum::Error),

    /// Filesystem or socket I/O failed, typically the listener bind or the
    /// local state directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
