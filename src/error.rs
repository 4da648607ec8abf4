//! Error types for the session cache.

use tower_sessions::session_store;

/// Errors produced by the session manager, the facade and the databases.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A facade operation ran before [`init_cache`](crate::init_cache).
    #[error("session cache is not initialized")]
    NotInitialized,

    /// [`init_cache`](crate::init_cache) ran more than once.
    #[error("session cache is already initialized")]
    AlreadyInitialized,

    /// A write was attempted on a session that has been destroyed.
    #[error("session has been destroyed")]
    Destroyed,

    /// A value could not be converted into JSON.
    #[error("failed to encode session value: {0}")]
    Encode(#[source] serde_json::Error),

    /// A stored value could not be converted into the requested type.
    #[error("failed to decode session value: {0}")]
    Decode(#[source] serde_json::Error),

    /// A `tower-sessions` store used as a database failed.
    #[error(transparent)]
    Store(#[from] session_store::Error),

    /// A database backend failed.
    #[error("database error: {0}")]
    Backend(String),

    /// Configuration could not be read.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
