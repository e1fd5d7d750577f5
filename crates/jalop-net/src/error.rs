//! Error types for the subscriber service.

use jalop_net_core::CoreError;
use jalop_net_store::StoreError;
use jalop_net_sync::SyncError;
use thiserror::Error;

/// Errors that can occur while running a subscriber.
#[derive(Debug, Error)]
pub enum NetError {
    /// Core error, such as an unknown digest name.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for subscriber operations.
pub type Result<T> = std::result::Result<T, NetError>;
