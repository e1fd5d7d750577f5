//! Error types for the sync module.

use thiserror::Error;

use jalop_net_core::SessionId;

/// Errors that can occur during sync operations.
///
/// Protocol outcomes (rejections, record failures, sync failures) are
/// messages, not errors. These are local faults.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Message could not be decoded from its header map.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    StoreError(#[from] jalop_net_store::StoreError),

    /// The session is closing or closed.
    #[error("session {0} is closed")]
    SessionClosed(SessionId),

    /// A message arrived that the session's state does not allow.
    #[error("unexpected message in state {state}: {kind}")]
    UnexpectedMessage { state: &'static str, kind: &'static str },

    /// Timeout waiting for peer.
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
