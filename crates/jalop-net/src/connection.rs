//! Connection authorization.

use async_trait::async_trait;

use jalop_net_core::ErrorCode;
use jalop_net_sync::{InitRequest, SessionInfo, TransportHandle};

/// What an authorizer sees of an `initialize` request.
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub transport: TransportHandle,
    pub request: InitRequest,
    /// Reasons negotiation already found, if any.
    pub reasons: Vec<ErrorCode>,
}

/// Decides whether a connection may open a session.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    /// Return the reasons to refuse; empty accepts.
    ///
    /// # Arguments
    /// - `rejecting`: whether negotiation already refused the request.
    /// - `request`: the request and the reasons found so far.
    async fn handle_connection_request(
        &self,
        rejecting: bool,
        request: &ConnectionRequest,
    ) -> Vec<ErrorCode>;

    /// Called once a session has been torn down.
    fn session_closed(&self, _info: &SessionInfo) {}
}

/// Accepts every request negotiation accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl ConnectionHandler for AcceptAll {
    async fn handle_connection_request(
        &self,
        _rejecting: bool,
        _request: &ConnectionRequest,
    ) -> Vec<ErrorCode> {
        Vec::new()
    }
}
