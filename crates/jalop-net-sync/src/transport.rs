//! Transport abstraction for the sync protocol.
//!
//! The transport delivers envelopes between peers. Real implementations
//! frame the header map over a channel-oriented or request/response
//! connection; this crate only needs send and receive.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::messages::Envelope;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Opaque handle for one physical connection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransportHandle(pub u64);

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransportHandle({})", self.0)
    }
}

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Transport trait for sending and receiving envelopes.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an envelope to a specific connection.
    async fn send(&self, to: &TransportHandle, envelope: Envelope) -> Result<()>;

    /// Receive the next envelope from any connection.
    ///
    /// Returns the sender's handle and the envelope. Fails once the
    /// transport is closed.
    async fn recv(&self) -> Result<(TransportHandle, Envelope)>;

    /// Receive with timeout.
    ///
    /// Returns None if timeout expires before an envelope arrives.
    async fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Option<(TransportHandle, Envelope)>>;

    /// This endpoint's own handle.
    fn local_handle(&self) -> TransportHandle;
}

/// A simple in-memory transport for testing.
///
/// Uses channels to simulate connections between peers.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{mpsc, RwLock};

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        /// Sender channels for each endpoint.
        senders: RwLock<HashMap<TransportHandle, mpsc::Sender<(TransportHandle, Envelope)>>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport endpoint attached to this network.
        pub async fn create_transport(self: &Arc<Self>, handle: TransportHandle) -> MemoryTransport {
            let (tx, rx) = mpsc::channel(1000);

            self.senders.write().await.insert(handle, tx);

            MemoryTransport {
                handle,
                network: Arc::clone(self),
                receiver: RwLock::new(rx),
            }
        }

        /// Detach an endpoint. Its receiver sees the channel close.
        pub async fn disconnect(&self, handle: &TransportHandle) {
            self.senders.write().await.remove(handle);
        }
    }

    impl Default for MemoryNetwork {
        fn default() -> Self {
            Self {
                senders: RwLock::new(HashMap::new()),
            }
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        handle: TransportHandle,
        network: Arc<MemoryNetwork>,
        receiver: RwLock<mpsc::Receiver<(TransportHandle, Envelope)>>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, to: &TransportHandle, envelope: Envelope) -> Result<()> {
            let sender = {
                let senders = self.network.senders.read().await;
                senders
                    .get(to)
                    .cloned()
                    .ok_or_else(|| SyncError::TransportError(format!("{} not found", to)))?
            };
            sender
                .send((self.handle, envelope))
                .await
                .map_err(|_| SyncError::TransportError(format!("{} disconnected", to)))
        }

        async fn recv(&self) -> Result<(TransportHandle, Envelope)> {
            let mut rx = self.receiver.write().await;
            rx.recv()
                .await
                .ok_or_else(|| SyncError::TransportError("channel closed".into()))
        }

        async fn recv_timeout(
            &self,
            timeout: std::time::Duration,
        ) -> Result<Option<(TransportHandle, Envelope)>> {
            let mut rx = self.receiver.write().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(received)) => Ok(Some(received)),
                Ok(None) => Err(SyncError::TransportError("channel closed".into())),
                Err(_) => Ok(None),
            }
        }

        fn local_handle(&self) -> TransportHandle {
            self.handle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;
    use crate::messages::Message;
    use jalop_net_core::RecordId;

    #[tokio::test]
    async fn test_memory_transport_send_recv() {
        let network = MemoryNetwork::new();

        let a = TransportHandle(1);
        let b = TransportHandle(2);

        let transport_a = network.create_transport(a).await;
        let transport_b = network.create_transport(b).await;

        let envelope = Envelope::new(Message::Sync {
            record_id: RecordId::from("abc"),
        });
        transport_a.send(&b, envelope.clone()).await.unwrap();

        let (from, received) = transport_b.recv().await.unwrap();
        assert_eq!(from, a);
        assert_eq!(received, envelope);
    }

    #[tokio::test]
    async fn test_memory_transport_timeout_and_disconnect() {
        let network = MemoryNetwork::new();
        let a = network.create_transport(TransportHandle(1)).await;

        let waited = a
            .recv_timeout(std::time::Duration::from_millis(10))
            .await
            .unwrap();
        assert!(waited.is_none());

        let missing = a
            .send(&TransportHandle(9), Envelope::new(Message::CloseSession))
            .await;
        assert!(matches!(missing, Err(SyncError::TransportError(_))));

        network.disconnect(&TransportHandle(1)).await;
        assert!(a.recv().await.is_err());
    }
}
