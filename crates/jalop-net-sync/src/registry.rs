//! Concurrent session registry.
//!
//! Sessions are addressable by id and by the (transport, record type) pair
//! that carries them. Admission is capped per (publisher, record type).

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};

use jalop_net_core::{ErrorCode, PublisherId, RecordType, SessionId};

use crate::dispatch::SessionCommand;
use crate::session::SessionInfo;
use crate::transport::TransportHandle;

/// How a session is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKey {
    Id(SessionId),
    Transport(TransportHandle, RecordType),
}

/// A registered session: its identity and the queue feeding its task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub info: SessionInfo,
    pub transport: TransportHandle,
    pub commands: mpsc::Sender<SessionCommand>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_id: HashMap<SessionId, SessionHandle>,
    by_transport: HashMap<(TransportHandle, RecordType), SessionId>,
}

impl RegistryInner {
    fn count_for(&self, publisher_id: &PublisherId, record_type: RecordType) -> usize {
        self.by_id
            .values()
            .filter(|h| h.info.publisher_id == *publisher_id && h.info.record_type == record_type)
            .count()
    }
}

/// Registry of live sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    max_per_pair: usize,
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    /// Create a registry admitting up to `max_per_pair` sessions per
    /// (publisher, record type).
    pub fn new(max_per_pair: usize) -> Self {
        Self {
            max_per_pair,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    pub fn max_per_pair(&self) -> usize {
        self.max_per_pair
    }

    /// Register a session.
    ///
    /// # Returns
    /// `Err(MaxSessionsExceeded)` when the pair is at its cap, or when the
    /// transport already carries a session of that record type. Nothing
    /// is registered in either case.
    pub async fn admit(&self, handle: SessionHandle) -> Result<(), ErrorCode> {
        let mut inner = self.inner.write().await;
        let info = &handle.info;

        if inner.count_for(&info.publisher_id, info.record_type) >= self.max_per_pair {
            tracing::warn!(
                publisher_id = %info.publisher_id,
                record_type = %info.record_type,
                limit = self.max_per_pair,
                "session cap reached"
            );
            return Err(ErrorCode::MaxSessionsExceeded);
        }

        let key = (handle.transport, info.record_type);
        if inner.by_transport.contains_key(&key) {
            tracing::warn!(
                transport = %handle.transport,
                record_type = %info.record_type,
                "transport already carries a session of this type"
            );
            return Err(ErrorCode::MaxSessionsExceeded);
        }

        let id = info.session_id;
        inner.by_transport.insert(key, id);
        inner.by_id.insert(id, handle);
        tracing::debug!(session_id = %id, "session registered");
        Ok(())
    }

    pub async fn find(&self, key: SessionKey) -> Option<SessionHandle> {
        let inner = self.inner.read().await;
        let id = match key {
            SessionKey::Id(id) => id,
            SessionKey::Transport(handle, record_type) => {
                *inner.by_transport.get(&(handle, record_type))?
            }
        };
        inner.by_id.get(&id).cloned()
    }

    /// Unregister a session. Returns its handle if it was present.
    pub async fn remove(&self, session_id: &SessionId) -> Option<SessionHandle> {
        let mut inner = self.inner.write().await;
        let handle = inner.by_id.remove(session_id)?;
        inner
            .by_transport
            .remove(&(handle.transport, handle.info.record_type));
        tracing::debug!(session_id = %session_id, "session unregistered");
        Some(handle)
    }

    /// Sessions carried by one transport.
    pub async fn on_transport(&self, transport: TransportHandle) -> Vec<SessionId> {
        let inner = self.inner.read().await;
        inner
            .by_transport
            .iter()
            .filter(|((t, _), _)| *t == transport)
            .map(|(_, id)| *id)
            .collect()
    }

    pub async fn count_for(&self, publisher_id: &PublisherId, record_type: RecordType) -> usize {
        self.inner.read().await.count_for(publisher_id, record_type)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jalop_net_core::{DigestAlgorithm, Mode, Role};

    const PUBLISHER: &str = "ae8a54d7-dd7c-4c50-a7e7-f948a140c556";

    fn handle(transport: u64, record_type: RecordType) -> SessionHandle {
        let (commands, _rx) = mpsc::channel(1);
        SessionHandle {
            info: SessionInfo {
                session_id: SessionId::generate(),
                publisher_id: PublisherId::parse(PUBLISHER).unwrap(),
                record_type,
                mode: Mode::Live,
                role: Role::Subscriber,
                digest: DigestAlgorithm::Sha256,
                xml_compression: "none".into(),
                configure_digest: true,
            },
            transport: TransportHandle(transport),
            commands,
        }
    }

    #[tokio::test]
    async fn test_cap_per_publisher_and_type() {
        let registry = SessionRegistry::new(5);
        for t in 0..5 {
            registry.admit(handle(t, RecordType::Log)).await.unwrap();
        }
        assert_eq!(
            registry.admit(handle(5, RecordType::Log)).await,
            Err(ErrorCode::MaxSessionsExceeded)
        );
        // Other record types have their own cap.
        registry.admit(handle(5, RecordType::Audit)).await.unwrap();
        assert_eq!(registry.len().await, 6);
    }

    #[tokio::test]
    async fn test_one_session_per_transport_and_type() {
        let registry = SessionRegistry::new(5);
        registry.admit(handle(1, RecordType::Log)).await.unwrap();
        assert!(registry.admit(handle(1, RecordType::Log)).await.is_err());
        registry.admit(handle(1, RecordType::Journal)).await.unwrap();
        assert_eq!(registry.on_transport(TransportHandle(1)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_find_and_remove() {
        let registry = SessionRegistry::new(5);
        let h = handle(7, RecordType::Audit);
        let id = h.info.session_id;
        registry.admit(h).await.unwrap();

        assert!(registry.find(SessionKey::Id(id)).await.is_some());
        let by_transport = registry
            .find(SessionKey::Transport(TransportHandle(7), RecordType::Audit))
            .await
            .unwrap();
        assert_eq!(by_transport.info.session_id, id);

        assert!(registry.remove(&id).await.is_some());
        assert!(registry.remove(&id).await.is_none());
        assert!(registry
            .find(SessionKey::Transport(TransportHandle(7), RecordType::Audit))
            .await
            .is_none());
        assert!(registry.is_empty().await);
    }
}
