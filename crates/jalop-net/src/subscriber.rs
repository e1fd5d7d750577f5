//! The subscriber service: admits sessions and routes traffic to them.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use jalop_net_core::{ErrorCode, RecordId, Role, SessionId};
use jalop_net_store::{FsRecordStore, JournalRecoveryPolicy, RecordStore};
use jalop_net_sync::{
    dispatch, Envelope, HandshakeNegotiator, HandshakeOutcome, InitAck, InitRequest, Message,
    Outbox, ResumePoint, Session, SessionHandle, SessionInfo, SessionKey, SessionRegistry,
    SessionTask, SyncConfig, SyncError, Transport, TransportHandle,
};

use crate::config::SubscriberConfig;
use crate::connection::{AcceptAll, ConnectionHandler, ConnectionRequest};
use crate::error::Result;

const OUTBOX_DEPTH: usize = 1024;

/// Receives records from publishers.
///
/// Each admitted session runs on its own task. `handle` is the single
/// entry point for inbound envelopes; `serve` drives it from a transport.
pub struct Subscriber<S: RecordStore + 'static, H: ConnectionHandler + 'static = AcceptAll> {
    recovery: JournalRecoveryPolicy<S>,
    negotiator: HandshakeNegotiator,
    sync_config: SyncConfig,
    registry: Arc<SessionRegistry>,
    handler: Arc<H>,
    outbox: Outbox,
    unsolicited: Mutex<mpsc::Receiver<(TransportHandle, Envelope)>>,
}

impl Subscriber<FsRecordStore, AcceptAll> {
    /// A subscriber writing to the filesystem at `config.output_path`.
    pub fn open_fs(config: &SubscriberConfig) -> Result<Self> {
        config.validate()?;
        let store = FsRecordStore::open(&config.output_path)?
            .with_confirmed_marker(config.create_confirmed_file);
        Self::new(Arc::new(store), config, AcceptAll)
    }
}

impl<S: RecordStore + 'static, H: ConnectionHandler + 'static> Subscriber<S, H> {
    pub fn new(store: Arc<S>, config: &SubscriberConfig, handler: H) -> Result<Self> {
        config.validate()?;
        let (outbox, unsolicited) = mpsc::channel(OUTBOX_DEPTH);
        Ok(Self {
            recovery: JournalRecoveryPolicy::new(store),
            negotiator: HandshakeNegotiator::new(config.negotiator_config()?),
            sync_config: config.sync_config(),
            registry: Arc::new(SessionRegistry::new(config.max_session_limit)),
            handler: Arc::new(handler),
            outbox,
            unsolicited: Mutex::new(unsolicited),
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<S> {
        self.recovery.store()
    }

    /// Handle one inbound envelope.
    ///
    /// # Returns
    /// The envelopes to send back to `from`, in order.
    pub async fn handle(&self, from: TransportHandle, envelope: Envelope) -> Vec<Envelope> {
        match envelope.message {
            Message::Initialize(request) => self.initialize(from, request).await,
            _ => self.route(from, envelope).await,
        }
    }

    /// Close every session carried by a transport.
    pub async fn disconnect(&self, transport: TransportHandle) {
        for session_id in self.registry.on_transport(transport).await {
            if let Some(handle) = self.registry.find(SessionKey::Id(session_id)).await {
                if let Err(e) = dispatch(&handle, Message::CloseSession).await {
                    tracing::debug!(session_id = %session_id, error = %e, "session already gone");
                }
            }
        }
    }

    /// Serve a transport until it closes.
    ///
    /// Replies go back to the connection that sent the request. Traffic a
    /// session produces on its own, such as expiry failures, is forwarded
    /// as it appears.
    pub async fn serve<T: Transport>(&self, transport: &T) -> Result<()> {
        let mut unsolicited = self.unsolicited.lock().await;
        loop {
            tokio::select! {
                received = transport.recv() => {
                    let (from, envelope) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            tracing::info!(error = %e, "transport closed");
                            return Ok(());
                        }
                    };
                    for reply in self.handle(from, envelope).await {
                        if let Err(e) = transport.send(&from, reply).await {
                            tracing::warn!(to = %from, error = %e, "failed to send reply");
                        }
                    }
                }
                Some((to, envelope)) = unsolicited.recv() => {
                    if let Err(e) = transport.send(&to, envelope).await {
                        tracing::warn!(to = %to, error = %e, "failed to send");
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admission
    // ─────────────────────────────────────────────────────────────────────────

    async fn initialize(&self, from: TransportHandle, request: InitRequest) -> Vec<Envelope> {
        let session_id = SessionId::generate();
        let outcome = match self
            .negotiator
            .negotiate(&request, &self.recovery, session_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "journal recovery failed");
                self.recovery.release_owner(&session_id).await;
                return vec![Envelope::new(Message::SessionFailure {
                    reason: ErrorCode::JournalMissingFailure,
                })];
            }
        };
        let mut reasons = match &outcome {
            HandshakeOutcome::Accepted(_) => Vec::new(),
            HandshakeOutcome::Rejected(reasons) => reasons.clone(),
        };

        let connection = ConnectionRequest {
            transport: from,
            request,
            reasons: reasons.clone(),
        };
        let refused = self
            .handler
            .handle_connection_request(!reasons.is_empty(), &connection)
            .await;
        for code in refused {
            if !reasons.contains(&code) {
                reasons.push(code);
            }
        }

        let agreement = match outcome {
            HandshakeOutcome::Accepted(agreement) if reasons.is_empty() => agreement,
            _ => {
                tracing::warn!(
                    transport = %from,
                    reasons = ?reasons,
                    "initialize refused"
                );
                self.recovery.release_owner(&session_id).await;
                return vec![Envelope::new(Message::InitializeNack { reasons })];
            }
        };

        let info = SessionInfo::from_agreement(session_id, Role::Subscriber, &agreement);
        let (commands, inbound) = mpsc::channel(self.sync_config.inbound_queue_depth);
        let admitted = self
            .registry
            .admit(SessionHandle {
                info,
                transport: from,
                commands,
            })
            .await;
        if let Err(reason) = admitted {
            self.recovery.release_owner(&session_id).await;
            return vec![Envelope::new(Message::SessionFailure { reason })];
        }

        let mut session = Session::subscriber(
            session_id,
            &agreement,
            self.recovery.clone(),
            self.sync_config.clone(),
        );
        if let Err(e) = session.activate() {
            tracing::error!(session_id = %session_id, error = %e, "session failed to start");
            self.registry.remove(&session_id).await;
            self.recovery.release_owner(&session_id).await;
            return vec![Envelope::new(Message::SessionFailure {
                reason: ErrorCode::UnsupportedSessionId,
            })];
        }

        let handler = Arc::clone(&self.handler);
        SessionTask::new(
            session,
            from,
            inbound,
            self.outbox.clone(),
            Arc::clone(&self.registry),
        )
        .on_closed(Arc::new(move |info: &SessionInfo| handler.session_closed(info)))
        .spawn();

        tracing::info!(
            session_id = %session_id,
            publisher_id = %agreement.publisher_id,
            record_type = %agreement.record_type,
            mode = %agreement.mode,
            digest = %agreement.digest,
            resume = agreement.resume.is_some(),
            "session admitted"
        );

        let ack = InitAck {
            session_id,
            digest: agreement.digest,
            xml_compression: agreement.xml_compression,
            configure_digest: agreement.configure_digest,
            resume: agreement.resume.map(|r| ResumePoint {
                record_id: r.record_id,
                offset: r.offset,
            }),
        };
        vec![Envelope::for_session(&session_id, Message::InitializeAck(ack))]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Routing
    // ─────────────────────────────────────────────────────────────────────────

    async fn find_session(&self, from: TransportHandle, envelope: &Envelope) -> Option<SessionHandle> {
        if let Some(raw) = &envelope.session_id {
            let id = SessionId::parse(raw)?;
            return self.registry.find(SessionKey::Id(id)).await;
        }

        if let Some(record_type) = envelope.message.record_type() {
            if let Some(handle) = self
                .registry
                .find(SessionKey::Transport(from, record_type))
                .await
            {
                return Some(handle);
            }
        }

        // Without a session id, a transport carrying a single session
        // addresses that session.
        match self.registry.on_transport(from).await.as_slice() {
            [only] => self.registry.find(SessionKey::Id(*only)).await,
            _ => None,
        }
    }

    async fn route(&self, from: TransportHandle, envelope: Envelope) -> Vec<Envelope> {
        let unknown_session = || {
            vec![Envelope {
                session_id: envelope.session_id.clone(),
                message: Message::SessionFailure {
                    reason: ErrorCode::UnsupportedSessionId,
                },
            }]
        };

        let handle = match self.find_session(from, &envelope).await {
            Some(handle) if handle.transport == from => handle,
            Some(handle) => {
                tracing::warn!(
                    session_id = %handle.info.session_id,
                    transport = %from,
                    "session addressed from a foreign transport"
                );
                return unknown_session();
            }
            None => {
                tracing::warn!(
                    transport = %from,
                    session_id = ?envelope.session_id,
                    kind = envelope.message.kind(),
                    "no session for message"
                );
                return unknown_session();
            }
        };

        let session_id = handle.info.session_id;
        let record_id = record_id_of(&envelope.message);
        match dispatch(&handle, envelope.message.clone()).await {
            Ok(replies) => replies
                .into_iter()
                .map(|m| Envelope::for_session(&session_id, m))
                .collect(),
            Err(SyncError::SessionClosed(_)) => unknown_session(),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "message refused");
                match record_id {
                    Some(record_id) => vec![Envelope::for_session(
                        &session_id,
                        Message::RecordFailure {
                            record_id,
                            reason: ErrorCode::RecordFailure,
                        },
                    )],
                    None => Vec::new(),
                }
            }
        }
    }
}

fn record_id_of(message: &Message) -> Option<RecordId> {
    match message {
        Message::Record { headers, .. } => Some(
            headers
                .record_id
                .as_deref()
                .map(RecordId::from)
                .unwrap_or_else(RecordId::empty),
        ),
        Message::JournalMissing { record_id } => Some(record_id.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jalop_net_store::MemoryRecordStore;

    const PUBLISHER: &str = "ae8a54d7-dd7c-4c50-a7e7-f948a140c556";

    fn init(record_type: &str) -> Envelope {
        Envelope::new(Message::Initialize(InitRequest {
            record_type: Some(record_type.into()),
            mode: Some("live".into()),
            publisher_id: Some(PUBLISHER.into()),
            version: Some("2.0".into()),
            ..Default::default()
        }))
    }

    fn subscriber() -> Subscriber<MemoryRecordStore> {
        Subscriber::new(
            Arc::new(MemoryRecordStore::new()),
            &SubscriberConfig::default(),
            AcceptAll,
        )
        .unwrap()
    }

    struct DenyJournals;

    #[async_trait::async_trait]
    impl ConnectionHandler for DenyJournals {
        async fn handle_connection_request(
            &self,
            _rejecting: bool,
            request: &ConnectionRequest,
        ) -> Vec<ErrorCode> {
            if request.request.record_type.as_deref() == Some("journal") {
                vec![ErrorCode::UnsupportedRecordType]
            } else {
                Vec::new()
            }
        }
    }

    #[tokio::test]
    async fn test_initialize_ack_carries_session() {
        let sub = subscriber();
        let out = sub.handle(TransportHandle(1), init("log")).await;

        let [Envelope {
            session_id: Some(raw),
            message: Message::InitializeAck(ack),
        }] = out.as_slice()
        else {
            panic!("expected ack, got {:?}", out);
        };
        assert_eq!(raw, &ack.session_id.to_string());
        assert!(ack.resume.is_none());
        assert_eq!(sub.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_handler_refusal_is_nack() {
        let sub = Subscriber::new(
            Arc::new(MemoryRecordStore::new()),
            &SubscriberConfig::default(),
            DenyJournals,
        )
        .unwrap();

        let out = sub.handle(TransportHandle(1), init("journal")).await;
        assert_eq!(
            out[0].message,
            Message::InitializeNack {
                reasons: vec![ErrorCode::UnsupportedRecordType]
            }
        );
        assert!(sub.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_session_id_echoed() {
        let sub = subscriber();
        let out = sub
            .handle(
                TransportHandle(1),
                Envelope {
                    session_id: Some("not-a-session".into()),
                    message: Message::CloseSession,
                },
            )
            .await;
        assert_eq!(
            out,
            vec![Envelope {
                session_id: Some("not-a-session".into()),
                message: Message::SessionFailure {
                    reason: ErrorCode::UnsupportedSessionId
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_close_from_foreign_transport() {
        let sub = subscriber();
        let out = sub.handle(TransportHandle(1), init("audit")).await;
        let session_id = out[0].session_id.clone();

        let out = sub
            .handle(
                TransportHandle(2),
                Envelope {
                    session_id: session_id.clone(),
                    message: Message::CloseSession,
                },
            )
            .await;
        assert!(matches!(
            out[0].message,
            Message::SessionFailure {
                reason: ErrorCode::UnsupportedSessionId
            }
        ));
        assert_eq!(sub.registry().len().await, 1);
    }
}
