//! Per-session tasks.
//!
//! Each session runs on its own task and drains its own queue, so one
//! slow session never blocks another. The task also drives cooperative
//! expiry on a fixed interval.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use jalop_net_core::SessionId;
use jalop_net_store::RecordStore;

use crate::error::{Result, SyncError};
use crate::messages::{Envelope, Message};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::session::{Session, SessionInfo, SessionState};
use crate::transport::TransportHandle;

/// One inbound message and where to deliver the session's answer.
pub struct SessionCommand {
    pub message: Message,
    pub reply: oneshot::Sender<Result<Vec<Message>>>,
}

impl fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCommand")
            .field("message", &self.message.kind())
            .finish()
    }
}

/// Unsolicited traffic a session produces, such as expiry failures.
pub type Outbox = mpsc::Sender<(TransportHandle, Envelope)>;

/// Called once after a session has left the registry.
pub type ClosedHook = Arc<dyn Fn(&SessionInfo) + Send + Sync>;

/// Hand a message to a session's task and wait for its answer.
pub async fn dispatch(handle: &SessionHandle, message: Message) -> Result<Vec<Message>> {
    let session_id = handle.info.session_id;
    let (reply, answer) = oneshot::channel();
    handle
        .commands
        .send(SessionCommand { message, reply })
        .await
        .map_err(|_| SyncError::SessionClosed(session_id))?;
    answer
        .await
        .map_err(|_| SyncError::SessionClosed(session_id))?
}

/// Everything a session task needs besides the session itself.
pub struct SessionTask<S: RecordStore + 'static> {
    session: Session<S>,
    transport: TransportHandle,
    commands: mpsc::Receiver<SessionCommand>,
    outbox: Outbox,
    registry: Arc<SessionRegistry>,
    on_closed: Option<ClosedHook>,
}

impl<S: RecordStore + 'static> SessionTask<S> {
    pub fn new(
        session: Session<S>,
        transport: TransportHandle,
        commands: mpsc::Receiver<SessionCommand>,
        outbox: Outbox,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            session,
            transport,
            commands,
            outbox,
            registry,
            on_closed: None,
        }
    }

    pub fn on_closed(mut self, hook: ClosedHook) -> Self {
        self.on_closed = Some(hook);
        self
    }

    /// Run the task on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let session_id = self.session.id();
        let mut ticker = tokio::time::interval(self.session.config().expire_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    let now = tokio::time::Instant::now().into_std();
                    let result = self.session.handle(command.message, now).await;
                    if let Err(e) = &result {
                        tracing::debug!(session_id = %session_id, error = %e, "message not handled");
                    }
                    let _ = command.reply.send(result);
                    if self.session.state() == SessionState::Closed {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let now = tokio::time::Instant::now().into_std();
                    match self.session.expire(now).await {
                        Ok(messages) => {
                            if !emit(&self.outbox, self.transport, session_id, messages).await {
                                break;
                            }
                        }
                        Err(SyncError::SessionClosed(_)) => break,
                        Err(e) => {
                            tracing::warn!(session_id = %session_id, error = %e, "expiry failed");
                        }
                    }
                }
            }
        }

        if self.session.state() != SessionState::Closed {
            if let Err(e) = self.session.close().await {
                tracing::warn!(session_id = %session_id, error = %e, "close failed");
            }
        }
        self.registry.remove(&session_id).await;
        if let Some(hook) = &self.on_closed {
            hook(self.session.info());
        }
    }
}

/// Push unsolicited messages to the peer. `false` once nobody listens.
async fn emit(
    outbox: &Outbox,
    transport: TransportHandle,
    session_id: SessionId,
    messages: Vec<Message>,
) -> bool {
    for message in messages {
        let envelope = Envelope::for_session(&session_id, message);
        if outbox.send((transport, envelope)).await.is_err() {
            tracing::debug!(session_id = %session_id, "outbox closed");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use jalop_net_core::{DigestAlgorithm, ErrorCode, Mode, PublisherId, RecordId, RecordType};
    use jalop_net_store::{JournalRecoveryPolicy, MemoryRecordStore};

    use crate::handshake::Agreement;
    use crate::registry::SessionKey;
    use crate::session::SyncConfig;

    fn agreement() -> Agreement {
        Agreement {
            record_type: RecordType::Log,
            mode: Mode::Live,
            publisher_id: PublisherId::parse("ae8a54d7-dd7c-4c50-a7e7-f948a140c556").unwrap(),
            digest: DigestAlgorithm::Sha256,
            xml_compression: "none".into(),
            configure_digest: true,
            version: "2.0".into(),
            resume: None,
        }
    }

    async fn start(
        registry: &Arc<SessionRegistry>,
        outbox: Outbox,
        closed: Arc<AtomicUsize>,
    ) -> SessionHandle {
        let store = Arc::new(MemoryRecordStore::new());
        let mut session = Session::subscriber(
            SessionId::generate(),
            &agreement(),
            JournalRecoveryPolicy::new(store),
            SyncConfig {
                expire_interval: Duration::from_millis(10),
                ..Default::default()
            },
        );
        session.activate().unwrap();

        let (tx, rx) = mpsc::channel(8);
        let handle = SessionHandle {
            info: session.info().clone(),
            transport: TransportHandle(1),
            commands: tx,
        };
        registry.admit(handle.clone()).await.unwrap();
        SessionTask::new(session, TransportHandle(1), rx, outbox, Arc::clone(registry))
            .on_closed(Arc::new(move |_info: &SessionInfo| {
                closed.fetch_add(1, Ordering::SeqCst);
            }))
            .spawn();
        handle
    }

    #[tokio::test]
    async fn test_dispatch_round_trip() {
        let registry = Arc::new(SessionRegistry::new(5));
        let (outbox, _out_rx) = mpsc::channel(8);
        let closed = Arc::new(AtomicUsize::new(0));
        let handle = start(&registry, outbox, Arc::clone(&closed)).await;

        let out = dispatch(
            &handle,
            Message::DigestResponse {
                entries: vec![crate::messages::DigestResponseEntry {
                    record_id: RecordId::from("nobody"),
                    status: "confirmed".into(),
                    digest: None,
                }],
            },
        )
        .await
        .unwrap();
        assert_eq!(
            out,
            vec![Message::SyncFailure {
                record_id: RecordId::from("nobody"),
                reason: ErrorCode::SyncFailure,
            }]
        );
    }

    #[tokio::test]
    async fn test_close_unregisters_and_runs_hook() {
        let registry = Arc::new(SessionRegistry::new(5));
        let (outbox, _out_rx) = mpsc::channel(8);
        let closed = Arc::new(AtomicUsize::new(0));
        let handle = start(&registry, outbox, Arc::clone(&closed)).await;
        let id = handle.info.session_id;

        dispatch(&handle, Message::CloseSession).await.unwrap();
        for _ in 0..50 {
            if closed.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(registry.find(SessionKey::Id(id)).await.is_none());
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let late = dispatch(&handle, Message::CloseSession).await;
        assert!(matches!(late, Err(SyncError::SessionClosed(_))));
    }
}
