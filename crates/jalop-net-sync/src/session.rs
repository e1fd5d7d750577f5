//! Session state machine.
//!
//! One [`Session`] owns one record-type channel between two peers. The
//! lifecycle skeleton is shared; what the session does with records and
//! digests depends on its [`RoleStrategy`].

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use jalop_net_core::{DigestAlgorithm, Mode, PublisherId, RecordId, RecordType, Role, SessionId};
use jalop_net_store::{JournalRecoveryPolicy, RecordStore};

use crate::error::{Result, SyncError};
use crate::handshake::Agreement;
use crate::messages::Message;
use crate::roles::{PublisherRole, SubscriberRole};

/// Configuration for per-session behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Max simultaneous pending digests per session.
    pub pending_digest_max: usize,
    /// How long a pending digest may wait for a verdict.
    pub pending_digest_timeout: Duration,
    /// How often the session task runs expiry.
    pub expire_interval: Duration,
    /// Depth of the per-session inbound queue.
    pub inbound_queue_depth: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pending_digest_max: 128,
            pending_digest_timeout: Duration::from_secs(120),
            expire_interval: Duration::from_secs(1),
            inbound_queue_depth: 64,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Negotiating,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Negotiating => "negotiating",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one record is in its digest cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPhase {
    Receiving,
    Digesting,
    AwaitingConfirmation,
}

/// Immutable identity and negotiated parameters of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub publisher_id: PublisherId,
    pub record_type: RecordType,
    pub mode: Mode,
    pub role: Role,
    pub digest: DigestAlgorithm,
    pub xml_compression: String,
    pub configure_digest: bool,
}

impl SessionInfo {
    pub fn from_agreement(session_id: SessionId, role: Role, agreement: &Agreement) -> Self {
        Self {
            session_id,
            publisher_id: agreement.publisher_id,
            record_type: agreement.record_type,
            mode: agreement.mode,
            role,
            digest: agreement.digest,
            xml_compression: agreement.xml_compression.clone(),
            configure_digest: agreement.configure_digest,
        }
    }
}

/// What a role strategy may use.
pub struct SessionContext<S: RecordStore> {
    pub info: SessionInfo,
    pub recovery: JournalRecoveryPolicy<S>,
    pub config: SyncConfig,
}

/// Role-specific behavior plugged into the session skeleton.
#[async_trait]
pub trait RoleStrategy<S: RecordStore + 'static>: Send {
    fn role(&self) -> Role;

    /// Handle a message addressed to an active session.
    async fn on_message(
        &mut self,
        ctx: &SessionContext<S>,
        message: Message,
        now: Instant,
    ) -> Result<Vec<Message>>;

    /// Observe a message this side is about to send.
    async fn on_outbound(&mut self, _ctx: &SessionContext<S>, _message: &Message) -> Result<()> {
        Ok(())
    }

    /// Periodic work: expiry and deferred challenges.
    async fn on_tick(&mut self, ctx: &SessionContext<S>, now: Instant) -> Result<Vec<Message>>;

    /// Drop in-flight state at teardown.
    async fn on_close(&mut self, ctx: &SessionContext<S>) -> Result<()>;

    /// Digests still owed a verdict.
    fn pending(&self) -> usize;

    fn record_phase(&self, _record_id: &RecordId) -> Option<RecordPhase> {
        None
    }
}

/// One record-type channel between two peers.
pub struct Session<S: RecordStore + 'static> {
    ctx: SessionContext<S>,
    state: SessionState,
    role: Box<dyn RoleStrategy<S>>,
}

impl<S: RecordStore + 'static> Session<S> {
    /// Create a session in `Negotiating`.
    pub fn new(
        info: SessionInfo,
        recovery: JournalRecoveryPolicy<S>,
        config: SyncConfig,
        role: Box<dyn RoleStrategy<S>>,
    ) -> Self {
        Self {
            ctx: SessionContext {
                info,
                recovery,
                config,
            },
            state: SessionState::Negotiating,
            role,
        }
    }

    /// The receiving side of an agreed handshake.
    pub fn subscriber(
        session_id: SessionId,
        agreement: &Agreement,
        recovery: JournalRecoveryPolicy<S>,
        config: SyncConfig,
    ) -> Self {
        let info = SessionInfo::from_agreement(session_id, Role::Subscriber, agreement);
        let role = SubscriberRole::new(&config, agreement.resume.clone());
        Self::new(info, recovery, config, Box::new(role))
    }

    /// The sending side of an agreed handshake.
    pub fn publisher(
        session_id: SessionId,
        agreement: &Agreement,
        recovery: JournalRecoveryPolicy<S>,
        config: SyncConfig,
    ) -> Self {
        let info = SessionInfo::from_agreement(session_id, Role::Publisher, agreement);
        Self::new(info, recovery, config, Box::new(PublisherRole::new()))
    }

    pub fn info(&self) -> &SessionInfo {
        &self.ctx.info
    }

    pub fn id(&self) -> SessionId {
        self.ctx.info.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role.role()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.ctx.config
    }

    pub fn pending_digests(&self) -> usize {
        self.role.pending()
    }

    pub fn record_phase(&self, record_id: &RecordId) -> Option<RecordPhase> {
        self.role.record_phase(record_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// `Negotiating -> Active`.
    pub fn activate(&mut self) -> Result<()> {
        if self.state != SessionState::Negotiating {
            return Err(SyncError::UnexpectedMessage {
                state: self.state.as_str(),
                kind: "activate",
            });
        }
        self.state = SessionState::Active;
        tracing::info!(
            session_id = %self.id(),
            publisher_id = %self.ctx.info.publisher_id,
            record_type = %self.ctx.info.record_type,
            role = ?self.role.role(),
            "session active"
        );
        Ok(())
    }

    /// `Negotiating -> Closed`, for a refused handshake.
    pub fn reject(&mut self) {
        if self.state == SessionState::Negotiating {
            self.state = SessionState::Closed;
        }
    }

    /// Stop admitting traffic. Later calls fail fast.
    pub fn begin_close(&mut self) {
        if matches!(self.state, SessionState::Negotiating | SessionState::Active) {
            self.state = SessionState::Closing;
        }
    }

    /// Tear down: drop in-flight state and move to `Closed`.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closing;
        let result = self.role.on_close(&self.ctx).await;
        self.state = SessionState::Closed;
        tracing::info!(session_id = %self.id(), "session closed");
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Traffic
    // ─────────────────────────────────────────────────────────────────────────

    fn ensure_active(&self, kind: &'static str) -> Result<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Closing | SessionState::Closed => Err(SyncError::SessionClosed(self.id())),
            SessionState::Negotiating => Err(SyncError::UnexpectedMessage {
                state: self.state.as_str(),
                kind,
            }),
        }
    }

    /// Handle one inbound message.
    ///
    /// # Returns
    /// The messages to send back, in order.
    pub async fn handle(&mut self, message: Message, now: Instant) -> Result<Vec<Message>> {
        self.ensure_active(message.kind())?;

        if let Err(reason) = message.validate_limits() {
            return Err(SyncError::InvalidMessage(reason.into()));
        }

        if message == Message::CloseSession {
            self.close().await?;
            return Ok(Vec::new());
        }

        self.role.on_message(&self.ctx, message, now).await
    }

    /// Let the role observe a message before it is sent.
    pub async fn prepare_outbound(&mut self, message: &Message) -> Result<()> {
        self.ensure_active(message.kind())?;
        self.role.on_outbound(&self.ctx, message).await
    }

    /// Cooperative expiry.
    pub async fn expire(&mut self, now: Instant) -> Result<Vec<Message>> {
        self.ensure_active("expire")?;
        self.role.on_tick(&self.ctx, now).await
    }
}
