//! Role strategies: what a session does with records and digests.
//!
//! The subscriber stores records, challenges digests and relocates
//! confirmed records. The publisher remembers what it sent and answers
//! challenges.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;

use jalop_net_core::{
    CodecOutcome, DigestStatus, DigestValue, ErrorCode, RecordCodec, RecordEnvelope, RecordHeaders,
    RecordId, RecordType, Role,
};
use jalop_net_store::{RecordSlot, RecordStatus, RecordStore, ResumeState, StoreError};

use crate::error::{Result, SyncError};
use crate::ledger::{DigestLedger, Verdict};
use crate::messages::{DigestPair, DigestResponseEntry, Message};
use crate::session::{RecordPhase, RoleStrategy, SessionContext, SyncConfig};

fn record_failure(record_id: RecordId, reason: ErrorCode) -> Message {
    Message::RecordFailure { record_id, reason }
}

fn sync_failure(record_id: RecordId, reason: ErrorCode) -> Message {
    Message::SyncFailure { record_id, reason }
}

fn unexpected(message: &Message) -> SyncError {
    SyncError::UnexpectedMessage {
        state: "active",
        kind: message.kind(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscriber
// ─────────────────────────────────────────────────────────────────────────────

/// Receiving side: store, digest, challenge, relocate.
pub struct SubscriberRole {
    ledger: DigestLedger,
    slots: HashMap<RecordId, RecordSlot>,
    resume: Option<ResumeState>,
}

impl SubscriberRole {
    pub fn new(config: &SyncConfig, resume: Option<ResumeState>) -> Self {
        Self {
            ledger: DigestLedger::new(config.pending_digest_max, config.pending_digest_timeout),
            slots: HashMap::new(),
            resume,
        }
    }

    pub fn ledger(&self) -> &DigestLedger {
        &self.ledger
    }

    /// The resume point still waiting for its record, if any.
    pub fn resume(&self) -> Option<&ResumeState> {
        self.resume.as_ref()
    }

    async fn receive_record<S: RecordStore + 'static>(
        &mut self,
        ctx: &SessionContext<S>,
        headers: RecordHeaders,
        body: Bytes,
        now: Instant,
    ) -> Result<Vec<Message>> {
        let echo = headers
            .record_id
            .as_deref()
            .map(RecordId::from)
            .unwrap_or_else(RecordId::empty);

        if self.ledger.is_backpressured() {
            tracing::warn!(
                session_id = %ctx.info.session_id,
                record_id = %echo,
                pending = self.ledger.pending_len(),
                "pending digest limit reached"
            );
            return Ok(vec![record_failure(echo, ErrorCode::PendingDigestLimit)]);
        }

        let envelope = match RecordEnvelope::parse(ctx.info.record_type, &headers) {
            Ok(envelope) => envelope,
            Err(rejection) => {
                tracing::warn!(
                    session_id = %ctx.info.session_id,
                    record_id = %rejection.record_id,
                    code = %rejection.code,
                    "record headers rejected"
                );
                return Ok(vec![record_failure(rejection.record_id, rejection.code)]);
            }
        };

        let record_id = envelope.record_id.clone();
        if self.slots.contains_key(&record_id) || self.ledger.contains(&record_id) {
            tracing::warn!(record_id = %record_id, "record id already awaiting a verdict");
            return Ok(vec![record_failure(record_id, ErrorCode::RecordFailure)]);
        }

        match self.store_record(ctx, envelope, &body, now).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::error!(
                    session_id = %ctx.info.session_id,
                    record_id = %record_id,
                    error = %e,
                    "failed to store record"
                );
                if let Some(slot) = self.slots.remove(&record_id) {
                    if let Err(e) = ctx.recovery.on_invalid(&slot).await {
                        tracing::error!(record_id = %record_id, error = %e, "failed to delete record");
                    }
                }
                Ok(vec![record_failure(record_id, ErrorCode::RecordFailure)])
            }
        }
    }

    /// Open the slot a record lands in, continuing a resumed journal when
    /// the ids match.
    async fn open_slot<S: RecordStore + 'static>(
        &mut self,
        ctx: &SessionContext<S>,
        envelope: &RecordEnvelope,
    ) -> std::result::Result<(RecordSlot, RecordCodec), StoreError> {
        let store = ctx.recovery.store();

        match self.resume.take() {
            Some(resume) if resume.record_id == envelope.record_id => {
                let prefix = store.read_payload(&resume.slot).await?;
                let mut status = store
                    .status(&resume.slot)
                    .await?
                    .unwrap_or_else(|| RecordStatus::new(envelope.record_id.clone(), envelope.lengths));
                status.declared = envelope.lengths;
                status.declared.payload = prefix.len() as u64 + envelope.lengths.payload;
                status.progress.payload = prefix.len() as u64;
                store.write_status(&resume.slot, &status).await?;

                tracing::info!(
                    record_id = %envelope.record_id,
                    offset = prefix.len(),
                    "resuming journal transfer"
                );
                let codec = RecordCodec::resume(envelope.clone(), ctx.info.digest, prefix);
                Ok((resume.slot, codec))
            }
            stale => {
                if let Some(resume) = stale {
                    tracing::warn!(
                        expected = %resume.record_id,
                        received = %envelope.record_id,
                        "resume point not taken; discarding backlog"
                    );
                    ctx.recovery
                        .discard_backlog(&ctx.info.publisher_id, ctx.info.session_id)
                        .await?;
                }
                let slot = ctx
                    .recovery
                    .open_record(
                        ctx.info.session_id,
                        &ctx.info.publisher_id,
                        ctx.info.record_type,
                        &envelope.record_id,
                        envelope.lengths,
                    )
                    .await?;
                Ok((slot, RecordCodec::new(envelope.clone(), ctx.info.digest)))
            }
        }
    }

    async fn store_record<S: RecordStore + 'static>(
        &mut self,
        ctx: &SessionContext<S>,
        envelope: RecordEnvelope,
        body: &[u8],
        now: Instant,
    ) -> std::result::Result<Vec<Message>, StoreError> {
        let store = ctx.recovery.store();
        let record_id = envelope.record_id.clone();
        let (slot, mut codec) = self.open_slot(ctx, &envelope).await?;
        self.slots.insert(record_id.clone(), slot);

        let feed = codec.feed(body);
        for chunk in &feed.chunks {
            store.append(&slot, chunk.part, chunk.bytes).await?;
        }
        let trailing = body.len() - feed.consumed;

        let digest = match codec.finish() {
            CodecOutcome::Complete(digest) if trailing == 0 => digest,
            CodecOutcome::Complete(_) => {
                tracing::warn!(record_id = %record_id, trailing, "bytes after final break marker");
                self.slots.remove(&record_id);
                ctx.recovery.on_invalid(&slot).await?;
                return Ok(vec![record_failure(record_id, ErrorCode::RecordFailure)]);
            }
            CodecOutcome::Incomplete { received, expected } => {
                tracing::warn!(record_id = %record_id, received, expected, "record body truncated");
                self.slots.remove(&record_id);
                // A truncated journal stays on storage, unclaimed, for a later resume.
                if ctx.info.record_type == RecordType::Journal {
                    ctx.recovery.release(&slot).await;
                } else {
                    ctx.recovery.on_invalid(&slot).await?;
                }
                return Ok(vec![record_failure(record_id, ErrorCode::RecordFailure)]);
            }
            CodecOutcome::Incorrect => {
                tracing::warn!(record_id = %record_id, "malformed break marker");
                self.slots.remove(&record_id);
                ctx.recovery.on_invalid(&slot).await?;
                return Ok(vec![record_failure(record_id, ErrorCode::RecordFailure)]);
            }
        };

        if let Some(mut status) = store.status(&slot).await? {
            status.set_digest(&digest);
            store.write_status(&slot, &status).await?;
        }
        tracing::debug!(record_id = %record_id, digest = %digest.to_hex(), "record digested");

        if !ctx.info.configure_digest {
            self.slots.remove(&record_id);
            ctx.recovery.on_confirmed(&slot).await?;
            return Ok(vec![Message::Sync { record_id }]);
        }

        let admission = self.ledger.record_completed(record_id, digest, now);
        tracing::debug!(?admission, pending = self.ledger.pending_len(), "digest queued");

        let batch = self.ledger.challenge_batch();
        if batch.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![Message::DigestChallenge { entries: batch }])
        }
    }

    async fn settle<S: RecordStore + 'static>(
        &mut self,
        ctx: &SessionContext<S>,
        record_id: RecordId,
        verdict: Verdict,
    ) -> Message {
        match verdict {
            Verdict::Confirmed => {
                let Some(slot) = self.slots.remove(&record_id) else {
                    return sync_failure(record_id, ErrorCode::SyncFailure);
                };
                match ctx.recovery.on_confirmed(&slot).await {
                    Ok(_) => Message::Sync { record_id },
                    Err(e) => {
                        tracing::error!(record_id = %record_id, error = %e, "relocation failed");
                        sync_failure(record_id, ErrorCode::SyncFailure)
                    }
                }
            }
            Verdict::Invalid | Verdict::Unknown => {
                if let Some(slot) = self.slots.remove(&record_id) {
                    if let Err(e) = ctx.recovery.on_invalid(&slot).await {
                        tracing::error!(record_id = %record_id, error = %e, "failed to delete record");
                    }
                }
                let reason = if verdict == Verdict::Invalid {
                    ErrorCode::InvalidDigest
                } else {
                    ErrorCode::SyncFailure
                };
                sync_failure(record_id, reason)
            }
            Verdict::SyncFailure => sync_failure(record_id, ErrorCode::SyncFailure),
            Verdict::BadStatus => sync_failure(record_id, ErrorCode::InvalidDigestStatus),
        }
    }

    async fn journal_missing<S: RecordStore + 'static>(
        &mut self,
        ctx: &SessionContext<S>,
        record_id: RecordId,
    ) -> Message {
        if ctx.info.record_type != RecordType::Journal {
            return record_failure(record_id, ErrorCode::UnsupportedRecordType);
        }

        match ctx
            .recovery
            .on_journal_missing(&ctx.info.publisher_id, &record_id, ctx.info.session_id)
            .await
        {
            Ok(purged) => {
                for id in purged.iter().chain(std::iter::once(&record_id)) {
                    self.ledger.remove(id);
                    self.slots.remove(id);
                }
                self.resume = None;
                Message::JournalMissingResponse { record_id }
            }
            Err(e) => {
                tracing::error!(record_id = %record_id, error = %e, "journal-missing purge failed");
                record_failure(record_id, ErrorCode::JournalMissingFailure)
            }
        }
    }
}

#[async_trait]
impl<S: RecordStore + 'static> RoleStrategy<S> for SubscriberRole {
    fn role(&self) -> Role {
        Role::Subscriber
    }

    async fn on_message(
        &mut self,
        ctx: &SessionContext<S>,
        message: Message,
        now: Instant,
    ) -> Result<Vec<Message>> {
        match message {
            Message::Record { headers, body } => self.receive_record(ctx, headers, body, now).await,
            Message::DigestResponse { entries } => {
                let verdicts = self.ledger.apply_responses(&entries, now);
                let mut out = Vec::with_capacity(verdicts.len());
                for (record_id, verdict) in verdicts {
                    out.push(self.settle(ctx, record_id, verdict).await);
                }
                Ok(out)
            }
            Message::JournalMissing { record_id } => {
                Ok(vec![self.journal_missing(ctx, record_id).await])
            }
            other => Err(unexpected(&other)),
        }
    }

    async fn on_tick(&mut self, ctx: &SessionContext<S>, now: Instant) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        for entry in self.ledger.expire(now) {
            tracing::warn!(
                session_id = %ctx.info.session_id,
                record_id = %entry.record_id,
                "digest verdict timed out"
            );
            if let Some(slot) = self.slots.remove(&entry.record_id) {
                ctx.recovery.on_invalid(&slot).await?;
            }
            out.push(sync_failure(entry.record_id, ErrorCode::SyncFailure));
        }

        let batch = self.ledger.challenge_batch();
        if !batch.is_empty() {
            out.push(Message::DigestChallenge { entries: batch });
        }
        Ok(out)
    }

    async fn on_close(&mut self, ctx: &SessionContext<S>) -> Result<()> {
        let dropped = self.ledger.clear();
        self.slots.clear();
        self.resume = None;
        let released = ctx.recovery.release_owner(&ctx.info.session_id).await;
        if !dropped.is_empty() || released > 0 {
            tracing::info!(
                session_id = %ctx.info.session_id,
                dropped = dropped.len(),
                released,
                "pending digests dropped at close"
            );
        }
        Ok(())
    }

    fn pending(&self) -> usize {
        self.ledger.pending_len() + self.ledger.overflow_len()
    }

    fn record_phase(&self, record_id: &RecordId) -> Option<RecordPhase> {
        if self.ledger.contains(record_id) {
            Some(RecordPhase::AwaitingConfirmation)
        } else if self.slots.contains_key(record_id) {
            Some(RecordPhase::Receiving)
        } else {
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Publisher
// ─────────────────────────────────────────────────────────────────────────────

/// Sending side: remember local digests and answer challenges.
#[derive(Debug, Default)]
pub struct PublisherRole {
    sent: HashMap<RecordId, DigestValue>,
}

impl PublisherRole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the digest of a record handed to the transport.
    pub fn note_sent(&mut self, record_id: RecordId, digest: DigestValue) {
        self.sent.insert(record_id, digest);
    }

    /// Compare a peer's digest against what was sent.
    pub fn answer(&self, pair: &DigestPair) -> DigestResponseEntry {
        let (status, digest) = match self.sent.get(&pair.record_id) {
            Some(local) if *local == pair.digest => (DigestStatus::Confirmed, Some(local.clone())),
            Some(local) => (DigestStatus::Invalid, Some(local.clone())),
            None => (DigestStatus::Unknown, None),
        };
        DigestResponseEntry {
            record_id: pair.record_id.clone(),
            status: status.as_str().to_string(),
            digest,
        }
    }
}

#[async_trait]
impl<S: RecordStore + 'static> RoleStrategy<S> for PublisherRole {
    fn role(&self) -> Role {
        Role::Publisher
    }

    async fn on_message(
        &mut self,
        ctx: &SessionContext<S>,
        message: Message,
        _now: Instant,
    ) -> Result<Vec<Message>> {
        match message {
            Message::DigestChallenge { entries } => {
                let entries = entries.iter().map(|pair| self.answer(pair)).collect();
                Ok(vec![Message::DigestResponse { entries }])
            }
            Message::Sync { record_id } => {
                self.sent.remove(&record_id);
                tracing::info!(session_id = %ctx.info.session_id, record_id = %record_id, "record synced");
                Ok(Vec::new())
            }
            Message::SyncFailure { record_id, reason }
            | Message::RecordFailure { record_id, reason } => {
                self.sent.remove(&record_id);
                tracing::warn!(
                    session_id = %ctx.info.session_id,
                    record_id = %record_id,
                    reason = %reason,
                    "peer refused record"
                );
                Ok(Vec::new())
            }
            Message::JournalMissingResponse { record_id } => {
                tracing::debug!(record_id = %record_id, "journal-missing acknowledged");
                Ok(Vec::new())
            }
            other => Err(unexpected(&other)),
        }
    }

    async fn on_outbound(&mut self, ctx: &SessionContext<S>, message: &Message) -> Result<()> {
        let Message::Record { headers, body } = message else {
            return Ok(());
        };
        let envelope = RecordEnvelope::parse(ctx.info.record_type, headers)
            .map_err(|r| SyncError::InvalidMessage(format!("{}: {}", r.record_id, r.code)))?;
        let record_id = envelope.record_id.clone();

        let mut codec = RecordCodec::new(envelope, ctx.info.digest);
        codec.feed(body);
        match codec.finish() {
            CodecOutcome::Complete(digest) => {
                self.note_sent(record_id, digest);
                Ok(())
            }
            _ => Err(SyncError::InvalidMessage(format!(
                "record {} body does not match its headers",
                record_id
            ))),
        }
    }

    async fn on_tick(&mut self, _ctx: &SessionContext<S>, _now: Instant) -> Result<Vec<Message>> {
        Ok(Vec::new())
    }

    async fn on_close(&mut self, _ctx: &SessionContext<S>) -> Result<()> {
        self.sent.clear();
        Ok(())
    }

    fn pending(&self) -> usize {
        self.sent.len()
    }
}
