//! # JALoP Net Sync
//!
//! Sessions, handshakes and the digest-confirmation protocol for moving
//! audit records from a publisher to a subscriber.
//!
//! ## Overview
//!
//! A publisher opens one session per record type. The handshake agrees on
//! a digest algorithm, XML compression and whether digests are challenged.
//! Records then flow one way; each stored record's digest is challenged,
//! and the publisher's verdict decides whether the record moves into the
//! confirmed namespace or is discarded.
//!
//! ## Key Properties
//!
//! - **Per-session isolation**: every session has its own task and queue
//! - **Bounded in-flight state**: pending digests are capped per session
//! - **Resumable journals**: an archive-mode journal continues from the
//!   bytes already stored
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//! use jalop_net_store::{JournalRecoveryPolicy, MemoryRecordStore};
//! use jalop_net_sync::{HandshakeNegotiator, HandshakeOutcome, InitRequest, Session, SyncConfig};
//! use jalop_net_core::SessionId;
//!
//! async fn example(request: InitRequest) -> jalop_net_sync::Result<()> {
//!     let recovery = JournalRecoveryPolicy::new(Arc::new(MemoryRecordStore::new()));
//!     let negotiator = HandshakeNegotiator::default();
//!     let session_id = SessionId::generate();
//!
//!     let outcome = negotiator.negotiate(&request, &recovery, session_id).await?;
//!     if let HandshakeOutcome::Accepted(agreement) = outcome {
//!         let mut session = Session::subscriber(
//!             session_id,
//!             &agreement,
//!             recovery,
//!             SyncConfig::default(),
//!         );
//!         session.activate()?;
//!         // let replies = session.handle(message, Instant::now()).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Publisher                               Subscriber
//!   |-------- initialize ------------------->|
//!   |<------- initialize-ack ----------------|
//!   |-------- log-record ------------------->|
//!   |<------- digest-challenge --------------|
//!   |-------- digest-response -------------->|
//!   |<------- sync --------------------------|
//! ```

pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod ledger;
pub mod messages;
pub mod registry;
pub mod roles;
pub mod session;
pub mod transport;

pub use dispatch::{dispatch, ClosedHook, Outbox, SessionCommand, SessionTask};
pub use error::{Result, SyncError};
pub use handshake::{
    Agreement, HandshakeNegotiator, HandshakeOutcome, NegotiatorConfig, KNOWN_XML_COMPRESSIONS,
};
pub use ledger::{Admission, DigestEntry, DigestLedger, EntryStatus, Verdict};
pub use messages::{
    limits, DigestPair, DigestResponseEntry, Envelope, HeaderMap, InitAck, InitRequest, Message,
    ResumePoint, PROTOCOL_VERSION,
};
pub use registry::{SessionHandle, SessionKey, SessionRegistry};
pub use roles::{PublisherRole, SubscriberRole};
pub use session::{
    RecordPhase, RoleStrategy, Session, SessionContext, SessionInfo, SessionState, SyncConfig,
};
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, Transport, TransportHandle};
