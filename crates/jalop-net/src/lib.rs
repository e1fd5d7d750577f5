//! # JALoP Net
//!
//! The subscriber side of a JALoP network store: it admits publisher
//! sessions, receives log, audit and journal records, challenges their
//! digests and moves confirmed records into durable storage.
//!
//! ## Overview
//!
//! - **Sessions**: one per publisher and record type, each on its own task
//! - **Admission**: handshake negotiation, an authorization hook and a
//!   per-publisher session cap
//! - **Storage**: a filesystem store by default, or any [`store::RecordStore`]
//! - **Recovery**: archive-mode journals resume from the bytes on disk
//!
//! ## Usage
//!
//! ```rust,no_run
//! use jalop_net::{Subscriber, SubscriberConfig};
//! use jalop_net::sync::{MemoryNetwork, TransportHandle};
//!
//! async fn example() -> jalop_net::Result<()> {
//!     let config = SubscriberConfig::from_file("subscriber.json")?;
//!     let subscriber = Subscriber::open_fs(&config)?;
//!
//!     let network = MemoryNetwork::new();
//!     let transport = network.create_transport(TransportHandle(0)).await;
//!     subscriber.serve(&transport).await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `jalop_net::core` - identifiers, reason codes, digests, record codec
//! - `jalop_net::store` - storage abstraction, filesystem and memory stores
//! - `jalop_net::sync` - messages, sessions, transport

pub mod config;
pub mod connection;
pub mod error;
pub mod subscriber;

pub use jalop_net_core as core;
pub use jalop_net_store as store;
pub use jalop_net_sync as sync;

pub use config::SubscriberConfig;
pub use connection::{AcceptAll, ConnectionHandler, ConnectionRequest};
pub use error::{NetError, Result};
pub use subscriber::Subscriber;

pub use jalop_net_core::{
    DigestAlgorithm, ErrorCode, Mode, PublisherId, RecordId, RecordType, Role, SessionId,
};
