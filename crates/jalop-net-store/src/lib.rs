//! # JALoP Net Store
//!
//! Record persistence for JALoP network sync. Provides the [`RecordStore`]
//! trait with filesystem and in-memory implementations, the per-record
//! status marker, and the journal recovery policy.
//!
//! ## Overview
//!
//! Records land in a temporary namespace keyed by publisher id and record
//! type. Once the peer confirms the digest, a record is moved into the
//! confirmed namespace for its type. [`FsRecordStore`] is the primary
//! implementation; [`MemoryRecordStore`] has the same semantics for tests.
//!
//! ## Key Types
//!
//! - [`RecordStore`] - The async trait for all storage operations
//! - [`FsRecordStore`] - Directory-per-record persistent storage
//! - [`MemoryRecordStore`] - In-memory storage for tests
//! - [`RecordStatus`] - The structural marker written before any byte
//! - [`JournalRecoveryPolicy`] - Resume, restart or purge decisions
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use jalop_net_store::{FsRecordStore, JournalRecoveryPolicy};
//! use jalop_net_core::{PublisherId, SessionId};
//!
//! async fn example(publisher: PublisherId, session: SessionId) {
//!     let store = Arc::new(FsRecordStore::open("/var/lib/jalop").unwrap());
//!     let policy = JournalRecoveryPolicy::new(store);
//!
//!     if let Some(resume) = policy.find_resumable(&publisher, session).await.unwrap() {
//!         println!("resume {} at {}", resume.record_id, resume.offset);
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Marker first**: a record without a readable status marker is corrupt
//! - **Move on confirm**: confirmation relocates, it never copies
//! - **Monotonic sequences**: persisted per namespace, never reused
//! - **Claimed slots**: recovery never touches a record a live session owns

pub mod error;
pub mod fs;
pub mod memory;
pub mod recovery;
pub mod status;
pub mod traits;

pub use error::{Result, StoreError};
pub use fs::FsRecordStore;
pub use memory::MemoryRecordStore;
pub use recovery::{JournalRecoveryPolicy, ResumeState};
pub use status::{PartProgress, RecordStatus};
pub use traits::{ConfirmedRecord, RecordSlot, RecordStore, RecordStoreExt, TempRecord};
