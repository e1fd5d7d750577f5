//! # JALoP Net Testkit
//!
//! Testing utilities for the JALoP network crates.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a publisher identity with a memory store, and a builder
//!   for well-formed records
//! - **Generators**: Proptest strategies for records, handshakes and
//!   digest batches
//!
//! ## Test Fixtures
//!
//! ```rust
//! use jalop_net_core::{DigestAlgorithm, RecordType};
//! use jalop_net_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let record = fixture
//!     .record(RecordType::Log, "abc")
//!     .payload(b"hello")
//!     .build();
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use jalop_net_testkit::generators::{record_from_params, RecordParams};
//!
//! proptest! {
//!     #[test]
//!     fn digest_is_deterministic(params: RecordParams) {
//!         let a = record_from_params(&params).digest(DigestAlgorithm::Sha256);
//!         let b = record_from_params(&params).digest(DigestAlgorithm::Sha256);
//!         prop_assert_eq!(a, b);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{confirm_all, multi_publisher_fixtures, respond_all, RecordBuilder, TestFixture};
pub use generators::{record_from_params, RecordParams};
