//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use bytes::Bytes;
use rand::{rngs::StdRng, Rng, SeedableRng};
use uuid::Uuid;

use jalop_net_core::{
    frame_record, record_digest, DigestAlgorithm, DigestValue, Mode, PublisherId, RecordHeaders,
    RecordType, AUDIT_FORMAT_XML,
};
use jalop_net_store::{JournalRecoveryPolicy, MemoryRecordStore};
use jalop_net_sync::{DigestPair, DigestResponseEntry, InitRequest, Message, PROTOCOL_VERSION};

/// A publisher identity and a memory store.
pub struct TestFixture {
    pub publisher_id: PublisherId,
    pub store: Arc<MemoryRecordStore>,
}

impl TestFixture {
    /// Create a new fixture with a random publisher id.
    pub fn new() -> Self {
        Self {
            publisher_id: PublisherId::from_uuid(Uuid::new_v4()),
            store: Arc::new(MemoryRecordStore::new()),
        }
    }

    /// Create with a deterministic publisher id.
    pub fn with_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            publisher_id: PublisherId::from_uuid(Uuid::from_u128(rng.gen())),
            store: Arc::new(MemoryRecordStore::new()),
        }
    }

    pub fn recovery(&self) -> JournalRecoveryPolicy<MemoryRecordStore> {
        JournalRecoveryPolicy::new(Arc::clone(&self.store))
    }

    /// An `initialize` request for this publisher that default
    /// negotiation accepts.
    pub fn init_request(&self, record_type: RecordType, mode: Mode) -> InitRequest {
        InitRequest {
            record_type: Some(record_type.as_str().to_string()),
            mode: Some(mode.as_str().to_string()),
            publisher_id: Some(self.publisher_id.to_string()),
            version: Some(PROTOCOL_VERSION.to_string()),
            ..Default::default()
        }
    }

    pub fn record(&self, record_type: RecordType, record_id: &str) -> RecordBuilder {
        RecordBuilder::new(record_type, record_id)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create fixtures for several distinct publishers.
pub fn multi_publisher_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| TestFixture::with_seed(i as u64))
        .collect()
}

/// Builds a well-formed record message.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record_type: RecordType,
    record_id: String,
    system_metadata: Vec<u8>,
    application_metadata: Vec<u8>,
    payload: Vec<u8>,
    resume_offset: usize,
}

impl RecordBuilder {
    pub fn new(record_type: RecordType, record_id: &str) -> Self {
        Self {
            record_type,
            record_id: record_id.to_string(),
            system_metadata: b"<JALRecord/>".to_vec(),
            application_metadata: Vec::new(),
            payload: b"payload".to_vec(),
            resume_offset: 0,
        }
    }

    pub fn system_metadata(mut self, bytes: &[u8]) -> Self {
        self.system_metadata = bytes.to_vec();
        self
    }

    pub fn application_metadata(mut self, bytes: &[u8]) -> Self {
        self.application_metadata = bytes.to_vec();
        self
    }

    pub fn payload(mut self, bytes: &[u8]) -> Self {
        self.payload = bytes.to_vec();
        self
    }

    /// Send only the payload from `offset` on, as a resumed journal does.
    pub fn resume_from(mut self, offset: usize) -> Self {
        self.resume_offset = offset.min(self.payload.len());
        self
    }

    fn sent_payload(&self) -> &[u8] {
        &self.payload[self.resume_offset..]
    }

    pub fn headers(&self) -> RecordHeaders {
        RecordHeaders {
            message_kind: self.record_type.message_kind().to_string(),
            record_id: Some(self.record_id.clone()),
            system_metadata_length: Some(self.system_metadata.len().to_string()),
            application_metadata_length: Some(self.application_metadata.len().to_string()),
            payload_length: Some(self.sent_payload().len().to_string()),
            audit_format: (self.record_type == RecordType::Audit)
                .then(|| AUDIT_FORMAT_XML.to_string()),
        }
    }

    pub fn body(&self) -> Bytes {
        frame_record(
            &self.system_metadata,
            &self.application_metadata,
            self.sent_payload(),
        )
    }

    pub fn build(&self) -> Message {
        Message::Record {
            headers: self.headers(),
            body: self.body(),
        }
    }

    /// Digest of the whole record, including any part skipped by
    /// [`resume_from`](Self::resume_from).
    pub fn digest(&self, algorithm: DigestAlgorithm) -> DigestValue {
        record_digest(
            algorithm,
            &self.system_metadata,
            &self.application_metadata,
            &self.payload,
        )
    }
}

/// A `digest-response` confirming every challenged entry.
pub fn confirm_all(challenge: &[DigestPair]) -> Message {
    respond_all(challenge, "confirmed")
}

/// A `digest-response` giving every challenged entry the same status.
pub fn respond_all(challenge: &[DigestPair], status: &str) -> Message {
    Message::DigestResponse {
        entries: challenge
            .iter()
            .map(|pair| DigestResponseEntry {
                record_id: pair.record_id.clone(),
                status: status.to_string(),
                digest: Some(pair.digest.clone()),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jalop_net_core::{RecordCodec, RecordEnvelope, CodecOutcome};

    #[test]
    fn test_seeded_fixtures_are_distinct_and_stable() {
        let fixtures = multi_publisher_fixtures(3);
        assert_ne!(fixtures[0].publisher_id, fixtures[1].publisher_id);
        assert_eq!(
            TestFixture::with_seed(7).publisher_id,
            TestFixture::with_seed(7).publisher_id
        );
    }

    #[test]
    fn test_builder_output_passes_validation() {
        for record_type in RecordType::ALL {
            let builder = RecordBuilder::new(record_type, "r1");
            let envelope = RecordEnvelope::parse(record_type, &builder.headers()).unwrap();
            let mut codec = RecordCodec::new(envelope, DigestAlgorithm::Sha256);
            codec.feed(&builder.body());
            assert_eq!(
                codec.finish(),
                CodecOutcome::Complete(builder.digest(DigestAlgorithm::Sha256))
            );
        }
    }

    #[test]
    fn test_resume_from_trims_payload_only() {
        let builder = RecordBuilder::new(RecordType::Journal, "j1")
            .payload(b"0123456789")
            .resume_from(4);
        assert_eq!(builder.headers().payload_length.as_deref(), Some("6"));
        assert_eq!(
            builder.digest(DigestAlgorithm::Sha256),
            RecordBuilder::new(RecordType::Journal, "j1")
                .payload(b"0123456789")
                .digest(DigestAlgorithm::Sha256)
        );
    }
}
