//! Proptest generators for property-based testing.

use proptest::prelude::*;

use jalop_net_core::{DigestAlgorithm, Mode, RecordId, RecordType};
use jalop_net_sync::{DigestResponseEntry, InitRequest};

use crate::fixtures::RecordBuilder;

/// Generate a RecordType.
pub fn record_type() -> impl Strategy<Value = RecordType> {
    prop_oneof![
        Just(RecordType::Log),
        Just(RecordType::Audit),
        Just(RecordType::Journal),
    ]
}

/// Generate a Mode.
pub fn mode() -> impl Strategy<Value = Mode> {
    prop_oneof![Just(Mode::Live), Just(Mode::Archive)]
}

/// Generate a supported digest algorithm.
pub fn digest_algorithm() -> impl Strategy<Value = DigestAlgorithm> {
    prop_oneof![
        Just(DigestAlgorithm::Sha256),
        Just(DigestAlgorithm::Sha384),
        Just(DigestAlgorithm::Sha512),
    ]
}

/// A digest token as a peer might offer it: a name or URI in any case.
pub fn digest_token() -> impl Strategy<Value = String> {
    (digest_algorithm(), any::<bool>(), any::<bool>()).prop_map(|(alg, by_uri, upper)| {
        let token = if by_uri { alg.uri() } else { alg.name() };
        if upper {
            token.to_ascii_uppercase()
        } else {
            token.to_string()
        }
    })
}

/// A digest token no implementation recognizes.
pub fn unknown_digest_token() -> impl Strategy<Value = String> {
    "md[0-9]|sha[0-9]{4}|x-[a-z]{1,8}".prop_map(String::from)
}

/// Generate a non-empty record id.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    "[A-Za-z0-9_.-]{1,64}".prop_map(RecordId::from)
}

/// Generate segment bytes of up to `max_len` bytes.
pub fn segment(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a digest-response status, occasionally a bad one.
pub fn digest_status() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => Just("confirmed".to_string()),
        2 => Just("invalid".to_string()),
        2 => Just("unknown".to_string()),
        1 => "[a-z]{1,10}".prop_map(String::from),
    ]
}

/// Generate a digest-response batch.
pub fn digest_response_entries(max_len: usize) -> impl Strategy<Value = Vec<DigestResponseEntry>> {
    prop::collection::vec(
        (record_id(), digest_status()).prop_map(|(record_id, status)| DigestResponseEntry {
            record_id,
            status,
            digest: None,
        }),
        0..=max_len,
    )
}

/// Generate an `initialize` request that default negotiation accepts.
pub fn init_request() -> impl Strategy<Value = InitRequest> {
    (
        record_type(),
        mode(),
        any::<u128>(),
        prop::collection::vec(digest_token(), 0..3),
    )
        .prop_map(|(record_type, mode, raw_id, accept_digests)| InitRequest {
            record_type: Some(record_type.as_str().to_string()),
            mode: Some(mode.as_str().to_string()),
            publisher_id: Some(uuid::Uuid::from_u128(raw_id).to_string()),
            version: Some(jalop_net_sync::PROTOCOL_VERSION.to_string()),
            accept_digests,
            ..Default::default()
        })
}

/// Parameters for generating a well-formed record.
#[derive(Debug, Clone)]
pub struct RecordParams {
    pub record_type: RecordType,
    pub record_id: RecordId,
    pub system_metadata: Vec<u8>,
    pub application_metadata: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Arbitrary for RecordParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            record_type(),
            record_id(),
            prop::collection::vec(any::<u8>(), 1..=256),
            segment(256),
            prop::collection::vec(any::<u8>(), 1..=2048),
        )
            .prop_map(|(record_type, record_id, sys, app, payload)| RecordParams {
                record_type,
                record_id,
                system_metadata: sys,
                application_metadata: app,
                payload,
            })
            .boxed()
    }
}

/// Build the record described by `params`.
pub fn record_from_params(params: &RecordParams) -> RecordBuilder {
    RecordBuilder::new(params.record_type, params.record_id.as_str())
        .system_metadata(&params.system_metadata)
        .application_metadata(&params.application_metadata)
        .payload(&params.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jalop_net_core::{CodecOutcome, DigestAlgorithmRegistry, RecordCodec, RecordEnvelope};
    use jalop_net_sync::HandshakeNegotiator;

    proptest! {
        #[test]
        fn digest_is_independent_of_chunking(
            params: RecordParams,
            alg in digest_algorithm(),
            cuts in prop::collection::vec(any::<usize>(), 0..8),
        ) {
            let builder = record_from_params(&params);
            let body = builder.body();
            let envelope = RecordEnvelope::parse(params.record_type, &builder.headers()).unwrap();
            let mut codec = RecordCodec::new(envelope, alg);

            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (body.len() + 1)).collect();
            cuts.push(body.len());
            cuts.sort_unstable();
            let mut start = 0;
            for end in cuts {
                let feed = codec.feed(&body[start..end]);
                prop_assert_eq!(feed.consumed, end - start);
                start = end;
            }
            prop_assert_eq!(codec.finish(), CodecOutcome::Complete(builder.digest(alg)));
        }

        #[test]
        fn resumed_digest_equals_full_digest(
            params: RecordParams,
            split in any::<prop::sample::Index>(),
        ) {
            let offset = split.index(params.payload.len());
            let full = record_from_params(&params);
            let resumed = full.clone().resume_from(offset);

            let mut headers = resumed.headers();
            headers.message_kind = RecordType::Journal.message_kind().to_string();
            headers.audit_format = None;
            let envelope = RecordEnvelope::parse(RecordType::Journal, &headers).unwrap();
            let mut codec = RecordCodec::resume(
                envelope,
                DigestAlgorithm::Sha256,
                params.payload[..offset].to_vec(),
            );
            codec.feed(&resumed.body());
            prop_assert_eq!(
                codec.finish(),
                CodecOutcome::Complete(full.digest(DigestAlgorithm::Sha256))
            );
        }

        #[test]
        fn generated_requests_are_accepted(req in init_request()) {
            prop_assert!(HandshakeNegotiator::default().evaluate(&req).is_ok());
        }

        #[test]
        fn one_unknown_digest_fails_selection(
            mut offered in prop::collection::vec(digest_token(), 0..3),
            unknown in unknown_digest_token(),
            at in any::<prop::sample::Index>(),
        ) {
            let pos = at.index(offered.len() + 1);
            offered.insert(pos, unknown);
            prop_assert_eq!(DigestAlgorithmRegistry::default().select(&offered), None);
        }
    }
}
