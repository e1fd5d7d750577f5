//! Connect-time negotiation.
//!
//! Agrees on record type, mode, digest algorithm, XML compression and
//! digest-challenge configuration. Every violated precondition is
//! collected, so one `initialize-nack` can report all of them.

use jalop_net_core::{
    DigestAlgorithm, DigestAlgorithmRegistry, ErrorCode, Mode, PublisherId, RecordType, SessionId,
};
use jalop_net_store::{JournalRecoveryPolicy, RecordStore, ResumeState};

use crate::error::Result;
use crate::messages::{InitRequest, PROTOCOL_VERSION};

/// XML compression tokens understood by this implementation.
pub const KNOWN_XML_COMPRESSIONS: [&str; 3] = ["none", "exi-1.0", "deflate"];

/// What the local side is willing to serve.
#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    pub record_types: Vec<RecordType>,
    pub modes: Vec<Mode>,
    /// Supported digests in preference order, plus the default.
    pub digests: DigestAlgorithmRegistry,
    /// Supported XML compressions in preference order.
    pub xml_compressions: Vec<String>,
    /// Allowed configure-digest-challenge values (`on`, `off`).
    pub configure_digest: Vec<String>,
    pub versions: Vec<String>,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            record_types: RecordType::ALL.to_vec(),
            modes: vec![Mode::Live, Mode::Archive],
            digests: DigestAlgorithmRegistry::default(),
            xml_compressions: KNOWN_XML_COMPRESSIONS.iter().map(|s| s.to_string()).collect(),
            configure_digest: vec!["on".into(), "off".into()],
            versions: vec![PROTOCOL_VERSION.to_string()],
        }
    }
}

/// The agreed session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agreement {
    pub record_type: RecordType,
    pub mode: Mode,
    pub publisher_id: PublisherId,
    pub digest: DigestAlgorithm,
    pub xml_compression: String,
    /// Whether records go through the digest challenge at all.
    pub configure_digest: bool,
    pub version: String,
    /// Set only on the archive journal path, by [`HandshakeNegotiator::negotiate`].
    pub resume: Option<ResumeState>,
}

/// Outcome of a handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Accepted(Agreement),
    Rejected(Vec<ErrorCode>),
}

/// Evaluates `initialize` requests against a [`NegotiatorConfig`].
#[derive(Debug, Clone, Default)]
pub struct HandshakeNegotiator {
    config: NegotiatorConfig,
}

impl HandshakeNegotiator {
    pub fn new(config: NegotiatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NegotiatorConfig {
        &self.config
    }

    /// Check a request without touching storage.
    ///
    /// All checks run; rejections accumulate in a fixed order.
    pub fn evaluate(&self, req: &InitRequest) -> std::result::Result<Agreement, Vec<ErrorCode>> {
        let mut reasons = Vec::new();

        let record_type = req
            .record_type
            .as_deref()
            .and_then(RecordType::parse)
            .filter(|t| self.config.record_types.contains(t));
        if record_type.is_none() {
            reasons.push(ErrorCode::UnsupportedRecordType);
        }

        let publisher_id = req.publisher_id.as_deref().and_then(PublisherId::parse);
        if publisher_id.is_none() {
            reasons.push(ErrorCode::UnsupportedPublisherId);
        }

        let mode = req
            .mode
            .as_deref()
            .and_then(Mode::parse)
            .filter(|m| self.config.modes.contains(m));
        if mode.is_none() {
            reasons.push(ErrorCode::UnsupportedMode);
        }

        let digest = self.config.digests.select(&req.accept_digests);
        if digest.is_none() {
            reasons.push(ErrorCode::UnsupportedDigest);
        }

        let xml_compression = self.select_xml_compression(&req.accept_xml_compressions);
        if xml_compression.is_none() {
            reasons.push(ErrorCode::UnsupportedXmlCompression);
        }

        let configure_digest = self.select_configure_digest(&req.accept_configure_digest);
        if configure_digest.is_none() {
            reasons.push(ErrorCode::UnsupportedConfigureDigestChallenge);
        }

        let version = req
            .version
            .as_deref()
            .map(str::trim)
            .filter(|v| self.config.versions.iter().any(|s| s.as_str() == *v));
        if version.is_none() {
            reasons.push(ErrorCode::UnsupportedVersion);
        }

        match (
            record_type,
            publisher_id,
            mode,
            digest,
            xml_compression,
            configure_digest,
            version,
        ) {
            (
                Some(record_type),
                Some(publisher_id),
                Some(mode),
                Some(digest),
                Some(xml_compression),
                Some(configure_digest),
                Some(version),
            ) => Ok(Agreement {
                record_type,
                mode,
                publisher_id,
                digest,
                xml_compression,
                configure_digest,
                version: version.to_string(),
                resume: None,
            }),
            _ => Err(reasons),
        }
    }

    /// Evaluate a request and, on the archive journal path, look for a
    /// resumable record on behalf of the session `owner` will become.
    ///
    /// A resumable record is claimed for `owner`. If the session is never
    /// admitted, the caller releases it with
    /// [`JournalRecoveryPolicy::release_owner`].
    pub async fn negotiate<S: RecordStore>(
        &self,
        req: &InitRequest,
        recovery: &JournalRecoveryPolicy<S>,
        owner: SessionId,
    ) -> Result<HandshakeOutcome> {
        match self.evaluate(req) {
            Ok(mut agreement) => {
                agreement.resume = Self::resume_point(&agreement, recovery, owner).await?;
                Ok(HandshakeOutcome::Accepted(agreement))
            }
            Err(reasons) => Ok(HandshakeOutcome::Rejected(reasons)),
        }
    }

    async fn resume_point<S: RecordStore>(
        agreement: &Agreement,
        recovery: &JournalRecoveryPolicy<S>,
        owner: SessionId,
    ) -> Result<Option<ResumeState>> {
        if agreement.mode != Mode::Archive || agreement.record_type != RecordType::Journal {
            return Ok(None);
        }
        Ok(recovery.find_resumable(&agreement.publisher_id, owner).await?)
    }

    /// An empty offer selects `none` when it is supported. Otherwise the
    /// first locally preferred compression the peer offered wins.
    fn select_xml_compression(&self, offered: &[String]) -> Option<String> {
        if offered.is_empty() {
            return self
                .config
                .xml_compressions
                .iter()
                .find(|c| c.eq_ignore_ascii_case("none"))
                .cloned();
        }
        self.config
            .xml_compressions
            .iter()
            .find(|local| offered.iter().any(|o| o.trim().eq_ignore_ascii_case(local)))
            .cloned()
    }

    /// An empty offer means `on`. Any unrecognized token fails the selection.
    fn select_configure_digest(&self, offered: &[String]) -> Option<bool> {
        let allowed = |token: &str| {
            self.config
                .configure_digest
                .iter()
                .any(|a| a.eq_ignore_ascii_case(token))
        };
        if offered.is_empty() {
            return allowed("on").then_some(true);
        }

        let mut parsed = Vec::with_capacity(offered.len());
        for token in offered {
            let token = token.trim();
            if token.eq_ignore_ascii_case("on") {
                parsed.push(true);
            } else if token.eq_ignore_ascii_case("off") {
                parsed.push(false);
            } else {
                return None;
            }
        }

        self.config.configure_digest.iter().find_map(|local| {
            let local_on = local.eq_ignore_ascii_case("on");
            parsed.contains(&local_on).then_some(local_on)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jalop_net_store::MemoryRecordStore;
    use std::sync::Arc;

    const PUBLISHER: &str = "ae8a54d7-dd7c-4c50-a7e7-f948a140c556";

    fn request() -> InitRequest {
        InitRequest {
            record_type: Some("journal".into()),
            mode: Some("archive".into()),
            publisher_id: Some(PUBLISHER.into()),
            version: Some("2.0".into()),
            accept_digests: vec![DigestAlgorithm::Sha256.uri().into()],
            accept_xml_compressions: vec!["none".into()],
            accept_configure_digest: vec!["on".into()],
        }
    }

    #[test]
    fn test_accepts_valid_request() {
        let agreement = HandshakeNegotiator::default().evaluate(&request()).unwrap();
        assert_eq!(agreement.record_type, RecordType::Journal);
        assert_eq!(agreement.mode, Mode::Archive);
        assert_eq!(agreement.digest, DigestAlgorithm::Sha256);
        assert_eq!(agreement.xml_compression, "none");
        assert!(agreement.configure_digest);
    }

    #[test]
    fn test_mode_is_case_insensitive() {
        let mut req = request();
        req.mode = Some("LiVe".into());
        let agreement = HandshakeNegotiator::default().evaluate(&req).unwrap();
        assert_eq!(agreement.mode, Mode::Live);
    }

    #[test]
    fn test_mode_not_served() {
        let negotiator = HandshakeNegotiator::new(NegotiatorConfig {
            modes: vec![Mode::Live],
            ..Default::default()
        });
        assert_eq!(
            negotiator.evaluate(&request()),
            Err(vec![ErrorCode::UnsupportedMode])
        );
    }

    #[test]
    fn test_invalid_digest_token_fails_whole_offer() {
        let mut req = request();
        req.accept_digests = vec!["sha999".into(), DigestAlgorithm::Sha256.uri().into()];
        assert_eq!(
            HandshakeNegotiator::default().evaluate(&req),
            Err(vec![ErrorCode::UnsupportedDigest])
        );
    }

    #[test]
    fn test_empty_digest_offer_uses_default() {
        let mut req = request();
        req.accept_digests.clear();
        let agreement = HandshakeNegotiator::default().evaluate(&req).unwrap();
        assert_eq!(agreement.digest, DigestAlgorithm::Sha256);
    }

    #[test]
    fn test_rejections_accumulate() {
        let req = InitRequest {
            record_type: None,
            mode: Some("sometimes".into()),
            publisher_id: Some("not-a-uuid".into()),
            version: Some("1.0".into()),
            accept_digests: vec!["md5".into()],
            accept_xml_compressions: vec!["zip".into()],
            accept_configure_digest: vec!["maybe".into()],
        };
        assert_eq!(
            HandshakeNegotiator::default().evaluate(&req),
            Err(vec![
                ErrorCode::UnsupportedRecordType,
                ErrorCode::UnsupportedPublisherId,
                ErrorCode::UnsupportedMode,
                ErrorCode::UnsupportedDigest,
                ErrorCode::UnsupportedXmlCompression,
                ErrorCode::UnsupportedConfigureDigestChallenge,
                ErrorCode::UnsupportedVersion,
            ])
        );
    }

    #[test]
    fn test_empty_publisher_id() {
        let mut req = request();
        req.publisher_id = Some(String::new());
        assert_eq!(
            HandshakeNegotiator::default().evaluate(&req),
            Err(vec![ErrorCode::UnsupportedPublisherId])
        );
    }

    #[test]
    fn test_xml_compression_defaults_to_none() {
        let mut req = request();
        req.accept_xml_compressions.clear();
        assert_eq!(
            HandshakeNegotiator::default()
                .evaluate(&req)
                .unwrap()
                .xml_compression,
            "none"
        );

        let negotiator = HandshakeNegotiator::new(NegotiatorConfig {
            xml_compressions: vec!["deflate".into()],
            ..Default::default()
        });
        assert_eq!(
            negotiator.evaluate(&req),
            Err(vec![ErrorCode::UnsupportedXmlCompression])
        );
    }

    #[test]
    fn test_configure_digest_off() {
        let mut req = request();
        req.accept_configure_digest = vec!["OFF".into()];
        assert!(!HandshakeNegotiator::default().evaluate(&req).unwrap().configure_digest);

        let negotiator = HandshakeNegotiator::new(NegotiatorConfig {
            configure_digest: vec!["on".into()],
            ..Default::default()
        });
        assert_eq!(
            negotiator.evaluate(&req),
            Err(vec![ErrorCode::UnsupportedConfigureDigestChallenge])
        );
    }

    #[tokio::test]
    async fn test_negotiate_without_backlog_has_no_resume() {
        let recovery = JournalRecoveryPolicy::new(Arc::new(MemoryRecordStore::new()));
        let outcome = HandshakeNegotiator::default()
            .negotiate(&request(), &recovery, SessionId::generate())
            .await
            .unwrap();
        match outcome {
            HandshakeOutcome::Accepted(agreement) => assert!(agreement.resume.is_none()),
            HandshakeOutcome::Rejected(reasons) => panic!("rejected: {:?}", reasons),
        }
    }

    #[tokio::test]
    async fn test_negotiate_claims_resume_for_owner() {
        use jalop_net_core::{RecordId, RecordLengths, RecordPart};

        let store = Arc::new(MemoryRecordStore::new());
        let recovery = JournalRecoveryPolicy::new(Arc::clone(&store));
        let publisher = PublisherId::parse(PUBLISHER).unwrap();
        let slot = store
            .create(
                &publisher,
                RecordType::Journal,
                &RecordId::from("j1"),
                RecordLengths {
                    system_metadata: 3,
                    application_metadata: 0,
                    payload: 8,
                },
            )
            .await
            .unwrap();
        store.append(&slot, RecordPart::Payload, b"abcd").await.unwrap();

        let owner = SessionId::generate();
        let outcome = HandshakeNegotiator::default()
            .negotiate(&request(), &recovery, owner)
            .await
            .unwrap();
        let HandshakeOutcome::Accepted(agreement) = outcome else {
            panic!("expected acceptance");
        };
        assert_eq!(agreement.resume.map(|r| r.offset), Some(4));
        assert_eq!(recovery.owner(&slot).await, Some(owner));

        // A second archive session sees nothing while the first holds it.
        let again = HandshakeNegotiator::default()
            .negotiate(&request(), &recovery, SessionId::generate())
            .await
            .unwrap();
        let HandshakeOutcome::Accepted(agreement) = again else {
            panic!("expected acceptance");
        };
        assert!(agreement.resume.is_none());
        assert!(store.status(&slot).await.unwrap().is_some());
    }
}
