//! Protocol message types and the header-map wire codec.
//!
//! Every message is a set of `JAL-*` headers plus an optional body. Record
//! bodies carry the framed segments; digest batches carry one
//! `value=record-id` line per entry.

use bytes::Bytes;

use jalop_net_core::{
    DigestAlgorithm, DigestValue, ErrorCode, RecordHeaders, RecordId, RecordType, SessionId,
};

use crate::error::{Result, SyncError};

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Message kind tokens (the `JAL-Message` header).
pub mod kinds {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZE_ACK: &str = "initialize-ack";
    pub const INITIALIZE_NACK: &str = "initialize-nack";
    pub const LOG_RECORD: &str = "log-record";
    pub const AUDIT_RECORD: &str = "audit-record";
    pub const JOURNAL_RECORD: &str = "journal-record";
    pub const DIGEST_CHALLENGE: &str = "digest-challenge";
    pub const DIGEST_RESPONSE: &str = "digest-response";
    pub const SYNC: &str = "sync";
    pub const SYNC_FAILURE: &str = "sync-failure";
    pub const RECORD_FAILURE: &str = "record-failure";
    pub const JOURNAL_MISSING: &str = "journal-missing";
    pub const JOURNAL_MISSING_RESPONSE: &str = "journal-missing-response";
    pub const CLOSE_SESSION: &str = "close-session";
    pub const SESSION_FAILURE: &str = "session-failure";
}

/// Header names.
pub mod headers {
    pub const MESSAGE: &str = "JAL-Message";
    pub const ID: &str = "JAL-Id";
    pub const SESSION_ID: &str = "JAL-Session-Id";
    pub const PUBLISHER_ID: &str = "JAL-Publisher-Id";
    pub const MODE: &str = "JAL-Mode";
    pub const VERSION: &str = "JAL-Version";
    pub const RECORD_TYPE: &str = "JAL-Record-Type";
    pub const ACCEPT_DIGEST: &str = "JAL-Accept-Digest";
    pub const DIGEST: &str = "JAL-Digest";
    pub const ACCEPT_XML_COMPRESSION: &str = "JAL-Accept-XML-Compression";
    pub const XML_COMPRESSION: &str = "JAL-XML-Compression";
    pub const ACCEPT_CONFIGURE_DIGEST_CHALLENGE: &str = "JAL-Accept-Configure-Digest-Challenge";
    pub const CONFIGURE_DIGEST_CHALLENGE: &str = "JAL-Configure-Digest-Challenge";
    pub const SYSTEM_METADATA_LENGTH: &str = "JAL-System-Metadata-Length";
    pub const APPLICATION_METADATA_LENGTH: &str = "JAL-Application-Metadata-Length";
    pub const LOG_LENGTH: &str = "JAL-Log-Length";
    pub const AUDIT_LENGTH: &str = "JAL-Audit-Length";
    pub const JOURNAL_LENGTH: &str = "JAL-Journal-Length";
    pub const AUDIT_FORMAT: &str = "JAL-Audit-Format";
    pub const JOURNAL_OFFSET: &str = "JAL-Journal-Offset";
    pub const DIGEST_VALUE: &str = "JAL-Digest-Value";
    pub const DIGEST_STATUS: &str = "JAL-Digest-Status";
    pub const ERROR_MESSAGE: &str = "JAL-Error-Message";
}

/// Message size limits.
pub mod limits {
    /// Max tokens in any `Accept-*` list.
    pub const MAX_ACCEPT_TOKENS: usize = 32;
    /// Max entries in a digest challenge or response batch.
    pub const MAX_DIGEST_BATCH: usize = 1000;
    /// Max reasons in an initialize-nack.
    pub const MAX_NACK_REASONS: usize = 32;
    /// Max length of a record id.
    pub const MAX_RECORD_ID_LEN: usize = 256;
}

/// The type-specific length header for a record type.
pub fn length_header(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::Log => headers::LOG_LENGTH,
        RecordType::Audit => headers::AUDIT_LENGTH,
        RecordType::Journal => headers::JOURNAL_LENGTH,
    }
}

/// Handshake request, with every field exactly as the peer sent it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitRequest {
    pub record_type: Option<String>,
    pub mode: Option<String>,
    pub publisher_id: Option<String>,
    pub version: Option<String>,
    pub accept_digests: Vec<String>,
    pub accept_xml_compressions: Vec<String>,
    pub accept_configure_digest: Vec<String>,
}

/// Where a resumed journal record continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub record_id: RecordId,
    pub offset: u64,
}

/// Successful handshake reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitAck {
    pub session_id: SessionId,
    pub digest: DigestAlgorithm,
    pub xml_compression: String,
    pub configure_digest: bool,
    pub resume: Option<ResumePoint>,
}

/// One entry of a digest challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestPair {
    pub record_id: RecordId,
    pub digest: DigestValue,
}

/// One entry of a digest response.
///
/// `status` is kept raw; an unrecognized status is a per-entry failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestResponseEntry {
    pub record_id: RecordId,
    pub status: String,
    pub digest: Option<DigestValue>,
}

/// Protocol messages, in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Open a session for one record type.
    Initialize(InitRequest),

    /// Handshake accepted.
    InitializeAck(InitAck),

    /// Handshake refused, with every violated precondition.
    InitializeNack { reasons: Vec<ErrorCode> },

    /// One record: headers plus the framed segments.
    Record { headers: RecordHeaders, body: Bytes },

    /// Locally computed digests, in completion order.
    DigestChallenge { entries: Vec<DigestPair> },

    /// The peer's verdicts on a challenge batch.
    DigestResponse { entries: Vec<DigestResponseEntry> },

    /// The record is durably confirmed.
    Sync { record_id: RecordId },

    /// The digest cycle failed for a record.
    SyncFailure { record_id: RecordId, reason: ErrorCode },

    /// A record was refused or could not be received.
    RecordFailure { record_id: RecordId, reason: ErrorCode },

    /// The peer abandons a journal record.
    JournalMissing { record_id: RecordId },

    /// Acknowledges a journal-missing purge.
    JournalMissingResponse { record_id: RecordId },

    /// Graceful close.
    CloseSession,

    /// The session could not be found, admitted or used.
    SessionFailure { reason: ErrorCode },
}

impl Message {
    /// The `JAL-Message` token.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Initialize(_) => kinds::INITIALIZE,
            Message::InitializeAck(_) => kinds::INITIALIZE_ACK,
            Message::InitializeNack { .. } => kinds::INITIALIZE_NACK,
            Message::Record { headers, .. } => RecordType::from_message_kind(&headers.message_kind)
                .map(|t| t.message_kind())
                .unwrap_or("record"),
            Message::DigestChallenge { .. } => kinds::DIGEST_CHALLENGE,
            Message::DigestResponse { .. } => kinds::DIGEST_RESPONSE,
            Message::Sync { .. } => kinds::SYNC,
            Message::SyncFailure { .. } => kinds::SYNC_FAILURE,
            Message::RecordFailure { .. } => kinds::RECORD_FAILURE,
            Message::JournalMissing { .. } => kinds::JOURNAL_MISSING,
            Message::JournalMissingResponse { .. } => kinds::JOURNAL_MISSING_RESPONSE,
            Message::CloseSession => kinds::CLOSE_SESSION,
            Message::SessionFailure { .. } => kinds::SESSION_FAILURE,
        }
    }

    /// The record type implied by the message itself, if any.
    pub fn record_type(&self) -> Option<RecordType> {
        match self {
            Message::Record { headers, .. } => RecordType::from_message_kind(&headers.message_kind),
            Message::Initialize(req) => req.record_type.as_deref().and_then(RecordType::parse),
            _ => None,
        }
    }

    /// Check if this message respects size limits.
    pub fn validate_limits(&self) -> std::result::Result<(), &'static str> {
        match self {
            Message::Initialize(req) => {
                if req.accept_digests.len() > limits::MAX_ACCEPT_TOKENS
                    || req.accept_xml_compressions.len() > limits::MAX_ACCEPT_TOKENS
                    || req.accept_configure_digest.len() > limits::MAX_ACCEPT_TOKENS
                {
                    return Err("too many accept tokens");
                }
            }
            Message::InitializeNack { reasons } => {
                if reasons.len() > limits::MAX_NACK_REASONS {
                    return Err("too many nack reasons");
                }
            }
            Message::Record { headers, .. } => {
                if headers
                    .record_id
                    .as_ref()
                    .is_some_and(|id| id.len() > limits::MAX_RECORD_ID_LEN)
                {
                    return Err("record id too long");
                }
            }
            Message::DigestChallenge { entries } => {
                if entries.len() > limits::MAX_DIGEST_BATCH {
                    return Err("too many challenge entries");
                }
            }
            Message::DigestResponse { entries } => {
                if entries.len() > limits::MAX_DIGEST_BATCH {
                    return Err("too many response entries");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// A message plus the session it addresses.
///
/// `session_id` is raw: a peer may name a session that does not exist or
/// is not even a valid id, and failures echo it back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub session_id: Option<String>,
    pub message: Message,
}

impl Envelope {
    pub fn new(message: Message) -> Self {
        Self {
            session_id: None,
            message,
        }
    }

    pub fn for_session(session_id: &SessionId, message: Message) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            message,
        }
    }

    /// Encode into headers and a body.
    pub fn to_wire(&self) -> (HeaderMap, Bytes) {
        let mut map = HeaderMap::new();
        map.insert(headers::MESSAGE, self.message.kind());
        if let Some(id) = &self.session_id {
            map.insert(headers::SESSION_ID, id);
        }

        let body = match &self.message {
            Message::Initialize(req) => {
                map.insert_opt(headers::RECORD_TYPE, req.record_type.as_deref());
                map.insert_opt(headers::MODE, req.mode.as_deref());
                map.insert_opt(headers::PUBLISHER_ID, req.publisher_id.as_deref());
                map.insert_opt(headers::VERSION, req.version.as_deref());
                map.insert_list(headers::ACCEPT_DIGEST, &req.accept_digests);
                map.insert_list(headers::ACCEPT_XML_COMPRESSION, &req.accept_xml_compressions);
                map.insert_list(
                    headers::ACCEPT_CONFIGURE_DIGEST_CHALLENGE,
                    &req.accept_configure_digest,
                );
                Bytes::new()
            }
            Message::InitializeAck(ack) => {
                map.insert(headers::SESSION_ID, &ack.session_id.to_string());
                map.insert(headers::DIGEST, ack.digest.uri());
                map.insert(headers::XML_COMPRESSION, &ack.xml_compression);
                map.insert(
                    headers::CONFIGURE_DIGEST_CHALLENGE,
                    if ack.configure_digest { "on" } else { "off" },
                );
                if let Some(resume) = &ack.resume {
                    map.insert(headers::ID, resume.record_id.as_str());
                    map.insert(headers::JOURNAL_OFFSET, &resume.offset.to_string());
                }
                Bytes::new()
            }
            Message::InitializeNack { reasons } => {
                let tokens: Vec<&str> = reasons.iter().map(|r| r.as_str()).collect();
                map.insert(headers::ERROR_MESSAGE, &tokens.join(","));
                Bytes::new()
            }
            Message::Record { headers: rec, body } => {
                map.insert(headers::MESSAGE, &rec.message_kind);
                map.insert_opt(headers::ID, rec.record_id.as_deref());
                map.insert_opt(
                    headers::SYSTEM_METADATA_LENGTH,
                    rec.system_metadata_length.as_deref(),
                );
                map.insert_opt(
                    headers::APPLICATION_METADATA_LENGTH,
                    rec.application_metadata_length.as_deref(),
                );
                if let Some(t) = RecordType::from_message_kind(&rec.message_kind) {
                    map.insert_opt(length_header(t), rec.payload_length.as_deref());
                }
                map.insert_opt(headers::AUDIT_FORMAT, rec.audit_format.as_deref());
                body.clone()
            }
            Message::DigestChallenge { entries } => {
                let lines: Vec<String> = entries
                    .iter()
                    .map(|e| format!("{}={}", e.digest.to_hex(), e.record_id))
                    .collect();
                Bytes::from(lines.join("\r\n"))
            }
            Message::DigestResponse { entries } => {
                let lines: Vec<String> = entries
                    .iter()
                    .map(|e| match &e.digest {
                        Some(d) => format!("{},{}={}", e.status, d.to_hex(), e.record_id),
                        None => format!("{}={}", e.status, e.record_id),
                    })
                    .collect();
                Bytes::from(lines.join("\r\n"))
            }
            Message::Sync { record_id }
            | Message::JournalMissing { record_id }
            | Message::JournalMissingResponse { record_id } => {
                map.insert(headers::ID, record_id.as_str());
                Bytes::new()
            }
            Message::SyncFailure { record_id, reason }
            | Message::RecordFailure { record_id, reason } => {
                map.insert(headers::ID, record_id.as_str());
                map.insert(headers::ERROR_MESSAGE, reason.as_str());
                Bytes::new()
            }
            Message::CloseSession => Bytes::new(),
            Message::SessionFailure { reason } => {
                map.insert(headers::ERROR_MESSAGE, reason.as_str());
                Bytes::new()
            }
        };

        (map, body)
    }

    /// Decode from headers and a body.
    pub fn from_wire(map: &HeaderMap, body: Bytes) -> Result<Self> {
        let kind = map
            .get(headers::MESSAGE)
            .ok_or_else(|| SyncError::InvalidMessage("missing JAL-Message".into()))?;
        let session_id = map.get(headers::SESSION_ID).map(String::from);
        let owned = |name: &str| map.get(name).map(String::from);
        let record_id = || RecordId::from(map.get(headers::ID).unwrap_or_default());

        let message = match kind {
            kinds::INITIALIZE => Message::Initialize(InitRequest {
                record_type: owned(headers::RECORD_TYPE),
                mode: owned(headers::MODE),
                publisher_id: owned(headers::PUBLISHER_ID),
                version: owned(headers::VERSION),
                accept_digests: map.get_list(headers::ACCEPT_DIGEST),
                accept_xml_compressions: map.get_list(headers::ACCEPT_XML_COMPRESSION),
                accept_configure_digest: map.get_list(headers::ACCEPT_CONFIGURE_DIGEST_CHALLENGE),
            }),
            kinds::INITIALIZE_ACK => {
                let session_id = map
                    .get(headers::SESSION_ID)
                    .and_then(SessionId::parse)
                    .ok_or_else(|| SyncError::InvalidMessage("bad JAL-Session-Id".into()))?;
                let digest = map
                    .get(headers::DIGEST)
                    .and_then(DigestAlgorithm::from_token)
                    .ok_or_else(|| SyncError::InvalidMessage("bad JAL-Digest".into()))?;
                let resume = match map.get(headers::JOURNAL_OFFSET) {
                    Some(raw) => Some(ResumePoint {
                        record_id: record_id(),
                        offset: raw.trim().parse().map_err(|_| {
                            SyncError::InvalidMessage("bad JAL-Journal-Offset".into())
                        })?,
                    }),
                    None => None,
                };
                Message::InitializeAck(InitAck {
                    session_id,
                    digest,
                    xml_compression: owned(headers::XML_COMPRESSION).unwrap_or_default(),
                    configure_digest: !map
                        .get(headers::CONFIGURE_DIGEST_CHALLENGE)
                        .is_some_and(|v| v.trim().eq_ignore_ascii_case("off")),
                    resume,
                })
            }
            kinds::INITIALIZE_NACK => Message::InitializeNack {
                reasons: map
                    .get_list(headers::ERROR_MESSAGE)
                    .iter()
                    .filter_map(|t| ErrorCode::from_token(t))
                    .collect(),
            },
            kinds::LOG_RECORD | kinds::AUDIT_RECORD | kinds::JOURNAL_RECORD => {
                let payload_header = RecordType::from_message_kind(kind)
                    .map(length_header)
                    .unwrap_or(headers::LOG_LENGTH);
                Message::Record {
                    headers: RecordHeaders {
                        message_kind: kind.to_string(),
                        record_id: owned(headers::ID),
                        system_metadata_length: owned(headers::SYSTEM_METADATA_LENGTH),
                        application_metadata_length: owned(headers::APPLICATION_METADATA_LENGTH),
                        payload_length: owned(payload_header),
                        audit_format: owned(headers::AUDIT_FORMAT),
                    },
                    body,
                }
            }
            kinds::DIGEST_CHALLENGE => {
                let mut entries = Vec::new();
                for (value, id) in body_lines(&body)? {
                    let digest = DigestValue::from_hex(value)
                        .map_err(|e| SyncError::InvalidMessage(e.to_string()))?;
                    entries.push(DigestPair {
                        record_id: RecordId::from(id),
                        digest,
                    });
                }
                Message::DigestChallenge { entries }
            }
            kinds::DIGEST_RESPONSE => {
                let mut entries = Vec::new();
                for (value, id) in body_lines(&body)? {
                    let (status, digest) = match value.split_once(',') {
                        Some((status, hex)) => (
                            status,
                            Some(
                                DigestValue::from_hex(hex)
                                    .map_err(|e| SyncError::InvalidMessage(e.to_string()))?,
                            ),
                        ),
                        None => (value, None),
                    };
                    entries.push(DigestResponseEntry {
                        record_id: RecordId::from(id),
                        status: status.to_string(),
                        digest,
                    });
                }
                Message::DigestResponse { entries }
            }
            kinds::SYNC => Message::Sync {
                record_id: record_id(),
            },
            kinds::SYNC_FAILURE => Message::SyncFailure {
                record_id: record_id(),
                reason: reason_code(map)?,
            },
            kinds::RECORD_FAILURE => Message::RecordFailure {
                record_id: record_id(),
                reason: reason_code(map)?,
            },
            kinds::JOURNAL_MISSING => Message::JournalMissing {
                record_id: record_id(),
            },
            kinds::JOURNAL_MISSING_RESPONSE => Message::JournalMissingResponse {
                record_id: record_id(),
            },
            kinds::CLOSE_SESSION => Message::CloseSession,
            kinds::SESSION_FAILURE => Message::SessionFailure {
                reason: reason_code(map)?,
            },
            other => {
                return Err(SyncError::InvalidMessage(format!(
                    "unknown message kind: {}",
                    other
                )))
            }
        };

        Ok(Self {
            session_id,
            message,
        })
    }
}

fn reason_code(map: &HeaderMap) -> Result<ErrorCode> {
    map.get(headers::ERROR_MESSAGE)
        .and_then(|t| ErrorCode::from_token(t.trim()))
        .ok_or_else(|| SyncError::InvalidMessage("bad JAL-Error-Message".into()))
}

/// Split a digest batch body into `(value, record-id)` pairs.
fn body_lines(body: &[u8]) -> Result<Vec<(&str, &str)>> {
    let text = std::str::from_utf8(body)
        .map_err(|_| SyncError::InvalidMessage("digest body is not UTF-8".into()))?;
    text.split("\r\n")
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split_once('=')
                .ok_or_else(|| SyncError::InvalidMessage(format!("bad digest line: {}", line)))
        })
        .collect()
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any existing value.
    pub fn insert(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    fn insert_opt(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.insert(name, value);
        }
    }

    fn insert_list(&mut self, name: &str, values: &[String]) {
        if !values.is_empty() {
            self.insert(name, &values.join(","));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// A comma-separated header as trimmed, non-empty tokens.
    pub fn get_list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jalop_net_core::frame_record;

    #[test]
    fn test_header_lookup_ignores_case() {
        let map: HeaderMap = [("jal-message", "sync"), ("JAL-ID", "abc")]
            .into_iter()
            .collect();
        assert_eq!(map.get(headers::MESSAGE), Some("sync"));
        assert_eq!(map.get(headers::ID), Some("abc"));
    }

    #[test]
    fn test_accept_lists_are_trimmed() {
        let map: HeaderMap = [
            ("JAL-Message", "initialize"),
            ("JAL-Accept-Digest", " sha256 , ,sha512"),
        ]
        .into_iter()
        .collect();
        let env = Envelope::from_wire(&map, Bytes::new()).unwrap();
        match env.message {
            Message::Initialize(req) => assert_eq!(req.accept_digests, vec!["sha256", "sha512"]),
            other => panic!("expected initialize, got {:?}", other),
        }
    }

    #[test]
    fn test_record_uses_type_specific_length() {
        let body = frame_record(b"sys", b"", b"payload");
        let map: HeaderMap = [
            ("JAL-Message", "journal-record"),
            ("JAL-Id", "j1"),
            ("JAL-System-Metadata-Length", "3"),
            ("JAL-Application-Metadata-Length", "0"),
            ("JAL-Journal-Length", "7"),
            ("JAL-Log-Length", "999"),
        ]
        .into_iter()
        .collect();
        let env = Envelope::from_wire(&map, body.clone()).unwrap();
        match env.message {
            Message::Record { headers, body: decoded } => {
                assert_eq!(headers.payload_length.as_deref(), Some("7"));
                assert_eq!(decoded, body);
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_digest_response_batch_wire() {
        let digest = DigestValue::from_bytes(vec![0xab, 0xcd]);
        let env = Envelope::new(Message::DigestResponse {
            entries: vec![
                DigestResponseEntry {
                    record_id: RecordId::from("a"),
                    status: "confirmed".into(),
                    digest: Some(digest.clone()),
                },
                DigestResponseEntry {
                    record_id: RecordId::from("b"),
                    status: "unknown".into(),
                    digest: None,
                },
            ],
        });
        let (map, body) = env.to_wire();
        assert_eq!(&body[..], b"confirmed,abcd=a\r\nunknown=b");
        assert_eq!(Envelope::from_wire(&map, body).unwrap(), env);
    }

    #[test]
    fn test_nack_carries_every_reason() {
        let env = Envelope::new(Message::InitializeNack {
            reasons: vec![ErrorCode::UnsupportedDigest, ErrorCode::UnsupportedMode],
        });
        let (map, _) = env.to_wire();
        assert_eq!(
            map.get(headers::ERROR_MESSAGE),
            Some("UnsupportedDigest,UnsupportedMode")
        );
    }

    #[test]
    fn test_unknown_kind_is_invalid() {
        let map: HeaderMap = [("JAL-Message", "subscribe")].into_iter().collect();
        assert!(matches!(
            Envelope::from_wire(&map, Bytes::new()),
            Err(SyncError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_message_limits() {
        let ok = Message::InitializeNack { reasons: vec![] };
        assert!(ok.validate_limits().is_ok());

        let too_long = Message::Record {
            headers: RecordHeaders {
                message_kind: "log-record".into(),
                record_id: Some("x".repeat(limits::MAX_RECORD_ID_LEN + 1)),
                ..Default::default()
            },
            body: Bytes::new(),
        };
        assert!(too_long.validate_limits().is_err());
    }
}
