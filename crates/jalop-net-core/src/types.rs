//! Strong type definitions for JALoP network sync.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of record carried by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Log,
    Audit,
    Journal,
}

impl RecordType {
    /// All record types, in wire order.
    pub const ALL: [RecordType; 3] = [RecordType::Log, RecordType::Audit, RecordType::Journal];

    /// Lowercase name used in paths and headers.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordType::Log => "log",
            RecordType::Audit => "audit",
            RecordType::Journal => "journal",
        }
    }

    /// The message kind that carries a record of this type.
    pub const fn message_kind(&self) -> &'static str {
        match self {
            RecordType::Log => "log-record",
            RecordType::Audit => "audit-record",
            RecordType::Journal => "journal-record",
        }
    }

    /// Parse a record type name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Map a record message kind back to its record type.
    pub fn from_message_kind(kind: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.message_kind().eq_ignore_ascii_case(kind.trim()))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer mode negotiated for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Records are streamed as they are produced.
    Live,
    /// Records are streamed from the publisher's backlog, with journal resume.
    Archive,
}

impl Mode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Archive => "archive",
        }
    }

    /// Parse a mode, ignoring case. `"LiVe"` is accepted.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("live") {
            Some(Mode::Live)
        } else if s.eq_ignore_ascii_case("archive") {
            Some(Mode::Archive)
        } else {
            None
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the exchange a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sends records and answers digest challenges.
    Publisher,
    /// Receives records, issues digest challenges and confirms.
    Subscriber,
}

/// A record identifier (the `JAL-Id` nonce).
///
/// Opaque to this crate. The empty id is representable because failure
/// responses for a missing id echo `""`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The empty identifier used in failure responses.
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({:?})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Peer-asserted publisher identity. Always a syntactically valid UUID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublisherId(Uuid);

impl PublisherId {
    /// Parse a publisher id. Empty and malformed strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublisherId({})", self.0)
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Session identifier, generated by the accepting side on a successful handshake.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_parse_ignores_case() {
        assert_eq!(RecordType::parse("JOURNAL"), Some(RecordType::Journal));
        assert_eq!(RecordType::parse("Log"), Some(RecordType::Log));
        assert_eq!(RecordType::parse(""), None);
        assert_eq!(RecordType::parse("metrics"), None);
    }

    #[test]
    fn test_record_type_message_kind() {
        assert_eq!(
            RecordType::from_message_kind("audit-record"),
            Some(RecordType::Audit)
        );
        assert_eq!(RecordType::Journal.message_kind(), "journal-record");
        assert_eq!(RecordType::from_message_kind("digest-response"), None);
    }

    #[test]
    fn test_mode_parse_mixed_case() {
        assert_eq!(Mode::parse("LiVe"), Some(Mode::Live));
        assert_eq!(Mode::parse("ARCHIVE"), Some(Mode::Archive));
        assert_eq!(Mode::parse("archival"), None);
        assert_eq!(Mode::parse(""), None);
    }

    #[test]
    fn test_publisher_id_requires_uuid() {
        assert!(PublisherId::parse("ae8a54d7-dd7c-4c50-a7e7-f948a140c556").is_some());
        assert!(PublisherId::parse("").is_none());
        assert!(PublisherId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn test_session_id_display_roundtrip() {
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(&id.to_string()), Some(id));
    }

    #[test]
    fn test_enums_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&RecordType::Journal).unwrap(), "\"journal\"");
        let mode: Mode = serde_json::from_str("\"archive\"").unwrap();
        assert_eq!(mode, Mode::Archive);
    }

    #[test]
    fn test_record_id_empty() {
        let id = RecordId::empty();
        assert!(id.is_empty());
        assert_eq!(id.to_string(), "");
    }
}
