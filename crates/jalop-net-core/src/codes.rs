//! Stable reason codes exchanged with peers.
//!
//! Peers key behavior off these tokens, so `as_str` must never change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic reason codes carried by `initialize-nack`, `record-failure`,
/// `sync-failure` and `session-failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    // Negotiation
    UnsupportedRecordType = 1,
    UnsupportedPublisherId = 2,
    UnsupportedMode = 3,
    UnsupportedDigest = 4,
    UnsupportedXmlCompression = 5,
    UnsupportedVersion = 6,
    UnsupportedConfigureDigestChallenge = 7,

    // Record structure
    InvalidSystemMetadataLength = 20,
    InvalidApplicationMetadataLength = 21,
    InvalidLogLength = 22,
    InvalidAuditLength = 23,
    InvalidJournalLength = 24,
    InvalidJALId = 25,
    UnsupportedAuditFormat = 26,
    InvalidLogRecord = 27,
    RecordFailure = 28,

    // Digest cycle
    SyncFailure = 40,
    InvalidDigest = 41,
    InvalidDigestStatus = 42,
    JournalMissingFailure = 43,
    PendingDigestLimit = 44,

    // Session
    UnsupportedSessionId = 60,
    MaxSessionsExceeded = 61,
}

impl ErrorCode {
    const ALL: [ErrorCode; 23] = [
        ErrorCode::UnsupportedRecordType,
        ErrorCode::UnsupportedPublisherId,
        ErrorCode::UnsupportedMode,
        ErrorCode::UnsupportedDigest,
        ErrorCode::UnsupportedXmlCompression,
        ErrorCode::UnsupportedVersion,
        ErrorCode::UnsupportedConfigureDigestChallenge,
        ErrorCode::InvalidSystemMetadataLength,
        ErrorCode::InvalidApplicationMetadataLength,
        ErrorCode::InvalidLogLength,
        ErrorCode::InvalidAuditLength,
        ErrorCode::InvalidJournalLength,
        ErrorCode::InvalidJALId,
        ErrorCode::UnsupportedAuditFormat,
        ErrorCode::InvalidLogRecord,
        ErrorCode::RecordFailure,
        ErrorCode::SyncFailure,
        ErrorCode::InvalidDigest,
        ErrorCode::InvalidDigestStatus,
        ErrorCode::JournalMissingFailure,
        ErrorCode::PendingDigestLimit,
        ErrorCode::UnsupportedSessionId,
        ErrorCode::MaxSessionsExceeded,
    ];

    /// The wire token for this code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedRecordType => "UnsupportedRecordType",
            ErrorCode::UnsupportedPublisherId => "UnsupportedPublisherId",
            ErrorCode::UnsupportedMode => "UnsupportedMode",
            ErrorCode::UnsupportedDigest => "UnsupportedDigest",
            ErrorCode::UnsupportedXmlCompression => "UnsupportedXmlCompression",
            ErrorCode::UnsupportedVersion => "UnsupportedVersion",
            ErrorCode::UnsupportedConfigureDigestChallenge => {
                "UnsupportedConfigureDigestChallenge"
            }
            ErrorCode::InvalidSystemMetadataLength => "InvalidSystemMetadataLength",
            ErrorCode::InvalidApplicationMetadataLength => "InvalidApplicationMetadataLength",
            ErrorCode::InvalidLogLength => "InvalidLogLength",
            ErrorCode::InvalidAuditLength => "InvalidAuditLength",
            ErrorCode::InvalidJournalLength => "InvalidJournalLength",
            ErrorCode::InvalidJALId => "InvalidJALId",
            ErrorCode::UnsupportedAuditFormat => "UnsupportedAuditFormat",
            ErrorCode::InvalidLogRecord => "InvalidLogRecord",
            ErrorCode::RecordFailure => "RecordFailure",
            ErrorCode::SyncFailure => "SyncFailure",
            ErrorCode::InvalidDigest => "InvalidDigest",
            ErrorCode::InvalidDigestStatus => "InvalidDigestStatus",
            ErrorCode::JournalMissingFailure => "JournalMissingFailure",
            ErrorCode::PendingDigestLimit => "PendingDigestLimit",
            ErrorCode::UnsupportedSessionId => "UnsupportedSessionId",
            ErrorCode::MaxSessionsExceeded => "MaxSessionsExceeded",
        }
    }

    /// Parse a wire token. Matching is exact.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == token)
    }

    /// Numeric code.
    pub const fn code(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
