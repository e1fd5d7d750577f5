//! Record framing: length validation, segment streaming and digesting.
//!
//! A record travels as three segments, each followed by the ASCII marker
//! `BREAK`:
//!
//! ```text
//! sys_metadata BREAK app_metadata BREAK payload BREAK
//! ```
//!
//! The digest covers the three segments in order and never the markers.
//! On a journal resume the already-stored payload prefix is fed to the
//! digest at the payload boundary, so the final digest equals the digest
//! of the record sent in one pass.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codes::ErrorCode;
use crate::digest::{DigestAlgorithm, DigestValue, RecordDigester};
use crate::error::RecordRejection;
use crate::types::{RecordId, RecordType};

/// Trailing synchronization marker after every segment.
pub const BREAK_MARKER: &[u8; 5] = b"BREAK";

/// The only audit format accepted (case-insensitive).
pub const AUDIT_FORMAT_XML: &str = "xml";

/// One of the three logically separate regions of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordPart {
    SystemMetadata,
    ApplicationMetadata,
    Payload,
}

impl RecordPart {
    fn index(self) -> usize {
        match self {
            RecordPart::SystemMetadata => 0,
            RecordPart::ApplicationMetadata => 1,
            RecordPart::Payload => 2,
        }
    }

    fn next(self) -> Option<RecordPart> {
        match self {
            RecordPart::SystemMetadata => Some(RecordPart::ApplicationMetadata),
            RecordPart::ApplicationMetadata => Some(RecordPart::Payload),
            RecordPart::Payload => None,
        }
    }
}

/// Raw record headers exactly as the transport delivered them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeaders {
    /// Message kind, e.g. `journal-record`.
    pub message_kind: String,
    pub record_id: Option<String>,
    pub system_metadata_length: Option<String>,
    pub application_metadata_length: Option<String>,
    /// The type-specific length (`JAL-Log-Length` and friends).
    pub payload_length: Option<String>,
    pub audit_format: Option<String>,
}

/// Declared segment lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLengths {
    pub system_metadata: u64,
    pub application_metadata: u64,
    pub payload: u64,
}

impl RecordLengths {
    pub fn get(&self, part: RecordPart) -> u64 {
        match part {
            RecordPart::SystemMetadata => self.system_metadata,
            RecordPart::ApplicationMetadata => self.application_metadata,
            RecordPart::Payload => self.payload,
        }
    }

    /// Total framed size including markers.
    pub fn framed_len(&self) -> u64 {
        self.system_metadata
            + self.application_metadata
            + self.payload
            + 3 * BREAK_MARKER.len() as u64
    }
}

/// A record whose headers passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub record_id: RecordId,
    pub record_type: RecordType,
    pub lengths: RecordLengths,
    pub audit_format: Option<String>,
}

impl RecordEnvelope {
    /// Validate raw headers against the channel's negotiated type.
    ///
    /// Checks run in a fixed order and stop at the first failure:
    /// 1. system metadata length, strictly positive
    /// 2. application metadata length, non-negative
    /// 3. the message kind against the channel type
    /// 4. the type-specific length, then the audit format for audit records
    /// 5. the record id, non-empty
    pub fn parse(channel: RecordType, headers: &RecordHeaders) -> Result<Self, RecordRejection> {
        let echo = headers
            .record_id
            .as_deref()
            .map(RecordId::from)
            .unwrap_or_else(RecordId::empty);
        let reject = |code| RecordRejection::new(echo.clone(), code);

        let system_metadata = parse_length(headers.system_metadata_length.as_deref())
            .filter(|len| *len > 0)
            .ok_or_else(|| reject(ErrorCode::InvalidSystemMetadataLength))?;

        let application_metadata = parse_length(headers.application_metadata_length.as_deref())
            .ok_or_else(|| reject(ErrorCode::InvalidApplicationMetadataLength))?;

        if RecordType::from_message_kind(&headers.message_kind) != Some(channel) {
            return Err(reject(ErrorCode::UnsupportedRecordType));
        }

        let payload_raw = parse_length(headers.payload_length.as_deref());
        let payload = match channel {
            RecordType::Log => {
                let len = payload_raw.ok_or_else(|| reject(ErrorCode::InvalidLogLength))?;
                if len == 0 && application_metadata == 0 {
                    return Err(reject(ErrorCode::InvalidLogRecord));
                }
                len
            }
            RecordType::Audit => {
                let len = payload_raw
                    .filter(|len| *len > 0)
                    .ok_or_else(|| reject(ErrorCode::InvalidAuditLength))?;
                let format_ok = headers
                    .audit_format
                    .as_deref()
                    .map(|f| f.trim().eq_ignore_ascii_case(AUDIT_FORMAT_XML))
                    .unwrap_or(false);
                if !format_ok {
                    return Err(reject(ErrorCode::UnsupportedAuditFormat));
                }
                len
            }
            RecordType::Journal => {
                payload_raw.ok_or_else(|| reject(ErrorCode::InvalidJournalLength))?
            }
        };

        if echo.is_empty() {
            return Err(RecordRejection::new(RecordId::empty(), ErrorCode::InvalidJALId));
        }

        Ok(Self {
            record_id: echo,
            record_type: channel,
            lengths: RecordLengths {
                system_metadata,
                application_metadata,
                payload,
            },
            audit_format: headers.audit_format.clone(),
        })
    }
}

/// Parse a non-negative decimal length. Missing, empty, junk and negative
/// values are all `None`.
fn parse_length(raw: Option<&str>) -> Option<u64> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<i64>().ok().and_then(|v| u64::try_from(v).ok())
}

/// A run of consumed bytes belonging to one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentChunk<'a> {
    pub part: RecordPart,
    pub bytes: &'a [u8],
}

/// Result of one `feed` call.
#[derive(Debug, Default)]
pub struct Feed<'a> {
    /// Bytes consumed from the input, markers included.
    pub consumed: usize,
    /// Segment bytes, in order, borrowed from the input.
    pub chunks: Vec<SegmentChunk<'a>>,
}

/// Final state of a record stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecOutcome {
    /// All declared bytes and markers arrived; exactly one digest.
    Complete(DigestValue),
    /// The stream ended before all declared bytes arrived.
    Incomplete { received: u64, expected: u64 },
    /// A trailing marker was absent or corrupted.
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Segment { part: RecordPart, remaining: u64 },
    Marker { part: RecordPart, matched: usize },
    Done,
    Incorrect,
}

/// Streaming decoder and digester for one record.
#[derive(Debug)]
pub struct RecordCodec {
    envelope: RecordEnvelope,
    digester: Option<RecordDigester>,
    resume_prefix: Option<Vec<u8>>,
    resume_offset: u64,
    stage: Stage,
    received: [u64; 3],
}

impl RecordCodec {
    /// Begin a fresh record.
    pub fn new(envelope: RecordEnvelope, algorithm: DigestAlgorithm) -> Self {
        let stage = Stage::Segment {
            part: RecordPart::SystemMetadata,
            remaining: envelope.lengths.system_metadata,
        };
        Self {
            envelope,
            digester: Some(RecordDigester::new(algorithm)),
            resume_prefix: None,
            resume_offset: 0,
            stage,
            received: [0; 3],
        }
    }

    /// Begin a resumed journal record.
    ///
    /// `prefix` is the payload already stored; the envelope's payload
    /// length counts only the bytes still to come.
    pub fn resume(envelope: RecordEnvelope, algorithm: DigestAlgorithm, prefix: Vec<u8>) -> Self {
        let mut codec = Self::new(envelope, algorithm);
        codec.resume_offset = prefix.len() as u64;
        codec.resume_prefix = Some(prefix);
        codec
    }

    pub fn envelope(&self) -> &RecordEnvelope {
        &self.envelope
    }

    pub fn record_id(&self) -> &RecordId {
        &self.envelope.record_id
    }

    /// Payload bytes that were already stored before this transfer.
    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }

    /// Bytes received so far for a segment, excluding any resume prefix.
    pub fn received(&self, part: RecordPart) -> u64 {
        self.received[part.index()]
    }

    pub fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Done | Stage::Incorrect)
    }

    /// Consume as much of `input` as belongs to this record.
    ///
    /// Stops at the end of the final marker, or at the first corrupted
    /// marker byte; anything after that is left unconsumed.
    pub fn feed<'a>(&mut self, input: &'a [u8]) -> Feed<'a> {
        let mut feed = Feed::default();
        let mut pos = 0;

        loop {
            match self.stage {
                Stage::Segment { part, remaining } if remaining == 0 => {
                    self.stage = Stage::Marker { part, matched: 0 };
                }
                Stage::Segment { part, remaining } => {
                    if pos >= input.len() {
                        break;
                    }
                    let available = (input.len() - pos) as u64;
                    let take = remaining.min(available) as usize;
                    let bytes = &input[pos..pos + take];
                    if let Some(d) = self.digester.as_mut() {
                        d.update(bytes);
                    }
                    self.received[part.index()] += take as u64;
                    feed.chunks.push(SegmentChunk { part, bytes });
                    pos += take;
                    self.stage = Stage::Segment {
                        part,
                        remaining: remaining - take as u64,
                    };
                }
                Stage::Marker { part, matched } => {
                    if matched == BREAK_MARKER.len() {
                        self.stage = match part.next() {
                            Some(next) => self.enter(next),
                            None => Stage::Done,
                        };
                        continue;
                    }
                    if pos >= input.len() {
                        break;
                    }
                    if input[pos] != BREAK_MARKER[matched] {
                        self.stage = Stage::Incorrect;
                        break;
                    }
                    pos += 1;
                    self.stage = Stage::Marker {
                        part,
                        matched: matched + 1,
                    };
                }
                Stage::Done | Stage::Incorrect => break,
            }
        }

        feed.consumed = pos;
        feed
    }

    fn enter(&mut self, part: RecordPart) -> Stage {
        if part == RecordPart::Payload {
            if let (Some(prefix), Some(d)) = (self.resume_prefix.take(), self.digester.as_mut()) {
                d.update(&prefix);
            }
        }
        Stage::Segment {
            part,
            remaining: self.envelope.lengths.get(part),
        }
    }

    /// Finish the record. A digest is produced only for a complete record.
    pub fn finish(mut self) -> CodecOutcome {
        match self.stage {
            Stage::Done => match self.digester.take() {
                Some(d) => CodecOutcome::Complete(d.finalize()),
                None => CodecOutcome::Incorrect,
            },
            Stage::Incorrect => CodecOutcome::Incorrect,
            _ => {
                let lengths = self.envelope.lengths;
                CodecOutcome::Incomplete {
                    received: self.received.iter().sum(),
                    expected: lengths.system_metadata
                        + lengths.application_metadata
                        + lengths.payload,
                }
            }
        }
    }
}

/// Frame three segments with trailing markers.
pub fn frame_record(system_metadata: &[u8], application_metadata: &[u8], payload: &[u8]) -> Bytes {
    let lengths = RecordLengths {
        system_metadata: system_metadata.len() as u64,
        application_metadata: application_metadata.len() as u64,
        payload: payload.len() as u64,
    };
    let mut buf = BytesMut::with_capacity(lengths.framed_len() as usize);
    for segment in [system_metadata, application_metadata, payload] {
        buf.put_slice(segment);
        buf.put_slice(BREAK_MARKER);
    }
    buf.freeze()
}

/// Digest of a record's three segments, as the receiving side computes it.
pub fn record_digest(
    algorithm: DigestAlgorithm,
    system_metadata: &[u8],
    application_metadata: &[u8],
    payload: &[u8],
) -> DigestValue {
    let mut d = RecordDigester::new(algorithm);
    d.update(system_metadata);
    d.update(application_metadata);
    d.update(payload);
    d.finalize()
}
