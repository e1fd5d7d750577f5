//! The per-record structural status marker.
//!
//! Written before any segment byte and rewritten as bytes arrive. A record
//! whose marker is absent or unreadable is treated as corrupt.

use serde::{Deserialize, Serialize};

use jalop_net_core::{DigestValue, RecordId, RecordLengths, RecordPart};

use crate::error::Result;

/// Bytes durably written per segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartProgress {
    pub system_metadata: u64,
    pub application_metadata: u64,
    pub payload: u64,
}

impl PartProgress {
    pub fn get(&self, part: RecordPart) -> u64 {
        match part {
            RecordPart::SystemMetadata => self.system_metadata,
            RecordPart::ApplicationMetadata => self.application_metadata,
            RecordPart::Payload => self.payload,
        }
    }

    pub fn set(&mut self, part: RecordPart, value: u64) {
        match part {
            RecordPart::SystemMetadata => self.system_metadata = value,
            RecordPart::ApplicationMetadata => self.application_metadata = value,
            RecordPart::Payload => self.payload = value,
        }
    }
}

/// Status marker contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatus {
    pub record_id: RecordId,
    /// Declared lengths. `payload` is always the full original payload size,
    /// including any part received before a resume.
    pub declared: RecordLengths,
    pub progress: PartProgress,
    /// Hex digest, once computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
}

impl RecordStatus {
    pub fn new(record_id: RecordId, declared: RecordLengths) -> Self {
        Self {
            record_id,
            declared,
            progress: PartProgress::default(),
            digest: None,
            confirmed: false,
        }
    }

    /// Whether the whole declared payload has been received.
    pub fn payload_complete(&self) -> bool {
        self.progress.payload >= self.declared.payload
    }

    pub fn set_digest(&mut self, digest: &DigestValue) {
        self.digest = Some(digest.to_hex());
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a marker. Unreadable markers are `None`, never an error.
    pub fn from_json(bytes: &[u8]) -> Option<Self> {
        match serde_json::from_slice(bytes) {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::debug!(error = %e, "unreadable status marker");
                None
            }
        }
    }
}
