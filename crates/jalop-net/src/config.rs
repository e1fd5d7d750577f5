//! Subscriber configuration.
//!
//! Loaded from JSON. Every field has a default, so an empty object is a
//! valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use jalop_net_core::{DigestAlgorithm, DigestAlgorithmRegistry, Mode, RecordType};
use jalop_net_sync::{NegotiatorConfig, SyncConfig, KNOWN_XML_COMPRESSIONS, PROTOCOL_VERSION};

use crate::error::{NetError, Result};

/// Configuration for a [`Subscriber`](crate::Subscriber).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Root directory of the filesystem record store.
    pub output_path: PathBuf,
    /// Record types accepted.
    pub record_types: Vec<RecordType>,
    /// Mode accepted. `None` accepts both.
    pub mode: Option<Mode>,
    /// Digest names or URIs, in preference order.
    pub supported_digests: Vec<String>,
    /// XML compressions, in preference order.
    pub supported_xml_compressions: Vec<String>,
    /// Allowed configure-digest-challenge values.
    pub allowed_configure_digests: Vec<String>,
    pub pending_digest_max: usize,
    pub pending_digest_timeout_secs: u64,
    /// Live sessions allowed per publisher and record type.
    pub max_session_limit: usize,
    /// Write an empty `confirmed` file into each confirmed record.
    pub create_confirmed_file: bool,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("jalop-records"),
            record_types: RecordType::ALL.to_vec(),
            mode: None,
            supported_digests: vec![DigestAlgorithm::Sha256.name().to_string()],
            supported_xml_compressions: KNOWN_XML_COMPRESSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_configure_digests: vec!["on".into(), "off".into()],
            pending_digest_max: 128,
            pending_digest_timeout_secs: 120,
            max_session_limit: 5,
            create_confirmed_file: false,
        }
    }
}

impl SubscriberConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| NetError::Config(format!("malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.record_types.is_empty() {
            return Err(NetError::Config("record_types is empty".into()));
        }
        if self.pending_digest_max == 0 {
            return Err(NetError::Config("pending_digest_max must be positive".into()));
        }
        if self.pending_digest_timeout_secs == 0 {
            return Err(NetError::Config(
                "pending_digest_timeout_secs must be positive".into(),
            ));
        }
        if self.max_session_limit == 0 {
            return Err(NetError::Config("max_session_limit must be positive".into()));
        }
        if self.supported_digests.is_empty() {
            return Err(NetError::Config("supported_digests is empty".into()));
        }
        DigestAlgorithmRegistry::from_tokens(&self.supported_digests)
            .map_err(|e| NetError::Config(e.to_string()))?;

        if let Some(unknown) = self
            .supported_xml_compressions
            .iter()
            .find(|c| !KNOWN_XML_COMPRESSIONS.contains(&c.to_ascii_lowercase().as_str()))
        {
            return Err(NetError::Config(format!("unknown XML compression: {}", unknown)));
        }
        if let Some(unknown) = self
            .allowed_configure_digests
            .iter()
            .find(|v| !matches!(v.to_ascii_lowercase().as_str(), "on" | "off"))
        {
            return Err(NetError::Config(format!(
                "unknown configure-digest-challenge value: {}",
                unknown
            )));
        }
        Ok(())
    }

    /// What the handshake may agree to.
    pub fn negotiator_config(&self) -> Result<NegotiatorConfig> {
        let digests = DigestAlgorithmRegistry::from_tokens(&self.supported_digests)?;
        let modes = match self.mode {
            Some(mode) => vec![mode],
            None => vec![Mode::Live, Mode::Archive],
        };
        Ok(NegotiatorConfig {
            record_types: self.record_types.clone(),
            modes,
            digests,
            xml_compressions: self
                .supported_xml_compressions
                .iter()
                .map(|c| c.to_ascii_lowercase())
                .collect(),
            configure_digest: self
                .allowed_configure_digests
                .iter()
                .map(|v| v.to_ascii_lowercase())
                .collect(),
            versions: vec![PROTOCOL_VERSION.to_string()],
        })
    }

    /// Per-session bounds.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            pending_digest_max: self.pending_digest_max,
            pending_digest_timeout: Duration::from_secs(self.pending_digest_timeout_secs),
            ..SyncConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_is_default() {
        let config = SubscriberConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SubscriberConfig::default());
        assert_eq!(config.max_session_limit, 5);
    }

    #[test]
    fn test_partial_override() {
        let config = SubscriberConfig::from_json_str(
            r#"{"record_types": ["journal"], "mode": "archive", "supported_digests": ["sha512", "sha256"]}"#,
        )
        .unwrap();
        assert_eq!(config.record_types, vec![RecordType::Journal]);

        let negotiator = config.negotiator_config().unwrap();
        assert_eq!(negotiator.modes, vec![Mode::Archive]);
        assert_eq!(
            negotiator.digests.supported(),
            &[DigestAlgorithm::Sha512, DigestAlgorithm::Sha256]
        );
    }

    #[test]
    fn test_validation_failures() {
        for json in [
            r#"{"pending_digest_max": 0}"#,
            r#"{"max_session_limit": 0}"#,
            r#"{"supported_digests": ["md5"]}"#,
            r#"{"supported_xml_compressions": ["gzip"]}"#,
            r#"{"allowed_configure_digests": ["maybe"]}"#,
            r#"{"record_types": []}"#,
            r#"{"record_types": ["syslog"]}"#,
        ] {
            let err = SubscriberConfig::from_json_str(json).unwrap_err();
            assert!(matches!(err, NetError::Config(_)), "{}: {:?}", json, err);
        }
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriber.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"pending_digest_timeout_secs": 30}}"#).unwrap();

        let config = SubscriberConfig::from_file(&path).unwrap();
        assert_eq!(
            config.sync_config().pending_digest_timeout,
            Duration::from_secs(30)
        );
        assert!(SubscriberConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
