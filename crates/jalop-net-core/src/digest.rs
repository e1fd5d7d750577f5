//! Digest algorithms, digest values and the algorithm registry.
//!
//! Wraps the SHA-2 family with strong types. Algorithms are named on the
//! wire either by short name (`sha256`) or by their XML-DSig URI.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;

use crate::error::CoreError;

/// A digest algorithm the protocol can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 3] = [
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ];

    /// Short name.
    pub const fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// XML-DSig algorithm URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            DigestAlgorithm::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            DigestAlgorithm::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Output length in bytes.
    pub const fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Look up an algorithm by name or URI, ignoring case.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL.into_iter().find(|alg| {
            alg.name().eq_ignore_ascii_case(token) || alg.uri().eq_ignore_ascii_case(token)
        })
    }

    /// One-shot digest.
    pub fn digest(&self, data: &[u8]) -> DigestValue {
        let mut digester = RecordDigester::new(*self);
        digester.update(data);
        digester.finalize()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw digest bytes.
///
/// Equality is byte equality. Hex forms are only for display and persistence.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigestValue(Vec<u8>);

impl DigestValue {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        hex::decode(s.trim())
            .map(Self)
            .map_err(|e| CoreError::DecodingError(format!("digest hex: {}", e)))
    }
}

impl fmt::Debug for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "DigestValue({})", &hex[..hex.len().min(16)])
    }
}

impl fmt::Display for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for DigestValue {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Incremental digest over record bytes.
#[derive(Clone)]
pub enum RecordDigester {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl RecordDigester {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha256 => RecordDigester::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => RecordDigester::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => RecordDigester::Sha512(Sha512::new()),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        match self {
            RecordDigester::Sha256(_) => DigestAlgorithm::Sha256,
            RecordDigester::Sha384(_) => DigestAlgorithm::Sha384,
            RecordDigester::Sha512(_) => DigestAlgorithm::Sha512,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            RecordDigester::Sha256(h) => h.update(data),
            RecordDigester::Sha384(h) => h.update(data),
            RecordDigester::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> DigestValue {
        match self {
            RecordDigester::Sha256(h) => DigestValue(h.finalize().to_vec()),
            RecordDigester::Sha384(h) => DigestValue(h.finalize().to_vec()),
            RecordDigester::Sha512(h) => DigestValue(h.finalize().to_vec()),
        }
    }
}

impl fmt::Debug for RecordDigester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordDigester({})", self.algorithm())
    }
}

/// The peer's verdict on a challenged digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestStatus {
    /// Both sides computed the same digest.
    Confirmed,
    /// The digests differ.
    Invalid,
    /// The peer has no record with this id.
    Unknown,
}

impl DigestStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DigestStatus::Confirmed => "confirmed",
            DigestStatus::Invalid => "invalid",
            DigestStatus::Unknown => "unknown",
        }
    }

    /// Parse a status token, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        [DigestStatus::Confirmed, DigestStatus::Invalid, DigestStatus::Unknown]
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for DigestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which digest algorithms this side supports, in preference order.
///
/// Pure lookup table; holds no per-session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestAlgorithmRegistry {
    supported: Vec<DigestAlgorithm>,
    default: DigestAlgorithm,
}

impl DigestAlgorithmRegistry {
    /// Create a registry. `supported` is in local preference order.
    pub fn new(supported: Vec<DigestAlgorithm>, default: DigestAlgorithm) -> Self {
        let mut deduped = Vec::with_capacity(supported.len());
        for alg in supported {
            if !deduped.contains(&alg) {
                deduped.push(alg);
            }
        }
        Self {
            supported: deduped,
            default,
        }
    }

    /// Build from configured names or URIs.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CoreError> {
        let mut supported = Vec::with_capacity(tokens.len());
        for token in tokens {
            let alg = DigestAlgorithm::from_token(token.as_ref())
                .ok_or_else(|| CoreError::UnknownDigest(token.as_ref().to_string()))?;
            supported.push(alg);
        }
        Ok(Self::new(supported, DigestAlgorithm::Sha256))
    }

    pub fn supported(&self) -> &[DigestAlgorithm] {
        &self.supported
    }

    pub fn default_algorithm(&self) -> DigestAlgorithm {
        self.default
    }

    pub fn is_supported(&self, alg: DigestAlgorithm) -> bool {
        self.supported.contains(&alg)
    }

    /// Select an algorithm from the peer's offer.
    ///
    /// - An empty offer selects the default, if the default is supported.
    /// - A single unrecognized token fails the whole selection.
    /// - Otherwise the first locally-preferred algorithm that was offered wins.
    pub fn select<S: AsRef<str>>(&self, offered: &[S]) -> Option<DigestAlgorithm> {
        if offered.is_empty() {
            return self.is_supported(self.default).then_some(self.default);
        }

        let mut parsed = Vec::with_capacity(offered.len());
        for token in offered {
            parsed.push(DigestAlgorithm::from_token(token.as_ref())?);
        }

        self.supported
            .iter()
            .copied()
            .find(|alg| parsed.contains(alg))
    }
}

impl Default for DigestAlgorithmRegistry {
    fn default() -> Self {
        Self::new(DigestAlgorithm::ALL.to_vec(), DigestAlgorithm::Sha256)
    }
}
