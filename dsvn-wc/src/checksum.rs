//! Content digests
//!
//! Checksums are persisted as `{kind}:{hex}` text so that rows stay
//! readable with plain sqlite tooling. The pristine store only accepts
//! SHA-1 keys; SHA-256 is carried for newer metadata consumers.

use crate::error::{Result, WcError};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Digest algorithm of a [`Checksum`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumKind {
    Sha1,
    Sha256,
}

impl ChecksumKind {
    fn as_token(self) -> &'static str {
        match self {
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Sha256 => "sha256",
        }
    }

    fn digest_len(self) -> usize {
        match self {
            ChecksumKind::Sha1 => 20,
            ChecksumKind::Sha256 => 32,
        }
    }
}

/// A content digest identifying a pristine text or file body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    kind: ChecksumKind,
    digest: Vec<u8>,
}

impl Checksum {
    /// Compute the SHA-1 digest of DATA.
    pub fn sha1(data: &[u8]) -> Checksum {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Checksum {
            kind: ChecksumKind::Sha1,
            digest: hasher.finalize().to_vec(),
        }
    }

    /// Compute the SHA-256 digest of DATA.
    pub fn sha256(data: &[u8]) -> Checksum {
        Checksum {
            kind: ChecksumKind::Sha256,
            digest: Sha256::digest(data).to_vec(),
        }
    }

    pub fn kind(&self) -> ChecksumKind {
        self.kind
    }

    /// Hex form of the digest, without the kind prefix.
    pub fn hex_digest(&self) -> String {
        hex::encode(&self.digest)
    }

    /// Serialized `{kind}:{hex}` form, as stored in checksum columns.
    pub fn to_text(&self) -> String {
        format!("{}:{}", self.kind.as_token(), self.hex_digest())
    }

    /// Parse the stored text form back into a checksum.
    pub fn parse(text: &str) -> Result<Checksum> {
        let (kind_token, hex_part) = text
            .split_once(':')
            .ok_or_else(|| WcError::CorruptChecksum(text.to_string()))?;

        let kind = match kind_token {
            "sha1" => ChecksumKind::Sha1,
            "sha256" => ChecksumKind::Sha256,
            _ => return Err(WcError::CorruptChecksum(text.to_string())),
        };

        let digest =
            hex::decode(hex_part).map_err(|_| WcError::CorruptChecksum(text.to_string()))?;
        if digest.len() != kind.digest_len() {
            return Err(WcError::CorruptChecksum(text.to_string()));
        }

        Ok(Checksum { kind, digest })
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_text())
    }
}
