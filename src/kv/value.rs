//! Stored configuration values and their payload codec.

use crate::error::{Result, WatchError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

/// Compute the content digest of raw file bytes.
///
/// The digest is the lowercase hex SHA-256 of the uncompressed input, so equal
/// content always yields an equal digest regardless of how it gets encoded.
pub fn digest(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}

/// Compress `raw` with gzip (best ratio) and encode it as standard base64.
///
/// # Errors
///
/// Returns [`WatchError::Compression`] if the gzip stream cannot be written.
pub fn encode(raw: &[u8]) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(raw)
        .map_err(|e| WatchError::Compression(format!("gzip write failed: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| WatchError::Compression(format!("gzip finish failed: {}", e)))?;
    Ok(STANDARD.encode(compressed))
}

/// Inverse of [`encode`].
///
/// # Errors
///
/// Returns [`WatchError::Compression`] if the payload is not valid base64 or
/// not a valid gzip stream.
pub fn decode(payload: &str) -> Result<Vec<u8>> {
    let compressed = STANDARD
        .decode(payload)
        .map_err(|e| WatchError::Compression(format!("base64 decode failed: {}", e)))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| WatchError::Compression(format!("gzip read failed: {}", e)))?;
    Ok(raw)
}

/// The latest known content of one configuration file.
///
/// Values are immutable; every accepted write replaces the stored value with a
/// fresh one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentValue {
    digest: String,
    payload: String,
    last_modified: DateTime<Utc>,
}

impl ContentValue {
    /// Build a value from raw file bytes, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Compression`] if the payload cannot be encoded.
    pub fn new(raw: &[u8]) -> Result<Self> {
        Ok(Self {
            digest: digest(raw),
            payload: encode(raw)?,
            last_modified: Utc::now(),
        })
    }

    /// Hex digest of the raw (uncompressed) content.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The compressed, base64 encoded payload.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// When this value was stored.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Decode the payload back into the original bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Compression`] if the payload is corrupt.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        decode(&self.payload)
    }

    /// Decode the payload as text.
    ///
    /// Content that is not valid UTF-8 is returned with replacement characters.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Compression`] if the payload is corrupt.
    pub fn text(&self) -> Result<String> {
        let raw = self.bytes()?;
        Ok(String::from_utf8(raw)
            .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned()))
    }
}
