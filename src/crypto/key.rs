//! Key material loaded once at startup

use aes_gcm::aead::{KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;

use crate::config::ConfigError;

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// Associated data used when none is configured
pub const DEFAULT_ASSOCIATED_DATA: &str = "iot-lab-shared";

/// A 256-bit symmetric key shared with the sensor nodes
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey([u8; KEY_LEN]);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a base64 key, requiring exactly 32 bytes
    pub fn from_base64(encoded: &str) -> Result<Self, ConfigError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ConfigError::InvalidKey(format!("not valid base64: {}", e)))?;

        let bytes: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            ConfigError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;

        Ok(Self(bytes))
    }

    /// Generate a fresh random key from the OS RNG
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// Never print key material.
impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Bytes bound into every envelope's authentication tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedData(Vec<u8>);

impl AssociatedData {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for AssociatedData {
    fn default() -> Self {
        Self::new(DEFAULT_ASSOCIATED_DATA)
    }
}
