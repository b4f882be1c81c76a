//! Envelope framing and AES-256-GCM decryption

use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::error::DecryptError;
use super::key::{AssociatedData, SharedKey};

/// GCM nonce length
pub const IV_LEN: usize = 12;
/// GCM authentication tag length
pub const TAG_LEN: usize = 16;
/// Smallest decodable envelope: IV plus tag with an empty ciphertext
pub const MIN_ENVELOPE_LEN: usize = IV_LEN + TAG_LEN;

/// Turns encrypted sensor payloads into numeric readings.
///
/// Holds no mutable state, so one instance is shared by every message.
#[derive(Clone)]
pub struct Decryptor {
    cipher: Aes256Gcm,
    aad: AssociatedData,
}

impl Decryptor {
    pub fn new(key: SharedKey, aad: AssociatedData) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        Self { cipher, aad }
    }

    /// Decode a raw broker payload: either `{"data": "<base64>"}` or bare base64
    pub fn open(&self, raw: &[u8]) -> Result<f64, DecryptError> {
        self.decrypt(&extract_envelope(raw))
    }

    /// Decrypt a base64 envelope to the number it carries
    pub fn decrypt(&self, envelope_b64: &str) -> Result<f64, DecryptError> {
        let bytes = STANDARD
            .decode(envelope_b64)
            .map_err(|e| DecryptError::MalformedEncoding(e.to_string()))?;

        if bytes.len() < MIN_ENVELOPE_LEN {
            return Err(DecryptError::PayloadTooShort(bytes.len()));
        }

        let (iv, rest) = bytes.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        // Decrypted in place; on tag mismatch the buffer is dropped unread.
        let mut buffer = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(iv),
                self.aad.as_bytes(),
                &mut buffer,
                Tag::from_slice(tag),
            )
            .map_err(|_| DecryptError::AuthenticationFailed)?;

        parse_number(&buffer)
    }

    /// Encrypt a plaintext into a base64 envelope with a random IV.
    ///
    /// This is the sensor-node side of the format; the bridge itself only
    /// uses it from the operator CLI and tests.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, aes_gcm::Error> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, self.aad.as_bytes(), &mut buffer)?;

        let mut envelope = Vec::with_capacity(MIN_ENVELOPE_LEN + buffer.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&tag);
        envelope.extend_from_slice(&buffer);
        Ok(STANDARD.encode(envelope))
    }
}

/// Pick the base64 envelope out of a raw message.
///
/// JSON objects with a non-empty string `data` field yield that field;
/// anything else is treated as bare base64 text.
pub fn extract_envelope(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);

    if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str(&text) {
        if let Some(serde_json::Value::String(data)) = obj.get("data") {
            if !data.is_empty() {
                return data.clone();
            }
        }
    }

    text.trim().to_string()
}

fn parse_number(plaintext: &[u8]) -> Result<f64, DecryptError> {
    let text = std::str::from_utf8(plaintext)
        .map_err(|_| DecryptError::NotANumber(String::from_utf8_lossy(plaintext).into_owned()))?;

    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(DecryptError::NotANumber(text.to_string())),
    }
}
