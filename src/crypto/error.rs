//! Decryption error types

use thiserror::Error;

/// Why a single inbound payload could not be turned into a reading.
///
/// Every variant is per-message and recoverable: the message is dropped and
/// the broker connection is unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptError {
    /// The envelope is not valid base64
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    /// Fewer bytes than an IV plus a tag
    #[error("Payload too short: {0} bytes (need at least 28)")]
    PayloadTooShort(usize),

    /// The GCM tag did not verify against key, IV and associated data
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The authenticated plaintext is not a finite decimal number
    #[error("Decrypted value is not a number: {0}")]
    NotANumber(String),
}

impl DecryptError {
    /// Short machine-readable name, used in log fields and the CLI
    pub fn kind(&self) -> &'static str {
        match self {
            DecryptError::MalformedEncoding(_) => "malformed_encoding",
            DecryptError::PayloadTooShort(_) => "payload_too_short",
            DecryptError::AuthenticationFailed => "authentication_failed",
            DecryptError::NotANumber(_) => "not_a_number",
        }
    }
}
