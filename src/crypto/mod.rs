//! Payload Decryption
//!
//! Sensor nodes publish readings as AES-256-GCM envelopes:
//!
//! ```text
//! base64( iv[12] || tag[16] || ciphertext )
//! ```
//!
//! optionally wrapped in a JSON object `{"data": "<base64>"}`. The plaintext
//! is the decimal text of a single number.
//!
//! ## Usage
//!
//! ```rust
//! use telemetry_bridge::crypto::{AssociatedData, Decryptor, SharedKey};
//!
//! let key = SharedKey::from_bytes([7u8; 32]);
//! let decryptor = Decryptor::new(key, AssociatedData::default());
//!
//! let envelope = decryptor.seal(b"23.5").unwrap();
//! assert_eq!(decryptor.open(envelope.as_bytes()).unwrap(), 23.5);
//! ```

mod decryptor;
mod error;
mod key;

pub use decryptor::{extract_envelope, Decryptor, IV_LEN, MIN_ENVELOPE_LEN, TAG_LEN};
pub use error::DecryptError;
pub use key::{AssociatedData, SharedKey, DEFAULT_ASSOCIATED_DATA, KEY_LEN};
