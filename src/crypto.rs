//! Curve25519 key pairs for tunnel interfaces
//!
//! Keys travel through the config format as standard base64 of 32 raw bytes.
//! Malformed key material is never an error here: callers get `None` and treat
//! the derived public key as absent.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};

/// Raw key length in bytes
pub const KEY_LENGTH: usize = 32;

/// Length of a base64-encoded key, including padding
pub const KEY_LENGTH_BASE64: usize = 44;

/// A private key together with its derived public key, both base64-encoded
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    private_key: String,
    public_key: String,
}

impl KeyPair {
    /// Generate a fresh random key pair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        Self::from_secret(&secret)
    }

    /// Derive the key pair for a base64 private key.
    ///
    /// Returns `None` if the key is not exactly `KEY_LENGTH_BASE64` characters
    /// of valid base64 decoding to `KEY_LENGTH` bytes.
    pub fn from_private_key(private_key: &str) -> Option<Self> {
        let bytes = decode_key(private_key)?;
        Some(Self::from_secret(&StaticSecret::from(bytes)))
    }

    fn from_secret(secret: &StaticSecret) -> Self {
        let public = PublicKey::from(secret);
        Self {
            private_key: encode_key(&secret.to_bytes()),
            public_key: encode_key(public.as_bytes()),
        }
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Decode a base64 key into raw bytes
pub fn decode_key(key: &str) -> Option<[u8; KEY_LENGTH]> {
    if key.len() != KEY_LENGTH_BASE64 {
        return None;
    }
    let bytes = BASE64.decode(key).ok()?;
    bytes.try_into().ok()
}

/// Encode raw key bytes as base64
pub fn encode_key(bytes: &[u8; KEY_LENGTH]) -> String {
    BASE64.encode(bytes)
}

/// Derive the base64 public key for a base64 private key
pub fn public_key_for(private_key: &str) -> Option<String> {
    KeyPair::from_private_key(private_key).map(|pair| pair.public_key)
}
