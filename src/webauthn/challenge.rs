//! # Challenges
//!
//! A challenge is 32 random bytes that bind one ceremony together: the server
//! hands it out with the options, the authenticator signs over it, and the
//! verifier checks it came back unchanged. Each challenge is used once.

use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::encoding;
use crate::error::{AppError, AppResult};

/// Number of random bytes in a freshly generated challenge.
pub const CHALLENGE_LEN: usize = 32;

/// An opaque challenge value.
///
/// Freshly generated challenges are always [`CHALLENGE_LEN`] bytes; values
/// decoded from a client may have any length and simply fail to match.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge(Vec<u8>);

impl Challenge {
    /// Generate a new challenge from the operating system's CSPRNG.
    ///
    /// No collision check is made; 256 bits of entropy make one pointless.
    ///
    /// ## Errors
    /// - Internal: the random source could not be read
    pub fn generate() -> AppResult<Self> {
        Self::generate_with(&mut rand::rngs::OsRng)
    }

    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> AppResult<Self> {
        let mut bytes = vec![0u8; CHALLENGE_LEN];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| AppError::Internal(format!("random source failed: {e}")))?;
        Ok(Self(bytes))
    }

    /// Parse the wire encoding sent back by a client.
    pub fn from_wire(text: &str) -> Option<Self> {
        encoding::decode(text)
            .filter(|bytes| !bytes.is_empty())
            .map(Self)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The wire encoding (base64url, no padding).
    pub fn to_wire(&self) -> String {
        encoding::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Constant-time comparison against raw bytes.
    pub fn matches(&self, other: &[u8]) -> bool {
        self.0.len() == other.len() && bool::from(self.0.ct_eq(other))
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Challenge").field(&self.to_wire()).finish()
    }
}

/// Derive the opaque WebAuthn user handle for an application user id.
///
/// The handle is SHA-256 over the RP ID and the user id, so it is always 32
/// bytes (within the 64 byte limit), stable across registrations of the same
/// user, and does not reveal the identifier it came from.
pub fn user_handle(rp_id: &str, user_id: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(rp_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_id.as_bytes());
    hasher.finalize().to_vec()
}
