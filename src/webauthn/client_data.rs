//! # Client Data
//!
//! The browser, not the authenticator, writes `clientDataJSON`. It records
//! which challenge it was answering, which origin asked, and whether this was
//! a create or a get. The authenticator then signs over its hash, so the
//! verifier can trust these fields once the signature checks out.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::challenge::Challenge;
use super::encoding;
use crate::config::RelyingParty;
use crate::error::{AppError, AppResult};

/// `CollectedClientData.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientDataType {
    Create,
    Get,
}

impl ClientDataType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientDataType::Create => "webauthn.create",
            ClientDataType::Get => "webauthn.get",
        }
    }
}

/// The subset of `CollectedClientData` the relying party checks. Unknown
/// members (e.g. `topOrigin`, Android's `androidPackageName`) are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ty: String,
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: Option<bool>,
}

/// clientDataJSON as received: the exact bytes (which are what gets hashed)
/// plus the parsed view of them.
#[derive(Debug, Clone)]
pub struct ClientData {
    raw: Vec<u8>,
    parsed: CollectedClientData,
}

impl ClientData {
    /// Decode the base64 `clientDataJSON` field of a credential response.
    pub fn from_wire(text: &str) -> AppResult<Self> {
        let raw = encoding::decode(text).ok_or_else(|| {
            AppError::MalformedCredential("clientDataJSON is not valid base64".to_string())
        })?;
        Self::from_bytes(raw)
    }

    pub fn from_bytes(raw: Vec<u8>) -> AppResult<Self> {
        let parsed = serde_json::from_slice(&raw).map_err(|e| {
            AppError::MalformedCredential(format!("clientDataJSON is not valid JSON: {e}"))
        })?;
        Ok(Self { raw, parsed })
    }

    /// The challenge the browser embedded, if it decodes.
    pub fn challenge(&self) -> Option<Challenge> {
        Challenge::from_wire(&self.parsed.challenge)
    }

    /// SHA-256 of the exact bytes the client sent.
    pub fn hash(&self) -> [u8; 32] {
        Sha256::digest(&self.raw).into()
    }

    /// Check ceremony type, challenge and origin, in that order.
    ///
    /// Type and challenge problems are [`AppError::ChallengeMismatch`]; origin
    /// problems (including a cross-origin iframe) are
    /// [`AppError::OriginMismatch`].
    pub fn verify(
        &self,
        expected_type: ClientDataType,
        expected_challenge: &Challenge,
        rp: &RelyingParty,
    ) -> AppResult<()> {
        if self.parsed.ty != expected_type.as_str() {
            return Err(AppError::ChallengeMismatch(format!(
                "client data type is '{}', expected '{}'",
                self.parsed.ty,
                expected_type.as_str()
            )));
        }

        let embedded = encoding::decode(&self.parsed.challenge).unwrap_or_default();
        if !expected_challenge.matches(&embedded) {
            return Err(AppError::ChallengeMismatch(
                "client data challenge does not match the issued challenge".to_string(),
            ));
        }

        if !rp.matches_origin(&self.parsed.origin) {
            return Err(AppError::OriginMismatch(format!(
                "client data origin '{}' is not '{}'",
                self.parsed.origin, rp.origin
            )));
        }

        if self.parsed.cross_origin == Some(true) {
            return Err(AppError::OriginMismatch(
                "cross-origin ceremonies are not accepted".to_string(),
            ));
        }

        Ok(())
    }
}
