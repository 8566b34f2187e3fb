//! Authenticator data and attestation object parsing.
//!
//! Layout (W3C WebAuthn §6.1):
//! ```text
//! rpIdHash[32] | flags[1] | signCount[4] | [attestedCredentialData] | [extensions]
//! attestedCredentialData = aaguid[16] | credIdLen[2] | credId | COSE_Key
//! ```

use ciborium::Value;
use sha2::{Digest, Sha256};

use super::cose::CredentialPublicKey;
use crate::error::{AppError, AppResult};

const USER_PRESENT: u8 = 0x01;
const USER_VERIFIED: u8 = 0x04;
const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;

/// Credential data included by the authenticator on registration.
#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    pub public_key: CredentialPublicKey,
}

#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
}

fn malformed(reason: impl Into<String>) -> AppError {
    AppError::MalformedCredential(reason.into())
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> AppResult<Self> {
        if bytes.len() < 37 {
            return Err(malformed(format!(
                "authenticator data too short: {} bytes (minimum 37)",
                bytes.len()
            )));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested_credential = if flags & ATTESTED_CREDENTIAL_DATA != 0 {
            Some(parse_attested_credential(&bytes[37..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & USER_VERIFIED != 0
    }

    /// Whether the authenticator scoped this response to `rp_id`.
    pub fn matches_rp_id(&self, rp_id: &str) -> bool {
        let expected: [u8; 32] = Sha256::digest(rp_id.as_bytes()).into();
        self.rp_id_hash == expected
    }
}

fn parse_attested_credential(bytes: &[u8]) -> AppResult<AttestedCredentialData> {
    if bytes.len() < 18 {
        return Err(malformed("attested credential data truncated"));
    }

    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&bytes[..16]);
    let id_len = usize::from(u16::from_be_bytes([bytes[16], bytes[17]]));
    let rest = &bytes[18..];
    if rest.len() < id_len {
        return Err(malformed("credential id runs past the end of authenticator data"));
    }
    let credential_id = rest[..id_len].to_vec();

    // The COSE_Key has no length prefix; the CBOR decoder stops at its end and
    // any extension map after it is left unread.
    let mut key_bytes = &rest[id_len..];
    let key: Value = ciborium::from_reader(&mut key_bytes)
        .map_err(|e| malformed(format!("credential public key is not CBOR: {e}")))?;
    let public_key = CredentialPublicKey::from_cbor_value(key)
        .map_err(|e| malformed(format!("credential public key: {e}")))?;

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        public_key,
    })
}

/// The three members of a CBOR attestation object. The statement itself is
/// not verified: the server requests `attestation: "none"`.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub auth_data: AuthenticatorData,
}

impl AttestationObject {
    pub fn parse(bytes: &[u8]) -> AppResult<Self> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| malformed(format!("attestation object is not CBOR: {e}")))?;
        let map = value
            .as_map()
            .ok_or_else(|| malformed("attestation object is not a CBOR map"))?;

        let field = |name: &str| {
            map.iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v)
        };

        let fmt = field("fmt")
            .and_then(Value::as_text)
            .ok_or_else(|| malformed("attestation object has no fmt"))?
            .to_string();
        let auth_data = field("authData")
            .and_then(Value::as_bytes)
            .ok_or_else(|| malformed("attestation object has no authData"))?;

        Ok(Self {
            fmt,
            auth_data: AuthenticatorData::parse(auth_data)?,
        })
    }
}
