//! # Database Models
//!
//! Row structs map one-to-one onto the tables in `migrations/`. Where the row
//! shape is awkward to work with (nullable columns that depend on each
//! other, JSON-encoded lists) a domain type is built from it instead.

use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::webauthn::challenge::Challenge;
use crate::webauthn::cose::CredentialPublicKey;
use crate::webauthn::types::AuthenticatorTransport;
use coset::iana::EnumI64;

/// Which of the two ceremonies a challenge was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CeremonyKind::Registration => "registration",
            CeremonyKind::Authentication => "authentication",
        }
    }
}

/// Who a pending ceremony is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CeremonySubject {
    /// Registration: the application user the new credential will belong to.
    User { user_id: String },
    /// Authentication: the credentials the client may answer with. Empty
    /// means any discoverable credential.
    AllowedCredentials { credential_ids: Vec<String> },
}

/// A challenge that was handed out and has not been verified yet.
///
/// ## Lifecycle
/// 1. Created by an options endpoint and stored
/// 2. Taken (deleted) by the first verification attempt that presents it
/// 3. Or left to expire and be swept by the cleanup task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCeremony {
    pub challenge: Challenge,
    pub subject: CeremonySubject,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds; the challenge is dead from this instant on
    pub expires_at: i64,
}

impl PendingCeremony {
    pub fn registration(challenge: Challenge, user_id: String, now: i64, timeout_ms: u64) -> Self {
        Self::new(challenge, CeremonySubject::User { user_id }, now, timeout_ms)
    }

    pub fn authentication(
        challenge: Challenge,
        credential_ids: Vec<String>,
        now: i64,
        timeout_ms: u64,
    ) -> Self {
        Self::new(
            challenge,
            CeremonySubject::AllowedCredentials { credential_ids },
            now,
            timeout_ms,
        )
    }

    fn new(challenge: Challenge, subject: CeremonySubject, now: i64, timeout_ms: u64) -> Self {
        let timeout = i64::try_from(timeout_ms).unwrap_or(i64::MAX);
        Self {
            challenge,
            subject,
            created_at: now,
            expires_at: now.saturating_add(timeout),
        }
    }

    pub fn kind(&self) -> CeremonyKind {
        match self.subject {
            CeremonySubject::User { .. } => CeremonyKind::Registration,
            CeremonySubject::AllowedCredentials { .. } => CeremonyKind::Authentication,
        }
    }

    /// Flatten into the row layout.
    pub fn to_row(&self) -> AppResult<PendingCeremonyRow> {
        let (user_id, allowed_credential_ids) = match &self.subject {
            CeremonySubject::User { user_id } => (Some(user_id.clone()), None),
            CeremonySubject::AllowedCredentials { credential_ids } => {
                (None, Some(serde_json::to_string(credential_ids)?))
            }
        };

        Ok(PendingCeremonyRow {
            challenge: self.challenge.as_bytes().to_vec(),
            kind: self.kind().as_str().to_string(),
            user_id,
            allowed_credential_ids,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

/// Row of `pending_ceremonies`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingCeremonyRow {
    pub challenge: Vec<u8>,
    /// "registration" or "authentication"
    pub kind: String,
    /// Set for registration ceremonies
    pub user_id: Option<String>,
    /// JSON array, set for authentication ceremonies
    pub allowed_credential_ids: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl TryFrom<PendingCeremonyRow> for PendingCeremony {
    type Error = AppError;

    fn try_from(row: PendingCeremonyRow) -> AppResult<Self> {
        let subject = match (row.kind.as_str(), row.user_id, row.allowed_credential_ids) {
            ("registration", Some(user_id), _) => CeremonySubject::User { user_id },
            ("authentication", _, Some(ids)) => CeremonySubject::AllowedCredentials {
                credential_ids: serde_json::from_str(&ids)?,
            },
            (kind, _, _) => {
                return Err(AppError::Internal(format!(
                    "pending ceremony row of kind '{kind}' is missing its subject"
                )))
            }
        };

        Ok(Self {
            challenge: Challenge::from_bytes(row.challenge),
            subject,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

/// Passkey credential stored for a user, row of `credentials`
///
/// Only the public key is stored; the private key never leaves the
/// authenticator.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredCredential {
    /// base64url credential id as reported by the browser
    pub credential_id: String,

    /// Application user that owns the credential
    pub user_id: String,

    /// WebAuthn user handle issued for `user_id` at registration
    pub user_handle: Vec<u8>,

    /// COSE_Key encoding of the public key
    pub public_key: Vec<u8>,

    /// COSE algorithm the key was registered with (-7 or -257)
    pub algorithm: i64,

    /// Last accepted signature counter
    pub sign_count: i64,

    /// JSON array of transport hints, if the client reported any
    pub transports: Option<String>,

    /// RFC3339 timestamp
    pub created_at: String,

    /// RFC3339 timestamp of the last successful authentication
    pub last_used_at: Option<String>,
}

impl StoredCredential {
    /// Decode the stored key and make sure it still carries the algorithm
    /// recorded at registration.
    pub fn public_key(&self) -> AppResult<CredentialPublicKey> {
        let key = CredentialPublicKey::from_cose_bytes(&self.public_key).map_err(|e| {
            AppError::Internal(format!(
                "stored key for credential '{}' is unreadable: {e}",
                self.credential_id
            ))
        })?;
        if key.algorithm().to_i64() != self.algorithm {
            return Err(AppError::Internal(format!(
                "stored key for credential '{}' does not match algorithm {}",
                self.credential_id, self.algorithm
            )));
        }
        Ok(key)
    }

    pub fn sign_count(&self) -> u32 {
        u32::try_from(self.sign_count).unwrap_or(u32::MAX)
    }
}

/// A credential that passed registration and is about to be stored.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub credential_id: String,
    pub user_id: String,
    pub user_handle: Vec<u8>,
    pub public_key: CredentialPublicKey,
    pub sign_count: u32,
    pub transports: Vec<AuthenticatorTransport>,
}

impl NewCredential {
    pub fn to_row(&self) -> AppResult<StoredCredential> {
        let public_key = self
            .public_key
            .to_cose_bytes()
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let transports = if self.transports.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&self.transports)?)
        };

        Ok(StoredCredential {
            credential_id: self.credential_id.clone(),
            user_id: self.user_id.clone(),
            user_handle: self.user_handle.clone(),
            public_key,
            algorithm: self.public_key.algorithm().to_i64(),
            sign_count: i64::from(self.sign_count),
            transports,
            created_at: Utc::now().to_rfc3339(),
            last_used_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceremony_rows_round_trip() {
        let ceremonies = [
            PendingCeremony::registration(Challenge::generate().unwrap(), "u1".into(), 1_000, 60_000),
            PendingCeremony::authentication(
                Challenge::generate().unwrap(),
                vec!["abc".into(), "def".into()],
                1_000,
                60_000,
            ),
            PendingCeremony::authentication(Challenge::generate().unwrap(), vec![], 1_000, 60_000),
        ];
        for ceremony in ceremonies {
            let back = PendingCeremony::try_from(ceremony.to_row().unwrap()).unwrap();
            assert_eq!(back, ceremony);
        }
    }

    #[test]
    fn expiry_uses_the_timeout() {
        let ceremony = PendingCeremony::registration(Challenge::generate().unwrap(), "u1".into(), 1_000, 60_000);
        assert_eq!(ceremony.kind(), CeremonyKind::Registration);
        assert_eq!(ceremony.created_at, 1_000);
        assert_eq!(ceremony.expires_at, 61_000);
    }

    #[test]
    fn inconsistent_rows_are_internal_errors() {
        let row = PendingCeremonyRow {
            challenge: vec![1; 32],
            kind: "registration".into(),
            user_id: None,
            allowed_credential_ids: None,
            created_at: 0,
            expires_at: 1,
        };
        assert!(matches!(
            PendingCeremony::try_from(row),
            Err(AppError::Internal(_))
        ));
    }
}
