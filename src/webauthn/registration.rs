//! # Passkey Registration Logic
//!
//! This module handles the server-side logic for creating new passkey credentials.
//! Registration is a two-step process: start and finish.
//!
//! ## Registration Flow
//! 1. **Start**: Generate cryptographic challenge → send options to client
//! 2. **Finish**: Verify credential response → store public key
//!
//! ## Security Concepts
//! - **Challenge**: Random value the browser echoes back in clientDataJSON
//! - **Public Key Cryptography**: Server stores public key, private key stays on device
//! - **Attestation**: Requested as `none`; when the client still sends an
//!   attestation object, its authenticator data is cross-checked against the
//!   submitted key

use coset::iana::EnumI64;

use super::authenticator_data::AttestationObject;
use super::challenge::{self, Challenge};
use super::client_data::{ClientData, ClientDataType};
use super::cose::CredentialPublicKey;
use super::types::{
    AttestationResponse, AuthenticatorTransport, CreationOptions, OptionsResponse,
    RegistrationCredential, RegistrationOptionsRequest, RegistrationVerificationRequest,
    RegistrationVerified,
};
use super::{encoding, options, resolve_challenge, settle};
use crate::config::RelyingParty;
use crate::db::models::{CeremonyKind, CeremonySubject, NewCredential, PendingCeremony};
use crate::db::{ceremonies, credentials, now_millis};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use sqlx::SqliteConnection;

/// A registration response that passed every check that does not need the
/// database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRegistration {
    pub credential_id: String,
    pub public_key: CredentialPublicKey,
    /// Public key as the client sent it, re-encoded as base64url
    pub public_key_wire: String,
    pub sign_count: u32,
    pub transports: Vec<AuthenticatorTransport>,
}

/// Start the passkey registration process
///
/// Step 1 of registration. Validates the user's identity fields, issues a
/// challenge and remembers which user it was issued for.
///
/// ## Errors
/// - InvalidInput: `userId`, `username` or `displayName` missing or blank
/// - Internal: no random challenge could be generated
/// - Database: the ceremony could not be stored
pub async fn start_registration(
    state: &AppState,
    req: RegistrationOptionsRequest,
) -> AppResult<OptionsResponse<CreationOptions>> {
    let user_id = required(req.user_id, "userId")?;
    let username = required(req.username, "username")?;
    let display_name = required(req.display_name, "displayName")?;

    let challenge = Challenge::generate()?;
    let handle = challenge::user_handle(&state.rp.id, &user_id);
    let creation = options::registration_options(
        &state.rp,
        &handle,
        &username,
        &display_name,
        &challenge,
        state.ceremony_timeout_ms,
    );

    let ceremony = PendingCeremony::registration(
        challenge,
        user_id,
        now_millis(),
        state.ceremony_timeout_ms,
    );
    ceremonies::save_ceremony(&state.db, &ceremony).await?;

    tracing::debug!(challenge = ?ceremony.challenge, "Issued registration challenge");

    Ok(OptionsResponse {
        challenge: creation.challenge.clone(),
        options: creation,
    })
}

/// Finish the passkey registration process
///
/// Step 2 of registration. Consumes the pending ceremony, verifies the
/// credential and stores its public key for the ceremony's user.
///
/// ## Flow
/// 1. Work out the challenge (explicit field or clientDataJSON)
/// 2. Take the pending ceremony; it must be a registration
/// 3. Check clientDataJSON type, challenge and origin when it was sent
/// 4. Decode the public key, cross-check the attestation object if present
/// 5. Refuse credential ids that are already registered
/// 6. Store the credential
///
/// ## Errors
/// Every rejection in [`AppError`] except the authentication-only ones.
/// A rejected attempt still consumes the challenge.
pub async fn finish_registration(
    state: &AppState,
    req: RegistrationVerificationRequest,
) -> AppResult<RegistrationVerified> {
    let credential = req.credential.unwrap_or_default();
    let challenge = resolve_challenge(
        req.challenge.as_deref(),
        credential
            .response
            .as_ref()
            .and_then(|r| r.client_data_json.as_deref()),
    )?;

    let mut tx = state.db.begin().await?;

    let Some(ceremony) = ceremonies::take_ceremony(&mut *tx, &challenge, now_millis()).await?
    else {
        return Err(AppError::CeremonyNotFound);
    };

    let outcome = register_credential(&mut tx, state, &ceremony, &credential).await;

    let result = settle(tx, outcome).await;
    if let Ok(verified) = &result {
        tracing::info!(credential_id = %verified.credential_id, "Registered new passkey");
    }
    result
}

/// Steps that run inside the verification transaction once the ceremony has
/// been taken.
async fn register_credential(
    conn: &mut SqliteConnection,
    state: &AppState,
    ceremony: &PendingCeremony,
    credential: &RegistrationCredential,
) -> AppResult<RegistrationVerified> {
    let CeremonySubject::User { user_id } = &ceremony.subject else {
        return Err(AppError::CeremonyKindMismatch {
            issued_for: CeremonyKind::Authentication.as_str(),
        });
    };

    let verified = verify_registration_response(&state.rp, &ceremony.challenge, credential)?;

    if credentials::find_by_credential_id(&mut *conn, &verified.credential_id)
        .await?
        .is_some()
    {
        return Err(AppError::DuplicateCredential);
    }

    let new_credential = NewCredential {
        credential_id: verified.credential_id.clone(),
        user_id: user_id.clone(),
        user_handle: challenge::user_handle(&state.rp.id, user_id),
        public_key: verified.public_key,
        sign_count: verified.sign_count,
        transports: verified.transports,
    };
    credentials::save_credential(&mut *conn, &new_credential).await?;

    Ok(RegistrationVerified {
        success: true,
        credential_id: verified.credential_id,
        public_key: verified.public_key_wire,
    })
}

/// Check a registration response against the issued challenge and the RP.
///
/// Pure: no storage is touched, so the order of checks here is the order in
/// which errors are reported.
pub fn verify_registration_response(
    rp: &RelyingParty,
    issued: &Challenge,
    credential: &RegistrationCredential,
) -> AppResult<VerifiedRegistration> {
    let empty = AttestationResponse::default();
    let response = credential.response.as_ref().unwrap_or(&empty);

    // Optional; without it the ceremony was found by the explicit challenge.
    if let Some(client_data_json) = response.client_data_json.as_deref() {
        ClientData::from_wire(client_data_json)?.verify(ClientDataType::Create, issued, rp)?;
    }

    let credential_id = credential
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(encoding::canonical_id)
        .ok_or_else(|| malformed("credential.id is required"))?;

    if let Some(ty) = &credential.ty {
        if ty != "public-key" {
            return Err(malformed(format!("credential type '{ty}' is not public-key")));
        }
    }
    if let Some(raw_id) = &credential.raw_id {
        let raw_id = encoding::decode(raw_id)
            .ok_or_else(|| malformed("credential.rawId is not valid base64url"))?;
        if let Some(id_bytes) = encoding::decode(&credential_id) {
            if raw_id != id_bytes {
                return Err(malformed("credential.rawId does not match credential.id"));
            }
        }
    }

    let public_key_text = response
        .public_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| malformed("response.publicKey is required"))?;
    let public_key_bytes = encoding::decode(public_key_text)
        .ok_or_else(|| malformed("response.publicKey is not valid base64"))?;
    let public_key = CredentialPublicKey::decode(&public_key_bytes)
        .map_err(|e| malformed(format!("response.publicKey: {e}")))?;

    if let Some(alg) = response.public_key_algorithm {
        if alg != public_key.algorithm().to_i64() {
            return Err(malformed(format!(
                "publicKeyAlgorithm {alg} does not match the submitted key"
            )));
        }
    }

    let sign_count = match response.attestation_object.as_deref() {
        Some(text) => check_attestation(rp, text, &credential_id, &public_key)?,
        None => 0,
    };

    Ok(VerifiedRegistration {
        credential_id,
        public_key,
        public_key_wire: encoding::encode(&public_key_bytes),
        sign_count,
        transports: response.transports.clone(),
    })
}

/// Cross-check the authenticator data inside an attestation object against
/// the rest of the response, returning the initial signature counter.
fn check_attestation(
    rp: &RelyingParty,
    attestation_object: &str,
    credential_id: &str,
    public_key: &CredentialPublicKey,
) -> AppResult<u32> {
    let bytes = encoding::decode(attestation_object)
        .ok_or_else(|| malformed("response.attestationObject is not valid base64"))?;
    let attestation = AttestationObject::parse(&bytes)?;
    let auth_data = attestation.auth_data;

    if !auth_data.matches_rp_id(&rp.id) {
        return Err(AppError::OriginMismatch(format!(
            "authenticator data is not scoped to RP ID '{}'",
            rp.id
        )));
    }
    if !auth_data.user_present() {
        return Err(malformed("authenticator did not report user presence"));
    }

    let attested = auth_data
        .attested_credential
        .as_ref()
        .ok_or_else(|| malformed("attestation object carries no credential data"))?;
    let id_bytes = encoding::decode(credential_id)
        .ok_or_else(|| malformed("credential.id is not valid base64url"))?;
    if attested.credential_id != id_bytes {
        return Err(malformed("attested credential id does not match credential.id"));
    }
    if &attested.public_key != public_key {
        return Err(malformed("attested public key does not match response.publicKey"));
    }

    tracing::debug!(
        fmt = %attestation.fmt,
        aaguid = ?attested.aaguid,
        user_verified = auth_data.user_verified(),
        "Attestation object accepted"
    );

    Ok(auth_data.sign_count)
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput(format!("{field} is required")))
}

fn malformed(reason: impl Into<String>) -> AppError {
    AppError::MalformedCredential(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::Value;
    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use p256::pkcs8::EncodePublicKey;
    use serde_json::json;
    use sha2::{Digest, Sha256};

    const ORIGIN: &str = "https://example.com";

    fn rp() -> RelyingParty {
        RelyingParty::new("example.com", "Example", ORIGIN).unwrap()
    }

    struct Authenticator {
        signing: SigningKey,
        id: Vec<u8>,
    }

    impl Authenticator {
        fn new() -> Self {
            Self {
                signing: SigningKey::random(&mut rand::rngs::OsRng),
                id: b"credential-one".to_vec(),
            }
        }

        fn cose_key(&self) -> CredentialPublicKey {
            let point = self.signing.verifying_key().to_encoded_point(false);
            CredentialPublicKey::Es256 {
                x: point.x().unwrap().to_vec(),
                y: point.y().unwrap().to_vec(),
            }
        }

        fn attestation_object(&self, rp_id: &str, flags: u8) -> String {
            let mut auth_data = Sha256::digest(rp_id.as_bytes()).to_vec();
            auth_data.push(flags);
            auth_data.extend_from_slice(&3u32.to_be_bytes());
            auth_data.extend_from_slice(&[0; 16]);
            auth_data.extend_from_slice(&u16::try_from(self.id.len()).unwrap().to_be_bytes());
            auth_data.extend_from_slice(&self.id);
            auth_data.extend_from_slice(&self.cose_key().to_cose_bytes().unwrap());

            let object = Value::Map(vec![
                (Value::Text("fmt".into()), Value::Text("none".into())),
                (Value::Text("attStmt".into()), Value::Map(vec![])),
                (Value::Text("authData".into()), Value::Bytes(auth_data)),
            ]);
            let mut bytes = Vec::new();
            ciborium::into_writer(&object, &mut bytes).unwrap();
            encoding::encode(&bytes)
        }

        fn credential(&self, challenge: &Challenge, origin: &str) -> RegistrationCredential {
            let client_data = json!({
                "type": "webauthn.create",
                "challenge": challenge.to_wire(),
                "origin": origin,
            })
            .to_string();
            let spki = self.signing.verifying_key().to_public_key_der().unwrap();

            RegistrationCredential {
                id: Some(encoding::encode(&self.id)),
                raw_id: Some(encoding::encode(&self.id)),
                ty: Some("public-key".into()),
                response: Some(AttestationResponse {
                    client_data_json: Some(encoding::encode(client_data.as_bytes())),
                    attestation_object: Some(self.attestation_object("example.com", 0x45)),
                    public_key: Some(encoding::encode(spki.as_bytes())),
                    public_key_algorithm: Some(-7),
                    transports: vec![AuthenticatorTransport::Internal],
                }),
            }
        }
    }

    #[test]
    fn accepts_a_well_formed_response() {
        let authenticator = Authenticator::new();
        let challenge = Challenge::generate().unwrap();
        let credential = authenticator.credential(&challenge, ORIGIN);

        let verified = verify_registration_response(&rp(), &challenge, &credential).unwrap();
        assert_eq!(verified.credential_id, encoding::encode(&authenticator.id));
        assert_eq!(verified.public_key, authenticator.cose_key());
        assert_eq!(verified.sign_count, 3);
        assert_eq!(verified.transports, vec![AuthenticatorTransport::Internal]);
    }

    #[test]
    fn attestation_object_is_optional() {
        let authenticator = Authenticator::new();
        let challenge = Challenge::generate().unwrap();
        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.response.as_mut().unwrap().attestation_object = None;

        let verified = verify_registration_response(&rp(), &challenge, &credential).unwrap();
        assert_eq!(verified.sign_count, 0);
    }

    #[test]
    fn client_data_is_optional() {
        let authenticator = Authenticator::new();
        let challenge = Challenge::generate().unwrap();
        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.response.as_mut().unwrap().client_data_json = None;

        let verified = verify_registration_response(&rp(), &challenge, &credential).unwrap();
        assert_eq!(verified.credential_id, encoding::encode(&authenticator.id));
    }

    #[test]
    fn raw_id_must_decode_and_match() {
        let authenticator = Authenticator::new();
        let challenge = Challenge::generate().unwrap();

        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.raw_id = Some("not base64!".into());
        assert!(matches!(
            verify_registration_response(&rp(), &challenge, &credential),
            Err(AppError::MalformedCredential(_))
        ));

        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.raw_id = Some(encoding::encode(b"another-id"));
        assert!(matches!(
            verify_registration_response(&rp(), &challenge, &credential),
            Err(AppError::MalformedCredential(_))
        ));
    }

    #[test]
    fn credential_id_is_stored_in_canonical_form() {
        let authenticator = Authenticator::new();
        let challenge = Challenge::generate().unwrap();
        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.id = Some(format!("{}=", encoding::encode(&authenticator.id)));

        let verified = verify_registration_response(&rp(), &challenge, &credential).unwrap();
        assert_eq!(verified.credential_id, encoding::encode(&authenticator.id));
    }

    #[test]
    fn wrong_challenge_or_origin_is_rejected() {
        let authenticator = Authenticator::new();
        let issued = Challenge::generate().unwrap();

        let credential = authenticator.credential(&Challenge::generate().unwrap(), ORIGIN);
        assert!(matches!(
            verify_registration_response(&rp(), &issued, &credential),
            Err(AppError::ChallengeMismatch(_))
        ));

        let credential = authenticator.credential(&issued, "https://evil.example");
        assert!(matches!(
            verify_registration_response(&rp(), &issued, &credential),
            Err(AppError::OriginMismatch(_))
        ));
    }

    #[test]
    fn missing_id_or_key_is_malformed() {
        let authenticator = Authenticator::new();
        let challenge = Challenge::generate().unwrap();

        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.id = None;
        credential.raw_id = None;
        assert!(matches!(
            verify_registration_response(&rp(), &challenge, &credential),
            Err(AppError::MalformedCredential(_))
        ));

        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.response.as_mut().unwrap().public_key = None;
        assert!(matches!(
            verify_registration_response(&rp(), &challenge, &credential),
            Err(AppError::MalformedCredential(_))
        ));
    }

    #[test]
    fn attestation_must_agree_with_the_response() {
        let authenticator = Authenticator::new();
        let challenge = Challenge::generate().unwrap();

        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.response.as_mut().unwrap().attestation_object =
            Some(authenticator.attestation_object("evil.example", 0x45));
        assert!(matches!(
            verify_registration_response(&rp(), &challenge, &credential),
            Err(AppError::OriginMismatch(_))
        ));

        let mut credential = authenticator.credential(&challenge, ORIGIN);
        let other = Authenticator::new();
        let spki = other.signing.verifying_key().to_public_key_der().unwrap();
        credential.response.as_mut().unwrap().public_key = Some(encoding::encode(spki.as_bytes()));
        assert!(matches!(
            verify_registration_response(&rp(), &challenge, &credential),
            Err(AppError::MalformedCredential(_))
        ));

        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.id = Some(encoding::encode(b"another-id"));
        credential.raw_id = None;
        assert!(matches!(
            verify_registration_response(&rp(), &challenge, &credential),
            Err(AppError::MalformedCredential(_))
        ));

        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.response.as_mut().unwrap().attestation_object =
            Some(authenticator.attestation_object("example.com", 0x44));
        assert!(matches!(
            verify_registration_response(&rp(), &challenge, &credential),
            Err(AppError::MalformedCredential(_))
        ));
    }

    #[test]
    fn declared_algorithm_must_match_the_key() {
        let authenticator = Authenticator::new();
        let challenge = Challenge::generate().unwrap();
        let mut credential = authenticator.credential(&challenge, ORIGIN);
        credential.response.as_mut().unwrap().public_key_algorithm = Some(-257);

        assert!(matches!(
            verify_registration_response(&rp(), &challenge, &credential),
            Err(AppError::MalformedCredential(_))
        ));
    }
}
