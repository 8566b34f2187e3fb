//! # Passkey Authentication Logic
//!
//! Start issues a challenge (optionally bound to a set of credential ids);
//! finish checks the signed assertion against the stored public key.

use sqlx::SqliteConnection;

use super::authenticator_data::AuthenticatorData;
use super::challenge::Challenge;
use super::client_data::{ClientData, ClientDataType};
use super::types::{
    AssertionResponse, AuthenticationCredential, AuthenticationOptionsRequest,
    AuthenticationVerificationRequest, AuthenticationVerified, OptionsResponse, RequestOptions,
};
use super::{encoding, options, resolve_challenge, settle};
use crate::config::RelyingParty;
use crate::db::models::{CeremonyKind, CeremonySubject, PendingCeremony, StoredCredential};
use crate::db::{ceremonies, credentials, now_millis};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use subtle::ConstantTimeEq;

/// Start the passkey authentication process
///
/// Step 1 of authentication. Issues a challenge and remembers which
/// credentials may answer it. Blank or null ids are dropped; an empty list
/// leaves the choice to the authenticator (discoverable credentials).
///
/// ## Errors
/// - Internal: no random challenge could be generated
/// - Database: the ceremony could not be stored
pub async fn start_authentication(
    state: &AppState,
    req: AuthenticationOptionsRequest,
) -> AppResult<OptionsResponse<RequestOptions>> {
    let credential_ids = options::filter_credential_ids(req.credential_ids);

    let challenge = Challenge::generate()?;
    let request = options::authentication_options(
        &state.rp,
        &credential_ids,
        &challenge,
        state.ceremony_timeout_ms,
    );

    let ceremony = PendingCeremony::authentication(
        challenge,
        credential_ids,
        now_millis(),
        state.ceremony_timeout_ms,
    );
    ceremonies::save_ceremony(&state.db, &ceremony).await?;

    tracing::debug!(
        challenge = ?ceremony.challenge,
        allowed = request.allow_credentials.len(),
        "Issued authentication challenge"
    );

    Ok(OptionsResponse {
        challenge: request.challenge.clone(),
        options: request,
    })
}

/// Verify an assertion and advance the credential's signature counter.
///
/// The ceremony is taken first; whatever the outcome, a rejected assertion
/// cannot be retried with the same challenge.
pub async fn finish_authentication(
    state: &AppState,
    req: AuthenticationVerificationRequest,
) -> AppResult<AuthenticationVerified> {
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

    let outcome = authenticate(&mut tx, &state.rp, &ceremony, &credential).await;

    let result = settle(tx, outcome).await;
    if result.is_ok() {
        tracing::info!(credential_id = ?credential.id, "Passkey authentication succeeded");
    }
    result
}

async fn authenticate(
    conn: &mut SqliteConnection,
    rp: &RelyingParty,
    ceremony: &PendingCeremony,
    credential: &AuthenticationCredential,
) -> AppResult<AuthenticationVerified> {
    let CeremonySubject::AllowedCredentials { credential_ids } = &ceremony.subject else {
        return Err(AppError::CeremonyKindMismatch {
            issued_for: CeremonyKind::Registration.as_str(),
        });
    };

    let credential_id = credential
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::MalformedCredential("credential.id is required".to_string()))?;

    if !credential_ids.is_empty()
        && !credential_ids
            .iter()
            .any(|allowed| same_credential_id(allowed, credential_id))
    {
        return Err(AppError::CredentialNotAllowed);
    }

    let stored_id = encoding::canonical_id(credential_id);
    let stored = credentials::find_by_credential_id(&mut *conn, &stored_id)
        .await?
        .ok_or(AppError::UnknownCredential)?;

    let empty = AssertionResponse::default();
    let response = credential.response.as_ref().unwrap_or(&empty);
    let new_counter = verify_assertion(rp, &ceremony.challenge, &stored, response)?;

    // Conditional update: a concurrent request that already moved the counter
    // this far makes this one a replay.
    if !credentials::advance_counter(&mut *conn, &stored.credential_id, new_counter).await? {
        return Err(AppError::ReplayOrCloneSuspected);
    }

    tracing::debug!(
        credential_id = %stored.credential_id,
        user_id = %stored.user_id,
        sign_count = new_counter,
        "Assertion verified"
    );

    Ok(AuthenticationVerified { success: true })
}

/// Check an assertion against the issued challenge, the RP and the stored
/// credential. Returns the counter to record.
pub fn verify_assertion(
    rp: &RelyingParty,
    issued: &Challenge,
    stored: &StoredCredential,
    response: &AssertionResponse,
) -> AppResult<u32> {
    let client_data = ClientData::from_wire(
        response
            .client_data_json
            .as_deref()
            .ok_or_else(|| malformed("response.clientDataJSON is required"))?,
    )?;
    client_data.verify(ClientDataType::Get, issued, rp)?;

    let auth_data_bytes = decode_field(response.authenticator_data.as_deref(), "authenticatorData")?;
    let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
    if !auth_data.matches_rp_id(&rp.id) {
        return Err(AppError::OriginMismatch(format!(
            "authenticator data is not scoped to RP ID '{}'",
            rp.id
        )));
    }
    if !auth_data.user_present() {
        return Err(malformed("authenticator did not report user presence"));
    }

    if let Some(handle) = response.user_handle.as_deref().filter(|h| !h.is_empty()) {
        let handle = encoding::decode(handle)
            .ok_or_else(|| malformed("response.userHandle is not valid base64"))?;
        if !bool::from(handle.ct_eq(&stored.user_handle)) {
            return Err(AppError::CredentialNotAllowed);
        }
    }

    let signature = decode_field(response.signature.as_deref(), "signature")?;
    let mut signed = auth_data_bytes;
    signed.extend_from_slice(&client_data.hash());
    stored
        .public_key()?
        .verify(&signed, &signature)
        .map_err(|_| AppError::SignatureVerification)?;

    check_counter(stored.sign_count(), auth_data.sign_count)?;

    Ok(auth_data.sign_count)
}

/// The reported counter must move forward. Authenticators without a counter
/// always report zero, which is accepted while the stored value is zero too.
fn check_counter(stored: u32, reported: u32) -> AppResult<()> {
    if reported > stored || (stored == 0 && reported == 0) {
        Ok(())
    } else {
        tracing::warn!(stored, reported, "Signature counter did not increase");
        Err(AppError::ReplayOrCloneSuspected)
    }
}

/// Credential ids are compared as strings, falling back to their decoded
/// bytes so padding or alphabet differences do not matter.
fn same_credential_id(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    matches!(
        (encoding::decode(a), encoding::decode(b)),
        (Some(x), Some(y)) if x == y
    )
}

fn decode_field(value: Option<&str>, name: &str) -> AppResult<Vec<u8>> {
    let text = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| malformed(format!("response.{name} is required")))?;
    encoding::decode(text).ok_or_else(|| malformed(format!("response.{name} is not valid base64")))
}

fn malformed(reason: impl Into<String>) -> AppError {
    AppError::MalformedCredential(reason.into())
}
