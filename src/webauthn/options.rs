//! # Ceremony Options
//!
//! Builds the dictionaries the browser passes to
//! `navigator.credentials.create()` and `navigator.credentials.get()`.
//!
//! Everything here is pure: the caller supplies the challenge and stores
//! the pending ceremony. The fixed choices are:
//! - ES256 then RS256 in `pubKeyCredParams`
//! - no attestation, no exclusions
//! - platform authenticators, resident key not required
//! - user verification preferred, never required

use coset::iana::EnumI64;

use super::challenge::Challenge;
use super::cose::SUPPORTED_ALGORITHMS;
use super::encoding;
use super::types::{
    AttestationConveyancePreference, AuthenticatorAttachment, AuthenticatorSelection,
    AuthenticatorTransport, CreationOptions, CredentialDescriptor, PubKeyCredParam,
    PublicKeyCredentialType, RelyingPartyEntity, RequestOptions, UserEntity,
    UserVerificationRequirement,
};
use crate::config::RelyingParty;

/// Transports advertised for every entry of an allow list. The server does
/// not know where a credential lives, so all of them are offered.
const ALLOW_LIST_TRANSPORTS: [AuthenticatorTransport; 4] = [
    AuthenticatorTransport::Internal,
    AuthenticatorTransport::Usb,
    AuthenticatorTransport::Nfc,
    AuthenticatorTransport::Ble,
];

/// `PublicKeyCredentialCreationOptions` for a new passkey.
///
/// `user_handle` goes into `user.id`; the application's own user id is never
/// sent to the authenticator.
pub fn registration_options(
    rp: &RelyingParty,
    user_handle: &[u8],
    username: &str,
    display_name: &str,
    challenge: &Challenge,
    timeout_ms: u64,
) -> CreationOptions {
    CreationOptions {
        rp: RelyingPartyEntity {
            name: rp.name.clone(),
            id: rp.id.clone(),
        },
        user: UserEntity {
            id: encoding::encode(user_handle),
            name: username.to_string(),
            display_name: display_name.to_string(),
        },
        challenge: challenge.to_wire(),
        pub_key_cred_params: SUPPORTED_ALGORITHMS
            .iter()
            .map(|alg| PubKeyCredParam {
                alg: alg.to_i64(),
                ty: PublicKeyCredentialType::PublicKey,
            })
            .collect(),
        timeout: timeout_ms,
        attestation: AttestationConveyancePreference::None,
        exclude_credentials: Vec::new(),
        authenticator_selection: AuthenticatorSelection {
            authenticator_attachment: AuthenticatorAttachment::Platform,
            require_resident_key: false,
            user_verification: UserVerificationRequirement::Preferred,
        },
    }
}

/// `PublicKeyCredentialRequestOptions` restricted to `credential_ids`.
///
/// An empty list produces an empty `allowCredentials`, which lets the
/// authenticator offer any discoverable credential for this RP.
pub fn authentication_options(
    rp: &RelyingParty,
    credential_ids: &[String],
    challenge: &Challenge,
    timeout_ms: u64,
) -> RequestOptions {
    RequestOptions {
        challenge: challenge.to_wire(),
        timeout: timeout_ms,
        rp_id: rp.id.clone(),
        user_verification: UserVerificationRequirement::Preferred,
        allow_credentials: credential_ids
            .iter()
            .map(|id| CredentialDescriptor {
                id: id.clone(),
                ty: PublicKeyCredentialType::PublicKey,
                transports: ALLOW_LIST_TRANSPORTS.to_vec(),
            })
            .collect(),
    }
}

/// Drop absent, `null` and blank entries from a client-supplied id list.
pub fn filter_credential_ids(ids: Option<Vec<Option<String>>>) -> Vec<String> {
    ids.unwrap_or_default()
        .into_iter()
        .flatten()
        .filter(|id| !id.trim().is_empty())
        .collect()
}
