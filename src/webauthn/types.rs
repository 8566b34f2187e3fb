//! # WebAuthn API Types
//!
//! Request/response bodies for the four ceremony endpoints, and the option
//! dictionaries handed to `navigator.credentials.create()` / `.get()`.
//! Field names follow the WebAuthn IDL, so everything is camelCase on the wire.
//!
//! Request bodies are deliberately loose (`Option` everywhere): a missing
//! field must become a specific ceremony error, not a generic JSON rejection.

use serde::{Deserialize, Serialize};

// Options dictionaries

/// `PublicKeyCredentialRpEntity`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelyingPartyEntity {
    pub name: String,
    pub id: String,
}

/// `PublicKeyCredentialUserEntity`
///
/// `id` is the base64url user handle, never the application's user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub id: String,
    pub name: String,
    pub display_name: String,
}

/// The only credential type WebAuthn defines.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PublicKeyCredentialType {
    #[default]
    PublicKey,
}

/// `PublicKeyCredentialParameters`; `alg` is a COSE algorithm identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PubKeyCredParam {
    pub alg: i64,
    #[serde(rename = "type")]
    pub ty: PublicKeyCredentialType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyancePreference {
    None,
    Indirect,
    Direct,
    Enterprise,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

/// Transport hints. Unknown values from clients are kept as text so a new
/// transport does not break registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorTransport {
    Internal,
    Usb,
    Nfc,
    Ble,
    Hybrid,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub authenticator_attachment: AuthenticatorAttachment,
    pub require_resident_key: bool,
    pub user_verification: UserVerificationRequirement,
}

/// `PublicKeyCredentialDescriptor`, used in allow and exclude lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: PublicKeyCredentialType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<AuthenticatorTransport>,
}

/// `PublicKeyCredentialCreationOptions`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub challenge: String,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub timeout: u64,
    pub attestation: AttestationConveyancePreference,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
}

/// `PublicKeyCredentialRequestOptions`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: String,
    pub timeout: u64,
    pub rp_id: String,
    pub user_verification: UserVerificationRequirement,
    pub allow_credentials: Vec<CredentialDescriptor>,
}

/// Body returned by both options endpoints. `challenge` repeats
/// `options.challenge` verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsResponse<T> {
    pub options: T,
    pub challenge: String,
}

// Requests

/// Body of `POST /generate-registration-options`
///
/// ## Example JSON
/// ```json
/// { "userId": "u1", "username": "alice", "displayName": "Alice" }
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptionsRequest {
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

/// Body of `POST /generate-authentication-options`
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptionsRequest {
    /// May be absent, `null`, or contain `null`/empty entries; all of those
    /// are filtered out rather than rejected.
    pub credential_ids: Option<Vec<Option<String>>>,
}

/// `response` member of a credential returned by `navigator.credentials.create()`
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Option<String>,
    pub attestation_object: Option<String>,
    /// SPKI DER (from `getPublicKey()`) or a COSE_Key, base64 encoded
    pub public_key: Option<String>,
    pub public_key_algorithm: Option<i64>,
    #[serde(default)]
    pub transports: Vec<AuthenticatorTransport>,
}

/// A `PublicKeyCredential` produced by a registration ceremony
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCredential {
    pub id: Option<String>,
    pub raw_id: Option<String>,
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub response: Option<AttestationResponse>,
}

/// Body of `POST /verify-registration`
///
/// `challenge` is optional; without it the challenge is recovered from the
/// credential's clientDataJSON.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationVerificationRequest {
    pub credential: Option<RegistrationCredential>,
    pub challenge: Option<String>,
}

/// `response` member of a credential returned by `navigator.credentials.get()`
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Option<String>,
    pub authenticator_data: Option<String>,
    pub signature: Option<String>,
    pub user_handle: Option<String>,
}

/// A `PublicKeyCredential` produced by an authentication ceremony
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationCredential {
    pub id: Option<String>,
    pub raw_id: Option<String>,
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub response: Option<AssertionResponse>,
}

/// Body of `POST /verify-authentication`
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationVerificationRequest {
    pub credential: Option<AuthenticationCredential>,
    pub challenge: Option<String>,
}

// Responses

/// Successful `POST /verify-registration`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationVerified {
    pub success: bool,
    pub credential_id: String,
    pub public_key: String,
}

/// Successful `POST /verify-authentication`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticationVerified {
    pub success: bool,
}
