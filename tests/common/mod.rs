#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use ciborium::Value as Cbor;
use http_body_util::BodyExt;
use p256::ecdsa::{signature::Signer, Signature};
use p256::pkcs8::EncodePublicKey;
use passkey_rp_server::config::RelyingParty;
use passkey_rp_server::state::AppState;
use passkey_rp_server::webauthn::cose::CredentialPublicKey;
use passkey_rp_server::webauthn::encoding;
use rand::RngCore;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

pub const RP_ID: &str = "localhost";
pub const ORIGIN: &str = "http://localhost:8080";

pub fn relying_party() -> RelyingParty {
    RelyingParty::new(RP_ID, "Passkey Test", ORIGIN).unwrap()
}

pub async fn state_with(database_url: &str, timeout_ms: u64) -> AppState {
    let db = passkey_rp_server::db::connect(database_url).await.unwrap();
    AppState::from_parts(db, relying_party(), timeout_ms)
}

pub async fn app() -> (Router, AppState) {
    let state = state_with("sqlite::memory:", 60_000).await;
    (passkey_rp_server::router(state.clone()), state)
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub fn b64(bytes: &[u8]) -> String {
    encoding::encode(bytes)
}

pub enum Key {
    Es256(p256::ecdsa::SigningKey),
    Rs256(Box<rsa::pkcs1v15::SigningKey<Sha256>>, rsa::RsaPublicKey),
}

/// A software authenticator holding one credential.
pub struct Authenticator {
    pub key: Key,
    pub credential_id: Vec<u8>,
    pub counter: u32,
}

impl Authenticator {
    pub fn es256() -> Self {
        Self::with_key(Key::Es256(p256::ecdsa::SigningKey::random(
            &mut rand::rngs::OsRng,
        )))
    }

    pub fn rs256() -> Self {
        let private = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let public = private.to_public_key();
        Self::with_key(Key::Rs256(
            Box::new(rsa::pkcs1v15::SigningKey::new(private)),
            public,
        ))
    }

    fn with_key(key: Key) -> Self {
        let mut credential_id = vec![0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut credential_id);
        Self {
            key,
            credential_id,
            counter: 0,
        }
    }

    pub fn id(&self) -> String {
        b64(&self.credential_id)
    }

    pub fn algorithm(&self) -> i64 {
        match self.key {
            Key::Es256(_) => -7,
            Key::Rs256(..) => -257,
        }
    }

    pub fn spki(&self) -> Vec<u8> {
        match &self.key {
            Key::Es256(signing) => signing
                .verifying_key()
                .to_public_key_der()
                .unwrap()
                .as_bytes()
                .to_vec(),
            Key::Rs256(_, public) => rsa::pkcs8::EncodePublicKey::to_public_key_der(public)
                .unwrap()
                .as_bytes()
                .to_vec(),
        }
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.key {
            Key::Es256(signing) => {
                let signature: Signature = signing.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
            Key::Rs256(signing, _) => {
                let signature = rsa::signature::Signer::sign(&**signing, message);
                let bytes: Box<[u8]> = signature.into();
                bytes.to_vec()
            }
        }
    }

    pub fn client_data(ty: &str, challenge: &str, origin: &str) -> String {
        b64(json!({
            "type": ty,
            "challenge": challenge,
            "origin": origin,
            "crossOrigin": false
        })
        .to_string()
        .as_bytes())
    }

    fn attestation_object(&self) -> String {
        let cose = CredentialPublicKey::from_spki_der(&self.spki())
            .unwrap()
            .to_cose_bytes()
            .unwrap();

        let mut auth_data = Sha256::digest(RP_ID.as_bytes()).to_vec();
        auth_data.push(0x45);
        auth_data.extend_from_slice(&self.counter.to_be_bytes());
        auth_data.extend_from_slice(&[0u8; 16]);
        auth_data.extend_from_slice(&u16::try_from(self.credential_id.len()).unwrap().to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&cose);

        let object = Cbor::Map(vec![
            (Cbor::Text("fmt".into()), Cbor::Text("none".into())),
            (Cbor::Text("attStmt".into()), Cbor::Map(vec![])),
            (Cbor::Text("authData".into()), Cbor::Bytes(auth_data)),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&object, &mut bytes).unwrap();
        b64(&bytes)
    }

    /// Body for `POST /verify-registration` answering `challenge`.
    pub fn registration(&self, challenge: &str) -> Value {
        json!({
            "credential": {
                "id": self.id(),
                "rawId": self.id(),
                "type": "public-key",
                "response": {
                    "clientDataJSON": Self::client_data("webauthn.create", challenge, ORIGIN),
                    "attestationObject": self.attestation_object(),
                    "publicKey": b64(&self.spki()),
                    "publicKeyAlgorithm": self.algorithm(),
                    "transports": ["internal"]
                }
            },
            "challenge": challenge
        })
    }

    /// Body for `POST /verify-authentication`, signed with the next counter value.
    pub fn assertion(&mut self, challenge: &str) -> Value {
        self.counter += 1;
        self.assertion_with_counter(challenge, self.counter)
    }

    pub fn assertion_with_counter(&self, challenge: &str, counter: u32) -> Value {
        let client_data = Self::client_data("webauthn.get", challenge, ORIGIN);
        let client_data_bytes = encoding::decode(&client_data).unwrap();

        let mut auth_data = Sha256::digest(RP_ID.as_bytes()).to_vec();
        auth_data.push(0x05);
        auth_data.extend_from_slice(&counter.to_be_bytes());

        let mut signed = auth_data.clone();
        signed.extend_from_slice(&Sha256::digest(&client_data_bytes));

        json!({
            "credential": {
                "id": self.id(),
                "rawId": self.id(),
                "type": "public-key",
                "response": {
                    "clientDataJSON": client_data,
                    "authenticatorData": b64(&auth_data),
                    "signature": b64(&self.sign(&signed)),
                    "userHandle": null
                }
            },
            "challenge": challenge
        })
    }
}

pub async fn registration_challenge(app: &Router, user_id: &str) -> String {
    let (status, body) = post(
        app,
        "/generate-registration-options",
        json!({ "userId": user_id, "username": "alice", "displayName": "Alice" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["challenge"].as_str().unwrap().to_string()
}

pub async fn authentication_challenge(app: &Router, credential_ids: Value) -> String {
    let (status, body) = post(
        app,
        "/generate-authentication-options",
        json!({ "credentialIds": credential_ids }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["challenge"].as_str().unwrap().to_string()
}

/// Run a full registration for `authenticator` under `user_id`.
pub async fn register(app: &Router, authenticator: &Authenticator, user_id: &str) {
    let challenge = registration_challenge(app, user_id).await;
    let (status, body) = post(app, "/verify-registration", authenticator.registration(&challenge)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}
