//! # WebAuthn Module
//!
//! The relying-party side of the WebAuthn ceremonies, implemented directly on
//! top of the wire formats (CBOR, COSE, clientDataJSON).
//!
//! ## Submodules
//! - `types`: Request/response types for the API
//! - `encoding`: The one base64 flavour used on the wire
//! - `challenge`: Random single-use challenges and user handles
//! - `options`: Creation/request options for the browser
//! - `client_data`, `authenticator_data`, `cose`: Parsing and checking what
//!   the browser and authenticator send back
//! - `registration`: Creating new passkey credentials
//! - `authentication`: Logging in with existing passkeys
//!
//! ## WebAuthn Flow Overview
//!
//! ### Registration (Creating a Passkey)
//! 1. Client requests options → `registration::start_registration()`
//! 2. Server stores a pending ceremony for a fresh challenge
//! 3. Client uses WebAuthn API to create credential with authenticator
//! 4. Client sends credential back → `registration::finish_registration()`
//! 5. Server consumes the ceremony, checks the credential, stores the key
//!
//! ### Authentication (Logging In)
//! 1. Client requests options → `authentication::start_authentication()`
//! 2. Server stores a pending ceremony with the allowed credentials
//! 3. Client uses WebAuthn API to sign challenge with authenticator
//! 4. Client sends the assertion back → `authentication::finish_authentication()`
//! 5. Server consumes the ceremony, verifies the signature and counter

pub mod authentication;
pub mod authenticator_data;
pub mod challenge;
pub mod client_data;
pub mod cose;
pub mod encoding;
pub mod options;
pub mod registration;
pub mod types;

use sqlx::{Sqlite, Transaction};

use crate::error::AppResult;
use challenge::Challenge;
use client_data::ClientData;

/// Work out which challenge a verification request is answering.
///
/// An explicit `challenge` field wins; otherwise the one embedded in
/// clientDataJSON is used.
pub(crate) fn resolve_challenge(
    explicit: Option<&str>,
    client_data_json: Option<&str>,
) -> AppResult<Challenge> {
    use crate::error::AppError;

    match (explicit, client_data_json) {
        (Some(text), _) => Challenge::from_wire(text)
            .ok_or_else(|| AppError::InvalidInput("challenge is not valid base64url".to_string())),
        (None, Some(client_data_json)) => ClientData::from_wire(client_data_json)?
            .challenge()
            .ok_or_else(|| {
                AppError::InvalidInput("clientDataJSON carries no usable challenge".to_string())
            }),
        (None, None) => Err(AppError::InvalidInput("challenge is required".to_string())),
    }
}

/// Finish a verification transaction.
///
/// The ceremony was deleted as the first statement of `tx`. Accepting or
/// rejecting the credential both commit, so a challenge is spent by the
/// first attempt that presents it. Internal faults roll back instead and
/// leave the ceremony available for a retry.
pub(crate) async fn settle<T>(
    tx: Transaction<'static, Sqlite>,
    outcome: AppResult<T>,
) -> AppResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) if e.is_rejection() => {
            tx.commit().await?;
            Err(e)
        }
        Err(e) => {
            tx.rollback().await?;
            Err(e)
        }
    }
}
