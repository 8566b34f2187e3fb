//! # Ceremony Handlers
//!
//! One handler per ceremony operation. Bodies are taken as
//! `Result<Json<T>, JsonRejection>` so that an unparsable body is answered
//! with the same `{success:false,error,code}` shape as every other rejection.

use crate::error::AppResult;
use crate::state::AppState;
use crate::webauthn::types::*;
use crate::webauthn::{authentication, registration};
use axum::{extract::rejection::JsonRejection, extract::State, Json};

// Registration endpoints

pub async fn generate_registration_options(
    State(state): State<AppState>,
    body: Result<Json<RegistrationOptionsRequest>, JsonRejection>,
) -> AppResult<Json<OptionsResponse<CreationOptions>>> {
    let Json(req) = body?;
    let options = registration::start_registration(&state, req).await?;

    Ok(Json(options))
}

pub async fn verify_registration(
    State(state): State<AppState>,
    body: Result<Json<RegistrationVerificationRequest>, JsonRejection>,
) -> AppResult<Json<RegistrationVerified>> {
    let Json(req) = body?;
    let verified = registration::finish_registration(&state, req).await?;

    Ok(Json(verified))
}

// Authentication endpoints

pub async fn generate_authentication_options(
    State(state): State<AppState>,
    body: Result<Json<AuthenticationOptionsRequest>, JsonRejection>,
) -> AppResult<Json<OptionsResponse<RequestOptions>>> {
    let Json(req) = body?;
    let options = authentication::start_authentication(&state, req).await?;

    Ok(Json(options))
}

pub async fn verify_authentication(
    State(state): State<AppState>,
    body: Result<Json<AuthenticationVerificationRequest>, JsonRejection>,
) -> AppResult<Json<AuthenticationVerified>> {
    let Json(req) = body?;
    let verified = authentication::finish_authentication(&state, req).await?;

    Ok(Json(verified))
}
