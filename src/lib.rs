//! # Passkey Relying-Party Server
//!
//! The server side of WebAuthn passkey ceremonies: it hands out registration
//! and authentication options, then verifies what the browser's
//! authenticator sends back.
//!
//! ## Key Concepts
//! - **WebAuthn**: Web Authentication API for passwordless authentication
//! - **Passkeys**: User-friendly implementation of WebAuthn credentials
//! - **Ceremony**: One options/verify round trip, bound by a single challenge
//!
//! Session issuance after a successful login is left to the application
//! in front of this service.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod state;
pub mod webauthn;

use crate::handlers::ceremony::{
    generate_authentication_options, generate_registration_options, verify_authentication,
    verify_registration,
};
use crate::handlers::health::health_check;
use crate::state::AppState;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the application router
///
/// ## Routes
/// - `GET /health`
/// - `POST /generate-registration-options`, `POST /verify-registration`
/// - `POST /generate-authentication-options`, `POST /verify-authentication`
///
/// CORS preflight (`OPTIONS`) is answered by the CORS layer for any origin.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        // Registration flow (creating a new passkey)
        .route(
            "/generate-registration-options",
            post(generate_registration_options),
        )
        .route("/verify-registration", post(verify_registration))
        // Authentication flow (logging in with a passkey)
        .route(
            "/generate-authentication-options",
            post(generate_authentication_options),
        )
        .route("/verify-authentication", post(verify_authentication))
        // Apply middleware layers (processed in reverse order)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
