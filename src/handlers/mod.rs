//! # HTTP Request Handlers
//!
//! This module contains all the HTTP route handlers (controllers).
//! Each handler processes a specific API endpoint.
//!
//! ## Submodules
//! - `health`: Health check endpoint (for monitoring)
//! - `ceremony`: The four WebAuthn ceremony endpoints
//!
//! ## Handler Pattern
//! Handlers are async functions that:
//! 1. Extract data from request (shared state, JSON body)
//! 2. Call the ceremony logic in `crate::webauthn`
//! 3. Return a JSON response, or an `AppError` that renders itself

pub mod ceremony;
pub mod health;
