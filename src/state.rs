//! # Application State
//!
//! This module defines the shared state that's accessible to all request handlers.
//! In Axum, state is how you share resources (database connections, configuration, etc.)
//! across different parts of your application.
//!
//! ## The State Pattern
//! Instead of creating new database connections for each request, we:
//! 1. Create a connection pool once at startup
//! 2. Store it in AppState
//! 3. Share it across all request handlers
//! 4. Axum clones the state for each request (cheap because we use Arc)

use crate::config::{Config, RelyingParty};
use crate::db;
use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

/// Shared application state
///
/// ## Why Clone?
/// Each request handler gets a clone of the state:
/// - `SqlitePool` is already a clone-able pool of connections
/// - `Arc<RelyingParty>` only clones a pointer
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool holding pending ceremonies and credentials
    pub db: SqlitePool,

    /// Relying party identity, fixed at startup
    pub rp: Arc<RelyingParty>,

    /// Challenge lifetime, also sent to the client as `timeout`
    pub ceremony_timeout_ms: u64,
}

impl AppState {
    /// Initialize application state
    ///
    /// This function:
    /// 1. Validates the relying party settings
    /// 2. Connects to the SQLite database and runs migrations
    /// 3. Returns the initialized state
    ///
    /// # Errors
    /// Returns an error if the RP origin is not a valid URL, or the database
    /// cannot be opened or migrated.
    pub async fn new(config: &Config) -> Result<Self> {
        let rp = config.relying_party()?;
        let db = db::connect(&config.database_url).await?;

        Ok(Self::from_parts(db, rp, config.ceremony_timeout_ms))
    }

    /// Assemble state from an already opened pool.
    pub fn from_parts(db: SqlitePool, rp: RelyingParty, ceremony_timeout_ms: u64) -> Self {
        AppState {
            db,
            rp: Arc::new(rp),
            ceremony_timeout_ms,
        }
    }
}
