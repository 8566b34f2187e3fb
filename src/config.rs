//! # Configuration Management
//!
//! Configuration is read once from the environment at startup (12-factor style)
//! and then turned into immutable values that are handed to the ceremony code.
//!
//! ## Environment Variables
//! - `HOST`: Server bind address (default: 127.0.0.1)
//! - `PORT`: Server port (default: 8080)
//! - `DATABASE_URL`: SQLite database connection string
//! - `RP_ID`: WebAuthn Relying Party ID (usually your domain)
//! - `RP_ORIGIN`: WebAuthn Relying Party Origin (full URL)
//! - `RP_NAME`: Human-readable name for your service
//! - `CEREMONY_TIMEOUT_MS`: How long a challenge stays valid (default: 60000)
//! - `CLEANUP_INTERVAL_SECS`: How often expired ceremonies are swept (default: 600)

use anyhow::{Context, Result};
use std::env;
use url::Url;

/// Default ceremony timeout, also advertised to the client as `timeout`.
pub const DEFAULT_CEREMONY_TIMEOUT_MS: u64 = 60_000;

/// Application configuration
///
/// Holds every value needed to run the server. The WebAuthn-specific part is
/// split off into a [`RelyingParty`] by [`Config::relying_party`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host/IP address to bind to
    pub host: String,

    /// Server port number
    pub port: u16,

    /// SQLite database connection URL
    /// Format: "sqlite:filename.db?mode=rwc"
    pub database_url: String,

    /// WebAuthn Relying Party ID, the domain without scheme or port
    pub rp_id: String,

    /// WebAuthn Relying Party Origin, the full URL the browser reports
    pub rp_origin: String,

    /// Human-readable name shown to users during passkey creation
    pub rp_name: String,

    /// Lifetime of an issued challenge in milliseconds
    pub ceremony_timeout_ms: u64,

    /// Period of the expired-ceremony sweeper in seconds
    pub cleanup_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables from a `.env` file are loaded first if one exists. Missing
    /// variables fall back to defaults suitable for local development; values
    /// that are present but unparsable are an error.
    ///
    /// ## Example .env file
    /// ```text
    /// HOST=127.0.0.1
    /// PORT=8080
    /// DATABASE_URL=sqlite:passkey.db?mode=rwc
    /// RP_ID=localhost
    /// RP_ORIGIN=http://localhost:8080
    /// RP_NAME=Passkey Demo
    /// CEREMONY_TIMEOUT_MS=60000
    /// ```
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),

            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid port number")?,

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:passkey.db?mode=rwc".to_string()),

            rp_id: env::var("RP_ID").unwrap_or_else(|_| "localhost".to_string()),

            rp_origin: env::var("RP_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),

            rp_name: env::var("RP_NAME").unwrap_or_else(|_| "Passkey Demo".to_string()),

            ceremony_timeout_ms: env::var("CEREMONY_TIMEOUT_MS")
                .unwrap_or_else(|_| DEFAULT_CEREMONY_TIMEOUT_MS.to_string())
                .parse()
                .context("CEREMONY_TIMEOUT_MS must be a number of milliseconds")?,

            cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("CLEANUP_INTERVAL_SECS must be a number of seconds")?,
        })
    }

    /// Get the socket address to bind the server to, e.g. "127.0.0.1:8080"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the immutable relying party identity from this configuration.
    pub fn relying_party(&self) -> Result<RelyingParty> {
        RelyingParty::new(&self.rp_id, &self.rp_name, &self.rp_origin)
    }
}

/// Relying party identity shared by the options builder and the verifier.
///
/// Constructed once at startup; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    /// RP ID, the effective domain credentials are scoped to
    pub id: String,
    /// Display name sent in the `rp` block of creation options
    pub name: String,
    /// ASCII serialisation of the expected origin, e.g. `https://example.com`
    pub origin: String,
}

impl RelyingParty {
    /// Validate and normalise the relying party settings.
    ///
    /// The origin is parsed as a URL and reduced to `scheme://host[:port]` so
    /// that trailing slashes or paths in the configuration do not cause every
    /// ceremony to fail the origin check.
    pub fn new(id: &str, name: &str, origin: &str) -> Result<Self> {
        if id.trim().is_empty() {
            anyhow::bail!("RP_ID must not be empty");
        }

        let origin = Url::parse(origin)
            .with_context(|| format!("RP_ORIGIN '{origin}' is not a valid URL"))?
            .origin();
        if !origin.is_tuple() {
            anyhow::bail!("RP_ORIGIN must have a scheme and host");
        }

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            origin: origin.ascii_serialization(),
        })
    }

    /// Whether an origin reported by a client equals the configured one.
    pub fn matches_origin(&self, candidate: &str) -> bool {
        Url::parse(candidate)
            .map(|url| url.origin().ascii_serialization() == self.origin)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_normalised() {
        let rp = RelyingParty::new("example.com", "Example", "https://example.com/login/").unwrap();
        assert_eq!(rp.origin, "https://example.com");
        assert!(rp.matches_origin("https://example.com"));
        assert!(rp.matches_origin("https://example.com/"));
    }

    #[test]
    fn origin_with_port_must_match_exactly() {
        let rp = RelyingParty::new("localhost", "Demo", "http://localhost:8080").unwrap();
        assert!(rp.matches_origin("http://localhost:8080"));
        assert!(!rp.matches_origin("http://localhost:8081"));
        assert!(!rp.matches_origin("https://localhost:8080"));
        assert!(!rp.matches_origin("not a url"));
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(RelyingParty::new("", "Demo", "http://localhost").is_err());
        assert!(RelyingParty::new("localhost", "Demo", "localhost").is_err());
    }
}
