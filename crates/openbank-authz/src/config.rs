//! Authorization engine configuration.
//!
//! Only token lifetimes and audit switches are configurable. The
//! authorization code length and lifetime are fixed policy and live in
//! [`crate::oauth::issuer`] as constants.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the authorization engine.
///
/// # Example (TOML)
///
/// ```toml
/// [tokens]
/// access_token_lifetime = "15m"
/// refresh_token_lifetime = "30d"
/// refresh_token_rotation = true
///
/// [audit]
/// log_token_operations = true
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Token issuance configuration.
    pub tokens: TokenConfig,

    /// Audit logging configuration.
    pub audit: AuditConfig,
}

/// Upper bound for any configured token lifetime (10 years).
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Access and refresh token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Issue a new refresh token on every refresh and invalidate the old one.
    pub refresh_token_rotation: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(3600), // 1 hour
            refresh_token_lifetime: Duration::from_secs(90 * 24 * 3600), // 90 days
            refresh_token_rotation: true,
        }
    }
}

impl TokenConfig {
    /// Access token lifetime as a `time::Duration`.
    #[must_use]
    pub fn access_token_ttl(&self) -> time::Duration {
        time::Duration::seconds(saturating_secs(self.access_token_lifetime))
    }

    /// Refresh token lifetime as a `time::Duration`.
    #[must_use]
    pub fn refresh_token_ttl(&self) -> time::Duration {
        time::Duration::seconds(saturating_secs(self.refresh_token_lifetime))
    }
}

fn saturating_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Audit logging configuration.
///
/// Controls which lifecycle events are emitted through `tracing`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Log token operations (issue, refresh, revoke).
    pub log_token_operations: bool,

    /// Log rejected authorization requests.
    pub log_failed_authorizations: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_token_operations: true,
            log_failed_authorizations: true,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl AuthzConfig {
    /// Parses and validates a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and
    /// `ConfigError::InvalidValue` if validation fails.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - A token lifetime is zero
    /// - A token lifetime exceeds [`MAX_TOKEN_LIFETIME`]
    /// - The refresh token lifetime is shorter than the access token lifetime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.tokens.refresh_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.tokens.access_token_lifetime > MAX_TOKEN_LIFETIME
            || self.tokens.refresh_token_lifetime > MAX_TOKEN_LIFETIME
        {
            return Err(ConfigError::InvalidValue(
                "token lifetimes must not exceed 10 years".to_string(),
            ));
        }

        if self.tokens.refresh_token_lifetime < self.tokens.access_token_lifetime {
            return Err(ConfigError::InvalidValue(
                "refresh_token_lifetime must not be shorter than access_token_lifetime"
                    .to_string(),
            ));
        }

        Ok(())
    }
}
