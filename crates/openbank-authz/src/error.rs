//! Authorization engine error types.
//!
//! [`AuthError`] is the crate-wide error returned by services and
//! repositories. Protocol-level failures that are sent back to the client
//! through the redirect live in [`crate::oauth::AuthorizationError`], and
//! resource-access failures in [`crate::token::TokenValidationError`].

use std::fmt;

use crate::oauth::AuthorizationErrorCode;

/// Errors raised while issuing, exchanging or revoking grants.
///
/// The first three variants are token endpoint outcomes (RFC 6749 §5.2)
/// and their message may be shown to the client. The remaining ones are
/// backend failures and are reported as `server_error`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client is unknown or suspended.
    #[error("client rejected: {0}")]
    InvalidClient(String),

    /// The code or refresh token is unknown, spent, expired, stale or
    /// bound to another client or redirect endpoint.
    #[error("grant rejected: {0}")]
    InvalidGrant(String),

    /// The requested scope exceeds what was granted.
    #[error("scope rejected: {0}")]
    InvalidScope(String),

    /// A record the operation expected to exist is missing.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The repository backend failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Configured values cannot be applied, such as a lifetime that
    /// overflows the date range.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient(message.into())
    }

    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant(message.into())
    }

    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns `true` if the failure is on the server side and its message
    /// must stay internal.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Storage(_) | Self::Configuration(_)
        )
    }

    /// Coarse grouping used as a structured logging field.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidClient(_) => ErrorCategory::Client,
            Self::InvalidGrant(_) | Self::InvalidScope(_) => ErrorCategory::Grant,
            Self::NotFound(_) | Self::Storage(_) => ErrorCategory::Storage,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Token endpoint `error` value for this failure.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidScope(_) => "invalid_scope",
            Self::NotFound(_) | Self::Storage(_) | Self::Configuration(_) => "server_error",
        }
    }

    /// Maps this error onto the authorization endpoint error taxonomy.
    #[must_use]
    pub fn authorization_error_code(&self) -> AuthorizationErrorCode {
        match self {
            Self::InvalidClient(_) => AuthorizationErrorCode::UnauthorizedClient,
            Self::InvalidGrant(_) => AuthorizationErrorCode::InvalidRequest,
            Self::InvalidScope(_) => AuthorizationErrorCode::InvalidScope,
            Self::NotFound(_) | Self::Storage(_) | Self::Configuration(_) => {
                AuthorizationErrorCode::ServerError
            }
        }
    }
}

/// Logging category of an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Client identity or status.
    Client,
    /// Codes, refresh tokens and their scope.
    Grant,
    /// Repository backend.
    Storage,
    /// Engine configuration.
    Configuration,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Grant => "grant",
            Self::Storage => "storage",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failure() {
        assert_eq!(
            AuthError::invalid_grant("code already redeemed").to_string(),
            "grant rejected: code already redeemed"
        );
        assert_eq!(
            AuthError::storage("connection reset").to_string(),
            "storage failure: connection reset"
        );
    }

    #[test]
    fn test_backend_failures_are_server_errors() {
        assert!(AuthError::storage("x").is_server_error());
        assert!(AuthError::not_found("x").is_server_error());
        assert!(!AuthError::invalid_client("x").is_server_error());

        for err in [AuthError::storage("x"), AuthError::not_found("x")] {
            assert_eq!(err.oauth_error_code(), "server_error");
            assert_eq!(
                err.authorization_error_code(),
                AuthorizationErrorCode::ServerError
            );
            assert_eq!(err.category(), ErrorCategory::Storage);
        }

        let err = AuthError::configuration("lifetime out of range");
        assert!(err.is_server_error());
        assert_eq!(err.oauth_error_code(), "server_error");
        assert_eq!(err.category().to_string(), "configuration");
    }

    #[test]
    fn test_token_endpoint_codes() {
        assert_eq!(AuthError::invalid_client("x").oauth_error_code(), "invalid_client");
        assert_eq!(AuthError::invalid_grant("x").oauth_error_code(), "invalid_grant");
        assert_eq!(AuthError::invalid_scope("x").oauth_error_code(), "invalid_scope");
        assert_eq!(AuthError::invalid_scope("x").category().to_string(), "grant");
    }

    #[test]
    fn test_suspended_client_maps_to_unauthorized_client() {
        assert_eq!(
            AuthError::invalid_client("suspended").authorization_error_code(),
            AuthorizationErrorCode::UnauthorizedClient
        );
    }
}
