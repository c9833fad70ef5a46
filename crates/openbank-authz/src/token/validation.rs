//! Access token validation errors.
//!
//! Each failed check of [`TokenService::validate_access_token`] has its own
//! variant so resource servers can log the precise cause while answering the
//! client with the coarse RFC 6750 error code.
//!
//! [`TokenService::validate_access_token`]: crate::token::TokenService::validate_access_token

use crate::error::AuthError;
use crate::types::TokenStatus;

/// Reasons an access token is not usable, in check order.
#[derive(Debug, thiserror::Error)]
pub enum TokenValidationError {
    /// No token with this value exists.
    #[error("Access token not found")]
    NotFound,

    /// The token's lifetime has elapsed.
    #[error("Access token expired")]
    Expired,

    /// The token was revoked.
    #[error("Access token revoked ({0:?})")]
    Revoked(TokenStatus),

    /// The owning authorization record no longer exists.
    #[error("Authorization for access token no longer exists")]
    AuthorizationMissing,

    /// The client is unknown or suspended.
    #[error("Client is not active")]
    ClientInactive,

    /// The grant was made under an older client revision.
    #[error("Access token was issued under a stale client revision")]
    RevisionMismatch,

    /// The token lacks a required scope.
    #[error("Access token lacks required scope")]
    InsufficientScope,

    /// A repository call failed.
    #[error(transparent)]
    Storage(#[from] AuthError),
}

impl TokenValidationError {
    /// RFC 6750 error code for the `WWW-Authenticate` challenge.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientScope => "insufficient_scope",
            Self::Storage(_) => "server_error",
            _ => "invalid_token",
        }
    }
}
