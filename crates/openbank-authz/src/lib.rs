//! # openbank-authz
//!
//! OAuth 2.0 authorization code issuance and token lifecycle engine for
//! FAPI / Open Banking authorization servers.
//!
//! This crate provides:
//! - Authorization request validation against client registration
//! - Single-use, time-boxed authorization codes bound to a user's consent
//! - Code exchange and refresh token renewal
//! - Access token validation with lazy expiry and revision checks
//! - User and administrator revocation
//!
//! ## Overview
//!
//! Transport, persistence and user authentication are external. The engine
//! consumes them through the repository traits in [`storage`] and returns
//! plain values the caller turns into HTTP responses.
//!
//! ## Modules
//!
//! - [`config`] - Token lifetimes and audit switches
//! - [`scope`] - Recognized scope catalog
//! - [`oauth`] - Authorization endpoint: validation, consent, code issuance
//! - [`token`] - Code exchange, refresh, validation and revocation
//! - [`types`] - Client, authorization and access token records
//! - [`storage`] - Repository traits

pub mod config;
pub mod error;
pub mod oauth;
pub mod scope;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuditConfig, AuthzConfig, ConfigError, TokenConfig};
pub use error::{AuthError, ErrorCategory};
pub use oauth::{
    AuthorizationError, AuthorizationErrorCode, AuthorizationGrant, AuthorizationOutcome,
    AuthorizationRequest, AuthorizationService, ConsentPrompt, ValidatedRequest,
    validate_authorization_request,
};
pub use scope::ScopeCatalog;
pub use storage::{AccessTokenRepository, AuthzInfoRepository, ClientRepository};
pub use token::{
    CodeExchangeRequest, RefreshRequest, RevocationService, TokenResponse, TokenService,
    TokenValidationError,
};
pub use types::{
    AccessTokenInfo, AccessTokenState, AuthorizationInfo, ClientInfo, ClientStatus, TokenStatus,
};

/// Type alias for authorization engine results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use openbank_authz::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuditConfig, AuthzConfig, ConfigError, TokenConfig};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::oauth::{
        AuthorizationError, AuthorizationErrorCode, AuthorizationGrant, AuthorizationOutcome,
        AuthorizationRequest, AuthorizationService, ConsentPrompt,
    };
    pub use crate::scope::ScopeCatalog;
    pub use crate::storage::{AccessTokenRepository, AuthzInfoRepository, ClientRepository};
    pub use crate::token::{
        CodeExchangeRequest, RefreshRequest, RevocationService, TokenResponse, TokenService,
        TokenValidationError,
    };
    pub use crate::types::{
        AccessTokenInfo, AuthorizationInfo, ClientInfo, ClientStatus, TokenStatus,
    };
}
