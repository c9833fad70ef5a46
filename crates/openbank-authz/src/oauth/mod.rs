//! OAuth 2.0 authorization endpoint.
//!
//! The authorization code flow is implemented across several submodules:
//!
//! - [`authorize`] - Request, response and error types
//! - [`validator`] - Pure request validation
//! - [`issuer`] - Code generation and persistence of the owning record
//! - [`service`] - Consent decision and orchestration
//!
//! # Example
//!
//! ```ignore
//! use openbank_authz::oauth::{AuthorizationOutcome, AuthorizationService};
//!
//! let service = AuthorizationService::new(clients, authz_infos);
//! if let AuthorizationOutcome::ConsentRequired(prompt) =
//!     service.authorize(&request, "user-1").await?
//! {
//!     let grant = service.grant_consent(&prompt, "user-1").await?;
//!     // redirect to grant.redirect_url
//! }
//! ```

pub mod authorize;
pub mod issuer;
pub mod service;
pub mod validator;

// Authorization endpoint types
pub use authorize::{
    AuthorizationError, AuthorizationErrorCode, AuthorizationRequest, AuthorizationResponse,
    ResponseType,
};

// Code issuance
pub use issuer::{
    AUTHORIZATION_CODE_LENGTH, AUTHORIZATION_CODE_LIFETIME, AuthorizationGrant,
    AuthorizationGrantIssuer, build_redirect, code_expiration, generate_code,
};

// Service
pub use service::{AuthorizationOutcome, AuthorizationService, ConsentPrompt};

// Validation
pub use validator::{
    ValidatedRequest, check_request_parameters, is_registered_endpoint, reduce_endpoint,
    validate_authorization_request,
};
