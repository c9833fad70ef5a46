//! Token issuance, validation and revocation.
//!
//! This module provides:
//!
//! - Code exchange and refresh token renewal
//! - Access token validation for resource servers
//! - User and administrator revocation

pub mod revocation;
pub mod service;
pub mod validation;

pub use revocation::RevocationService;
pub use service::{
    CodeExchangeRequest, RefreshRequest, SweepReport, TokenResponse, TokenService,
};
pub use validation::TokenValidationError;
