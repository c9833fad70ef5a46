//! Domain records shared by the services and repositories.
//!
//! - [`ClientInfo`] - externally registered client metadata
//! - [`AuthorizationInfo`] - durable client/user grant
//! - [`AccessTokenInfo`] - ephemeral access token linked to a grant

pub mod access_token;
pub mod authorization_info;
pub mod client;

pub use access_token::{
    AccessTokenInfo, AccessTokenState, TokenStatus, generate_token, hash_token,
};
pub use authorization_info::{AuthorizationInfo, CodeReissue, consent_required};
pub use client::{ClientInfo, ClientStatus};
