//! Storage traits for authorization data.
//!
//! This module defines storage interfaces for:
//!
//! - Client metadata (read-mostly, externally administered)
//! - Authorization records (durable relational store)
//! - Access tokens (ephemeral key-value store)
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `openbank-authz-memory` - concurrent in-memory backend

pub mod access_token;
pub mod authz_info;
pub mod client;

pub use access_token::AccessTokenRepository;
pub use authz_info::AuthzInfoRepository;
pub use client::ClientRepository;
