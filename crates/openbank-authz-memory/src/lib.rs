//! In-memory repository backend for openbank-authz.
//!
//! This crate provides [`InMemoryAuthzStore`], an implementation of the
//! `ClientRepository`, `AuthzInfoRepository` and `AccessTokenRepository`
//! traits from `openbank-authz`, using dashmap for concurrent access.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use openbank_authz::{AuthorizationService, ClientInfo, TokenService};
//! use openbank_authz_memory::InMemoryAuthzStore;
//!
//! let store = Arc::new(InMemoryAuthzStore::new());
//! store.register_client(ClientInfo::new("tpp-1", ["https://tpp.example.com/cb"]));
//!
//! let authorization = AuthorizationService::new(store.clone(), store.clone());
//! let tokens = TokenService::new(store.clone(), store.clone(), store);
//! ```

pub mod storage;

pub use storage::InMemoryAuthzStore;

/// Creates a new shareable in-memory store.
pub fn create_store() -> std::sync::Arc<InMemoryAuthzStore> {
    std::sync::Arc::new(InMemoryAuthzStore::new())
}
