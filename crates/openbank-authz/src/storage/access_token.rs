//! Access token storage trait.
//!
//! Access tokens live in a fast key-value store, keyed by the SHA-256 hash
//! of the token value and indexed by owning authorization.
//!
//! # Implementation Notes
//!
//! - Revocation must never move a token back to `Active`
//! - Expired entries may be dropped at any time; they are already invalid

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{AccessTokenInfo, TokenStatus};

/// Storage trait for access tokens.
#[async_trait]
pub trait AccessTokenRepository: Send + Sync {
    /// Stores a token.
    ///
    /// # Errors
    ///
    /// Returns an error if a token with the same hash exists or the storage
    /// operation fails.
    async fn insert(&self, token: &AccessTokenInfo) -> AuthResult<()>;

    /// Finds a token by the hash of its value.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_token_hash(&self, token_hash: &str) -> AuthResult<Option<AccessTokenInfo>>;

    /// Lists all tokens issued under an authorization.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_by_authorization(&self, authorization_id: Uuid)
    -> AuthResult<Vec<AccessTokenInfo>>;

    /// Revokes every active token issued under an authorization.
    ///
    /// # Returns
    ///
    /// The number of tokens that changed status.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_by_authorization(
        &self,
        authorization_id: Uuid,
        status: TokenStatus,
        now: OffsetDateTime,
    ) -> AuthResult<u64>;

    /// Revokes every active token issued to a client.
    ///
    /// # Returns
    ///
    /// The number of tokens that changed status.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_by_client(
        &self,
        client_id: &str,
        status: TokenStatus,
        now: OffsetDateTime,
    ) -> AuthResult<u64>;

    /// Drops every token that expired at or before `now`.
    ///
    /// # Returns
    ///
    /// The number of tokens removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
