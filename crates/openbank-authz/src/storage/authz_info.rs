//! Authorization record storage trait.
//!
//! This module defines the storage interface for [`AuthorizationInfo`]
//! records, the durable half of the engine's state.
//!
//! # Implementation Notes
//!
//! Implementations should:
//!
//! - Keep at most one record per (client, user) pair
//! - Support efficient lookup by pending code and by refresh token hash
//! - Make [`AuthzInfoRepository::redeem_code`] atomic (compare-and-clear)
//! - Apply `reissue_code`, `rotate_refresh_token` and `revoke_grant` to the
//!   stored record in place, never by writing back a copy read earlier
//!
//! # Security Considerations
//!
//! - Never log authorization codes or refresh token hashes
//! - A redeemed code must never be observable as pending again

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{AccessTokenInfo, AuthorizationInfo, CodeReissue};

/// Storage trait for authorization records.
///
/// Records are created when a user first grants consent to a client, updated
/// on every re-authorization and deleted when the user revokes consent.
///
/// # Implementations
///
/// Implementations are provided for:
/// - In-memory concurrent maps (in `openbank-authz-memory` crate)
#[async_trait]
pub trait AuthzInfoRepository: Send + Sync {
    /// Finds the current record for a client and user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_and_user(
        &self,
        client_id: &str,
        user_id: &str,
    ) -> AuthResult<Option<AuthorizationInfo>>;

    /// Finds a record by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<AuthorizationInfo>>;

    /// Finds the record holding `code` as its pending authorization code.
    ///
    /// Returns the record even if the code has expired; callers decide what
    /// to do with expired codes.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationInfo>>;

    /// Finds the record whose refresh token hashes to `token_hash`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_refresh_token_hash(
        &self,
        token_hash: &str,
    ) -> AuthResult<Option<AuthorizationInfo>>;

    /// Lists all records of a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_by_client(&self, client_id: &str) -> AuthResult<Vec<AuthorizationInfo>>;

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns an error if a record with the same id or the same
    /// (client, user) pair already exists, or if the storage operation fails.
    async fn insert(&self, info: &AuthorizationInfo) -> AuthResult<()>;

    /// Replaces an existing record.
    ///
    /// Services use the targeted operations below instead, so that
    /// concurrent redemptions and rotations are never undone.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the record does not exist, or an
    /// error if the storage operation fails.
    async fn update(&self, info: &AuthorizationInfo) -> AuthResult<()>;

    /// Deletes a record. Deleting a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, id: Uuid) -> AuthResult<()>;

    /// Atomically redeems a pending code.
    ///
    /// If the record `id` still holds `code`, this must in one step:
    /// clear the code, install `refresh_token_hash` with
    /// `refresh_token_expiration`, and persist `access_token`. If the code
    /// has already been cleared or replaced, nothing is written.
    ///
    /// Exactly one of any number of concurrent calls for the same code may
    /// return `true`.
    ///
    /// # Returns
    ///
    /// `true` if this call redeemed the code, `false` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn redeem_code(
        &self,
        id: Uuid,
        code: &str,
        access_token: &AccessTokenInfo,
        refresh_token_hash: &str,
        refresh_token_expiration: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<bool>;

    /// Issues a new code on an existing record via
    /// [`AuthorizationInfo::apply_reissue`], as one step on the stored
    /// record.
    ///
    /// # Returns
    ///
    /// The updated record, or `None` if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn reissue_code(
        &self,
        id: Uuid,
        reissue: &CodeReissue,
        now: OffsetDateTime,
    ) -> AuthResult<Option<AuthorizationInfo>>;

    /// Replaces the refresh token of record `id` if it still hashes to
    /// `current_hash` and is live. Only the refresh token fields change.
    ///
    /// Exactly one of any number of concurrent rotations of the same token
    /// may return `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current_hash: &str,
        new_hash: &str,
        expiration: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<bool>;

    /// Revokes the refresh token and clears the pending code of record `id`.
    ///
    /// # Returns
    ///
    /// `false` if the record does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_grant(&self, id: Uuid, now: OffsetDateTime) -> AuthResult<bool>;

    /// Clears the pending code of a record if it still equals `code`.
    ///
    /// Used to purge codes found expired at exchange time.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn clear_code(&self, id: Uuid, code: &str, now: OffsetDateTime) -> AuthResult<()>;

    /// Clears every pending code that expired at or before `now`.
    ///
    /// # Returns
    ///
    /// The number of codes cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn purge_expired_codes(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
