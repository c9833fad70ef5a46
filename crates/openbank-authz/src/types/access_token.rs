//! Ephemeral access token record.
//!
//! Access tokens are opaque random strings. Only their SHA-256 hash is
//! persisted, in the fast key-value store, together with a link to the
//! owning [`AuthorizationInfo`].
//!
//! # State machine
//!
//! ```text
//! Issued -> Active -> { Expired | UserRevoked | AdminRevoked | RevisionInvalid }
//! ```
//!
//! Revocation is persisted in [`AccessTokenInfo::status`]. Expiry and
//! revision staleness are derived at read time, so a terminal token can never
//! become active again.

use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::types::authorization_info::AuthorizationInfo;
use crate::types::client::ClientInfo;

/// Persisted revocation status of an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Not revoked.
    Active,
    /// Revoked because the resource owner withdrew consent.
    UserRevoked,
    /// Revoked because an administrator suspended the client.
    AdminRevoked,
}

/// Lifecycle state of an access token at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTokenState {
    /// Created but not yet linked to a redeemed code.
    Issued,
    /// Usable.
    Active,
    /// Past `issued_date + expires_in`.
    Expired,
    /// Revoked by the resource owner.
    UserRevoked,
    /// Revoked by an administrator.
    AdminRevoked,
    /// The owning grant is missing or belongs to a stale client revision.
    RevisionInvalid,
}

impl AccessTokenState {
    /// Returns `true` for states a token can never leave.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Issued | Self::Active)
    }
}

/// Access token record stored in the key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenInfo {
    /// SHA-256 hash of the token value.
    pub token_hash: String,

    /// Owning authorization record.
    pub authorization_id: Uuid,

    /// Client the token was issued to.
    pub client_id: String,

    /// Scopes carried by the token.
    pub scope: BTreeSet<String>,

    /// Issuance instant.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_date: OffsetDateTime,

    /// Lifetime in seconds.
    pub expires_in: i64,

    /// Client revision at issuance.
    pub authz_revision: u64,

    /// Revocation status.
    pub status: TokenStatus,

    /// When the token was revoked.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,
}

impl AccessTokenInfo {
    /// Creates an active token record for `authorization`.
    #[must_use]
    pub fn issue(
        token_hash: String,
        authorization: &AuthorizationInfo,
        issued_date: OffsetDateTime,
        lifetime: Duration,
    ) -> Self {
        Self {
            token_hash,
            authorization_id: authorization.id,
            client_id: authorization.client_id.clone(),
            scope: authorization.scope.clone(),
            issued_date,
            expires_in: lifetime.whole_seconds(),
            authz_revision: authorization.authz_revision,
            status: TokenStatus::Active,
            revoked_at: None,
        }
    }

    /// Absolute expiry instant, saturating at the last representable date.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.issued_date
            .checked_add(Duration::seconds(self.expires_in))
            .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
    }

    /// Returns `true` once `now` reaches the expiry instant.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at()
    }

    /// Returns `true` if the token has been revoked by any path.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.status != TokenStatus::Active
    }

    /// Revokes an active token. A token that is already revoked keeps its
    /// original status. Returns `true` if the status changed.
    pub fn revoke(&mut self, status: TokenStatus, now: OffsetDateTime) -> bool {
        if self.is_revoked() || status == TokenStatus::Active {
            return false;
        }
        self.status = status;
        self.revoked_at = Some(now);
        true
    }

    /// Returns `true` if every scope in `required` is carried by the token.
    #[must_use]
    pub fn has_scopes<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|s| self.scope.contains(s.as_ref()))
    }

    /// Computes the lifecycle state at `now`.
    ///
    /// `authorization` is the owning record if it still exists.
    #[must_use]
    pub fn state_at(
        &self,
        now: OffsetDateTime,
        authorization: Option<&AuthorizationInfo>,
        client: &ClientInfo,
    ) -> AccessTokenState {
        if self.is_expired(now) {
            return AccessTokenState::Expired;
        }
        match self.status {
            TokenStatus::UserRevoked => return AccessTokenState::UserRevoked,
            TokenStatus::AdminRevoked => return AccessTokenState::AdminRevoked,
            TokenStatus::Active => {}
        }
        match authorization {
            Some(info) if self.is_revision_current(info, client.authz_revision) => {
                AccessTokenState::Active
            }
            _ => AccessTokenState::RevisionInvalid,
        }
    }

    /// Returns `true` if both the owning record and the token's issuance
    /// snapshot match the client's current revision.
    #[must_use]
    pub fn is_revision_current(&self, authorization: &AuthorizationInfo, client_revision: u64) -> bool {
        authorization.is_revision_current(client_revision) && self.authz_revision == client_revision
    }
}

/// Generates a cryptographically secure opaque token.
///
/// 256 bits of randomness, base64url encoded without padding (43 characters).
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hashes a token value with SHA-256 for storage and lookup.
#[must_use]
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
