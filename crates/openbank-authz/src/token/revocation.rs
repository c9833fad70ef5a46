//! Grant revocation.
//!
//! Implements the three explicit revocation paths of the access token
//! lifecycle:
//!
//! - **User**: the resource owner withdraws consent for a client. All access
//!   tokens of the authorization become `UserRevoked`, the refresh token is
//!   revoked and the record is deleted.
//! - **Admin**: an administrator suspends a client. The client becomes
//!   `suspended`, every access token becomes `AdminRevoked` and every refresh
//!   token is revoked. Reinstatement bumps the client revision so nothing
//!   issued before the suspension becomes valid again.
//! - **Revision**: an administrator bumps the client revision, invalidating
//!   every outstanding grant lazily without enumerating them.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::AuditConfig;
use crate::storage::{AccessTokenRepository, AuthzInfoRepository, ClientRepository};
use crate::types::{ClientStatus, TokenStatus};

/// Service for user and administrator initiated revocation.
pub struct RevocationService {
    clients: Arc<dyn ClientRepository>,
    authz_infos: Arc<dyn AuthzInfoRepository>,
    access_tokens: Arc<dyn AccessTokenRepository>,
    audit: AuditConfig,
}

impl RevocationService {
    /// Creates a new revocation service.
    pub fn new(
        clients: Arc<dyn ClientRepository>,
        authz_infos: Arc<dyn AuthzInfoRepository>,
        access_tokens: Arc<dyn AccessTokenRepository>,
    ) -> Self {
        Self {
            clients,
            authz_infos,
            access_tokens,
            audit: AuditConfig::default(),
        }
    }

    /// Replaces the audit configuration.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditConfig) -> Self {
        self.audit = audit;
        self
    }

    /// Revokes the consent `user_id` gave to `client_id`.
    ///
    /// # Returns
    ///
    /// `true` if a grant existed and was revoked, `false` if there was
    /// nothing to revoke.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails. Tokens revoked before
    /// the failure stay revoked.
    pub async fn revoke_consent(&self, client_id: &str, user_id: &str) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();

        let Some(info) = self
            .authz_infos
            .find_by_client_and_user(client_id, user_id)
            .await?
        else {
            return Ok(false);
        };

        let revoked = self
            .access_tokens
            .revoke_by_authorization(info.id, TokenStatus::UserRevoked, now)
            .await?;

        // Revoke first so a failed delete still leaves the refresh token dead
        self.authz_infos.revoke_grant(info.id, now).await?;
        self.authz_infos.delete(info.id).await?;

        if self.audit.log_token_operations {
            tracing::info!(
                client_id = %client_id,
                authorization_id = %info.id,
                revoked_access_tokens = revoked,
                "Consent revoked by user"
            );
        }

        Ok(true)
    }

    /// Suspends a client and revokes everything issued to it.
    ///
    /// # Returns
    ///
    /// The number of access tokens revoked.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the client does not exist, or an
    /// error if a storage operation fails.
    pub async fn suspend_client(&self, client_id: &str) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();

        // Block new grants before touching existing ones
        self.clients
            .set_status(client_id, ClientStatus::Suspended)
            .await?;

        let revoked = self
            .access_tokens
            .revoke_by_client(client_id, TokenStatus::AdminRevoked, now)
            .await?;

        let infos = self.authz_infos.list_by_client(client_id).await?;
        let authorizations = infos.len();
        for info in infos {
            self.authz_infos.revoke_grant(info.id, now).await?;
        }

        if self.audit.log_token_operations {
            tracing::warn!(
                client_id = %client_id,
                revoked_access_tokens = revoked,
                authorizations,
                "Client suspended"
            );
        }

        Ok(revoked)
    }

    /// Reinstates a suspended client under a new revision.
    ///
    /// # Returns
    ///
    /// The new client revision.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the client does not exist, or an
    /// error if a storage operation fails.
    pub async fn reinstate_client(&self, client_id: &str) -> AuthResult<u64> {
        // Bump first so the client is never published at the old revision
        let revision = self.clients.increment_revision(client_id).await?;
        self.clients
            .set_status(client_id, ClientStatus::Published)
            .await?;

        if self.audit.log_token_operations {
            tracing::info!(client_id = %client_id, revision, "Client reinstated");
        }

        Ok(revision)
    }

    /// Invalidates every outstanding grant of a client by bumping its
    /// revision. Status is left unchanged.
    ///
    /// # Returns
    ///
    /// The new client revision.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the client does not exist, or an
    /// error if a storage operation fails.
    pub async fn invalidate_client_grants(&self, client_id: &str) -> AuthResult<u64> {
        let revision = self.clients.increment_revision(client_id).await?;

        if self.audit.log_token_operations {
            tracing::info!(client_id = %client_id, revision, "Client grants invalidated");
        }

        Ok(revision)
    }
}
