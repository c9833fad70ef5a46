//! Token service.
//!
//! Exchanges authorization codes and refresh tokens for opaque bearer access
//! tokens, and validates access tokens presented to resource servers.
//!
//! # Token Storage
//!
//! - Access tokens: SHA-256 hash in the [`AccessTokenRepository`]
//! - Refresh tokens: SHA-256 hash on the owning [`AuthorizationInfo`]
//!
//! Plaintext tokens are returned to the client once and never stored or
//! logged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::AuthResult;
use crate::config::{AuditConfig, TokenConfig};
use crate::error::AuthError;
use crate::oauth::validator::reduce_endpoint;
use crate::scope::{format_scope, parse_scope};
use crate::storage::{AccessTokenRepository, AuthzInfoRepository, ClientRepository};
use crate::token::validation::TokenValidationError;
use crate::types::{
    AccessTokenInfo, AuthorizationInfo, ClientInfo, generate_token, hash_token,
};

/// Token endpoint request for the `authorization_code` grant.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeExchangeRequest {
    /// Authenticated client.
    pub client_id: String,

    /// The authorization code.
    pub code: String,

    /// Redirect URI used in the authorization request.
    pub redirect_uri: String,
}

/// Token endpoint request for the `refresh_token` grant.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    /// Authenticated client.
    pub client_id: String,

    /// The refresh token.
    pub refresh_token: String,

    /// Optional narrower scope, space-delimited.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Successful token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    /// Opaque access token.
    pub access_token: String,

    /// Always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// New refresh token. Omitted on refresh without rotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scopes (space-separated).
    pub scope: String,
}

/// Counts from a storage hygiene sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired access tokens removed.
    pub expired_access_tokens: u64,

    /// Expired authorization codes cleared.
    pub expired_codes: u64,
}

/// Token service for code exchange, refresh and access token validation.
pub struct TokenService {
    clients: Arc<dyn ClientRepository>,
    authz_infos: Arc<dyn AuthzInfoRepository>,
    access_tokens: Arc<dyn AccessTokenRepository>,
    config: TokenConfig,
    audit: AuditConfig,
}

impl TokenService {
    /// Creates a new token service with default configuration.
    pub fn new(
        clients: Arc<dyn ClientRepository>,
        authz_infos: Arc<dyn AuthzInfoRepository>,
        access_tokens: Arc<dyn AccessTokenRepository>,
    ) -> Self {
        Self {
            clients,
            authz_infos,
            access_tokens,
            config: TokenConfig::default(),
            audit: AuditConfig::default(),
        }
    }

    /// Replaces the token configuration.
    #[must_use]
    pub fn with_config(mut self, config: TokenConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the audit configuration.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditConfig) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the token configuration.
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// - `InvalidClient` if the client is unknown or suspended
    /// - `InvalidGrant` if the code is unknown, issued to another client,
    ///   expired, issued under a stale revision, already redeemed, or the
    ///   redirect URI does not match
    /// - `Configuration` if a token lifetime overflows the date range
    /// - Storage errors are propagated
    pub async fn exchange_code(&self, request: &CodeExchangeRequest) -> AuthResult<TokenResponse> {
        self.exchange_code_at(request, OffsetDateTime::now_utc())
            .await
    }

    /// Same as [`exchange_code`](Self::exchange_code) at an explicit instant.
    ///
    /// # Errors
    ///
    /// See [`exchange_code`](Self::exchange_code).
    pub async fn exchange_code_at(
        &self,
        request: &CodeExchangeRequest,
        now: OffsetDateTime,
    ) -> AuthResult<TokenResponse> {
        // 1. Client must be active
        let client = self.load_active_client(&request.client_id).await?;

        // 2. Find the record holding the code
        let info = self
            .authz_infos
            .find_by_code(&request.code)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid authorization code"))?;

        // 3. Code must belong to this client
        if info.client_id != client.client_id {
            return Err(AuthError::invalid_grant("Invalid authorization code"));
        }

        // 4. Expired codes are treated as absent and purged
        if !info.is_code_unexpired(now) {
            self.authz_infos
                .clear_code(info.id, &request.code, now)
                .await?;
            return Err(AuthError::invalid_grant("Authorization code expired"));
        }

        // 5. Redirect endpoint must match the authorization request
        let redirect_matches = Url::parse(&request.redirect_uri)
            .map(|url| reduce_endpoint(&url) == info.redirect_uri)
            .unwrap_or(false);
        if !redirect_matches {
            return Err(AuthError::invalid_grant(
                "Redirect URI does not match authorization request",
            ));
        }

        // 6. Grant must be current
        if !info.is_revision_current(client.authz_revision) {
            return Err(AuthError::invalid_grant(
                "Authorization was issued under a previous client revision",
            ));
        }

        // 7. Redeem atomically; exactly one concurrent caller wins
        let refresh_expiration = expiry(now, self.config.refresh_token_ttl())?;
        expiry(now, self.config.access_token_ttl())?;

        let access_token = generate_token();
        let mut token_info = AccessTokenInfo::issue(
            hash_token(&access_token),
            &info,
            now,
            self.config.access_token_ttl(),
        );
        token_info.scope = info.code_scope_or_grant().clone();
        let refresh_token = generate_token();

        let redeemed = self
            .authz_infos
            .redeem_code(
                info.id,
                &request.code,
                &token_info,
                &hash_token(&refresh_token),
                refresh_expiration,
                now,
            )
            .await?;

        if !redeemed {
            tracing::warn!(
                client_id = %client.client_id,
                authorization_id = %info.id,
                "Authorization code already redeemed"
            );
            return Err(AuthError::invalid_grant("Invalid authorization code"));
        }

        if self.audit.log_token_operations {
            tracing::info!(
                client_id = %client.client_id,
                authorization_id = %info.id,
                "Authorization code exchanged"
            );
        }

        Ok(self.response(access_token, Some(refresh_token), &token_info))
    }

    /// Issues a new access token from a refresh token.
    ///
    /// With rotation enabled the presented refresh token is replaced and a
    /// new one returned.
    ///
    /// # Errors
    ///
    /// - `InvalidClient` if the client is unknown or suspended
    /// - `InvalidGrant` if the refresh token is unknown, issued to another
    ///   client, revoked, expired, or its grant is stale
    /// - `InvalidScope` if the requested scope is not a subset of the grant
    /// - `Configuration` if a token lifetime overflows the date range
    pub async fn refresh(&self, request: &RefreshRequest) -> AuthResult<TokenResponse> {
        self.refresh_at(request, OffsetDateTime::now_utc()).await
    }

    /// Same as [`refresh`](Self::refresh) at an explicit instant.
    ///
    /// # Errors
    ///
    /// See [`refresh`](Self::refresh).
    pub async fn refresh_at(
        &self,
        request: &RefreshRequest,
        now: OffsetDateTime,
    ) -> AuthResult<TokenResponse> {
        // 1. Client must be active
        let client = self.load_active_client(&request.client_id).await?;

        // 2. Hash and look up the token
        let token_hash = hash_token(&request.refresh_token);
        let info = self
            .authz_infos
            .find_by_refresh_token_hash(&token_hash)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid refresh token"))?;

        // 3. Validate the token and its grant
        self.validate_refresh_grant(&info, &client, now)?;

        // 4. Scope may be narrowed, never expanded
        expiry(now, self.config.access_token_ttl())?;
        let mut token_info = AccessTokenInfo::issue(
            String::new(),
            &info,
            now,
            self.config.access_token_ttl(),
        );
        if let Some(requested) = request.scope.as_deref() {
            let requested = parse_scope(requested);
            if let Some(extra) = requested.iter().find(|s| !info.scope.contains(*s)) {
                return Err(AuthError::invalid_scope(format!(
                    "Scope '{extra}' exceeds the original grant"
                )));
            }
            if !requested.is_empty() {
                token_info.scope = requested.into_iter().collect();
            }
        }

        // 5. Rotate before handing out anything new; only the presented
        //    token may be swapped out, so a lost race fails here
        let new_refresh_token = if self.config.refresh_token_rotation {
            let expiration = expiry(now, self.config.refresh_token_ttl())?;
            let value = generate_token();
            let rotated = self
                .authz_infos
                .rotate_refresh_token(info.id, &token_hash, &hash_token(&value), expiration, now)
                .await?;
            if !rotated {
                tracing::warn!(
                    client_id = %client.client_id,
                    authorization_id = %info.id,
                    "Refresh token changed while refreshing"
                );
                return Err(AuthError::invalid_grant("Invalid refresh token"));
            }
            Some(value)
        } else {
            None
        };

        // 6. Store the access token
        let access_token = generate_token();
        token_info.token_hash = hash_token(&access_token);
        self.access_tokens.insert(&token_info).await?;

        if self.audit.log_token_operations {
            tracing::info!(
                client_id = %client.client_id,
                authorization_id = %info.id,
                rotated = new_refresh_token.is_some(),
                "Access token refreshed"
            );
        }

        Ok(self.response(access_token, new_refresh_token, &token_info))
    }

    /// Validates an access token for a request needing `required_scope`.
    ///
    /// Checks, in order: the token exists, has not expired, has not been
    /// revoked, its authorization still exists, the client is active, the
    /// grant matches the client's current revision, and the token carries
    /// every required scope.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`TokenValidationError`].
    pub async fn validate_access_token<S: AsRef<str> + Sync>(
        &self,
        token: &str,
        required_scope: &[S],
    ) -> Result<AccessTokenInfo, TokenValidationError> {
        self.validate_access_token_at(token, required_scope, OffsetDateTime::now_utc())
            .await
    }

    /// Same as [`validate_access_token`](Self::validate_access_token) at an
    /// explicit instant.
    ///
    /// # Errors
    ///
    /// See [`validate_access_token`](Self::validate_access_token).
    pub async fn validate_access_token_at<S: AsRef<str> + Sync>(
        &self,
        token: &str,
        required_scope: &[S],
        now: OffsetDateTime,
    ) -> Result<AccessTokenInfo, TokenValidationError> {
        let token_info = self
            .access_tokens
            .find_by_token_hash(&hash_token(token))
            .await?
            .ok_or(TokenValidationError::NotFound)?;

        if token_info.is_expired(now) {
            return Err(TokenValidationError::Expired);
        }

        if token_info.is_revoked() {
            return Err(TokenValidationError::Revoked(token_info.status));
        }

        let info = self
            .authz_infos
            .find_by_id(token_info.authorization_id)
            .await?
            .ok_or(TokenValidationError::AuthorizationMissing)?;

        let client = self
            .clients
            .get_client_info_by_id(&token_info.client_id)
            .await?
            .filter(ClientInfo::is_active)
            .ok_or(TokenValidationError::ClientInactive)?;

        if !token_info.is_revision_current(&info, client.authz_revision) {
            tracing::debug!(
                client_id = %client.client_id,
                authorization_id = %info.id,
                token_revision = token_info.authz_revision,
                client_revision = client.authz_revision,
                "Access token revision is stale"
            );
            return Err(TokenValidationError::RevisionMismatch);
        }

        if !token_info.has_scopes(required_scope) {
            return Err(TokenValidationError::InsufficientScope);
        }

        Ok(token_info)
    }

    /// Drops expired access tokens and clears expired authorization codes.
    ///
    /// Not required for correctness; expired entries are already rejected
    /// on read.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub async fn sweep_expired(&self) -> AuthResult<SweepReport> {
        self.sweep_expired_at(OffsetDateTime::now_utc()).await
    }

    /// Same as [`sweep_expired`](Self::sweep_expired) at an explicit instant.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub async fn sweep_expired_at(&self, now: OffsetDateTime) -> AuthResult<SweepReport> {
        let report = SweepReport {
            expired_access_tokens: self.access_tokens.cleanup_expired(now).await?,
            expired_codes: self.authz_infos.purge_expired_codes(now).await?,
        };

        tracing::debug!(
            expired_access_tokens = report.expired_access_tokens,
            expired_codes = report.expired_codes,
            "Expired token sweep completed"
        );

        Ok(report)
    }

    async fn load_active_client(&self, client_id: &str) -> AuthResult<ClientInfo> {
        match self.clients.get_client_info_by_id(client_id).await? {
            Some(client) if client.is_active() => Ok(client),
            Some(_) => Err(AuthError::invalid_client("Client is suspended")),
            None => Err(AuthError::invalid_client("Unknown client")),
        }
    }

    fn validate_refresh_grant(
        &self,
        info: &AuthorizationInfo,
        client: &ClientInfo,
        now: OffsetDateTime,
    ) -> AuthResult<()> {
        if info.client_id != client.client_id {
            return Err(AuthError::invalid_grant("Invalid refresh token"));
        }

        if !info.is_refresh_token_valid(now) {
            return Err(AuthError::invalid_grant(
                "Refresh token has been revoked or has expired",
            ));
        }

        if !info.is_revision_current(client.authz_revision) {
            return Err(AuthError::invalid_grant(
                "Authorization was issued under a previous client revision",
            ));
        }

        Ok(())
    }

    fn response(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        token_info: &AccessTokenInfo,
    ) -> TokenResponse {
        TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: u64::try_from(token_info.expires_in).unwrap_or_default(),
            refresh_token,
            scope: format_scope(&token_info.scope),
        }
    }
}

fn expiry(now: OffsetDateTime, ttl: Duration) -> AuthResult<OffsetDateTime> {
    now.checked_add(ttl).ok_or_else(|| {
        AuthError::configuration(format!("Token lifetime of {ttl} is out of range"))
    })
}
