//! OAuth authorization service.
//!
//! This module provides the service behind the authorization endpoint. It
//! validates requests, decides whether the user must be prompted for
//! consent, and issues authorization codes.
//!
//! # Usage
//!
//! ```ignore
//! use openbank_authz::oauth::{AuthorizationOutcome, AuthorizationService};
//!
//! let service = AuthorizationService::new(clients, authz_infos);
//!
//! match service.authorize(&request, &user_id).await {
//!     Ok(AuthorizationOutcome::Issued(grant)) => redirect(grant.redirect_url),
//!     Ok(AuthorizationOutcome::ConsentRequired(prompt)) => show_consent(prompt),
//!     Err(err) => match err.redirect_url() {
//!         Some(url) => redirect(url),
//!         None => show_error(err),
//!     },
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::config::AuditConfig;
use crate::error::AuthError;
use crate::oauth::authorize::{AuthorizationError, AuthorizationErrorCode, AuthorizationRequest};
use crate::oauth::issuer::{AuthorizationGrant, AuthorizationGrantIssuer};
use crate::oauth::validator::{
    ValidatedRequest, check_request_parameters, is_registered_endpoint,
    validate_authorization_request,
};
use crate::scope::ScopeCatalog;
use crate::storage::{AuthzInfoRepository, ClientRepository};
use crate::types::{ClientInfo, consent_required};

/// Result of a successful authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// The existing grant covers the request and a code was issued.
    Issued(AuthorizationGrant),
    /// The user must approve the request first.
    ConsentRequired(ConsentPrompt),
}

/// A validated request waiting for the user's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentPrompt {
    /// The validated request.
    pub request: ValidatedRequest,

    /// Scopes the user already granted to this client.
    pub previously_granted: BTreeSet<String>,
}

impl ConsentPrompt {
    /// Requested scopes not covered by the existing grant.
    #[must_use]
    pub fn new_scopes(&self) -> BTreeSet<String> {
        self.request
            .scope
            .difference(&self.previously_granted)
            .cloned()
            .collect()
    }
}

/// Authorization service for handling OAuth 2.0 authorization requests.
pub struct AuthorizationService {
    /// Client metadata lookup.
    clients: Arc<dyn ClientRepository>,

    /// Authorization record storage.
    authz_infos: Arc<dyn AuthzInfoRepository>,

    /// Code issuance.
    issuer: AuthorizationGrantIssuer,

    /// Recognized scopes.
    catalog: ScopeCatalog,

    /// Audit switches.
    audit: AuditConfig,
}

impl AuthorizationService {
    /// Creates a new authorization service with the default scope catalog.
    pub fn new(
        clients: Arc<dyn ClientRepository>,
        authz_infos: Arc<dyn AuthzInfoRepository>,
    ) -> Self {
        Self {
            clients,
            issuer: AuthorizationGrantIssuer::new(authz_infos.clone()),
            authz_infos,
            catalog: ScopeCatalog::default(),
            audit: AuditConfig::default(),
        }
    }

    /// Replaces the scope catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: ScopeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replaces the audit configuration.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditConfig) -> Self {
        self.audit = audit;
        self
    }

    /// The scope catalog in use.
    pub fn catalog(&self) -> &ScopeCatalog {
        &self.catalog
    }

    /// Processes an authorization request for an authenticated user.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthorizationError`] if:
    /// - A required parameter is empty or `redirect_uri` is malformed
    ///   (`invalid_request`, no redirect)
    /// - The client is unknown or suspended (`unauthorized_client`, no redirect)
    /// - Any remaining validation step fails
    /// - Storage fails (`server_error`)
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
        user_id: &str,
    ) -> Result<AuthorizationOutcome, AuthorizationError> {
        self.authorize_at(request, user_id, OffsetDateTime::now_utc())
            .await
    }

    /// Same as [`authorize`](Self::authorize) at an explicit instant.
    ///
    /// # Errors
    ///
    /// See [`authorize`](Self::authorize).
    pub async fn authorize_at(
        &self,
        request: &AuthorizationRequest,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<AuthorizationOutcome, AuthorizationError> {
        // 1. Parameter checks that need no client metadata
        check_request_parameters(request).map_err(|err| self.rejected(&request.client_id, err))?;

        // 2. Client must exist and be published
        let client = self
            .load_active_client(&request.client_id, &request.state)
            .await
            .map_err(|err| self.rejected(&request.client_id, err))?;

        // 3. Full validation against registration and catalog
        let validated = validate_authorization_request(request, &client.redirect_uris, &self.catalog)
            .map_err(|err| self.rejected(&client.client_id, err))?;

        // 4. Consent decision
        let previous = self
            .authz_infos
            .find_by_client_and_user(&client.client_id, user_id)
            .await
            .map_err(|err| self.server_error(&validated, err))?;

        if consent_required(previous.as_ref(), &validated.scope) {
            tracing::debug!(client_id = %client.client_id, "Consent required");
            return Ok(AuthorizationOutcome::ConsentRequired(ConsentPrompt {
                request: validated,
                previously_granted: previous.map(|info| info.scope).unwrap_or_default(),
            }));
        }

        // 5. Existing grant covers the request; keep it as is
        let granted = previous.map(|info| info.scope).unwrap_or_default();
        let grant = self
            .issuer
            .issue(&validated, user_id, &client, granted, now)
            .await
            .map_err(|err| self.server_error(&validated, err))?;

        Ok(AuthorizationOutcome::Issued(grant))
    }

    /// Issues a code after the user approved `prompt`.
    ///
    /// The stored grant becomes the union of the previous grant and the
    /// requested scopes.
    ///
    /// # Errors
    ///
    /// Returns `unauthorized_client` if the client has since been removed or
    /// suspended, `invalid_request` if the redirect endpoint is no longer
    /// registered, `invalid_scope` if the prompt carries a scope outside the
    /// catalog, and `server_error` on storage failure.
    pub async fn grant_consent(
        &self,
        prompt: &ConsentPrompt,
        user_id: &str,
    ) -> Result<AuthorizationGrant, AuthorizationError> {
        self.grant_consent_at(prompt, user_id, OffsetDateTime::now_utc())
            .await
    }

    /// Same as [`grant_consent`](Self::grant_consent) at an explicit instant.
    ///
    /// # Errors
    ///
    /// See [`grant_consent`](Self::grant_consent).
    pub async fn grant_consent_at(
        &self,
        prompt: &ConsentPrompt,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<AuthorizationGrant, AuthorizationError> {
        let validated = &prompt.request;

        let client = self
            .load_active_client(&validated.client_id, &validated.state)
            .await
            .map_err(|err| self.rejected(&validated.client_id, err))?;

        if !is_registered_endpoint(&validated.redirect_endpoint, &client.redirect_uris) {
            return Err(self.rejected(
                &client.client_id,
                AuthorizationError::invalid_request(
                    "redirect_uri does not match a registered endpoint",
                    validated.state.as_str(),
                ),
            ));
        }

        // Stored scope must stay within the catalog whatever the prompt says
        let requested: Vec<&String> = validated.scope.iter().collect();
        if !self.catalog.supports(&requested) {
            return Err(self.rejected(
                &client.client_id,
                AuthorizationError::with_description(
                    AuthorizationErrorCode::InvalidScope,
                    "Requested scope is not supported",
                    validated.state.as_str(),
                )
                .with_redirect(validated.redirect_uri.clone()),
            ));
        }

        let previous = self
            .authz_infos
            .find_by_client_and_user(&client.client_id, user_id)
            .await
            .map_err(|err| self.server_error(validated, err))?;

        let mut granted = previous.map(|info| info.scope).unwrap_or_default();
        granted.extend(validated.scope.iter().cloned());

        let grant = self
            .issuer
            .issue(validated, user_id, &client, granted, now)
            .await
            .map_err(|err| self.server_error(validated, err))?;

        if self.audit.log_token_operations {
            tracing::info!(
                client_id = %client.client_id,
                authorization_id = %grant.authorization_id,
                scope_count = grant.scope.len(),
                "Consent granted"
            );
        }

        Ok(grant)
    }

    /// Rejects `prompt` because the user declined it.
    ///
    /// Returns the `access_denied` error to redirect to the client.
    #[must_use]
    pub fn deny_consent(&self, prompt: &ConsentPrompt) -> AuthorizationError {
        let validated = &prompt.request;
        if self.audit.log_failed_authorizations {
            tracing::info!(client_id = %validated.client_id, "Consent denied by user");
        }
        AuthorizationError::with_description(
            AuthorizationErrorCode::AccessDenied,
            "The resource owner denied the request",
            validated.state.as_str(),
        )
        .with_redirect(validated.redirect_uri.clone())
    }

    async fn load_active_client(
        &self,
        client_id: &str,
        state: &str,
    ) -> Result<ClientInfo, AuthorizationError> {
        let client = match self.clients.get_client_info_by_id(client_id).await {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(client_id = %client_id, error = %err, "Client lookup failed");
                return Err(AuthorizationError::server_error(state));
            }
        };

        match client {
            Some(client) if client.is_active() => Ok(client),
            Some(_) => Err(AuthorizationError::with_description(
                AuthorizationErrorCode::UnauthorizedClient,
                "Client is suspended",
                state,
            )),
            None => Err(AuthorizationError::with_description(
                AuthorizationErrorCode::UnauthorizedClient,
                "Unknown client",
                state,
            )),
        }
    }

    fn rejected(&self, client_id: &str, err: AuthorizationError) -> AuthorizationError {
        if self.audit.log_failed_authorizations {
            tracing::warn!(
                client_id = %client_id,
                error = %err.error,
                redirect = err.redirect_uri.is_some(),
                "Authorization request rejected"
            );
        }
        err
    }

    fn server_error(&self, validated: &ValidatedRequest, err: AuthError) -> AuthorizationError {
        tracing::error!(
            client_id = %validated.client_id,
            category = %err.category(),
            error = %err,
            "Authorization failed"
        );
        AuthorizationError::new(err.authorization_error_code(), validated.state.as_str())
            .with_redirect(validated.redirect_uri.clone())
    }
}
