//! Authorization endpoint types.
//!
//! This module provides the request, response and error values exchanged
//! at the OAuth 2.0 authorization endpoint.
//!
//! A request arrives as query parameters, is validated against the client
//! registration, and ends in a redirect carrying either `code` and `state`
//! or `error` and `state`.
//!
//! Redirect URLs are always built as new values. A caller's [`Url`] is never
//! mutated in place.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::scope::parse_scope;

/// Raw parameters of an authorization endpoint call.
///
/// The value is immutable once parsed and validated by a single pure
/// function, [`crate::oauth::validate_authorization_request`].
///
/// # Example
///
/// ```ignore
/// GET /authorize?
///   response_type=code
///   &client_id=tpp-1
///   &redirect_uri=https://tpp.example.com/callback
///   &scope=openid accounts
///   &state=af0ifjsldkj
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthorizationRequest {
    /// `code` or `code id_token`.
    #[serde(default)]
    pub response_type: String,

    /// Registered client (TPP) identifier.
    #[serde(default)]
    pub client_id: String,

    /// Where the outcome is sent; must reduce to a registered endpoint.
    #[serde(default)]
    pub redirect_uri: String,

    /// Requested scopes, space-delimited on the wire.
    #[serde(default, deserialize_with = "deserialize_scope")]
    pub scope: Vec<String>,

    /// Opaque value echoed back to the client.
    #[serde(default)]
    pub state: String,
}

impl AuthorizationRequest {
    /// Requested scopes as a set.
    #[must_use]
    pub fn scope_set(&self) -> BTreeSet<String> {
        self.scope.iter().cloned().collect()
    }
}

fn deserialize_scope<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(parse_scope).unwrap_or_default())
}

/// Recognized `response_type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseType {
    /// Plain authorization code flow.
    #[serde(rename = "code")]
    Code,
    /// Hybrid flow returning a code and an ID token.
    #[serde(rename = "code id_token")]
    CodeIdToken,
}

impl ResponseType {
    /// Parses a `response_type` parameter. Returns `None` for anything
    /// other than an exact supported value.
    #[must_use]
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "code" => Some(Self::Code),
            "code id_token" => Some(Self::CodeIdToken),
            _ => None,
        }
    }

    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::CodeIdToken => "code id_token",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `code` and `state` sent back to the client on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationResponse {
    /// Authorization code to exchange for tokens.
    pub code: String,

    /// Echoed state parameter.
    pub state: String,
}

impl AuthorizationResponse {
    #[must_use]
    pub fn new(code: String, state: String) -> Self {
        Self { code, state }
    }

    /// Builds the redirect URL with `code` and `state` appended.
    ///
    /// Existing query parameters of `redirect_uri` are preserved.
    #[must_use]
    pub fn to_redirect_url(&self, redirect_uri: &Url) -> Url {
        let mut url = redirect_uri.clone();
        url.query_pairs_mut()
            .append_pair("code", &self.code)
            .append_pair("state", &self.state);
        url
    }
}

/// Failure reported by the authorization endpoint.
///
/// Always carries the request's `state`. `redirect_uri` is set only once the
/// request's redirect endpoint has been matched against the client's
/// registration; without it the error must be shown to the user instead of
/// being redirected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{error}")]
pub struct AuthorizationError {
    pub error: AuthorizationErrorCode,

    /// Optional text for the client developer. Never set for `server_error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Echoed state parameter.
    pub state: String,

    /// Verified redirect target, if any.
    #[serde(skip)]
    pub redirect_uri: Option<Url>,
}

impl AuthorizationError {
    #[must_use]
    pub fn new(error: AuthorizationErrorCode, state: impl Into<String>) -> Self {
        Self {
            error,
            error_description: None,
            state: state.into(),
            redirect_uri: None,
        }
    }

    #[must_use]
    pub fn with_description(
        error: AuthorizationErrorCode,
        description: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            state: state.into(),
            redirect_uri: None,
        }
    }

    /// Shorthand for `invalid_request` with a description.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>, state: impl Into<String>) -> Self {
        Self::with_description(AuthorizationErrorCode::InvalidRequest, description, state)
    }

    /// `server_error` without a description. Infrastructure details are
    /// never sent to the client.
    #[must_use]
    pub fn server_error(state: impl Into<String>) -> Self {
        Self::new(AuthorizationErrorCode::ServerError, state)
    }

    /// Attaches a verified redirect target.
    #[must_use]
    pub fn with_redirect(mut self, redirect_uri: Url) -> Self {
        self.redirect_uri = Some(redirect_uri);
        self
    }

    /// Builds the error redirect URL with `error`, `error_description` and
    /// `state` appended to `redirect_uri`.
    #[must_use]
    pub fn to_redirect_url(&self, redirect_uri: &Url) -> Url {
        let mut url = redirect_uri.clone();
        let mut query = url.query_pairs_mut();
        query.append_pair("error", self.error.as_str());
        if let Some(description) = self.error_description.as_deref() {
            query.append_pair("error_description", description);
        }
        query.append_pair("state", &self.state);
        drop(query);
        url
    }

    /// Returns the error redirect URL if a verified redirect target is known.
    #[must_use]
    pub fn redirect_url(&self) -> Option<Url> {
        self.redirect_uri
            .as_ref()
            .map(|uri| self.to_redirect_url(uri))
    }
}

/// OAuth 2.0 authorization error codes (RFC 6749 §4.1.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationErrorCode {
    /// The request is missing a required parameter, includes an invalid
    /// parameter value, or is otherwise malformed.
    InvalidRequest,

    /// The client is not authorized to request an authorization code.
    UnauthorizedClient,

    /// The resource owner or authorization server denied the request.
    AccessDenied,

    /// The authorization server does not support this response type.
    UnsupportedResponseType,

    /// The requested scope is invalid, unknown, or malformed.
    InvalidScope,

    /// The authorization server encountered an unexpected condition.
    ServerError,

    /// The authorization server is temporarily unable to handle the request.
    TemporarilyUnavailable,
}

impl AuthorizationErrorCode {
    /// Returns the error code as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }
}

impl fmt::Display for AuthorizationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
