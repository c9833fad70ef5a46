//! Authorization request validation.
//!
//! Validation is a single pure pass over an [`AuthorizationRequest`], the
//! client's registered redirect endpoints and the [`ScopeCatalog`]. The
//! first failing check wins:
//!
//! 1. `client_id`, `redirect_uri` and `state` are non-empty
//! 2. `redirect_uri` is an absolute URL without a fragment
//! 3. `response_type` is non-empty and supported
//! 4. the redirect endpoint matches a registered endpoint
//! 5. every requested scope is in the catalog
//!
//! Endpoints are compared after reduction to `scheme://host[:port]/path`,
//! so a request may add query parameters to a registered endpoint but may
//! not change its scheme, host, port or path.

use std::collections::BTreeSet;

use url::Url;

use crate::oauth::authorize::{
    AuthorizationError, AuthorizationErrorCode, AuthorizationRequest, ResponseType,
};
use crate::scope::ScopeCatalog;

/// An authorization request that passed every validation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Requesting client.
    pub client_id: String,

    /// Supported response type.
    pub response_type: ResponseType,

    /// Redirect URI exactly as requested, query included.
    pub redirect_uri: Url,

    /// Reduced form of `redirect_uri`, equal to a registered endpoint.
    pub redirect_endpoint: String,

    /// Requested scopes, all members of the catalog.
    pub scope: BTreeSet<String>,

    /// Echoed state parameter.
    pub state: String,
}

/// Reduces a URL to `scheme://host[:port]/path`, dropping user info, query
/// and fragment.
///
/// Default ports are omitted, so `https://a.example:443/cb` and
/// `https://a.example/cb` reduce to the same endpoint.
#[must_use]
pub fn reduce_endpoint(url: &Url) -> String {
    let mut endpoint = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        endpoint.push(':');
        endpoint.push_str(&port.to_string());
    }
    endpoint.push_str(url.path());
    endpoint
}

/// Returns `true` if `endpoint` equals the reduced form of one of the
/// registered redirect URIs. Registered URIs that fail to parse never match.
#[must_use]
pub fn is_registered_endpoint<S: AsRef<str>>(endpoint: &str, registered: &[S]) -> bool {
    registered
        .iter()
        .filter_map(|uri| Url::parse(uri.as_ref()).ok())
        .any(|uri| reduce_endpoint(&uri) == endpoint)
}

/// Runs the checks that need no client metadata (steps 1 and 2).
///
/// Returns the parsed redirect URI. Errors never carry a redirect target.
///
/// # Errors
///
/// Returns `invalid_request` if a required parameter is empty, or if
/// `redirect_uri` is not an absolute URL or contains a fragment.
pub fn check_request_parameters(request: &AuthorizationRequest) -> Result<Url, AuthorizationError> {
    let state = request.state.as_str();

    for (name, value) in [
        ("client_id", &request.client_id),
        ("redirect_uri", &request.redirect_uri),
        ("state", &request.state),
    ] {
        if value.is_empty() {
            return Err(AuthorizationError::invalid_request(
                format!("Missing required parameter: {name}"),
                state,
            ));
        }
    }

    let redirect_uri = Url::parse(&request.redirect_uri).map_err(|_| {
        AuthorizationError::invalid_request("redirect_uri must be an absolute URL", state)
    })?;

    if redirect_uri.fragment().is_some() {
        return Err(AuthorizationError::invalid_request(
            "redirect_uri must not contain a fragment",
            state,
        ));
    }

    Ok(redirect_uri)
}

/// Validates an authorization request against the client's registered
/// redirect endpoints and the scope catalog.
///
/// Has no side effects. Errors from the response type and scope checks carry
/// the request's redirect URI when its endpoint is registered; the others
/// never do.
///
/// # Errors
///
/// Returns the first failing check as an [`AuthorizationError`] tagged with
/// the request's `state`.
pub fn validate_authorization_request<S: AsRef<str>>(
    request: &AuthorizationRequest,
    registered_redirect_uris: &[S],
    catalog: &ScopeCatalog,
) -> Result<ValidatedRequest, AuthorizationError> {
    let state = request.state.as_str();
    let redirect_uri = check_request_parameters(request)?;
    let redirect_endpoint = reduce_endpoint(&redirect_uri);
    let endpoint_registered = is_registered_endpoint(&redirect_endpoint, registered_redirect_uris);

    // Step 3: response type. Redirect only once the endpoint is known good.
    let response_type = match check_response_type(&request.response_type, state) {
        Ok(response_type) => response_type,
        Err(err) if endpoint_registered => return Err(err.with_redirect(redirect_uri)),
        Err(err) => return Err(err),
    };

    // Step 4: redirect endpoint
    if !endpoint_registered {
        return Err(AuthorizationError::invalid_request(
            "redirect_uri does not match a registered endpoint",
            state,
        ));
    }

    // Step 5: scope
    if !catalog.supports(&request.scope) {
        return Err(AuthorizationError::with_description(
            AuthorizationErrorCode::InvalidScope,
            "Requested scope is not supported",
            state,
        )
        .with_redirect(redirect_uri));
    }

    Ok(ValidatedRequest {
        client_id: request.client_id.clone(),
        response_type,
        redirect_uri,
        redirect_endpoint,
        scope: request.scope_set(),
        state: request.state.clone(),
    })
}

fn check_response_type(value: &str, state: &str) -> Result<ResponseType, AuthorizationError> {
    if value.is_empty() {
        return Err(AuthorizationError::invalid_request(
            "Missing required parameter: response_type",
            state,
        ));
    }
    ResponseType::from_param(value).ok_or_else(|| {
        AuthorizationError::with_description(
            AuthorizationErrorCode::UnsupportedResponseType,
            format!("Unsupported response_type: {value}"),
            state,
        )
    })
}
