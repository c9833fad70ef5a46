//! Client metadata consumed by the engine.
//!
//! Clients are registered and administered elsewhere. The engine only reads
//! their redirect endpoints, revision and status, and flips status and
//! revision during administrative revocation.

use serde::{Deserialize, Serialize};

/// Publication status of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// The client may obtain and use grants.
    Published,
    /// The client has been suspended by an administrator.
    Suspended,
}

impl ClientStatus {
    /// Returns the wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client metadata as seen by the authorization engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Registered redirect endpoints.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Current authorization revision. Incremented when the client is
    /// reinstated; every grant issued under an older revision is stale.
    pub authz_revision: u64,

    /// Publication status.
    pub status: ClientStatus,
}

impl ClientInfo {
    /// Creates a published client at revision zero.
    #[must_use]
    pub fn new<I, S>(client_id: impl Into<String>, redirect_uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client_id: client_id.into(),
            redirect_uris: redirect_uris.into_iter().map(Into::into).collect(),
            authz_revision: 0,
            status: ClientStatus::Published,
        }
    }

    /// Returns `true` if the client may obtain and use grants.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Published
    }
}
