//! Recognized scope identifiers.
//!
//! The catalog is a fixed, ordered set of scope strings: OpenID Connect core
//! scopes, the FAPI read/write profile scopes and the Open Banking API
//! scopes. Order gives each entry a stable position for display and
//! discovery documents but never implies precedence.

use std::collections::BTreeSet;

use indexmap::IndexSet;

/// OpenID Connect core scopes.
pub const OIDC_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "address",
    "phone",
    "offline_access",
];

/// FAPI read/write profile scopes.
pub const FAPI_SCOPES: &[&str] = &["read", "write"];

/// Open Banking API scopes.
pub const OPEN_BANKING_SCOPES: &[&str] = &["accounts", "payments", "fundsconfirmations"];

/// Immutable set of scope identifiers recognized by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeCatalog {
    scopes: IndexSet<String>,
}

impl ScopeCatalog {
    /// Builds a catalog from an explicit list. Duplicates collapse onto the
    /// first occurrence.
    #[must_use]
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if `scope` is a member of the catalog.
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Returns `true` iff every requested scope is a member of the catalog.
    ///
    /// An empty request is supported. A request with more entries than the
    /// catalog is rejected without looking at its contents, and a single
    /// unknown entry rejects the whole request.
    #[must_use]
    pub fn supports<S: AsRef<str>>(&self, requested: &[S]) -> bool {
        if requested.len() > self.scopes.len() {
            return false;
        }
        requested.iter().all(|scope| self.contains(scope.as_ref()))
    }

    /// Number of scopes in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns `true` if the catalog has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Iterates the catalog in its stable order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }
}

impl Default for ScopeCatalog {
    fn default() -> Self {
        Self::new(
            OIDC_SCOPES
                .iter()
                .chain(FAPI_SCOPES)
                .chain(OPEN_BANKING_SCOPES)
                .copied(),
        )
    }
}

/// Splits a space-delimited `scope` parameter into its entries.
#[must_use]
pub fn parse_scope(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Joins a scope set into the space-delimited wire form.
#[must_use]
pub fn format_scope(scope: &BTreeSet<String>) -> String {
    scope.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}
