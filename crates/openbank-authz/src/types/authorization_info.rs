//! Durable authorization record.
//!
//! An [`AuthorizationInfo`] binds a client, a user and the scopes the user
//! consented to. It carries the pending authorization code between issuance
//! and exchange, the hash of the refresh token after exchange, and the
//! client revision the grant was made under.
//!
//! # Lifecycle
//!
//! 1. Created when the user first grants consent to the client
//! 2. Code regenerated on each new authorization (the old one is discarded)
//! 3. Code cleared atomically when exchanged for tokens
//! 4. Deleted when the user revokes consent

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Authorization record stored in the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationInfo {
    /// Primary lookup key.
    pub id: Uuid,

    /// Client the grant was made to.
    pub client_id: String,

    /// User who granted consent.
    pub user_id: String,

    /// Granted scopes. Always a subset of the scope catalog.
    pub scope: BTreeSet<String>,

    /// Redirect endpoint (scheme, host and path) the code was issued for.
    pub redirect_uri: String,

    /// Pending authorization code. Present only between issuance and exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Scopes the pending code was requested for, a subset of `scope`.
    /// Empty means the whole grant.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub code_scope: BTreeSet<String>,

    /// When the pending code stops being redeemable.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub code_expiration: Option<OffsetDateTime>,

    /// SHA-256 hash of the refresh token. The plaintext is handed to the
    /// client once and never stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_hash: Option<String>,

    /// When the refresh token expires.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub refresh_token_expiration: Option<OffsetDateTime>,

    /// When the refresh token was revoked.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub refresh_token_revoked_at: Option<OffsetDateTime>,

    /// Client revision this grant was made under.
    pub authz_revision: u64,

    /// When the record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the record was last modified.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl AuthorizationInfo {
    /// Creates a record with no code and no refresh token.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        user_id: impl Into<String>,
        scope: BTreeSet<String>,
        redirect_uri: impl Into<String>,
        authz_revision: u64,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            user_id: user_id.into(),
            scope,
            redirect_uri: redirect_uri.into(),
            code: None,
            code_scope: BTreeSet::new(),
            code_expiration: None,
            refresh_token_hash: None,
            refresh_token_expiration: None,
            refresh_token_revoked_at: None,
            authz_revision,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if a code is pending and `now` is strictly before its
    /// expiration.
    #[must_use]
    pub fn is_code_unexpired(&self, now: OffsetDateTime) -> bool {
        match (&self.code, self.code_expiration) {
            (Some(code), Some(expiration)) => !code.is_empty() && now < expiration,
            _ => false,
        }
    }

    /// Returns `true` if `requested` asks for anything this record does not
    /// already grant.
    #[must_use]
    pub fn needs_consent(&self, requested: &BTreeSet<String>) -> bool {
        !requested.is_subset(&self.scope)
    }

    /// Returns `true` if a refresh token exists, has not been revoked and
    /// has not expired.
    #[must_use]
    pub fn is_refresh_token_valid(&self, now: OffsetDateTime) -> bool {
        let present = self
            .refresh_token_hash
            .as_deref()
            .is_some_and(|hash| !hash.is_empty());
        let unexpired = self
            .refresh_token_expiration
            .is_none_or(|expiration| now < expiration);

        present && self.refresh_token_revoked_at.is_none() && unexpired
    }

    /// Returns `true` if the grant was made under the client's current
    /// revision.
    #[must_use]
    pub fn is_revision_current(&self, client_revision: u64) -> bool {
        self.authz_revision == client_revision
    }

    /// Stores a freshly generated code, replacing any pending one.
    pub fn set_code(&mut self, code: String, expiration: OffsetDateTime, now: OffsetDateTime) {
        self.code = Some(code);
        self.code_expiration = Some(expiration);
        self.updated_at = now;
    }

    /// Drops the pending code.
    pub fn clear_code(&mut self, now: OffsetDateTime) {
        self.code = None;
        self.code_scope.clear();
        self.code_expiration = None;
        self.updated_at = now;
    }

    /// Scopes an access token minted from the pending code carries.
    #[must_use]
    pub fn code_scope_or_grant(&self) -> &BTreeSet<String> {
        if self.code_scope.is_empty() {
            &self.scope
        } else {
            &self.code_scope
        }
    }

    /// Applies a re-authorization. Moving to another client revision
    /// revokes the refresh token issued under the old one.
    pub fn apply_reissue(&mut self, reissue: &CodeReissue, now: OffsetDateTime) {
        if self.authz_revision != reissue.authz_revision {
            self.revoke_refresh_token(now);
            self.authz_revision = reissue.authz_revision;
        }
        self.scope = reissue.scope.clone();
        self.redirect_uri = reissue.redirect_uri.clone();
        self.set_code(reissue.code.clone(), reissue.code_expiration, now);
        self.code_scope = reissue.code_scope.clone();
    }

    /// Replaces the refresh token if `current_hash` is still the live one.
    ///
    /// Returns `false`, leaving the record untouched, when the token was
    /// rotated, revoked or has expired in the meantime.
    pub fn rotate_refresh_token(
        &mut self,
        current_hash: &str,
        new_hash: String,
        expiration: OffsetDateTime,
        now: OffsetDateTime,
    ) -> bool {
        if self.refresh_token_hash.as_deref() != Some(current_hash)
            || !self.is_refresh_token_valid(now)
        {
            return false;
        }
        self.set_refresh_token(new_hash, expiration, now);
        true
    }

    /// Revokes the refresh token and drops any pending code.
    pub fn revoke_grant(&mut self, now: OffsetDateTime) {
        self.revoke_refresh_token(now);
        self.clear_code(now);
    }

    /// Installs a new refresh token hash, clearing any earlier revocation.
    pub fn set_refresh_token(
        &mut self,
        token_hash: String,
        expiration: OffsetDateTime,
        now: OffsetDateTime,
    ) {
        self.refresh_token_hash = Some(token_hash);
        self.refresh_token_expiration = Some(expiration);
        self.refresh_token_revoked_at = None;
        self.updated_at = now;
    }

    /// Marks the refresh token as revoked. Idempotent.
    pub fn revoke_refresh_token(&mut self, now: OffsetDateTime) {
        if self.refresh_token_revoked_at.is_none() {
            self.refresh_token_revoked_at = Some(now);
            self.updated_at = now;
        }
    }
}

/// New values for an existing record when a code is issued for it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeReissue {
    pub code: String,
    pub code_expiration: OffsetDateTime,
    /// Scopes the new code carries.
    pub code_scope: BTreeSet<String>,
    /// Full grant after this authorization.
    pub scope: BTreeSet<String>,
    pub redirect_uri: String,
    pub authz_revision: u64,
}

/// Returns `true` if the user must be prompted before a code can be issued.
///
/// A missing prior grant always needs consent.
#[must_use]
pub fn consent_required(
    previous: Option<&AuthorizationInfo>,
    requested: &BTreeSet<String>,
) -> bool {
    previous.is_none_or(|info| info.needs_consent(requested))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::datetime;

    fn scopes(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn create_test_info() -> AuthorizationInfo {
        AuthorizationInfo::new(
            "tpp-1",
            "user-1",
            scopes(&["openid", "accounts"]),
            "https://tpp.example.com/cb",
            3,
            datetime!(2026-01-01 12:00 UTC),
        )
    }

    #[test]
    fn test_new_record_has_no_code_or_refresh_token() {
        let info = create_test_info();
        assert!(info.code.is_none());
        assert!(!info.is_code_unexpired(info.created_at));
        assert!(!info.is_refresh_token_valid(info.created_at));
    }

    #[test]
    fn test_code_expiry_boundary() {
        let issued = datetime!(2026-01-01 12:00 UTC);
        let mut info = create_test_info();
        info.set_code("code".to_string(), issued + Duration::minutes(10), issued);

        assert!(info.is_code_unexpired(issued));
        assert!(info.is_code_unexpired(issued + Duration::minutes(10) - Duration::nanoseconds(1)));
        assert!(!info.is_code_unexpired(issued + Duration::minutes(10)));
        assert!(!info.is_code_unexpired(issued + Duration::minutes(11)));
    }

    #[test]
    fn test_empty_code_is_treated_as_absent() {
        let now = datetime!(2026-01-01 12:00 UTC);
        let mut info = create_test_info();
        info.set_code(String::new(), now + Duration::minutes(10), now);
        assert!(!info.is_code_unexpired(now));
    }

    #[test]
    fn test_clear_code() {
        let now = datetime!(2026-01-01 12:00 UTC);
        let mut info = create_test_info();
        info.set_code("code".to_string(), now + Duration::minutes(10), now);
        info.clear_code(now + Duration::seconds(5));

        assert!(info.code.is_none());
        assert!(info.code_expiration.is_none());
        assert_eq!(info.updated_at, now + Duration::seconds(5));
    }

    #[test]
    fn test_needs_consent_for_superset_only() {
        let info = create_test_info();

        assert!(!info.needs_consent(&scopes(&["openid"])));
        assert!(!info.needs_consent(&scopes(&["openid", "accounts"])));
        assert!(!info.needs_consent(&scopes(&[])));
        assert!(info.needs_consent(&scopes(&["openid", "payments"])));
    }

    #[test]
    fn test_consent_required_without_previous_grant() {
        assert!(consent_required(None, &scopes(&["openid"])));

        let info = create_test_info();
        assert!(!consent_required(Some(&info), &scopes(&["accounts"])));
        assert!(consent_required(Some(&info), &scopes(&["payments"])));
    }

    #[test]
    fn test_refresh_token_validity() {
        let now = datetime!(2026-01-01 12:00 UTC);
        let mut info = create_test_info();

        info.set_refresh_token("hash".to_string(), now + Duration::days(90), now);
        assert!(info.is_refresh_token_valid(now));
        assert!(!info.is_refresh_token_valid(now + Duration::days(90)));

        info.revoke_refresh_token(now + Duration::hours(1));
        assert!(!info.is_refresh_token_valid(now + Duration::hours(2)));

        // Revocation is sticky until a new token is installed
        info.revoke_refresh_token(now + Duration::hours(3));
        assert_eq!(info.refresh_token_revoked_at, Some(now + Duration::hours(1)));

        info.set_refresh_token("rotated".to_string(), now + Duration::days(90), now);
        assert!(info.is_refresh_token_valid(now));
    }

    #[test]
    fn test_empty_refresh_token_hash_is_invalid() {
        let now = datetime!(2026-01-01 12:00 UTC);
        let mut info = create_test_info();
        info.set_refresh_token(String::new(), now + Duration::days(1), now);
        assert!(!info.is_refresh_token_valid(now));
    }

    #[test]
    fn test_revision_current() {
        let info = create_test_info();
        assert!(info.is_revision_current(3));
        assert!(!info.is_revision_current(4));
    }

    #[test]
    fn test_rotate_refresh_token_requires_live_current_hash() {
        let now = datetime!(2026-01-01 12:00 UTC);
        let expiration = now + Duration::days(90);
        let mut info = create_test_info();
        info.set_refresh_token("first".to_string(), expiration, now);

        assert!(!info.rotate_refresh_token("other", "second".to_string(), expiration, now));
        assert_eq!(info.refresh_token_hash.as_deref(), Some("first"));

        assert!(info.rotate_refresh_token("first", "second".to_string(), expiration, now));
        assert_eq!(info.refresh_token_hash.as_deref(), Some("second"));

        // The replaced hash cannot rotate again
        assert!(!info.rotate_refresh_token("first", "third".to_string(), expiration, now));

        info.revoke_refresh_token(now);
        assert!(!info.rotate_refresh_token("second", "third".to_string(), expiration, now));
    }

    #[test]
    fn test_apply_reissue_keeps_refresh_token_within_revision() {
        let now = datetime!(2026-01-01 12:00 UTC);
        let mut info = create_test_info();
        info.set_refresh_token("hash".to_string(), now + Duration::days(90), now);

        let mut reissue = CodeReissue {
            code: "new-code".to_string(),
            code_expiration: now + Duration::minutes(10),
            code_scope: scopes(&["accounts"]),
            scope: scopes(&["openid", "accounts"]),
            redirect_uri: "https://tpp.example.com/cb".to_string(),
            authz_revision: 3,
        };
        info.apply_reissue(&reissue, now);
        assert!(info.is_refresh_token_valid(now));
        assert_eq!(info.code.as_deref(), Some("new-code"));
        assert_eq!(info.code_scope_or_grant(), &scopes(&["accounts"]));

        reissue.authz_revision = 4;
        info.apply_reissue(&reissue, now);
        assert!(!info.is_refresh_token_valid(now));
        assert_eq!(info.authz_revision, 4);
    }

    #[test]
    fn test_code_scope_falls_back_to_grant() {
        let now = datetime!(2026-01-01 12:00 UTC);
        let mut info = create_test_info();
        assert_eq!(info.code_scope_or_grant(), &info.scope);

        info.code_scope = scopes(&["openid"]);
        info.revoke_grant(now);
        assert!(info.code_scope.is_empty());
        assert!(info.code.is_none());
        assert!(info.refresh_token_revoked_at.is_some());
    }

    #[test]
    fn test_serialization() {
        let now = datetime!(2026-01-01 12:00 UTC);
        let mut info = create_test_info();
        info.set_code("abc".to_string(), now + Duration::minutes(10), now);

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains(r#""clientId":"tpp-1""#));
        assert!(json.contains(r#""authzRevision":3"#));
        assert!(!json.contains("refreshTokenHash"));

        let deserialized: AuthorizationInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, deserialized);
    }
}
