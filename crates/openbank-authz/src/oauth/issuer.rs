//! Authorization code issuance.
//!
//! The issuer turns a [`ValidatedRequest`] into a single-use authorization
//! code bound to an [`AuthorizationInfo`] record. The record is persisted
//! before the code is returned, so a caller never sees a code the
//! repository does not know about.

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use time::{Duration, OffsetDateTime};
use url::Url;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::authorize::AuthorizationResponse;
use crate::oauth::validator::ValidatedRequest;
use crate::storage::AuthzInfoRepository;
use crate::types::{AuthorizationInfo, ClientInfo, CodeReissue};

/// Random bytes per authorization code (208 bits).
pub const AUTHORIZATION_CODE_LENGTH: usize = 26;

/// Authorization code lifetime (RFC 6749 §4.1.2).
pub const AUTHORIZATION_CODE_LIFETIME: Duration = Duration::minutes(10);

/// Generates a cryptographically secure authorization code.
///
/// Uses [`AUTHORIZATION_CODE_LENGTH`] bytes from the thread-local CSPRNG,
/// base64url encoded without padding.
#[must_use]
pub fn generate_code() -> String {
    let mut bytes = [0u8; AUTHORIZATION_CODE_LENGTH];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Expiration instant of a code issued at `issued_at`.
#[must_use]
pub fn code_expiration(issued_at: OffsetDateTime) -> OffsetDateTime {
    issued_at + AUTHORIZATION_CODE_LIFETIME
}

/// Builds the success redirect: a new URL equal to `redirect_uri` with
/// `code` and `state` appended.
#[must_use]
pub fn build_redirect(redirect_uri: &Url, code: &str, state: &str) -> Url {
    AuthorizationResponse::new(code.to_string(), state.to_string()).to_redirect_url(redirect_uri)
}

/// A freshly issued authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    /// Record the code is bound to.
    pub authorization_id: Uuid,

    /// The authorization code.
    pub code: String,

    /// When the code stops being redeemable.
    pub code_expiration: OffsetDateTime,

    /// Scopes granted by the record.
    pub scope: BTreeSet<String>,

    /// Scopes tokens minted from this code carry.
    pub code_scope: BTreeSet<String>,

    /// Redirect to send the user agent to.
    pub redirect_url: Url,
}

/// Issues authorization codes and persists the owning record.
pub struct AuthorizationGrantIssuer {
    authz_infos: Arc<dyn AuthzInfoRepository>,
}

impl AuthorizationGrantIssuer {
    /// Creates a new issuer.
    pub fn new(authz_infos: Arc<dyn AuthzInfoRepository>) -> Self {
        Self { authz_infos }
    }

    /// Issues a code for `user_id` and persists it.
    ///
    /// Creates the client/user record on first grant. On re-authorization
    /// the existing record gets the new code (discarding any pending one),
    /// the `granted_scope` and the client's current revision. A record
    /// re-issued under a newer revision loses its refresh token. The code
    /// itself carries only the requested scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or persisted, or if it
    /// was deleted while the code was being issued. No code is returned in
    /// that case.
    pub async fn issue(
        &self,
        validated: &ValidatedRequest,
        user_id: &str,
        client: &ClientInfo,
        granted_scope: BTreeSet<String>,
        now: OffsetDateTime,
    ) -> AuthResult<AuthorizationGrant> {
        let code = generate_code();
        let expiration = code_expiration(now);

        let existing = self
            .authz_infos
            .find_by_client_and_user(&client.client_id, user_id)
            .await?;

        let info = match existing {
            Some(existing) => {
                let reissue = CodeReissue {
                    code: code.clone(),
                    code_expiration: expiration,
                    code_scope: validated.scope.clone(),
                    scope: granted_scope,
                    redirect_uri: validated.redirect_endpoint.clone(),
                    authz_revision: client.authz_revision,
                };
                self.authz_infos
                    .reissue_code(existing.id, &reissue, now)
                    .await?
                    .ok_or_else(|| {
                        AuthError::not_found(format!(
                            "Authorization removed during issuance: {}",
                            existing.id
                        ))
                    })?
            }
            None => {
                let mut info = AuthorizationInfo::new(
                    client.client_id.as_str(),
                    user_id,
                    granted_scope,
                    validated.redirect_endpoint.as_str(),
                    client.authz_revision,
                    now,
                );
                info.set_code(code.clone(), expiration, now);
                info.code_scope = validated.scope.clone();
                self.authz_infos.insert(&info).await?;
                info
            }
        };

        tracing::debug!(
            client_id = %client.client_id,
            authorization_id = %info.id,
            "Authorization code issued"
        );

        Ok(AuthorizationGrant {
            authorization_id: info.id,
            redirect_url: build_redirect(&validated.redirect_uri, &code, &validated.state),
            code,
            code_expiration: expiration,
            code_scope: info.code_scope_or_grant().clone(),
            scope: info.scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::RwLock;
    use time::macros::datetime;
    use tokio_test::block_on;

    #[test]
    fn test_generate_code_length_and_alphabet() {
        let code = generate_code();
        // 26 bytes -> ceil(26 * 4 / 3) characters without padding
        assert_eq!(code.len(), 35);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        let decoded = URL_SAFE_NO_PAD.decode(&code).unwrap();
        assert_eq!(decoded.len(), AUTHORIZATION_CODE_LENGTH);
    }

    #[test]
    fn test_generate_code_is_unique() {
        let codes: HashSet<String> = (0..10_000).map(|_| generate_code()).collect();
        assert_eq!(codes.len(), 10_000);
    }

    #[test]
    fn test_code_expiration_is_ten_minutes() {
        let issued = datetime!(2026-03-01 09:00 UTC);
        assert_eq!(code_expiration(issued), datetime!(2026-03-01 09:10 UTC));
    }

    #[test]
    fn test_build_redirect_preserves_query() {
        let base = Url::parse("https://tpp.example.com/cb?tenant=eu").unwrap();
        let url = build_redirect(&base, "abc", "xyz");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("tenant".to_string(), "eu".to_string()),
                ("code".to_string(), "abc".to_string()),
                ("state".to_string(), "xyz".to_string()),
            ]
        );
        assert_eq!(base.query(), Some("tenant=eu"));
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_build_redirect_encodes_state() {
        let base = Url::parse("https://tpp.example.com/cb").unwrap();
        let url = build_redirect(&base, "abc", "a b&c");
        assert_eq!(url.as_str(), "https://tpp.example.com/cb?code=abc&state=a+b%26c");
    }

    /// Mock authorization record storage for testing.
    struct MockAuthzInfoStorage {
        infos: RwLock<HashMap<Uuid, AuthorizationInfo>>,
        fail_writes: bool,
    }

    impl MockAuthzInfoStorage {
        fn new(fail_writes: bool) -> Self {
            Self {
                infos: RwLock::new(HashMap::new()),
                fail_writes,
            }
        }

        fn write(&self, info: &AuthorizationInfo) -> AuthResult<()> {
            if self.fail_writes {
                return Err(AuthError::storage("write rejected"));
            }
            self.infos.write().unwrap().insert(info.id, info.clone());
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl AuthzInfoRepository for MockAuthzInfoStorage {
        async fn find_by_client_and_user(
            &self,
            client_id: &str,
            user_id: &str,
        ) -> AuthResult<Option<AuthorizationInfo>> {
            Ok(self
                .infos
                .read()
                .unwrap()
                .values()
                .find(|i| i.client_id == client_id && i.user_id == user_id)
                .cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<AuthorizationInfo>> {
            Ok(self.infos.read().unwrap().get(&id).cloned())
        }

        async fn find_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationInfo>> {
            Ok(self
                .infos
                .read()
                .unwrap()
                .values()
                .find(|i| i.code.as_deref() == Some(code))
                .cloned())
        }

        async fn find_by_refresh_token_hash(
            &self,
            _token_hash: &str,
        ) -> AuthResult<Option<AuthorizationInfo>> {
            Ok(None)
        }

        async fn list_by_client(&self, _client_id: &str) -> AuthResult<Vec<AuthorizationInfo>> {
            Ok(Vec::new())
        }

        async fn insert(&self, info: &AuthorizationInfo) -> AuthResult<()> {
            self.write(info)
        }

        async fn update(&self, info: &AuthorizationInfo) -> AuthResult<()> {
            self.write(info)
        }

        async fn delete(&self, id: Uuid) -> AuthResult<()> {
            self.infos.write().unwrap().remove(&id);
            Ok(())
        }

        async fn redeem_code(
            &self,
            _id: Uuid,
            _code: &str,
            _access_token: &crate::types::AccessTokenInfo,
            _refresh_token_hash: &str,
            _refresh_token_expiration: OffsetDateTime,
            _now: OffsetDateTime,
        ) -> AuthResult<bool> {
            Ok(false)
        }

        async fn reissue_code(
            &self,
            id: Uuid,
            reissue: &CodeReissue,
            now: OffsetDateTime,
        ) -> AuthResult<Option<AuthorizationInfo>> {
            if self.fail_writes {
                return Err(AuthError::storage("write rejected"));
            }
            Ok(self.infos.write().unwrap().get_mut(&id).map(|info| {
                info.apply_reissue(reissue, now);
                info.clone()
            }))
        }

        async fn rotate_refresh_token(
            &self,
            _id: Uuid,
            _current_hash: &str,
            _new_hash: &str,
            _expiration: OffsetDateTime,
            _now: OffsetDateTime,
        ) -> AuthResult<bool> {
            Ok(false)
        }

        async fn revoke_grant(&self, _id: Uuid, _now: OffsetDateTime) -> AuthResult<bool> {
            Ok(false)
        }

        async fn clear_code(&self, _id: Uuid, _code: &str, _now: OffsetDateTime) -> AuthResult<()> {
            Ok(())
        }

        async fn purge_expired_codes(&self, _now: OffsetDateTime) -> AuthResult<u64> {
            Ok(0)
        }
    }

    fn create_validated(redirect_uri: &str) -> ValidatedRequest {
        let redirect_uri = Url::parse(redirect_uri).unwrap();
        ValidatedRequest {
            client_id: "tpp-1".to_string(),
            response_type: crate::oauth::ResponseType::Code,
            redirect_endpoint: crate::oauth::reduce_endpoint(&redirect_uri),
            redirect_uri,
            scope: ["openid".to_string()].into_iter().collect(),
            state: "s1".to_string(),
        }
    }

    fn scopes(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_issue_persists_before_returning() {
        let storage = Arc::new(MockAuthzInfoStorage::new(false));
        let issuer = AuthorizationGrantIssuer::new(storage.clone());
        let client = ClientInfo::new("tpp-1", ["https://tpp.example.com/cb"]);
        let now = datetime!(2026-03-01 09:00 UTC);

        let grant = block_on(issuer.issue(
            &create_validated("https://tpp.example.com/cb?tenant=eu"),
            "user-1",
            &client,
            scopes(&["openid"]),
            now,
        ))
        .unwrap();

        let stored = block_on(storage.find_by_code(&grant.code)).unwrap().unwrap();
        assert_eq!(stored.id, grant.authorization_id);
        assert_eq!(stored.redirect_uri, "https://tpp.example.com/cb");
        assert_eq!(stored.code_expiration, Some(datetime!(2026-03-01 09:10 UTC)));
        assert_eq!(grant.code_expiration, datetime!(2026-03-01 09:10 UTC));

        let pairs: HashMap<String, String> = grant
            .redirect_url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs.get("code"), Some(&grant.code));
        assert_eq!(pairs.get("state").map(String::as_str), Some("s1"));
        assert_eq!(pairs.get("tenant").map(String::as_str), Some("eu"));
        assert!(!pairs.contains_key("error"));
    }

    #[test]
    fn test_reissue_replaces_pending_code() {
        let storage = Arc::new(MockAuthzInfoStorage::new(false));
        let issuer = AuthorizationGrantIssuer::new(storage.clone());
        let client = ClientInfo::new("tpp-1", ["https://tpp.example.com/cb"]);
        let validated = create_validated("https://tpp.example.com/cb");
        let now = datetime!(2026-03-01 09:00 UTC);

        let first = block_on(issuer.issue(&validated, "user-1", &client, scopes(&["openid"]), now))
            .unwrap();
        let second = block_on(issuer.issue(
            &validated,
            "user-1",
            &client,
            scopes(&["openid", "accounts"]),
            now,
        ))
        .unwrap();

        assert_eq!(first.authorization_id, second.authorization_id);
        assert_ne!(first.code, second.code);
        assert!(block_on(storage.find_by_code(&first.code)).unwrap().is_none());
        assert_eq!(second.scope, scopes(&["accounts", "openid"]));
        // The code is bound to what was asked for, not the whole grant
        assert_eq!(second.code_scope, scopes(&["openid"]));
    }

    #[test]
    fn test_reissue_under_new_revision_drops_refresh_token() {
        let storage = Arc::new(MockAuthzInfoStorage::new(false));
        let now = datetime!(2026-03-01 09:00 UTC);
        let mut info = AuthorizationInfo::new(
            "tpp-1",
            "user-1",
            scopes(&["openid"]),
            "https://tpp.example.com/cb",
            0,
            now,
        );
        info.set_refresh_token("old-hash".to_string(), now + Duration::days(1), now);
        storage.write(&info).unwrap();

        let mut client = ClientInfo::new("tpp-1", ["https://tpp.example.com/cb"]);
        client.authz_revision = 1;
        let issuer = AuthorizationGrantIssuer::new(storage.clone());
        let grant = block_on(issuer.issue(
            &create_validated("https://tpp.example.com/cb"),
            "user-1",
            &client,
            scopes(&["openid"]),
            now,
        ))
        .unwrap();

        let stored = block_on(storage.find_by_id(grant.authorization_id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.authz_revision, 1);
        assert!(!stored.is_refresh_token_valid(now));
    }

    #[test]
    fn test_storage_failure_returns_no_code() {
        let storage = Arc::new(MockAuthzInfoStorage::new(true));
        let issuer = AuthorizationGrantIssuer::new(storage);
        let client = ClientInfo::new("tpp-1", ["https://tpp.example.com/cb"]);

        let result = block_on(issuer.issue(
            &create_validated("https://tpp.example.com/cb"),
            "user-1",
            &client,
            scopes(&["openid"]),
            datetime!(2026-03-01 09:00 UTC),
        ));

        let err = result.unwrap_err();
        assert!(err.is_server_error());
    }
}
