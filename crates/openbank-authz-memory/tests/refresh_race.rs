//! A refresh racing the exchange of a newer code for the same grant.
//!
//! The refresh reads the authorization record while a second code is
//! pending. Before it rotates, that code is exchanged. The rotation must
//! not resurrect the code nor overwrite the refresh token the exchange
//! installed.

use std::sync::{Arc, Mutex};

use openbank_authz::oauth::AuthorizationOutcome;
use openbank_authz::storage::AuthzInfoRepository;
use openbank_authz::types::{AccessTokenInfo, AuthorizationInfo, ClientInfo, CodeReissue};
use openbank_authz::{
    AuthError, AuthResult, AuthorizationRequest, AuthorizationService, CodeExchangeRequest,
    RefreshRequest, TokenResponse, TokenService,
};
use openbank_authz_memory::InMemoryAuthzStore;
use time::OffsetDateTime;
use uuid::Uuid;

const CLIENT_ID: &str = "tpp-1";
const USER_ID: &str = "user-1";
const REDIRECT_URI: &str = "https://tpp.example.com/cb";

/// Delegates to the in-memory store, exchanging a queued code right before
/// the next refresh token rotation reaches the store.
struct InterleavingStore {
    inner: Arc<InMemoryAuthzStore>,
    queued_exchange: Mutex<Option<CodeExchangeRequest>>,
    interleaved: Mutex<Option<TokenResponse>>,
}

impl InterleavingStore {
    fn new(inner: Arc<InMemoryAuthzStore>) -> Self {
        Self {
            inner,
            queued_exchange: Mutex::new(None),
            interleaved: Mutex::new(None),
        }
    }

    fn queue_exchange(&self, code: &str) {
        *self.queued_exchange.lock().unwrap() = Some(exchange_request(code));
    }

    fn interleaved_response(&self) -> Option<TokenResponse> {
        self.interleaved.lock().unwrap().take()
    }
}

#[async_trait::async_trait]
impl AuthzInfoRepository for InterleavingStore {
    async fn find_by_client_and_user(
        &self,
        client_id: &str,
        user_id: &str,
    ) -> AuthResult<Option<AuthorizationInfo>> {
        self.inner.find_by_client_and_user(client_id, user_id).await
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<AuthorizationInfo>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationInfo>> {
        self.inner.find_by_code(code).await
    }

    async fn find_by_refresh_token_hash(
        &self,
        token_hash: &str,
    ) -> AuthResult<Option<AuthorizationInfo>> {
        self.inner.find_by_refresh_token_hash(token_hash).await
    }

    async fn list_by_client(&self, client_id: &str) -> AuthResult<Vec<AuthorizationInfo>> {
        self.inner.list_by_client(client_id).await
    }

    async fn insert(&self, info: &AuthorizationInfo) -> AuthResult<()> {
        AuthzInfoRepository::insert(self.inner.as_ref(), info).await
    }

    async fn update(&self, info: &AuthorizationInfo) -> AuthResult<()> {
        self.inner.update(info).await
    }

    async fn delete(&self, id: Uuid) -> AuthResult<()> {
        self.inner.delete(id).await
    }

    async fn redeem_code(
        &self,
        id: Uuid,
        code: &str,
        access_token: &AccessTokenInfo,
        refresh_token_hash: &str,
        refresh_token_expiration: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        self.inner
            .redeem_code(
                id,
                code,
                access_token,
                refresh_token_hash,
                refresh_token_expiration,
                now,
            )
            .await
    }

    async fn reissue_code(
        &self,
        id: Uuid,
        reissue: &CodeReissue,
        now: OffsetDateTime,
    ) -> AuthResult<Option<AuthorizationInfo>> {
        self.inner.reissue_code(id, reissue, now).await
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current_hash: &str,
        new_hash: &str,
        expiration: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        let queued = self.queued_exchange.lock().unwrap().take();
        if let Some(request) = queued {
            let store = self.inner.clone();
            let tokens = TokenService::new(store.clone(), store.clone(), store);
            let response = tokens.exchange_code(&request).await?;
            *self.interleaved.lock().unwrap() = Some(response);
        }

        self.inner
            .rotate_refresh_token(id, current_hash, new_hash, expiration, now)
            .await
    }

    async fn revoke_grant(&self, id: Uuid, now: OffsetDateTime) -> AuthResult<bool> {
        self.inner.revoke_grant(id, now).await
    }

    async fn clear_code(&self, id: Uuid, code: &str, now: OffsetDateTime) -> AuthResult<()> {
        self.inner.clear_code(id, code, now).await
    }

    async fn purge_expired_codes(&self, now: OffsetDateTime) -> AuthResult<u64> {
        self.inner.purge_expired_codes(now).await
    }
}

fn exchange_request(code: &str) -> CodeExchangeRequest {
    CodeExchangeRequest {
        client_id: CLIENT_ID.to_string(),
        code: code.to_string(),
        redirect_uri: REDIRECT_URI.to_string(),
    }
}

fn refresh_request(refresh_token: &str) -> RefreshRequest {
    RefreshRequest {
        client_id: CLIENT_ID.to_string(),
        refresh_token: refresh_token.to_string(),
        scope: None,
    }
}

fn create_request() -> AuthorizationRequest {
    AuthorizationRequest {
        response_type: "code".to_string(),
        client_id: CLIENT_ID.to_string(),
        redirect_uri: REDIRECT_URI.to_string(),
        scope: vec!["openid".to_string(), "accounts".to_string()],
        state: "xyz".to_string(),
    }
}

#[tokio::test]
async fn test_refresh_racing_exchange_does_not_restore_redeemed_code() {
    let store = Arc::new(InMemoryAuthzStore::new());
    store.register_client(ClientInfo::new(CLIENT_ID, [REDIRECT_URI]));
    let authorization = AuthorizationService::new(store.clone(), store.clone());
    let plain_tokens = TokenService::new(store.clone(), store.clone(), store.clone());

    // First code, redeemed for a refresh token
    let AuthorizationOutcome::ConsentRequired(prompt) =
        authorization.authorize(&create_request(), USER_ID).await.unwrap()
    else {
        panic!("expected consent prompt");
    };
    let first_code = authorization
        .grant_consent(&prompt, USER_ID)
        .await
        .unwrap()
        .code;
    let first = plain_tokens
        .exchange_code(&exchange_request(&first_code))
        .await
        .unwrap();
    let first_refresh = first.refresh_token.unwrap();

    // Second code pending on the same record
    let AuthorizationOutcome::Issued(second) =
        authorization.authorize(&create_request(), USER_ID).await.unwrap()
    else {
        panic!("expected a code without consent");
    };

    let racing = Arc::new(InterleavingStore::new(store.clone()));
    racing.queue_exchange(&second.code);
    let racing_tokens = TokenService::new(store.clone(), racing.clone(), store.clone());

    let err = racing_tokens
        .refresh(&refresh_request(&first_refresh))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant(_)));

    let interleaved = racing
        .interleaved_response()
        .expect("second code exchanged during the refresh");

    // The second code stays spent
    assert!(store.find_by_code(&second.code).await.unwrap().is_none());
    let err = plain_tokens
        .exchange_code(&exchange_request(&second.code))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant(_)));

    // The refresh token installed by the exchange survives
    let refreshed = plain_tokens
        .refresh(&refresh_request(interleaved.refresh_token.as_deref().unwrap()))
        .await
        .unwrap();
    assert!(refreshed.refresh_token.is_some());

    // Only the two exchanges minted access tokens
    assert_eq!(store.access_token_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refreshes_rotate_once() {
    let store = Arc::new(InMemoryAuthzStore::new());
    store.register_client(ClientInfo::new(CLIENT_ID, [REDIRECT_URI]));
    let authorization = AuthorizationService::new(store.clone(), store.clone());
    let tokens = Arc::new(TokenService::new(store.clone(), store.clone(), store.clone()));

    let AuthorizationOutcome::ConsentRequired(prompt) =
        authorization.authorize(&create_request(), USER_ID).await.unwrap()
    else {
        panic!("expected consent prompt");
    };
    let code = authorization
        .grant_consent(&prompt, USER_ID)
        .await
        .unwrap()
        .code;
    let refresh_token = tokens
        .exchange_code(&exchange_request(&code))
        .await
        .unwrap()
        .refresh_token
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tokens = tokens.clone();
            let request = refresh_request(&refresh_token);
            tokio::spawn(async move { tokens.refresh(&request).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert!(matches!(err, AuthError::InvalidGrant(_))),
        }
    }
    assert_eq!(winners, 1);
}
