//! Dashmap-backed implementation of the repository traits.
//!
//! Every conditional write (code redemption, code reissue, refresh token
//! rotation) runs under the entry lock of the authorization record, so
//! concurrent callers observe a single winner.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use openbank_authz::storage::{AccessTokenRepository, AuthzInfoRepository, ClientRepository};
use openbank_authz::types::{
    AccessTokenInfo, AuthorizationInfo, ClientInfo, ClientStatus, CodeReissue, TokenStatus,
};
use openbank_authz::{AuthError, AuthResult};
use time::OffsetDateTime;
use uuid::Uuid;

/// Key of the "current authorization for this client and user" index.
type ClientUserKey = (String, String);

/// In-memory repository backend using dashmap concurrent maps.
///
/// One store implements all three repository traits so that code
/// redemption can clear the code and persist the access token under a
/// single entry lock.
///
/// Locking rules:
/// - No map guard is held across an `.await`
/// - When two maps are locked together, `authz_infos` is always locked
///   before `access_tokens`
#[derive(Debug, Default)]
pub struct InMemoryAuthzStore {
    clients: DashMap<String, ClientInfo>,
    authz_infos: DashMap<Uuid, AuthorizationInfo>,
    client_user_index: DashMap<ClientUserKey, Uuid>,
    access_tokens: DashMap<String, AccessTokenInfo>,
}

impl InMemoryAuthzStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a client.
    pub fn register_client(&self, client: ClientInfo) {
        self.clients.insert(client.client_id.clone(), client);
    }

    /// Number of stored authorization records.
    pub fn authorization_count(&self) -> usize {
        self.authz_infos.len()
    }

    /// Number of stored access tokens, including revoked and expired ones.
    pub fn access_token_count(&self) -> usize {
        self.access_tokens.len()
    }
}

fn client_user_key(client_id: &str, user_id: &str) -> ClientUserKey {
    (client_id.to_string(), user_id.to_string())
}

#[async_trait::async_trait]
impl ClientRepository for InMemoryAuthzStore {
    async fn get_client_info_by_id(&self, client_id: &str) -> AuthResult<Option<ClientInfo>> {
        Ok(self.clients.get(client_id).map(|entry| entry.value().clone()))
    }

    async fn set_status(&self, client_id: &str, status: ClientStatus) -> AuthResult<()> {
        let mut client = self
            .clients
            .get_mut(client_id)
            .ok_or_else(|| AuthError::not_found(format!("Client not found: {client_id}")))?;
        client.status = status;
        Ok(())
    }

    async fn increment_revision(&self, client_id: &str) -> AuthResult<u64> {
        let mut client = self
            .clients
            .get_mut(client_id)
            .ok_or_else(|| AuthError::not_found(format!("Client not found: {client_id}")))?;
        client.authz_revision += 1;
        Ok(client.authz_revision)
    }
}

#[async_trait::async_trait]
impl AuthzInfoRepository for InMemoryAuthzStore {
    async fn find_by_client_and_user(
        &self,
        client_id: &str,
        user_id: &str,
    ) -> AuthResult<Option<AuthorizationInfo>> {
        let id = match self
            .client_user_index
            .get(&client_user_key(client_id, user_id))
        {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        Ok(self.authz_infos.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<AuthorizationInfo>> {
        Ok(self.authz_infos.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationInfo>> {
        if code.is_empty() {
            return Ok(None);
        }
        Ok(self
            .authz_infos
            .iter()
            .find(|entry| entry.code.as_deref() == Some(code))
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_refresh_token_hash(
        &self,
        token_hash: &str,
    ) -> AuthResult<Option<AuthorizationInfo>> {
        Ok(self
            .authz_infos
            .iter()
            .find(|entry| entry.refresh_token_hash.as_deref() == Some(token_hash))
            .map(|entry| entry.value().clone()))
    }

    async fn list_by_client(&self, client_id: &str) -> AuthResult<Vec<AuthorizationInfo>> {
        Ok(self
            .authz_infos
            .iter()
            .filter(|entry| entry.client_id == client_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn insert(&self, info: &AuthorizationInfo) -> AuthResult<()> {
        // The index entry guard serializes inserts for the same client and user
        match self
            .client_user_index
            .entry(client_user_key(&info.client_id, &info.user_id))
        {
            Entry::Occupied(_) => Err(AuthError::storage(format!(
                "Authorization already exists for client {}",
                info.client_id
            ))),
            Entry::Vacant(slot) => {
                if self.authz_infos.contains_key(&info.id) {
                    return Err(AuthError::storage(format!(
                        "Duplicate authorization id {}",
                        info.id
                    )));
                }
                self.authz_infos.insert(info.id, info.clone());
                slot.insert(info.id);
                Ok(())
            }
        }
    }

    async fn update(&self, info: &AuthorizationInfo) -> AuthResult<()> {
        let mut entry = self
            .authz_infos
            .get_mut(&info.id)
            .ok_or_else(|| AuthError::not_found(format!("Authorization not found: {}", info.id)))?;
        *entry = info.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AuthResult<()> {
        if let Some((_, info)) = self.authz_infos.remove(&id) {
            self.client_user_index.remove_if(
                &client_user_key(&info.client_id, &info.user_id),
                |_, indexed| *indexed == id,
            );
        }
        Ok(())
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
        let Some(mut info) = self.authz_infos.get_mut(&id) else {
            return Ok(false);
        };

        // Compare-and-clear under the entry lock
        if code.is_empty() || info.code.as_deref() != Some(code) {
            tracing::debug!(authorization_id = %id, "Code redemption lost");
            return Ok(false);
        }

        match self.access_tokens.entry(access_token.token_hash.clone()) {
            Entry::Occupied(_) => {
                return Err(AuthError::storage("Duplicate access token hash"));
            }
            Entry::Vacant(slot) => {
                slot.insert(access_token.clone());
            }
        }

        info.clear_code(now);
        info.set_refresh_token(refresh_token_hash.to_string(), refresh_token_expiration, now);
        Ok(true)
    }

    async fn reissue_code(
        &self,
        id: Uuid,
        reissue: &CodeReissue,
        now: OffsetDateTime,
    ) -> AuthResult<Option<AuthorizationInfo>> {
        Ok(self.authz_infos.get_mut(&id).map(|mut info| {
            info.apply_reissue(reissue, now);
            info.value().clone()
        }))
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current_hash: &str,
        new_hash: &str,
        expiration: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        let Some(mut info) = self.authz_infos.get_mut(&id) else {
            return Ok(false);
        };
        Ok(info.rotate_refresh_token(current_hash, new_hash.to_string(), expiration, now))
    }

    async fn revoke_grant(&self, id: Uuid, now: OffsetDateTime) -> AuthResult<bool> {
        let Some(mut info) = self.authz_infos.get_mut(&id) else {
            return Ok(false);
        };
        info.revoke_grant(now);
        Ok(true)
    }

    async fn clear_code(&self, id: Uuid, code: &str, now: OffsetDateTime) -> AuthResult<()> {
        if let Some(mut info) = self.authz_infos.get_mut(&id)
            && info.code.as_deref() == Some(code)
        {
            info.clear_code(now);
        }
        Ok(())
    }

    async fn purge_expired_codes(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut purged = 0;
        for mut entry in self.authz_infos.iter_mut() {
            if entry.code.is_some() && !entry.is_code_unexpired(now) {
                entry.clear_code(now);
                purged += 1;
            }
        }
        Ok(purged)
    }
}

#[async_trait::async_trait]
impl AccessTokenRepository for InMemoryAuthzStore {
    async fn insert(&self, token: &AccessTokenInfo) -> AuthResult<()> {
        match self.access_tokens.entry(token.token_hash.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage("Duplicate access token hash")),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(())
            }
        }
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> AuthResult<Option<AccessTokenInfo>> {
        Ok(self
            .access_tokens
            .get(token_hash)
            .map(|entry| entry.value().clone()))
    }

    async fn list_by_authorization(
        &self,
        authorization_id: Uuid,
    ) -> AuthResult<Vec<AccessTokenInfo>> {
        Ok(self
            .access_tokens
            .iter()
            .filter(|entry| entry.authorization_id == authorization_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn revoke_by_authorization(
        &self,
        authorization_id: Uuid,
        status: TokenStatus,
        now: OffsetDateTime,
    ) -> AuthResult<u64> {
        let mut revoked = 0;
        for mut entry in self.access_tokens.iter_mut() {
            if entry.authorization_id == authorization_id && entry.revoke(status, now) {
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_by_client(
        &self,
        client_id: &str,
        status: TokenStatus,
        now: OffsetDateTime,
    ) -> AuthResult<u64> {
        let mut revoked = 0;
        for mut entry in self.access_tokens.iter_mut() {
            if entry.client_id == client_id && entry.revoke(status, now) {
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut removed = 0;
        self.access_tokens.retain(|_, token| {
            let keep = !token.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
