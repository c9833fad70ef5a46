//! Client metadata storage trait.
//!
//! Clients are registered by an external administration system. The engine
//! reads them on every request and writes only status and revision.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{ClientInfo, ClientStatus};

/// Storage trait for client metadata.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Finds a client by its client id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_client_info_by_id(&self, client_id: &str) -> AuthResult<Option<ClientInfo>>;

    /// Sets the publication status of a client.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the client does not exist, or an
    /// error if the storage operation fails.
    async fn set_status(&self, client_id: &str, status: ClientStatus) -> AuthResult<()>;

    /// Increments the authorization revision of a client.
    ///
    /// # Returns
    ///
    /// The new revision.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the client does not exist, or an
    /// error if the storage operation fails.
    async fn increment_revision(&self, client_id: &str) -> AuthResult<u64>;
}
