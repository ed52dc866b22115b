//! Persisted credential port.

use async_trait::async_trait;
use campus_domain::StoredCredential;

use super::StoreError;

/// Storage that survives restarts for the signed-in credential.
///
/// The in-memory session always takes precedence; this store is only the
/// fallback consulted by the token resolver.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the persisted credential, `None` when signed out.
    async fn load(&self) -> Result<Option<StoredCredential>, StoreError>;

    /// Persists the credential, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error if the credential cannot be written.
    async fn save(&self, credential: &StoredCredential) -> Result<(), StoreError>;

    /// Removes the persisted credential. Removing nothing is not an error.
    async fn clear(&self) -> Result<(), StoreError>;
}
