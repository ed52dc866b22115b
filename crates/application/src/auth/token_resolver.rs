//! Bearer token resolution.
//!
//! The in-memory session is consulted first, then the persisted credential.
//! Every protected call goes through [`TokenResolver::resolve`].

use std::sync::Arc;

use campus_domain::{Session, StoredCredential, Token};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::ApplicationResult;
use crate::ports::CredentialStore;

/// Resolves the current bearer credential from layered stores.
#[derive(Clone)]
pub struct TokenResolver {
    session: Arc<RwLock<Session>>,
    store: Arc<dyn CredentialStore>,
}

impl TokenResolver {
    pub(crate) fn new(session: Arc<RwLock<Session>>, store: Arc<dyn CredentialStore>) -> Self {
        Self { session, store }
    }

    /// Returns the in-memory session token if present, else the persisted
    /// token, else `None`.
    ///
    /// A failing persisted store counts as "no token".
    pub async fn resolve(&self) -> Option<Token> {
        if let Some(token) = self.memory_token() {
            return Some(token);
        }
        match self.store.load().await {
            Ok(Some(credential)) => {
                debug!("token resolved from persisted credential");
                Some(credential.token)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "persisted credential unreadable");
                None
            }
        }
    }

    /// Returns the in-memory token only.
    #[must_use]
    pub fn memory_token(&self) -> Option<Token> {
        let session = self.session.read();
        if session.is_authenticated {
            session.token.clone()
        } else {
            None
        }
    }

    /// Persists `credential` for later restarts.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Storage` if the store fails.
    pub async fn remember(&self, credential: &StoredCredential) -> ApplicationResult<()> {
        self.store.save(credential).await?;
        Ok(())
    }

    /// Forgets the persisted credential.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Storage` if the store fails.
    pub async fn forget(&self) -> ApplicationResult<()> {
        self.store.clear().await?;
        Ok(())
    }

    /// Loads the persisted credential.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Storage` if the store fails.
    pub async fn persisted(&self) -> ApplicationResult<Option<StoredCredential>> {
        Ok(self.store.load().await?)
    }
}
