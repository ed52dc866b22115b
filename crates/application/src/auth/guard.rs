//! Session validation and the expiry protocol.
//!
//! [`AuthGuard`] is the only owner of the [`Session`]. It is consulted before
//! every protected operation and is the single place where an expired
//! session is torn down: clear the session, cancel protected in-flight work,
//! run expiry hooks, clear the persisted credential and redirect to sign-in.

use std::sync::Arc;

use campus_domain::{Capability, Role, Session, StoredCredential, UserId};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{info, warn};

use super::TokenResolver;
use crate::error::{ApplicationError, ApplicationResult};
use crate::ports::{CancellationReceiver, CancellationToken, CredentialStore, Navigation, Navigator};

/// Coarse authentication state for UI binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No session; nothing has expired.
    SignedOut,
    /// A valid session exists.
    SignedIn,
    /// The session was torn down by the expiry path.
    Expired,
}

type ExpiryHook = Arc<dyn Fn() + Send + Sync>;

/// Validates the session and enforces the expiry protocol.
pub struct AuthGuard {
    session: Arc<RwLock<Session>>,
    resolver: TokenResolver,
    navigator: Arc<dyn Navigator>,
    scope: Mutex<CancellationToken>,
    state: watch::Sender<AuthState>,
    hooks: Mutex<Vec<ExpiryHook>>,
}

impl AuthGuard {
    /// Creates a guard with an empty session.
    pub fn new(credentials: Arc<dyn CredentialStore>, navigator: Arc<dyn Navigator>) -> Self {
        let session = Arc::new(RwLock::new(Session::default()));
        let resolver = TokenResolver::new(Arc::clone(&session), credentials);
        let (scope, _) = CancellationToken::new();
        let (state, _) = watch::channel(AuthState::SignedOut);
        Self {
            session,
            resolver,
            navigator,
            scope: Mutex::new(scope),
            state,
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Returns the token resolver bound to this guard's session.
    #[must_use]
    pub fn resolver(&self) -> &TokenResolver {
        &self.resolver
    }

    /// Returns a copy of the current session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.session.read().clone()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Registers a hook run synchronously on every expiry and sign-out.
    ///
    /// Hooks run after the hook list is released, so a hook may call back
    /// into the guard.
    pub fn on_expire(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().push(Arc::new(hook));
    }

    /// Returns a receiver that fires when the current session's protected
    /// work must be abandoned.
    #[must_use]
    pub fn scope(&self) -> CancellationReceiver {
        self.scope.lock().receiver()
    }

    /// Starts a session and persists its credential.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Storage` if the credential cannot be
    /// persisted. The in-memory session is established regardless.
    pub async fn sign_in(&self, credential: StoredCredential) -> ApplicationResult<()> {
        self.establish(Session::from_credential(credential.clone()));
        info!(subject = %credential.subject, role = %credential.role, "signed in");
        self.resolver.remember(&credential).await
    }

    /// Rebuilds the session from the persisted credential at start-up.
    ///
    /// Returns true when a session was restored.
    pub async fn restore(&self) -> bool {
        match self.resolver.persisted().await {
            Ok(Some(credential)) => {
                info!(subject = %credential.subject, "session restored");
                self.establish(Session::from_credential(credential));
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "could not restore session");
                false
            }
        }
    }

    fn establish(&self, session: Session) {
        *self.session.write() = session;
        let mut scope = self.scope.lock();
        if scope.is_cancelled() {
            *scope = CancellationToken::new().0;
        }
        drop(scope);
        self.state.send_replace(AuthState::SignedIn);
    }

    /// Updates subject and role from canonical user data returned by a
    /// protected fetch. Ignored when no valid session exists.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Storage` if the refreshed credential cannot
    /// be persisted.
    pub async fn refresh_user(&self, subject: UserId, role: Role) -> ApplicationResult<()> {
        let credential = {
            let mut session = self.session.write();
            if !session.is_valid() {
                return Ok(());
            }
            session.subject = Some(subject);
            session.role = Some(role);
            session.credential()
        };
        match credential {
            Some(credential) => self.resolver.remember(&credential).await,
            None => Ok(()),
        }
    }

    /// Validates the session. An invalid session goes through the expiry
    /// path and the call fails with `AuthExpired`.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::AuthExpired` when the session is invalid.
    pub async fn guard(&self) -> ApplicationResult<Session> {
        let session = self.session();
        if session.is_valid() {
            return Ok(session);
        }
        self.expire().await;
        Err(ApplicationError::AuthExpired)
    }

    /// Like [`Self::guard`], additionally requiring `capability`.
    ///
    /// # Errors
    ///
    /// Returns `AuthExpired` for an invalid session and `Forbidden` when the
    /// role lacks the capability.
    pub async fn require(&self, capability: Capability) -> ApplicationResult<Session> {
        let session = self.guard().await?;
        if session.can(capability) {
            Ok(session)
        } else {
            Err(ApplicationError::Forbidden(format!("{capability:?}")))
        }
    }

    /// The expiry path, shared by [`Self::guard`] and 401 handling.
    ///
    /// The in-memory teardown runs before the first suspension point.
    /// Repeated calls while already expired do nothing.
    pub async fn expire(&self) {
        if self.state() == AuthState::Expired && !self.session.read().is_authenticated {
            return;
        }
        warn!("session expired, redirecting to sign-in");
        self.teardown(AuthState::Expired);
        self.navigator.navigate(Navigation::SignIn);
        if let Err(e) = self.resolver.forget().await {
            warn!(error = %e, "could not clear persisted credential");
        }
    }

    /// Ends the session on the user's request.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Storage` if the persisted credential
    /// cannot be removed. The in-memory session is gone regardless.
    pub async fn sign_out(&self) -> ApplicationResult<()> {
        info!("signed out");
        self.teardown(AuthState::SignedOut);
        self.resolver.forget().await
    }

    fn teardown(&self, next: AuthState) {
        *self.session.write() = Session::default();
        {
            let mut scope = self.scope.lock();
            scope.cancel();
            *scope = CancellationToken::new().0;
        }
        let hooks: Vec<ExpiryHook> = self.hooks.lock().clone();
        for hook in &hooks {
            hook();
        }
        self.state.send_replace(next);
    }
}
