//! Session and credential types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};
use crate::role::{Capability, Role};

/// Identifier of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user id, rejecting blank values.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidIdentifier` if `value` is empty or whitespace.
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidIdentifier("user id is empty".to_string()));
        }
        Ok(Self(value))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bearer credential.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Wraps a raw bearer token. Returns `None` for blank input.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the value of an `Authorization` header carrying this token.
    #[must_use]
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// The authenticated session of the current user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    /// Signed-in user, if any.
    pub subject: Option<UserId>,
    /// Role of the signed-in user.
    pub role: Option<Role>,
    /// Bearer credential.
    pub token: Option<Token>,
    /// Whether sign-in completed.
    pub is_authenticated: bool,
}

impl Session {
    /// Creates an authenticated session.
    #[must_use]
    pub const fn signed_in(subject: UserId, role: Role, token: Token) -> Self {
        Self {
            subject: Some(subject),
            role: Some(role),
            token: Some(token),
            is_authenticated: true,
        }
    }

    /// Creates a session from a persisted credential.
    #[must_use]
    pub fn from_credential(credential: StoredCredential) -> Self {
        Self::signed_in(credential.subject, credential.role, credential.token)
    }

    /// Returns true iff authenticated with both a token and a subject.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.is_authenticated && self.token.is_some() && self.subject.is_some()
    }

    /// Returns true if the session's role grants `capability`.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        self.is_valid() && self.role.is_some_and(|role| role.can(capability))
    }

    /// Returns the persistable form of a valid session.
    #[must_use]
    pub fn credential(&self) -> Option<StoredCredential> {
        if !self.is_valid() {
            return None;
        }
        Some(StoredCredential {
            subject: self.subject.clone()?,
            role: self.role?,
            token: self.token.clone()?,
        })
    }
}

/// Credential persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Signed-in user.
    pub subject: UserId,
    /// Role of the user.
    pub role: Role,
    /// Bearer credential.
    pub token: Token,
}
