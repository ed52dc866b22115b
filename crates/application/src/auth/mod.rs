//! Authentication for the sync core.
//!
//! This module provides:
//! - Token resolution with a fixed precedence (memory, then persisted)
//! - The session guard and its expiry protocol

mod guard;
mod token_resolver;

pub use guard::{AuthGuard, AuthState};
pub use token_resolver::TokenResolver;
