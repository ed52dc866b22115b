//! Deterministic JSON files for local state.
//!
//! Files are written with 2-space indentation and a trailing newline, and
//! replaced atomically so a crash never leaves a half-written credential.

mod json;

pub use json::*;
