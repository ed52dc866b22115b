//! Optimistic mutations.

mod coordinator;
mod patch;

pub use coordinator::{Mutation, MutationCoordinator, Settle};
pub use patch::{Patch, identity};
