//! Collaborator traits owned by this layer and in-memory implementations of
//! every collaborator the registry consumes.

pub mod directory;
pub mod resources;

pub use directory::{InMemoryMembershipDirectory, InMemoryPolicyStore, InMemoryTokenService};
pub use resources::{InMemoryResourceRepository, ResourceRepository};
