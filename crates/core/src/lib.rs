//! `arbor-core`: identifiers, the resource record model and error kinds.
//!
//! This crate contains **pure** primitives (no IO, no collaborator access).

pub mod error;
pub mod id;
pub mod identifier;
pub mod record;

pub use error::{Backend, BackendError, RegistryError, RegistryResult};
pub use id::{PolicyId, TenantId};
pub use identifier::{IdContext, ResourceId, DEFAULT_KIND};
pub use record::{FieldSelector, FieldType, Resource, ResourcePatch, WriteOutcome};
