//! Infrastructure layer: collaborator stores, resolution, configuration and
//! the request-level registry engine.

pub mod config;
pub mod engine;
pub mod resolver;
pub mod store;


pub use config::RegistryConfig;
pub use engine::{ReadOptions, RegistryEngine, RequestContext, TMPVAL_KEY, WritePayload};
pub use resolver::{Contribution, Resolution, Via, resolve};
pub use store::{
    InMemoryMembershipDirectory, InMemoryPolicyStore, InMemoryResourceRepository, InMemoryTokenService,
    ResourceRepository,
};
