//! `arbor-auth`: credential classification and authorization decisions.
//!
//! This crate is decoupled from transport and storage: token, policy and
//! membership lookups go through the collaborator traits defined here.

pub mod action;
pub mod authorize;
pub mod credential;
pub mod membership;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod token;

pub use action::Action;
pub use authorize::{Authorizer, AuthzError, Grant};
pub use credential::{Credential, Endpoint, GrantValidationError, TokenGrant, TokenKind, validate_grant};
pub use membership::{HostEntry, HostQuery, HostQueryKind, MembershipDirectory};
pub use policy::{Effect, PermitExplanation, Policy, PolicyStore, explain_permission, permits, policies_permit};
pub use principal::CallerIdentity;
pub use roles::RoleId;
pub use token::TokenService;
