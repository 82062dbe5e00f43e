//! Registry error model.

use thiserror::Error;

/// Result type used across the registry core.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Caller-facing error kinds.
///
/// Transport layers map these onto their own status codes via [`RegistryError::code`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The credential is unknown, expired or otherwise unusable.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The identifier could not be parsed or lacks a tenant/path.
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// The request payload has the wrong shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The caller is authenticated but not permitted to act on the target.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An anonymous caller's endpoint is not registered under the declared role.
    #[error("endpoint is not a member of role {role}: {endpoint}")]
    NotMember { role: String, endpoint: String },

    /// The target record (or the requested part of it) does not exist.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A non tenant-scoped caller attempted to set or clear aliases.
    #[error("aliases may only be set with a tenant credential{}", alias_list(.0))]
    AliasNotAllowed(Vec<String>),

    /// A collaborator (repository, directory, policy store, token service) failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl RegistryError {
    pub fn invalid_credential(msg: impl Into<String>) -> Self {
        Self::InvalidCredential(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedIdentifier(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::ResourceNotFound(msg.into())
    }

    /// Stable snake_case code for transport mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredential(_) => "invalid_credential",
            Self::MalformedIdentifier(_) => "malformed_identifier",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Forbidden(_) => "forbidden",
            Self::NotMember { .. } => "not_member",
            Self::ResourceNotFound(_) => "resource_not_found",
            Self::AliasNotAllowed(_) => "alias_not_allowed",
            Self::Backend(_) => "backend_error",
        }
    }

    /// True for the denial kinds a full read hides behind "not found".
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Forbidden(_) | Self::NotMember { .. })
    }
}

fn alias_list(aliases: &[String]) -> String {
    if aliases.is_empty() {
        String::new()
    } else {
        format!(": {}", aliases.join(", "))
    }
}

/// The external collaborator a [`BackendError`] originated from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Backend {
    ResourceRepository,
    MembershipDirectory,
    PolicyStore,
    TokenService,
}

impl core::fmt::Display for Backend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Backend::ResourceRepository => "resource repository",
            Backend::MembershipDirectory => "membership directory",
            Backend::PolicyStore => "policy store",
            Backend::TokenService => "token service",
        })
    }
}

/// Failure reported by one of the external collaborators.
///
/// Never retried by the core; propagated unchanged to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{backend} failure: {message}")]
pub struct BackendError {
    pub backend: Backend,
    pub message: String,
}

impl BackendError {
    pub fn new(backend: Backend, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
        }
    }

    /// Shorthand for a poisoned in-process lock.
    pub fn poisoned(backend: Backend) -> Self {
        Self::new(backend, "lock poisoned")
    }
}
