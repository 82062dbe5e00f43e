use serde::Serialize;

use arbor_core::TenantId;

use crate::{Endpoint, RoleId};

/// A classified caller, the outcome of credential identification.
///
/// Construction is decoupled from transport: the engine derives it from a
/// [`crate::Credential`] through the token service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum CallerIdentity {
    /// Full access within one tenant.
    Tenant { tenant: TenantId },

    /// Policy-gated access through a role.
    Role { tenant: TenantId, role: RoleId },

    /// Membership-and-policy-gated access for an unauthenticated endpoint.
    Anonymous { role: RoleId, endpoint: Endpoint },
}

impl CallerIdentity {
    /// Tenant the caller acts within.
    pub fn tenant(&self) -> &TenantId {
        match self {
            CallerIdentity::Tenant { tenant } | CallerIdentity::Role { tenant, .. } => tenant,
            CallerIdentity::Anonymous { role, .. } => role.tenant(),
        }
    }

    pub fn role(&self) -> Option<&RoleId> {
        match self {
            CallerIdentity::Tenant { .. } => None,
            CallerIdentity::Role { role, .. } | CallerIdentity::Anonymous { role, .. } => Some(role),
        }
    }

    /// Only tenant-scoped callers may set or clear aliases.
    pub fn may_set_aliases(&self) -> bool {
        matches!(self, CallerIdentity::Tenant { .. })
    }

    pub fn scope(&self) -> &'static str {
        match self {
            CallerIdentity::Tenant { .. } => "tenant",
            CallerIdentity::Role { .. } => "role",
            CallerIdentity::Anonymous { .. } => "anonymous",
        }
    }
}
