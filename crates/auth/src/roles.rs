use core::str::FromStr;

use serde::{Deserialize, Serialize};

use arbor_core::{IdContext, RegistryError, ResourceId, TenantId};

/// Kind used for role identifiers written without one.
pub const ROLE_KIND: &str = "role";

/// Identity of a role.
///
/// Roles are named with the same hierarchical identifiers as resources
/// (`tenant:role:path`), which pins every role to exactly one tenant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(ResourceId);

impl RoleId {
    pub fn new(id: ResourceId) -> Self {
        Self(id)
    }

    /// Parse a role identifier; bare names take the tenant from `ctx` and kind `role`.
    pub fn parse(input: &str, ctx: &IdContext) -> Result<Self, RegistryError> {
        let ctx = IdContext {
            kind: Some(ROLE_KIND.to_string()),
            ..ctx.clone()
        };
        ResourceId::parse(input, &ctx).map(Self)
    }

    pub fn tenant(&self) -> &TenantId {
        self.0.tenant()
    }

    pub fn as_resource_id(&self) -> &ResourceId {
        &self.0
    }
}

impl core::fmt::Display for RoleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RoleId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, &IdContext::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_role_names_get_role_kind() {
        let ctx = IdContext::for_tenant(TenantId::new("acme").unwrap());
        let role = RoleId::parse("web", &ctx).unwrap();
        assert_eq!(role.to_string(), "acme:role:web");
        assert_eq!(role.tenant().as_str(), "acme");
    }

    #[test]
    fn explicit_role_identifiers_keep_their_kind() {
        let role: RoleId = "acme:role:ops/oncall".parse().unwrap();
        assert_eq!(role.as_resource_id().kind(), "role");
        assert_eq!(role.as_resource_id().segments(), ["ops", "oncall"]);
    }
}
