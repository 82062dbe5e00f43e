//! In-memory authorization collaborators: role membership, policies, tokens.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use arbor_auth::{Endpoint, HostEntry, HostQuery, MembershipDirectory, Policy, PolicyStore, RoleId, TokenGrant, TokenService};
use arbor_core::{Backend, BackendError};

/// Role → registered hosts.
#[derive(Debug, Default)]
pub struct InMemoryMembershipDirectory {
    hosts: RwLock<HashMap<RoleId, Vec<HostEntry>>>,
}

impl InMemoryMembershipDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host under `role`; registration order is lookup order.
    pub fn register(&self, role: RoleId, entry: HostEntry) -> Result<(), BackendError> {
        let mut hosts = self
            .hosts
            .write()
            .map_err(|_| BackendError::poisoned(Backend::MembershipDirectory))?;
        hosts.entry(role).or_default().push(entry);
        Ok(())
    }
}

impl MembershipDirectory for InMemoryMembershipDirectory {
    fn is_member(&self, role: &RoleId, endpoint: &Endpoint) -> Result<bool, BackendError> {
        let hosts = self
            .hosts
            .read()
            .map_err(|_| BackendError::poisoned(Backend::MembershipDirectory))?;
        Ok(hosts
            .get(role)
            .is_some_and(|entries| entries.iter().any(|h| h.contains(endpoint))))
    }

    /// The `index_hint`-th matching entry, or the first match when the hint is out of range.
    fn lookup_host(&self, role: &RoleId, query: &HostQuery) -> Result<Option<HostEntry>, BackendError> {
        let hosts = self
            .hosts
            .read()
            .map_err(|_| BackendError::poisoned(Backend::MembershipDirectory))?;
        let matching: Vec<&HostEntry> = hosts
            .get(role)
            .map(|entries| entries.iter().filter(|h| h.matches(query)).collect())
            .unwrap_or_default();

        let found = matching
            .get(query.index_hint)
            .or_else(|| matching.first())
            .map(|h| (*h).clone());
        debug!(%role, query = %query.match_value, matches = matching.len(), "host lookup");
        Ok(found)
    }
}

/// Role → attached (effective) policies.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<HashMap<RoleId, Vec<Policy>>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, role: RoleId, policy: Policy) -> Result<(), BackendError> {
        let mut policies = self
            .policies
            .write()
            .map_err(|_| BackendError::poisoned(Backend::PolicyStore))?;
        policies.entry(role).or_default().push(policy);
        Ok(())
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn policies_for(&self, role: &RoleId) -> Result<Vec<Policy>, BackendError> {
        let policies = self
            .policies
            .read()
            .map_err(|_| BackendError::poisoned(Backend::PolicyStore))?;
        Ok(policies.get(role).cloned().unwrap_or_default())
    }
}

/// Opaque token → grant.
#[derive(Debug, Default)]
pub struct InMemoryTokenService {
    grants: RwLock<HashMap<String, TokenGrant>>,
}

impl InMemoryTokenService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, token: impl Into<String>, grant: TokenGrant) -> Result<(), BackendError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| BackendError::poisoned(Backend::TokenService))?;
        grants.insert(token.into(), grant);
        Ok(())
    }

    pub fn revoke(&self, token: &str) -> Result<bool, BackendError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| BackendError::poisoned(Backend::TokenService))?;
        Ok(grants.remove(token).is_some())
    }
}

impl TokenService for InMemoryTokenService {
    fn resolve(&self, token: &str) -> Result<Option<TokenGrant>, BackendError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| BackendError::poisoned(Backend::TokenService))?;
        Ok(grants.get(token).cloned())
    }
}
