//! Role membership directory (consumed interface).
//!
//! The directory answers two questions about a role's registered hosts:
//! exact endpoint containment (authorization of anonymous callers) and
//! "give me one host entry matching these criteria" (template expansion).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use arbor_core::{BackendError, RegistryError};

use crate::{Endpoint, RoleId};

/// One registered host of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Hostname, when registered by name.
    #[serde(default)]
    pub name: Option<String>,
    /// Address (or hostname) the host connects from.
    pub address: String,
    pub port: u16,
    /// Connection key the host must present, if any.
    #[serde(default)]
    pub cuk: Option<String>,
    /// Free-form attributes, filterable by lookups.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl HostEntry {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            name: None,
            address: address.into(),
            port,
            cuk: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_cuk(mut self, cuk: impl Into<String>) -> Self {
        self.cuk = Some(cuk.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Exact containment of a caller endpoint in this entry.
    ///
    /// The address must equal the entry's address or name; a supplied port must
    /// equal the entry's port; an entry declaring a connection key requires it.
    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        let address = endpoint.address.to_string();
        let address_matches = self.address == address || self.name.as_deref() == Some(address.as_str());
        let port_matches = endpoint.port.is_none_or(|p| p == self.port);
        let cuk_matches = match &self.cuk {
            Some(cuk) => endpoint.cuk.as_deref() == Some(cuk.as_str()),
            None => true,
        };
        address_matches && port_matches && cuk_matches
    }

    /// Whether this entry satisfies a lookup's match value and extra filter.
    pub fn matches(&self, query: &HostQuery) -> bool {
        let matched = match query.kind {
            HostQueryKind::Name => self.name.as_deref() == Some(query.match_value.as_str()),
            HostQueryKind::Ip => self.address == query.match_value,
        };
        matched
            && query
                .extra
                .as_ref()
                .is_none_or(|(k, v)| self.extra.get(k) == Some(v))
    }
}

/// Which host attribute a lookup matches on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostQueryKind {
    /// `/hosts/name`
    Name,
    /// `/hosts/ip`
    Ip,
}

impl HostQueryKind {
    pub fn as_path(&self) -> &'static str {
        match self {
            HostQueryKind::Name => "/hosts/name",
            HostQueryKind::Ip => "/hosts/ip",
        }
    }
}

impl core::str::FromStr for HostQueryKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "/hosts/name" => Ok(HostQueryKind::Name),
            "/hosts/ip" => Ok(HostQueryKind::Ip),
            other => Err(RegistryError::invalid_payload(format!(
                "host query must be /hosts/name or /hosts/ip (got '{other}')"
            ))),
        }
    }
}

/// Criteria for fetching one host entry of a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostQuery {
    pub kind: HostQueryKind,
    pub match_value: String,
    /// Preferred position among the matching entries.
    pub index_hint: usize,
    /// `(attribute, value)` the entry's extras must contain.
    pub extra: Option<(String, String)>,
}

/// Role membership directory (external).
pub trait MembershipDirectory: Send + Sync {
    /// Is `endpoint` registered as a host of `role`?
    fn is_member(&self, role: &RoleId, endpoint: &Endpoint) -> Result<bool, BackendError>;

    /// Fetch one host entry of `role` matching `query`, `Ok(None)` when nothing matches.
    fn lookup_host(&self, role: &RoleId, query: &HostQuery) -> Result<Option<HostEntry>, BackendError>;
}

impl<D> MembershipDirectory for Arc<D>
where
    D: MembershipDirectory + ?Sized,
{
    fn is_member(&self, role: &RoleId, endpoint: &Endpoint) -> Result<bool, BackendError> {
        (**self).is_member(role, endpoint)
    }

    fn lookup_host(&self, role: &RoleId, query: &HostQuery) -> Result<Option<HostEntry>, BackendError> {
        (**self).lookup_host(role, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(addr: &str, port: Option<u16>, cuk: Option<&str>) -> Endpoint {
        Endpoint {
            address: addr.parse().unwrap(),
            port,
            cuk: cuk.map(str::to_string),
        }
    }

    #[test]
    fn containment_is_exact() {
        let entry = HostEntry::new("10.0.0.5", 8080);
        assert!(entry.contains(&endpoint("10.0.0.5", None, None)));
        assert!(entry.contains(&endpoint("10.0.0.5", Some(8080), None)));
        assert!(!entry.contains(&endpoint("10.0.0.5", Some(9090), None)));
        assert!(!entry.contains(&endpoint("10.0.0.6", None, None)));
    }

    #[test]
    fn connection_key_is_required_when_registered() {
        let entry = HostEntry::new("10.0.0.5", 8080).with_cuk("secret");
        assert!(!entry.contains(&endpoint("10.0.0.5", None, None)));
        assert!(!entry.contains(&endpoint("10.0.0.5", None, Some("other"))));
        assert!(entry.contains(&endpoint("10.0.0.5", None, Some("secret"))));
    }

    #[test]
    fn lookup_matching_uses_kind_and_extra() {
        let entry = HostEntry::new("10.0.0.5", 5432)
            .with_name("db01")
            .with_extra("zone", "eu");

        let mut query = HostQuery {
            kind: HostQueryKind::Name,
            match_value: "db01".into(),
            index_hint: 0,
            extra: None,
        };
        assert!(entry.matches(&query));

        query.extra = Some(("zone".into(), "us".into()));
        assert!(!entry.matches(&query));

        query.extra = Some(("zone".into(), "eu".into()));
        assert!(entry.matches(&query));

        query.kind = HostQueryKind::Ip;
        assert!(!entry.matches(&query));
        query.match_value = "10.0.0.5".into();
        assert!(entry.matches(&query));
    }

    #[test]
    fn query_kind_parses_paths() {
        assert_eq!("/hosts/name".parse::<HostQueryKind>().unwrap(), HostQueryKind::Name);
        assert_eq!("/hosts/ip".parse::<HostQueryKind>().unwrap(), HostQueryKind::Ip);
        assert!("/hosts/mac".parse::<HostQueryKind>().is_err());
    }
}
