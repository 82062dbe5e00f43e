//! Hierarchical resource identifiers.
//!
//! Three textual forms are accepted:
//!
//! ```text
//! scheme:provider:service::tenant:kind:path     full (service-scoped)
//! tenant:kind:path                              short (never service-scoped)
//! path                                          bare (tenant/service/kind from context)
//! ```
//!
//! Paths are `/`-segmented. A record stored at a proper prefix of a deeper path
//! is an *ancestor* of it.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::id::TenantId;

/// Kind used when neither the identifier nor the context names one.
pub const DEFAULT_KIND: &str = "resource";

const CANONICAL_SCHEME: &str = "arn";
const CANONICAL_PROVIDER: &str = "arbor";

/// Request-scoped defaults used to complete bare identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdContext {
    pub tenant: Option<TenantId>,
    pub service: Option<String>,
    pub kind: Option<String>,
}

impl IdContext {
    pub fn for_tenant(tenant: TenantId) -> Self {
        Self {
            tenant: Some(tenant),
            ..Self::default()
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    fn kind_or_default(&self) -> &str {
        self.kind.as_deref().unwrap_or(DEFAULT_KIND)
    }
}

/// Normalized identity of a resource (or a role).
///
/// Equality, ordering and hashing consider tenant, service, kind and segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    tenant: TenantId,
    service: Option<String>,
    kind: String,
    segments: Vec<String>,
}

impl ResourceId {
    /// Build an identifier from already separated parts.
    pub fn new(
        tenant: TenantId,
        service: Option<String>,
        kind: impl Into<String>,
        path: &str,
    ) -> Result<Self, RegistryError> {
        let kind = kind.into();
        validate_word("kind", &kind)?;
        let service = match service {
            Some(s) if s.is_empty() => None,
            Some(s) => {
                validate_word("service", &s)?;
                Some(s)
            }
            None => None,
        };
        let segments = split_path(path)?;
        Ok(Self {
            tenant,
            service,
            kind,
            segments,
        })
    }

    /// Parse any of the accepted textual forms, completing missing parts from `ctx`.
    pub fn parse(input: &str, ctx: &IdContext) -> Result<Self, RegistryError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RegistryError::malformed("identifier is empty"));
        }

        let full: Vec<&str> = input.splitn(7, ':').collect();
        if let [scheme, provider, service, "", tenant, kind, path] = full[..] {
            if scheme.is_empty() || provider.is_empty() {
                return Err(RegistryError::malformed(format!(
                    "'{input}': scheme and provider are required in the full form"
                )));
            }
            let tenant = tenant_or_context(tenant, ctx, input)?;
            let service = (!service.is_empty()).then(|| service.to_string());
            return Self::new(tenant, service, kind, path);
        }

        let short: Vec<&str> = input.splitn(3, ':').collect();
        match short[..] {
            [path] => {
                let tenant = ctx
                    .tenant
                    .clone()
                    .ok_or_else(|| RegistryError::malformed(format!("'{input}': no tenant in identifier or context")))?;
                Self::new(tenant, ctx.service.clone(), ctx.kind_or_default(), path)
            }
            [tenant, kind, path] => {
                let tenant = tenant_or_context(tenant, ctx, input)?;
                let kind = if kind.is_empty() { ctx.kind_or_default() } else { kind };
                Self::new(tenant, None, kind, path)
            }
            _ => Err(RegistryError::malformed(format!(
                "'{input}': expected 'tenant:kind:path', a full identifier or a bare path"
            ))),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The `/`-joined path.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// Depth of the path (number of segments, always >= 1).
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Proper ancestors, shortest path first.
    pub fn ancestors(&self) -> impl Iterator<Item = ResourceId> + '_ {
        (1..self.segments.len()).map(move |len| self.truncated(len))
    }

    /// The direct parent, if any.
    pub fn parent(&self) -> Option<ResourceId> {
        (self.segments.len() > 1).then(|| self.truncated(self.segments.len() - 1))
    }

    /// Identifier for a child path below this one.
    pub fn child(&self, segment: &str) -> Result<ResourceId, RegistryError> {
        let mut extra = split_path(segment)?;
        let mut segments = self.segments.clone();
        segments.append(&mut extra);
        Ok(Self {
            segments,
            ..self.clone()
        })
    }

    /// True if `self` is a proper path-ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &ResourceId) -> bool {
        self.same_namespace(other)
            && self.segments.len() < other.segments.len()
            && other.segments.starts_with(&self.segments)
    }

    /// True if `self` equals `other` or is a path-ancestor of it.
    pub fn covers(&self, other: &ResourceId) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    fn same_namespace(&self, other: &ResourceId) -> bool {
        self.tenant == other.tenant && self.service == other.service && self.kind == other.kind
    }

    fn truncated(&self, len: usize) -> ResourceId {
        ResourceId {
            tenant: self.tenant.clone(),
            service: self.service.clone(),
            kind: self.kind.clone(),
            segments: self.segments[..len].to_vec(),
        }
    }
}

impl core::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.service {
            Some(service) => write!(
                f,
                "{CANONICAL_SCHEME}:{CANONICAL_PROVIDER}:{service}::{}:{}:{}",
                self.tenant,
                self.kind,
                self.path()
            ),
            None => write!(f, "{}:{}:{}", self.tenant, self.kind, self.path()),
        }
    }
}

impl FromStr for ResourceId {
    type Err = RegistryError;

    /// Parse without context (bare paths are rejected for lack of a tenant).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, &IdContext::default())
    }
}

impl TryFrom<String> for ResourceId {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceId> for String {
    fn from(value: ResourceId) -> Self {
        value.to_string()
    }
}

fn tenant_or_context(raw: &str, ctx: &IdContext, input: &str) -> Result<TenantId, RegistryError> {
    if raw.is_empty() {
        ctx.tenant
            .clone()
            .ok_or_else(|| RegistryError::malformed(format!("'{input}': no tenant in identifier or context")))
    } else {
        TenantId::new(raw)
    }
}

fn validate_word(what: &str, value: &str) -> Result<(), RegistryError> {
    if value.is_empty() {
        return Err(RegistryError::malformed(format!("{what} is empty")));
    }
    if value.contains([':', '/']) || value.chars().any(char::is_whitespace) {
        return Err(RegistryError::malformed(format!("{what} '{value}' contains a reserved character")));
    }
    Ok(())
}

fn split_path(path: &str) -> Result<Vec<String>, RegistryError> {
    let segments: Vec<String> = path
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if segments.is_empty() {
        return Err(RegistryError::malformed(format!("path '{path}' has no segments")));
    }
    if let Some(bad) = segments.iter().find(|s| *s == "." || *s == "..") {
        return Err(RegistryError::malformed(format!("path segment '{bad}' is not allowed")));
    }
    Ok(segments)
}
