//! Request orchestration for the registry.
//!
//! Every exposed operation runs the same pipeline:
//!
//! ```text
//! RequestContext + identifier
//!   ↓
//! 1. Identify the caller (token service / anonymous role claim)
//!   ↓
//! 2. Parse the target identifier (bare forms complete from the context)
//!   ↓
//! 3. Authorize (tenant, alias rule, policy, membership)
//!   ↓
//! 4. Execute: resolve + render (reads) or merge/clear (writes)
//! ```
//!
//! The engine holds no per-request state; collaborators are injected and may
//! be shared behind `Arc`.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument};

use arbor_auth::{Action, Authorizer, CallerIdentity, Credential, HostEntry, MembershipDirectory, PolicyStore, TokenService};
use arbor_core::{
    FieldSelector, FieldType, IdContext, RegistryError, RegistryResult, ResourceId, ResourcePatch, TenantId,
    WriteOutcome,
};
use arbor_template::{TemplateEngine, host_value};

use crate::config::RegistryConfig;
use crate::resolver::{Resolution, resolve};
use crate::store::ResourceRepository;

/// Key under which an expanded read exposes the last host bound from the directory.
pub const TMPVAL_KEY: &str = "tmpval";

/// Per-request caller data supplied by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub credential: Credential,
    /// Peer address; required for anonymous callers.
    pub remote: Option<IpAddr>,
    /// Tenant for bare identifiers.
    pub tenant: Option<TenantId>,
    /// Service for bare identifiers; falls back to the configured default.
    pub service: Option<String>,
}

impl RequestContext {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            remote: None,
            tenant: None,
            service: None,
        }
    }

    pub fn with_remote(mut self, remote: IpAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// What a read returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Expand templates instead of returning their source.
    pub expand: bool,
    pub field: Option<FieldType>,
    /// Single `keys` entry to return.
    pub key: Option<String>,
}

impl ReadOptions {
    pub fn expanded(mut self) -> Self {
        self.expand = true;
        self
    }

    pub fn field(mut self, field: FieldType) -> Self {
        self.field = Some(field);
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.field = Some(FieldType::Keys);
        self.key = Some(key.into());
        self
    }
}

/// Write request body. Aliases stay textual until the caller is authorized,
/// so a rejection can name them as supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WritePayload {
    pub string: Option<String>,
    pub object: Option<Value>,
    pub expire: Option<DateTime<Utc>>,
    pub keys: Option<BTreeMap<String, Value>>,
    pub aliases: Option<Vec<String>>,
}

impl WritePayload {
    pub fn is_empty(&self) -> bool {
        self.string.is_none()
            && self.object.is_none()
            && self.expire.is_none()
            && self.keys.is_none()
            && self.aliases.is_none()
    }

    /// Bare alias paths complete from the target's tenant, service and kind.
    fn into_patch(self, target: &ResourceId) -> RegistryResult<ResourcePatch> {
        let aliases = match self.aliases {
            Some(values) => {
                let ctx = IdContext {
                    tenant: Some(target.tenant().clone()),
                    service: target.service().map(str::to_string),
                    kind: Some(target.kind().to_string()),
                };
                let parsed = values
                    .iter()
                    .map(|value| {
                        let alias = ResourceId::parse(value, &ctx)
                            .map_err(|e| RegistryError::invalid_payload(format!("alias '{value}': {e}")))?;
                        if alias.tenant() != target.tenant() {
                            return Err(RegistryError::invalid_payload(format!(
                                "alias '{value}' belongs to tenant {}, not {}",
                                alias.tenant(),
                                target.tenant()
                            )));
                        }
                        Ok(alias)
                    })
                    .collect::<RegistryResult<Vec<_>>>()?;
                Some(parsed)
            }
            None => None,
        };

        Ok(ResourcePatch {
            string: self.string,
            object: self.object,
            expire: self.expire,
            keys: self.keys,
            aliases,
        })
    }
}

/// Authorization-aware registry operations over injected collaborators.
///
/// ## Generic Parameters
///
/// - `R`: resource repository
/// - `T`: token service
/// - `P`: policy store
/// - `D`: role membership directory
#[derive(Debug)]
pub struct RegistryEngine<R, T, P, D> {
    resources: R,
    tokens: T,
    policies: P,
    directory: D,
    config: RegistryConfig,
    templates: TemplateEngine,
}

impl<R, T, P, D> RegistryEngine<R, T, P, D> {
    pub fn new(resources: R, tokens: T, policies: P, directory: D, config: RegistryConfig) -> Self {
        let templates = TemplateEngine::new(config.template_marker.clone());
        Self {
            resources,
            tokens,
            policies,
            directory,
            config,
            templates,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    fn id_context(&self, ctx: &RequestContext) -> IdContext {
        IdContext {
            tenant: ctx.tenant.clone(),
            service: ctx.service.clone().or_else(|| self.config.default_service.clone()),
            kind: Some(self.config.default_kind.clone()),
        }
    }
}

impl<R, T, P, D> RegistryEngine<R, T, P, D>
where
    R: ResourceRepository,
    T: TokenService,
    P: PolicyStore,
    D: MembershipDirectory,
{
    fn authorizer(&self) -> Authorizer<'_> {
        Authorizer::new(&self.tokens, &self.policies, &self.directory)
    }

    /// Identify the caller, then parse `id`; bare identifiers fall back to the caller's tenant.
    fn caller_and_target(&self, ctx: &RequestContext, id: &str) -> RegistryResult<(CallerIdentity, ResourceId)> {
        let mut id_ctx = self.id_context(ctx);
        let identity = self
            .authorizer()
            .identify(&ctx.credential, ctx.remote, &id_ctx, Utc::now())?;
        if id_ctx.tenant.is_none() {
            id_ctx.tenant = Some(identity.tenant().clone());
        }
        let target = ResourceId::parse(id, &id_ctx)?;
        Ok((identity, target))
    }

    /// `readResource`: the merged view of `id`, a single slot of it, or one key.
    #[instrument(skip(self, ctx, options), fields(expand = options.expand), err)]
    pub fn read_resource(&self, ctx: &RequestContext, id: &str, options: &ReadOptions) -> RegistryResult<Value> {
        if options.key.is_some() && !matches!(options.field, None | Some(FieldType::Keys)) {
            return Err(RegistryError::invalid_payload("a key name can only be read from keys"));
        }

        let (identity, target) = self.caller_and_target(ctx, id)?;
        if let Err(err) = self.authorizer().authorize(&identity, &target, Action::Read, None) {
            return Err(self.mask_denial(err.into(), &target));
        }

        let resolution = resolve(&self.resources, &target)?;
        self.view(&resolution, options)
    }

    /// Existence probe; denials are reported as they are.
    #[instrument(skip(self, ctx), err)]
    pub fn probe_resource(&self, ctx: &RequestContext, id: &str) -> RegistryResult<bool> {
        let (identity, target) = self.caller_and_target(ctx, id)?;
        self.authorizer().authorize(&identity, &target, Action::Read, None)?;
        Ok(self.resources.get(&target)?.is_some())
    }

    /// `writeResource`: create or merge.
    #[instrument(skip(self, ctx, payload), err)]
    pub fn write_resource(&self, ctx: &RequestContext, id: &str, payload: WritePayload) -> RegistryResult<WriteOutcome> {
        if payload.is_empty() {
            return Err(RegistryError::invalid_payload(
                "payload sets none of: string, object, expire, keys, aliases",
            ));
        }

        let (identity, target) = self.caller_and_target(ctx, id)?;
        self.authorizer()
            .authorize(&identity, &target, Action::Write, payload.aliases.as_deref())?;

        let patch = payload.into_patch(&target)?;
        let (record, outcome) = self.resources.put(&target, patch)?;
        info!(%target, scope = identity.scope(), ?outcome, keys = record.keys.len(), "resource written");
        Ok(outcome)
    }

    /// `deleteResource`: clear one slot (optionally only the named keys or
    /// aliases), or the whole record when no field is given.
    #[instrument(skip(self, ctx, names), err)]
    pub fn delete_resource(
        &self,
        ctx: &RequestContext,
        id: &str,
        field: Option<FieldType>,
        names: Vec<String>,
    ) -> RegistryResult<()> {
        if !names.is_empty() && !matches!(field, Some(FieldType::Keys | FieldType::Aliases)) {
            return Err(RegistryError::invalid_payload("names can only narrow a keys or aliases delete"));
        }
        let selector = FieldSelector::from_parts(field, names);

        let (identity, target) = self.caller_and_target(ctx, id)?;
        let aliases = match &selector {
            FieldSelector::Field {
                field: FieldType::Aliases,
                names,
            } => Some(names.as_slice()),
            _ => None,
        };
        self.authorizer()
            .authorize(&identity, &target, Action::Write, aliases)?;

        if !self.resources.delete_fields(&target, &selector)? {
            return Err(RegistryError::not_found(target.to_string()));
        }
        info!(%target, scope = identity.scope(), ?selector, "resource deleted");
        Ok(())
    }

    fn mask_denial(&self, err: RegistryError, target: &ResourceId) -> RegistryError {
        if self.config.mask_read_denials && err.is_denial() {
            debug!(%target, error = %err, "read denial masked");
            RegistryError::not_found(target.to_string())
        } else {
            err
        }
    }

    /// Exposed `string` plus the host to surface as `tmpval`.
    fn render(&self, resolution: &Resolution, expand: bool) -> RegistryResult<(Option<String>, Option<HostEntry>)> {
        let sources = resolution.section_sources();
        if !self.templates.applies(&sources) {
            return Ok((resolution.target().string.clone(), None));
        }
        if !expand {
            return Ok((Some(self.templates.render_raw(&sources)), None));
        }

        let expansion = self
            .templates
            .render_expanded(&sources, &resolution.merged_keys(), &self.directory)?;
        if expansion.degraded > 0 {
            debug!(resource = %resolution.target().id, degraded = expansion.degraded, "template partially expanded");
        }
        Ok((Some(expansion.text), expansion.last_host))
    }

    fn view(&self, resolution: &Resolution, options: &ReadOptions) -> RegistryResult<Value> {
        let target = resolution.target();
        let needs_string = matches!(options.field, None | Some(FieldType::String));
        let needs_host = options.expand && matches!(options.field, None | Some(FieldType::Keys));
        let (string, last_host) = if needs_string || needs_host {
            self.render(resolution, options.expand)?
        } else {
            (None, None)
        };

        let mut keys = resolution.merged_keys();
        if let Some(host) = &last_host {
            keys.insert(TMPVAL_KEY.to_string(), host_value(host));
        }
        let aliases: Vec<String> = resolution.aliases().iter().map(ToString::to_string).collect();

        let value = match (options.field, &options.key) {
            (_, Some(key)) => keys
                .remove(key)
                .ok_or_else(|| RegistryError::not_found(format!("key '{key}' of {}", target.id)))?,
            (None, None) => json!({
                "string": string,
                "object": target.object,
                "expire": target.expire,
                "keys": keys,
                "aliases": aliases,
            }),
            (Some(FieldType::String), None) => string.map(Value::String).unwrap_or(Value::Null),
            (Some(FieldType::Object), None) => target.object.clone().unwrap_or(Value::Null),
            (Some(FieldType::Expire), None) => json!(target.expire),
            (Some(FieldType::Keys), None) => Value::Object(keys.into_iter().collect::<Map<String, Value>>()),
            (Some(FieldType::Aliases), None) => json!(aliases),
        };
        Ok(value)
    }
}
