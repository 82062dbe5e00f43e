//! Per-request authorization state machine.
//!
//! ```text
//! IdentifyCredential ─┬─ TenantScoped ─┐
//!                     ├─ RoleScoped ───┼─ Authorize ─┬─ Granted ── Execute
//!                     └─ Anonymous ────┘             └─ Denied
//! ```
//!
//! Identification consults the token service; authorization consults the
//! policy store and, for anonymous callers, the membership directory. Nothing
//! here retries; collaborator failures surface as [`AuthzError::Backend`].

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use arbor_core::{BackendError, IdContext, RegistryError, ResourceId, TenantId};

use crate::policy::explain_permission;
use crate::{
    Action, CallerIdentity, Credential, Endpoint, MembershipDirectory, PermitExplanation, PolicyStore, RoleId,
    TokenService,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("tenant mismatch: caller acts in {caller}, target belongs to {target}")]
    TenantMismatch { caller: TenantId, target: TenantId },

    #[error("forbidden: role {role} may not {action} {target}")]
    Forbidden {
        role: RoleId,
        action: Action,
        target: ResourceId,
    },

    #[error("endpoint {endpoint} is not a member of role {role}")]
    NotMember { role: RoleId, endpoint: Endpoint },

    #[error("aliases may only be set with a tenant credential")]
    AliasNotAllowed(Vec<String>),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<AuthzError> for RegistryError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::InvalidCredential(msg) => RegistryError::InvalidCredential(msg),
            e @ AuthzError::TenantMismatch { .. } => RegistryError::Forbidden(e.to_string()),
            e @ AuthzError::Forbidden { .. } => RegistryError::Forbidden(e.to_string()),
            AuthzError::NotMember { role, endpoint } => RegistryError::NotMember {
                role: role.to_string(),
                endpoint: endpoint.to_string(),
            },
            AuthzError::AliasNotAllowed(values) => RegistryError::AliasNotAllowed(values),
            AuthzError::Backend(e) => RegistryError::Backend(e),
        }
    }
}

/// A granted authorization decision.
#[derive(Debug, Clone)]
pub struct Grant {
    pub identity: CallerIdentity,
    pub action: Action,
    pub target: ResourceId,
    /// Policy explanation for role-scoped and anonymous grants.
    pub explanation: Option<PermitExplanation>,
}

/// Authorization engine over the injected collaborators.
///
/// Holds only borrowed collaborator handles; one instance can serve any
/// number of concurrent requests.
pub struct Authorizer<'a> {
    tokens: &'a dyn TokenService,
    policies: &'a dyn PolicyStore,
    directory: &'a dyn MembershipDirectory,
}

impl<'a> Authorizer<'a> {
    pub fn new(
        tokens: &'a dyn TokenService,
        policies: &'a dyn PolicyStore,
        directory: &'a dyn MembershipDirectory,
    ) -> Self {
        Self {
            tokens,
            policies,
            directory,
        }
    }

    /// `IdentifyCredential`: classify the caller.
    ///
    /// `remote` is the caller's network address (required for anonymous access);
    /// `ctx` completes bare role names.
    pub fn identify(
        &self,
        credential: &Credential,
        remote: Option<IpAddr>,
        ctx: &IdContext,
        now: DateTime<Utc>,
    ) -> Result<CallerIdentity, AuthzError> {
        let identity = match credential {
            Credential::Session { token } => {
                let grant = self
                    .tokens
                    .resolve(token)?
                    .ok_or_else(|| AuthzError::InvalidCredential("unknown token".to_string()))?;
                grant
                    .into_identity(now)
                    .map_err(|e| AuthzError::InvalidCredential(e.to_string()))?
            }
            Credential::Anonymous { role, port, cuk } => {
                let address = remote.ok_or_else(|| {
                    AuthzError::InvalidCredential("anonymous access requires a remote address".to_string())
                })?;
                let role = RoleId::parse(role, ctx).map_err(|e| AuthzError::InvalidCredential(e.to_string()))?;
                CallerIdentity::Anonymous {
                    role,
                    endpoint: Endpoint {
                        address,
                        port: *port,
                        cuk: cuk.clone(),
                    },
                }
            }
        };

        debug!(scope = identity.scope(), tenant = %identity.tenant(), "credential identified");
        Ok(identity)
    }

    /// `Authorize`: decide whether `identity` may perform `action` on `target`.
    ///
    /// `aliases` carries the alias values the request sets or clears, if any.
    pub fn authorize(
        &self,
        identity: &CallerIdentity,
        target: &ResourceId,
        action: Action,
        aliases: Option<&[String]>,
    ) -> Result<Grant, AuthzError> {
        if identity.tenant() != target.tenant() {
            return Err(AuthzError::TenantMismatch {
                caller: identity.tenant().clone(),
                target: target.tenant().clone(),
            });
        }

        if let Some(values) = aliases {
            if !identity.may_set_aliases() {
                info!(scope = identity.scope(), %target, "alias change rejected");
                return Err(AuthzError::AliasNotAllowed(values.to_vec()));
            }
        }

        let explanation = match identity {
            CallerIdentity::Tenant { .. } => None,
            CallerIdentity::Role { role, .. } => Some(self.check_policy(role, target, action)?),
            CallerIdentity::Anonymous { role, endpoint } => {
                if !self.directory.is_member(role, endpoint)? {
                    info!(%role, %endpoint, %target, "anonymous endpoint is not a member");
                    return Err(AuthzError::NotMember {
                        role: role.clone(),
                        endpoint: endpoint.clone(),
                    });
                }
                Some(self.check_policy(role, target, action)?)
            }
        };

        Ok(Grant {
            identity: identity.clone(),
            action,
            target: target.clone(),
            explanation,
        })
    }

    fn check_policy(&self, role: &RoleId, target: &ResourceId, action: Action) -> Result<PermitExplanation, AuthzError> {
        let policies = self.policies.policies_for(role)?;
        let explanation = explain_permission(&policies, role, target, action);
        if explanation.granted {
            debug!(reason = %explanation.reason, "policy granted");
            Ok(explanation)
        } else {
            info!(reason = %explanation.reason, "policy denied");
            Err(AuthzError::Forbidden {
                role: role.clone(),
                action,
                target: target.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Duration;

    use super::*;
    use crate::{HostEntry, HostQuery, Policy, TokenGrant, TokenKind};

    #[derive(Default)]
    struct Tokens(HashMap<String, TokenGrant>);

    impl TokenService for Tokens {
        fn resolve(&self, token: &str) -> Result<Option<TokenGrant>, BackendError> {
            Ok(self.0.get(token).cloned())
        }
    }

    #[derive(Default)]
    struct Policies(HashMap<RoleId, Vec<Policy>>);

    impl PolicyStore for Policies {
        fn policies_for(&self, role: &RoleId) -> Result<Vec<Policy>, BackendError> {
            Ok(self.0.get(role).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct Directory(HashMap<RoleId, Vec<HostEntry>>);

    impl MembershipDirectory for Directory {
        fn is_member(&self, role: &RoleId, endpoint: &Endpoint) -> Result<bool, BackendError> {
            Ok(self
                .0
                .get(role)
                .is_some_and(|hosts| hosts.iter().any(|h| h.contains(endpoint))))
        }

        fn lookup_host(&self, _role: &RoleId, _query: &HostQuery) -> Result<Option<HostEntry>, BackendError> {
            Ok(None)
        }
    }

    fn id(s: &str) -> ResourceId {
        s.parse().unwrap()
    }

    fn role() -> RoleId {
        "acme:role:web".parse().unwrap()
    }

    fn acme() -> TenantId {
        TenantId::new("acme").unwrap()
    }

    fn token(kind: TokenKind, role: Option<RoleId>) -> TokenGrant {
        let now = Utc::now();
        TokenGrant {
            kind,
            tenant: acme(),
            role,
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::minutes(10),
        }
    }

    struct Fixture {
        tokens: Tokens,
        policies: Policies,
        directory: Directory,
    }

    impl Fixture {
        fn new() -> Self {
            let mut tokens = Tokens::default();
            tokens.0.insert("tenant-token".into(), token(TokenKind::Tenant, None));
            tokens.0.insert("role-token".into(), token(TokenKind::Role, Some(role())));

            let mut policies = Policies::default();
            policies.0.insert(
                role(),
                vec![
                    Policy::allow([Action::Read], vec![id("acme:resource:app")]),
                    Policy::allow([Action::Write], vec![id("acme:resource:app/web")]),
                ],
            );

            let mut directory = Directory::default();
            directory.0.insert(role(), vec![HostEntry::new("10.0.0.5", 8080)]);

            Self {
                tokens,
                policies,
                directory,
            }
        }

        fn authorizer(&self) -> Authorizer<'_> {
            Authorizer::new(&self.tokens, &self.policies, &self.directory)
        }
    }

    fn ctx() -> IdContext {
        IdContext::for_tenant(acme())
    }

    #[test]
    fn unknown_token_is_invalid_credential() {
        let fx = Fixture::new();
        let err = fx
            .authorizer()
            .identify(&Credential::session("nope"), None, &ctx(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidCredential(_)));
    }

    #[test]
    fn expired_token_is_invalid_credential() {
        let fx = Fixture::new();
        let err = fx
            .authorizer()
            .identify(
                &Credential::session("tenant-token"),
                None,
                &ctx(),
                Utc::now() + Duration::hours(1),
            )
            .unwrap_err();
        assert_eq!(err, AuthzError::InvalidCredential("token has expired".into()));
    }

    #[test]
    fn tenant_scope_is_always_granted_in_tenant() {
        let fx = Fixture::new();
        let authz = fx.authorizer();
        let identity = authz
            .identify(&Credential::session("tenant-token"), None, &ctx(), Utc::now())
            .unwrap();
        assert_eq!(identity.scope(), "tenant");

        let aliases = vec!["acme:resource:other".to_string()];
        let grant = authz
            .authorize(&identity, &id("acme:resource:anything"), Action::Write, Some(aliases.as_slice()))
            .unwrap();
        assert!(grant.explanation.is_none());
    }

    #[test]
    fn cross_tenant_targets_are_rejected() {
        let fx = Fixture::new();
        let identity = CallerIdentity::Tenant { tenant: acme() };
        let err = fx
            .authorizer()
            .authorize(&identity, &id("globex:resource:a"), Action::Read, None)
            .unwrap_err();
        assert!(matches!(err, AuthzError::TenantMismatch { .. }));
    }

    #[test]
    fn role_scope_follows_policy() {
        let fx = Fixture::new();
        let authz = fx.authorizer();
        let identity = authz
            .identify(&Credential::session("role-token"), None, &ctx(), Utc::now())
            .unwrap();

        assert!(authz.authorize(&identity, &id("acme:resource:app/db"), Action::Read, None).is_ok());
        assert!(authz.authorize(&identity, &id("acme:resource:app/web/x"), Action::Write, None).is_ok());

        let err = authz
            .authorize(&identity, &id("acme:resource:app/db"), Action::Write, None)
            .unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden { .. }));
    }

    #[test]
    fn role_scope_cannot_set_aliases_even_with_policy() {
        let fx = Fixture::new();
        let identity = CallerIdentity::Role {
            tenant: acme(),
            role: role(),
        };
        let aliases = vec!["acme:resource:x".to_string()];
        let err = fx
            .authorizer()
            .authorize(&identity, &id("acme:resource:app/web"), Action::Write, Some(aliases.as_slice()))
            .unwrap_err();
        assert_eq!(err, AuthzError::AliasNotAllowed(aliases));
    }

    #[test]
    fn anonymous_requires_membership_then_policy() {
        let fx = Fixture::new();
        let authz = fx.authorizer();
        let credential = Credential::Anonymous {
            role: "web".into(),
            port: Some(8080),
            cuk: None,
        };

        let member = authz
            .identify(&credential, Some("10.0.0.5".parse().unwrap()), &ctx(), Utc::now())
            .unwrap();
        assert!(authz.authorize(&member, &id("acme:resource:app"), Action::Read, None).is_ok());
        assert!(matches!(
            authz.authorize(&member, &id("acme:resource:app"), Action::Write, None),
            Err(AuthzError::Forbidden { .. })
        ));

        let stranger = authz
            .identify(&credential, Some("10.9.9.9".parse().unwrap()), &ctx(), Utc::now())
            .unwrap();
        assert!(matches!(
            authz.authorize(&stranger, &id("acme:resource:app"), Action::Read, None),
            Err(AuthzError::NotMember { .. })
        ));
    }

    #[test]
    fn anonymous_alias_changes_are_rejected_before_membership() {
        let fx = Fixture::new();
        let authz = fx.authorizer();
        let stranger = authz
            .identify(&Credential::anonymous("web"), Some("10.9.9.9".parse().unwrap()), &ctx(), Utc::now())
            .unwrap();
        let aliases = vec!["acme:resource:shared".to_string()];

        let err = authz
            .authorize(&stranger, &id("acme:resource:app"), Action::Write, Some(aliases.as_slice()))
            .unwrap_err();
        assert_eq!(err, AuthzError::AliasNotAllowed(aliases));

        let err = authz
            .authorize(&stranger, &id("acme:resource:app"), Action::Write, Some(&[] as &[String]))
            .unwrap_err();
        assert_eq!(err, AuthzError::AliasNotAllowed(vec![]));
    }

    #[test]
    fn role_grant_without_role_is_invalid_credential() {
        let mut fx = Fixture::new();
        fx.tokens.0.insert("broken".into(), token(TokenKind::Role, None));
        let err = fx
            .authorizer()
            .identify(&Credential::session("broken"), None, &ctx(), Utc::now())
            .unwrap_err();
        assert_eq!(err, AuthzError::InvalidCredential("role-scoped token carries no role".into()));
    }

    #[test]
    fn anonymous_without_address_is_invalid() {
        let fx = Fixture::new();
        let err = fx
            .authorizer()
            .identify(&Credential::anonymous("web"), None, &ctx(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidCredential(_)));
    }

    #[test]
    fn errors_map_to_registry_kinds() {
        let err: RegistryError = AuthzError::NotMember {
            role: role(),
            endpoint: Endpoint {
                address: "10.0.0.1".parse().unwrap(),
                port: None,
                cuk: None,
            },
        }
        .into();
        assert_eq!(err.code(), "not_member");

        let err: RegistryError = AuthzError::Forbidden {
            role: role(),
            action: Action::Write,
            target: id("acme:resource:z"),
        }
        .into();
        assert_eq!(err.code(), "forbidden");
    }
}
