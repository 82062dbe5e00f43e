use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use arbor_core::TenantId;

use crate::{CallerIdentity, RoleId};

/// What the caller presented, before classification.
///
/// The variant is the credential-kind marker: a session token is resolved by
/// the token service, an anonymous caller names the role it claims membership of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
    /// Opaque session token (tenant- or role-scoped, decided by the token service).
    Session { token: String },

    /// No token; access is derived from endpoint membership in `role`.
    Anonymous {
        role: String,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        cuk: Option<String>,
    },
}

impl Credential {
    pub fn session(token: impl Into<String>) -> Self {
        Self::Session { token: token.into() }
    }

    pub fn anonymous(role: impl Into<String>) -> Self {
        Self::Anonymous {
            role: role.into(),
            port: None,
            cuk: None,
        }
    }
}

/// Network endpoint of an anonymous caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: Option<u16>,
    /// Connection key registered with the host entry, if any.
    pub cuk: Option<String>,
}

impl core::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.address, port)?,
            None => write!(f, "{}", self.address)?,
        }
        if self.cuk.is_some() {
            f.write_str(" (with connection key)")?;
        }
        Ok(())
    }
}

/// Scope carried by a session token.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Tenant,
    Role,
}

/// What the token service knows about a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub kind: TokenKind,

    /// Tenant the token acts within.
    pub tenant: TenantId,

    /// Role for role-scoped tokens.
    pub role: Option<RoleId>,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrantValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("role-scoped token carries no role")]
    MissingRole,

    #[error("token role {role} belongs to another tenant than {tenant}")]
    RoleTenantMismatch { role: RoleId, tenant: TenantId },
}

/// Deterministically validate a token grant at `now`.
pub fn validate_grant(grant: &TokenGrant, now: DateTime<Utc>) -> Result<(), GrantValidationError> {
    if grant.expires_at <= grant.issued_at {
        return Err(GrantValidationError::InvalidTimeWindow);
    }
    if now < grant.issued_at {
        return Err(GrantValidationError::NotYetValid);
    }
    if now >= grant.expires_at {
        return Err(GrantValidationError::Expired);
    }
    if let Some(role) = grant.role.as_ref().filter(|role| role.tenant() != &grant.tenant) {
        return Err(GrantValidationError::RoleTenantMismatch {
            role: role.clone(),
            tenant: grant.tenant.clone(),
        });
    }
    Ok(())
}

impl TokenGrant {
    /// Validate the grant at `now` and classify the caller it stands for.
    pub fn into_identity(self, now: DateTime<Utc>) -> Result<CallerIdentity, GrantValidationError> {
        validate_grant(&self, now)?;
        match self.kind {
            TokenKind::Tenant => Ok(CallerIdentity::Tenant { tenant: self.tenant }),
            TokenKind::Role => {
                let role = self.role.ok_or(GrantValidationError::MissingRole)?;
                Ok(CallerIdentity::Role {
                    tenant: self.tenant,
                    role,
                })
            }
        }
    }
}
