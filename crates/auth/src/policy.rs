//! Policy model and evaluation.
//!
//! A policy grants a set of actions on a list of resource patterns. A pattern
//! matches a target when it is equal to it or a path-ancestor of it, so a
//! grant on `acme:resource:app` covers everything below `app/`.
//!
//! Deny precedence and condition evaluation happen in the policy store; the
//! policies it returns for a role are the effective ones.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use arbor_core::{BackendError, PolicyId, ResourceId};

use crate::{Action, RoleId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

/// A policy attached to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub effect: Effect,
    pub actions: BTreeSet<Action>,
    pub resources: Vec<ResourceId>,
    /// Condition text, already resolved by the store; carried for audit only.
    #[serde(default)]
    pub condition: Option<String>,
}

impl Policy {
    /// An allow policy for `actions` on `resources`.
    pub fn allow(actions: impl IntoIterator<Item = Action>, resources: Vec<ResourceId>) -> Self {
        Self {
            id: PolicyId::new(),
            effect: Effect::Allow,
            actions: actions.into_iter().collect(),
            resources,
            condition: None,
        }
    }

    /// The first resource pattern of this policy covering `target` for `action`.
    pub fn matching_pattern(&self, target: &ResourceId, action: Action) -> Option<&ResourceId> {
        if self.effect != Effect::Allow || !self.actions.contains(&action) {
            return None;
        }
        self.resources.iter().find(|pattern| pattern.covers(target))
    }
}

/// Policy store (external).
pub trait PolicyStore: Send + Sync {
    fn policies_for(&self, role: &RoleId) -> Result<Vec<Policy>, BackendError>;
}

impl<S> PolicyStore for Arc<S>
where
    S: PolicyStore + ?Sized,
{
    fn policies_for(&self, role: &RoleId) -> Result<Vec<Policy>, BackendError> {
        (**self).policies_for(role)
    }
}

/// Pure check over an already fetched policy set.
pub fn policies_permit(policies: &[Policy], target: &ResourceId, action: Action) -> bool {
    policies
        .iter()
        .any(|p| p.matching_pattern(target, action).is_some())
}

/// `permits(role, target, action)`: does any policy attached to `role` allow it?
pub fn permits(
    store: &dyn PolicyStore,
    role: &RoleId,
    target: &ResourceId,
    action: Action,
) -> Result<bool, BackendError> {
    let policies = store.policies_for(role)?;
    Ok(policies_permit(&policies, target, action))
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of a policy decision.
#[derive(Debug, Clone, Serialize)]
pub struct PermitExplanation {
    pub role: RoleId,
    pub target: ResourceId,
    pub action: Action,
    pub granted: bool,
    /// Human-readable reason for the decision.
    pub reason: String,
    /// Policy and pattern that granted the action, if any.
    pub matched_policy: Option<PolicyId>,
    pub matched_pattern: Option<ResourceId>,
    /// Number of attached policies that were considered.
    pub policies_considered: usize,
}

/// Explain why `role` may (or may not) perform `action` on `target`.
pub fn explain_permission(
    policies: &[Policy],
    role: &RoleId,
    target: &ResourceId,
    action: Action,
) -> PermitExplanation {
    let matched = policies
        .iter()
        .find_map(|p| p.matching_pattern(target, action).map(|pattern| (p.id, pattern.clone())));

    let (granted, reason, matched_policy, matched_pattern) = match matched {
        Some((policy_id, pattern)) => {
            let reason = if pattern == *target {
                format!("policy {policy_id} allows {action} on {target}")
            } else {
                format!("policy {policy_id} allows {action} on ancestor {pattern}")
            };
            (true, reason, Some(policy_id), Some(pattern))
        }
        None if policies.is_empty() => (false, format!("role {role} has no policies attached"), None, None),
        None => (
            false,
            format!(
                "none of the {} policies of role {role} allows {action} on {target}",
                policies.len()
            ),
            None,
            None,
        ),
    };

    PermitExplanation {
        role: role.clone(),
        target: target.clone(),
        action,
        granted,
        reason,
        matched_policy,
        matched_pattern,
        policies_considered: policies.len(),
    }
}
