//! Contributing-record resolution.
//!
//! For a target `acme:resource:a/b/c` the sequence is built from the records
//! at `a`, `a/b` and `a/b/c` (shortest first), each immediately followed by
//! the records named in its own `aliases`. Aliases are followed one hop only
//! and nothing is deduplicated.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use arbor_core::{RegistryError, RegistryResult, Resource, ResourceId};
use arbor_template::SectionSource;

use crate::store::ResourceRepository;

/// How a record joined the contributing sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Via {
    Ancestor,
    Target,
    Alias { of: ResourceId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub record: Resource,
    pub via: Via,
}

/// The ordered contributing records of one target.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    contributions: Vec<Contribution>,
    target: usize,
}

impl Resolution {
    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    pub fn target(&self) -> &Resource {
        &self.contributions[self.target].record
    }

    /// Key-wise union; later contributors win.
    pub fn merged_keys(&self) -> BTreeMap<String, Value> {
        self.contributions
            .iter()
            .flat_map(|c| c.record.keys.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    /// Only the target's own aliases are exposed.
    pub fn aliases(&self) -> &[ResourceId] {
        &self.target().aliases
    }

    pub fn section_sources(&self) -> Vec<SectionSource<'_>> {
        self.contributions
            .iter()
            .map(|c| SectionSource {
                id: &c.record.id,
                string: c.record.string.as_deref(),
                keys: &c.record.keys,
            })
            .collect()
    }
}

/// Resolve `target` into its contributing sequence.
///
/// Fails with `ResourceNotFound` when the target itself has no record, even if
/// ancestors do.
pub fn resolve(repo: &dyn ResourceRepository, target: &ResourceId) -> RegistryResult<Resolution> {
    let own = repo
        .get(target)?
        .ok_or_else(|| RegistryError::not_found(target.to_string()))?;

    let mut contributions = Vec::new();
    for ancestor in target.ancestors() {
        if let Some(record) = repo.get(&ancestor)? {
            push_with_aliases(repo, &mut contributions, record, Via::Ancestor)?;
        }
    }

    let target_index = contributions.len();
    push_with_aliases(repo, &mut contributions, own, Via::Target)?;

    debug!(%target, contributors = contributions.len(), "resolved");
    Ok(Resolution {
        contributions,
        target: target_index,
    })
}

fn push_with_aliases(
    repo: &dyn ResourceRepository,
    contributions: &mut Vec<Contribution>,
    record: Resource,
    via: Via,
) -> RegistryResult<()> {
    let aliases = record.aliases.clone();
    let of = record.id.clone();
    contributions.push(Contribution { record, via });

    for alias in aliases {
        match repo.get(&alias)? {
            Some(record) => contributions.push(Contribution {
                record,
                via: Via::Alias { of: of.clone() },
            }),
            None => debug!(%alias, of = %of, "alias target has no record"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryResourceRepository;
    use arbor_core::{Backend, BackendError, FieldSelector, ResourcePatch, WriteOutcome};
    use proptest::prelude::*;
    use serde_json::json;

    fn id(s: &str) -> ResourceId {
        s.parse().unwrap()
    }

    fn put(repo: &InMemoryResourceRepository, target: &str, patch: ResourcePatch) {
        repo.put(&id(target), patch).unwrap();
    }

    fn ids(resolution: &Resolution) -> Vec<String> {
        resolution
            .contributions()
            .iter()
            .map(|c| c.record.id.to_string())
            .collect()
    }

    #[test]
    fn ancestors_precede_target_and_aliases_follow_their_owner() {
        let repo = InMemoryResourceRepository::new();
        put(
            &repo,
            "acme:resource:a",
            ResourcePatch::default().with_aliases(vec![id("acme:resource:shared")]),
        );
        put(
            &repo,
            "acme:resource:a/b/c",
            ResourcePatch::default().with_aliases(vec![id("acme:resource:x"), id("acme:resource:shared")]),
        );
        put(&repo, "acme:resource:shared", ResourcePatch::default().with_string("s"));
        put(&repo, "acme:resource:x", ResourcePatch::default().with_string("x"));

        let resolution = resolve(&repo, &id("acme:resource:a/b/c")).unwrap();
        assert_eq!(
            ids(&resolution),
            vec![
                "acme:resource:a",
                "acme:resource:shared",
                "acme:resource:a/b/c",
                "acme:resource:x",
                "acme:resource:shared",
            ]
        );
        assert_eq!(resolution.contributions()[0].via, Via::Ancestor);
        assert_eq!(resolution.contributions()[2].via, Via::Target);
        assert_eq!(
            resolution.contributions()[3].via,
            Via::Alias {
                of: id("acme:resource:a/b/c")
            }
        );
        assert_eq!(resolution.target().id, id("acme:resource:a/b/c"));
    }

    #[test]
    fn missing_target_is_not_found_even_with_ancestors() {
        let repo = InMemoryResourceRepository::new();
        put(&repo, "acme:resource:a", ResourcePatch::default().with_string("a"));
        let err = resolve(&repo, &id("acme:resource:a/b")).unwrap_err();
        assert!(matches!(err, RegistryError::ResourceNotFound(_)));
    }

    #[test]
    fn aliases_are_one_hop_and_only_targets_are_exposed() {
        let repo = InMemoryResourceRepository::new();
        put(
            &repo,
            "acme:resource:a",
            ResourcePatch::default()
                .with_keys([("x", json!("1"))])
                .with_aliases(vec![id("acme:resource:c")]),
        );
        put(
            &repo,
            "acme:resource:c",
            ResourcePatch::default()
                .with_keys([("y", json!("2"))])
                .with_aliases(vec![id("acme:resource:d")]),
        );
        put(&repo, "acme:resource:d", ResourcePatch::default().with_keys([("z", json!("3"))]));

        let resolution = resolve(&repo, &id("acme:resource:a")).unwrap();
        assert_eq!(resolution.merged_keys(), serde_json::from_value(json!({"x": "1", "y": "2"})).unwrap());
        assert_eq!(resolution.aliases(), &[id("acme:resource:c")]);

        let reverse = resolve(&repo, &id("acme:resource:c")).unwrap();
        assert_eq!(reverse.aliases(), &[id("acme:resource:d")]);
    }

    #[test]
    fn alias_cycles_terminate() {
        let repo = InMemoryResourceRepository::new();
        put(&repo, "acme:resource:a", ResourcePatch::default().with_aliases(vec![id("acme:resource:b")]));
        put(&repo, "acme:resource:b", ResourcePatch::default().with_aliases(vec![id("acme:resource:a")]));
        let resolution = resolve(&repo, &id("acme:resource:a")).unwrap();
        assert_eq!(ids(&resolution), vec!["acme:resource:a", "acme:resource:b"]);
    }

    #[test]
    fn missing_alias_records_are_skipped() {
        let repo = InMemoryResourceRepository::new();
        put(&repo, "acme:resource:a", ResourcePatch::default().with_aliases(vec![id("acme:resource:gone")]));
        let resolution = resolve(&repo, &id("acme:resource:a")).unwrap();
        assert_eq!(resolution.contributions().len(), 1);
        assert_eq!(resolution.aliases(), &[id("acme:resource:gone")]);
    }

    struct Failing;

    impl ResourceRepository for Failing {
        fn get(&self, _id: &ResourceId) -> Result<Option<Resource>, BackendError> {
            Err(BackendError::new(Backend::ResourceRepository, "timeout"))
        }

        fn put(&self, _id: &ResourceId, _patch: ResourcePatch) -> Result<(Resource, WriteOutcome), BackendError> {
            Err(BackendError::new(Backend::ResourceRepository, "timeout"))
        }

        fn delete_fields(&self, _id: &ResourceId, _selector: &FieldSelector) -> Result<bool, BackendError> {
            Err(BackendError::new(Backend::ResourceRepository, "timeout"))
        }
    }

    #[test]
    fn repository_failures_propagate() {
        let err = resolve(&Failing, &id("acme:resource:a")).unwrap_err();
        assert_eq!(err.code(), "backend_error");
    }

    proptest! {
        /// Property: deeper contributors override shallower ones on key collisions.
        #[test]
        fn deeper_contributor_wins(depth in 1usize..5, values in prop::collection::vec(0i64..100, 5)) {
            let repo = InMemoryResourceRepository::new();
            let mut path = String::new();
            for level in 0..depth {
                if level > 0 {
                    path.push('/');
                }
                path.push_str(&format!("l{level}"));
                repo.put(
                    &id(&format!("acme:resource:{path}")),
                    ResourcePatch::default().with_keys([("k", json!(values[level]))]),
                ).unwrap();
            }
            let resolution = resolve(&repo, &id(&format!("acme:resource:{path}"))).unwrap();
            let merged = resolution.merged_keys();
            prop_assert_eq!(merged.get("k"), Some(&json!(values[depth - 1])));
        }
    }
}
