use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arbor_core::{Backend, BackendError, FieldSelector, Resource, ResourceId, ResourcePatch, WriteOutcome};

/// Resource repository (external).
///
/// `put` is a single-key read-modify-write; the store serialises concurrent
/// writes to the same identifier and the last writer wins.
pub trait ResourceRepository: Send + Sync {
    fn get(&self, id: &ResourceId) -> Result<Option<Resource>, BackendError>;

    /// Create or merge; returns the stored record.
    fn put(&self, id: &ResourceId, patch: ResourcePatch) -> Result<(Resource, WriteOutcome), BackendError>;

    /// Clear the selected slot, or drop the record. `false` when there was no record.
    fn delete_fields(&self, id: &ResourceId, selector: &FieldSelector) -> Result<bool, BackendError>;
}

impl<S> ResourceRepository for Arc<S>
where
    S: ResourceRepository + ?Sized,
{
    fn get(&self, id: &ResourceId) -> Result<Option<Resource>, BackendError> {
        (**self).get(id)
    }

    fn put(&self, id: &ResourceId, patch: ResourcePatch) -> Result<(Resource, WriteOutcome), BackendError> {
        (**self).put(id, patch)
    }

    fn delete_fields(&self, id: &ResourceId, selector: &FieldSelector) -> Result<bool, BackendError> {
        (**self).delete_fields(id, selector)
    }
}

/// In-memory resource repository for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryResourceRepository {
    inner: RwLock<HashMap<ResourceId, Resource>>,
}

impl InMemoryResourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, BackendError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.len())
    }

    pub fn is_empty(&self) -> Result<bool, BackendError> {
        Ok(self.len()? == 0)
    }
}

fn poisoned() -> BackendError {
    BackendError::poisoned(Backend::ResourceRepository)
}

impl ResourceRepository for InMemoryResourceRepository {
    fn get(&self, id: &ResourceId) -> Result<Option<Resource>, BackendError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(id).cloned())
    }

    fn put(&self, id: &ResourceId, patch: ResourcePatch) -> Result<(Resource, WriteOutcome), BackendError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let outcome = if map.contains_key(id) {
            WriteOutcome::Updated
        } else {
            WriteOutcome::Created
        };
        let record = map.entry(id.clone()).or_insert_with(|| Resource::new(id.clone()));
        record.apply_patch(patch);
        Ok((record.clone(), outcome))
    }

    fn delete_fields(&self, id: &ResourceId, selector: &FieldSelector) -> Result<bool, BackendError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        match selector {
            FieldSelector::Record => Ok(map.remove(id).is_some()),
            FieldSelector::Field { field, names } => match map.get_mut(id) {
                Some(record) => {
                    record.clear(*field, names);
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::FieldType;
    use serde_json::json;

    fn id(s: &str) -> ResourceId {
        s.parse().unwrap()
    }

    #[test]
    fn first_put_creates_then_merges() {
        let repo = InMemoryResourceRepository::new();
        let target = id("acme:resource:app");

        let (record, outcome) = repo
            .put(&target, ResourcePatch::default().with_keys([("a", json!("1"))]))
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Created);
        assert_eq!(record.string, None);

        let (record, outcome) = repo
            .put(&target, ResourcePatch::default().with_keys([("b", json!("2"))]).with_string("s"))
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);
        assert_eq!(record.keys.len(), 2);
        assert_eq!(record.string.as_deref(), Some("s"));
        assert_eq!(repo.get(&target).unwrap(), Some(record));
    }

    #[test]
    fn delete_fields_reports_missing_records() {
        let repo = InMemoryResourceRepository::new();
        let target = id("acme:resource:app");
        let selector = FieldSelector::from_parts(Some(FieldType::Keys), vec!["a".into()]);
        assert!(!repo.delete_fields(&target, &selector).unwrap());

        repo.put(&target, ResourcePatch::default().with_keys([("a", json!(1)), ("b", json!(2))]))
            .unwrap();
        assert!(repo.delete_fields(&target, &selector).unwrap());
        let record = repo.get(&target).unwrap().unwrap();
        assert_eq!(record.keys.keys().collect::<Vec<_>>(), vec!["b"]);

        assert!(repo.delete_fields(&target, &FieldSelector::Record).unwrap());
        assert!(repo.is_empty().unwrap());
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let repo = Arc::new(InMemoryResourceRepository::new());
        let holder = Arc::clone(&repo);
        let _ = std::thread::spawn(move || {
            let _guard = holder.inner.write().unwrap();
            panic!("writer died");
        })
        .join();

        assert_eq!(repo.len().unwrap_err().backend, Backend::ResourceRepository);
        assert!(repo.is_empty().is_err());
        assert!(repo.get(&id("acme:resource:app")).is_err());
    }

    #[test]
    fn records_are_isolated_per_tenant() {
        let repo = InMemoryResourceRepository::new();
        repo.put(&id("acme:resource:app"), ResourcePatch::default().with_string("a"))
            .unwrap();
        assert_eq!(repo.get(&id("globex:resource:app")).unwrap(), None);
    }
}
