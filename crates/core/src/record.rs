//! Resource records and their field-scoped write/clear semantics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RegistryError;
use crate::identifier::ResourceId;

/// A stored resource record.
///
/// `keys` is ordered so every derived view (merges, templates) is deterministic.
/// `aliases` is an ordered adjacency list; the alias graph may contain cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub string: Option<String>,
    pub object: Option<Value>,
    pub expire: Option<DateTime<Utc>>,
    #[serde(default)]
    pub keys: BTreeMap<String, Value>,
    #[serde(default)]
    pub aliases: Vec<ResourceId>,
}

impl Resource {
    /// A record with every field at its default.
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            string: None,
            object: None,
            expire: None,
            keys: BTreeMap::new(),
            aliases: Vec::new(),
        }
    }

    /// Merge a partial write into this record.
    ///
    /// Scalars overwrite only when supplied, `keys` merges per key, `aliases`
    /// is replaced wholesale when supplied.
    pub fn apply_patch(&mut self, patch: ResourcePatch) {
        if let Some(string) = patch.string {
            self.string = Some(string);
        }
        if let Some(object) = patch.object {
            self.object = Some(object);
        }
        if let Some(expire) = patch.expire {
            self.expire = Some(expire);
        }
        if let Some(keys) = patch.keys {
            self.keys.extend(keys);
        }
        if let Some(aliases) = patch.aliases {
            self.aliases = aliases;
        }
    }

    /// Clear the slot named by a field selector.
    ///
    /// Removing names that are not present is not an error.
    pub fn clear(&mut self, field: FieldType, names: &[String]) {
        match field {
            FieldType::String => self.string = None,
            FieldType::Object => self.object = None,
            FieldType::Expire => self.expire = None,
            FieldType::Keys if names.is_empty() => self.keys.clear(),
            FieldType::Keys => {
                for name in names {
                    self.keys.remove(name);
                }
            }
            FieldType::Aliases if names.is_empty() => self.aliases.clear(),
            FieldType::Aliases => self
                .aliases
                .retain(|alias| !names.iter().any(|n| *n == alias.to_string())),
        }
    }
}

/// A partial record supplied by a write.
///
/// `None` means "not supplied"; supplied fields are merged by [`Resource::apply_patch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePatch {
    pub string: Option<String>,
    pub object: Option<Value>,
    pub expire: Option<DateTime<Utc>>,
    pub keys: Option<BTreeMap<String, Value>>,
    pub aliases: Option<Vec<ResourceId>>,
}

impl ResourcePatch {
    pub fn is_empty(&self) -> bool {
        self.string.is_none()
            && self.object.is_none()
            && self.expire.is_none()
            && self.keys.is_none()
            && self.aliases.is_none()
    }

    pub fn with_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    pub fn with_string(mut self, string: impl Into<String>) -> Self {
        self.string = Some(string.into());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<ResourceId>) -> Self {
        self.aliases = Some(aliases);
        self
    }
}

/// Whether a write created the record or merged into an existing one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Created,
    Updated,
}

/// Closed set of record slots addressable by read filters and deletes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Object,
    Expire,
    Keys,
    Aliases,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Object => "object",
            FieldType::Expire => "expire",
            FieldType::Keys => "keys",
            FieldType::Aliases => "aliases",
        }
    }
}

impl core::fmt::Display for FieldType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for FieldType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "object" => Ok(FieldType::Object),
            "expire" => Ok(FieldType::Expire),
            "keys" => Ok(FieldType::Keys),
            "aliases" => Ok(FieldType::Aliases),
            other => Err(RegistryError::invalid_payload(format!(
                "type must be one of: string, object, expire, keys, aliases (got '{other}')"
            ))),
        }
    }
}

/// What a delete removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelector {
    /// The whole record.
    Record,
    /// One slot; `names` narrows `keys`/`aliases` removal (empty = all).
    Field { field: FieldType, names: Vec<String> },
}

impl FieldSelector {
    pub fn from_parts(field: Option<FieldType>, names: Vec<String>) -> Self {
        match field {
            None => FieldSelector::Record,
            Some(field) => FieldSelector::Field { field, names },
        }
    }

    pub fn touches_aliases(&self) -> bool {
        matches!(
            self,
            FieldSelector::Field {
                field: FieldType::Aliases,
                ..
            }
        )
    }
}
