//! Registry configuration.

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use arbor_core::DEFAULT_KIND;
use arbor_template::DEFAULT_MARKER;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Prefix that turns a record's `string` into a template.
    pub template_marker: String,
    /// Kind assumed for bare identifiers.
    pub default_kind: String,
    /// Service assumed for bare identifiers.
    pub default_service: Option<String>,
    /// Report denied reads as "not found" so existence is not disclosed.
    pub mask_read_denials: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            template_marker: DEFAULT_MARKER.to_string(),
            default_kind: DEFAULT_KIND.to_string(),
            default_service: None,
            mask_read_denials: true,
        }
    }
}

impl RegistryConfig {
    /// Defaults overlaid with `ARBOR_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(marker) = lookup("ARBOR_TEMPLATE_MARKER") {
            anyhow::ensure!(!marker.is_empty(), "ARBOR_TEMPLATE_MARKER must not be empty");
            config.template_marker = marker;
        }
        if let Some(kind) = lookup("ARBOR_DEFAULT_KIND").filter(|k| !k.is_empty()) {
            config.default_kind = kind;
        }
        config.default_service = lookup("ARBOR_DEFAULT_SERVICE").filter(|s| !s.is_empty());
        if let Some(mask) = lookup("ARBOR_MASK_READ_DENIALS") {
            config.mask_read_denials = mask
                .trim()
                .parse::<bool>()
                .with_context(|| format!("ARBOR_MASK_READ_DENIALS must be true or false (got '{mask}')"))?;
            if !config.mask_read_denials {
                warn!("read denials are reported unmasked; callers can probe for record existence");
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = RegistryConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.template_marker, "#!tmpl");
        assert_eq!(config.default_kind, "resource");
        assert!(config.mask_read_denials);
    }

    #[test]
    fn environment_overrides() {
        let config = RegistryConfig::from_lookup(lookup(&[
            ("ARBOR_TEMPLATE_MARKER", "%tpl"),
            ("ARBOR_DEFAULT_KIND", "secret"),
            ("ARBOR_DEFAULT_SERVICE", "vault"),
            ("ARBOR_MASK_READ_DENIALS", "false"),
        ]))
        .unwrap();
        assert_eq!(config.template_marker, "%tpl");
        assert_eq!(config.default_kind, "secret");
        assert_eq!(config.default_service.as_deref(), Some("vault"));
        assert!(!config.mask_read_denials);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = RegistryConfig::from_lookup(lookup(&[("ARBOR_MASK_READ_DENIALS", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("ARBOR_MASK_READ_DENIALS"));
        assert!(RegistryConfig::from_lookup(lookup(&[("ARBOR_TEMPLATE_MARKER", "")])).is_err());
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: RegistryConfig = serde_json::from_str(r#"{"mask_read_denials": false}"#).unwrap();
        assert!(!config.mask_read_denials);
        assert_eq!(config.template_marker, "#!tmpl");
    }
}
