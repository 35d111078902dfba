//! Context discovery and name resolution.
//!
//! Contexts are declared in a `contexts.yaml` manifest in the project
//! directory rather than discovered by runtime scanning. Manifest order is
//! the discovery order, so listings stay stable across runs.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::drivers::DriverKind;
use crate::env::EnvSubstitution;
use crate::error::{Result, SetupError};
use crate::ident::is_valid_class_name;

/// Manifest file name expected in the project working directory.
pub const MANIFEST_FILE: &str = "contexts.yaml";

/// One configured database context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDescriptor {
    /// Context type name, e.g. `MainDbContext`.
    pub name: String,

    /// Which engine driver provisions this context. Absent means the context
    /// is listed but not provisionable (operations warn and skip it).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<DriverKind>,

    /// Canonical-to-actual env key remappings, applied in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_substitutions: Vec<EnvSubstitution>,
}

impl ContextDescriptor {
    pub fn new(name: impl Into<String>, setup: Option<DriverKind>) -> Self {
        Self {
            name: name.into(),
            setup,
            env_substitutions: Vec::new(),
        }
    }

    pub fn with_substitutions(mut self, substitutions: Vec<EnvSubstitution>) -> Self {
        self.env_substitutions = substitutions;
        self
    }
}

/// On-disk manifest shape.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ContextManifest {
    #[serde(default)]
    pub contexts: Vec<ContextDescriptor>,
}

impl ContextManifest {
    /// Parse a manifest from YAML text and validate declared names.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: ContextManifest = serde_yaml::from_str(yaml)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_yaml(&content)
    }

    /// Write the manifest back out as YAML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for descriptor in &self.contexts {
            if !is_valid_class_name(&descriptor.name) {
                return Err(SetupError::config(format!(
                    "invalid context name in manifest: {:?}",
                    descriptor.name
                )));
            }
            if !seen.insert(descriptor.name.to_lowercase()) {
                return Err(SetupError::config(format!(
                    "duplicate context name in manifest: {}",
                    descriptor.name
                )));
            }
        }
        Ok(())
    }
}

/// All known contexts, in stable discovery order.
pub struct ContextRegistry {
    descriptors: Vec<ContextDescriptor>,
}

impl ContextRegistry {
    pub fn new(descriptors: Vec<ContextDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Load the registry from a manifest file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(ContextManifest::load(path)?.contexts))
    }

    pub fn all(&self) -> &[ContextDescriptor] {
        &self.descriptors
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Case-insensitive exact-name membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors
            .iter()
            .any(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Resolve a user-supplied name: case-insensitive exact match first, then
    /// a match with the `DbContext`/`Context` suffix stripped from both sides.
    pub fn resolve(&self, name: &str) -> Result<&ContextDescriptor> {
        let lowered = name.to_lowercase();

        if let Some(descriptor) = self
            .descriptors
            .iter()
            .find(|d| d.name.to_lowercase() == lowered)
        {
            return Ok(descriptor);
        }

        let stem = strip_context_suffix(&lowered);
        if let Some(descriptor) = self
            .descriptors
            .iter()
            .find(|d| strip_context_suffix(&d.name.to_lowercase()) == stem)
        {
            return Ok(descriptor);
        }

        Err(SetupError::param(format!(
            "Could not find context with name {name:?} - try the \"list\" command to see all available contexts"
        )))
    }
}

fn strip_context_suffix(lowered: &str) -> &str {
    lowered
        .strip_suffix("dbcontext")
        .or_else(|| lowered.strip_suffix("context"))
        .unwrap_or(lowered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ContextRegistry {
        ContextRegistry::new(vec![
            ContextDescriptor::new("MainDbContext", Some(DriverKind::Postgres)),
            ContextDescriptor::new("NoSetupTypeDbContext", None),
        ])
    }

    #[test]
    fn test_resolve_exact_and_stemmed() {
        let registry = registry();
        for input in ["main", "Main", "MainDbContext", "MAINDBCONTEXT", "MainContext"] {
            let descriptor = registry.resolve(input).unwrap();
            assert_eq!(descriptor.name, "MainDbContext", "input {input:?}");
        }
    }

    #[test]
    fn test_resolve_context_without_setup_type() {
        let registry = registry();
        let descriptor = registry.resolve("nosetuptype").unwrap();
        assert_eq!(descriptor.name, "NoSetupTypeDbContext");
        assert!(descriptor.setup.is_none());
    }

    #[test]
    fn test_resolve_unknown_is_param_error() {
        let registry = registry();
        let err = registry.resolve("nonexistent").unwrap_err();
        assert!(err.is_param());
        assert!(err.to_string().contains("nonexistent"));
        assert!(err.to_string().contains("list"));
    }

    #[test]
    fn test_manifest_round_trip() {
        let yaml = r#"
contexts:
  - name: MainDbContext
    setup: postgres
  - name: TestDbContext
    setup: postgres
    env_substitutions:
      - from: DB_NAME
        to: DB_NAME_TEST
  - name: ReportingDbContext
"#;
        let manifest = ContextManifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.contexts.len(), 3);
        assert_eq!(manifest.contexts[0].setup, Some(DriverKind::Postgres));
        assert_eq!(
            manifest.contexts[1].env_substitutions,
            vec![EnvSubstitution::new("DB_NAME", "DB_NAME_TEST")]
        );
        assert!(manifest.contexts[2].setup.is_none());

        let rendered = serde_yaml::to_string(&manifest).unwrap();
        let reparsed = ContextManifest::from_yaml(&rendered).unwrap();
        assert_eq!(reparsed.contexts.len(), 3);
    }

    #[test]
    fn test_manifest_rejects_bad_names() {
        let yaml = "contexts:\n  - name: \"1Bad\"\n";
        assert!(ContextManifest::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_manifest_rejects_duplicates() {
        let yaml = "contexts:\n  - name: MainDbContext\n  - name: maindbcontext\n";
        assert!(ContextManifest::from_yaml(yaml).is_err());
    }
}
