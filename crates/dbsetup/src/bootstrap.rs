//! Scaffolding for new database contexts.
//!
//! Bootstrapping writes a context declaration stub, lays out the per-context
//! migrations directory, registers the context in the manifest when one is
//! present, and optionally prepares a scripts subdirectory. Every filesystem
//! step is idempotent: whatever already exists is logged and skipped.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::context::{ContextDescriptor, ContextManifest, MANIFEST_FILE};
use crate::drivers::{Driver, DriverKind};
use crate::error::{Result, SetupError};
use crate::ident::is_valid_class_name;

/// Canonical suffix required on context type names.
pub const CONTEXT_SUFFIX: &str = "DbContext";

const SCRIPTS_SUBDIR_INVALID_CHARS: &[char] = &['"', '\'', '/', '\\', ' '];

/// Scaffolds new context boilerplate under a project root directory.
pub struct Bootstrapper {
    root: PathBuf,
}

impl Bootstrapper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Bootstrapper rooted at the process working directory.
    pub fn in_current_dir() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Create all boilerplate for a new context: the declaration stub, the
    /// migrations folder layout, the manifest entry, and (optionally) a
    /// scripts subdirectory.
    pub fn bootstrap(
        &self,
        context_name: &str,
        setup_type_name: &str,
        scripts_subdir: Option<&str>,
    ) -> Result<()> {
        let manifest_path = self.root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            Some(ContextManifest::load(&manifest_path)?)
        } else {
            None
        };

        let context_name = self.validate_context_name(context_name, manifest.as_ref())?;
        let kind = self.validate_setup_type(setup_type_name)?;

        self.ensure_context_file(&context_name, kind)?;
        self.ensure_migrations_folder(&context_name)?;
        self.ensure_manifest_entry(&manifest_path, manifest, &context_name, kind)?;

        if let Some(subdir) = validate_scripts_subdir(scripts_subdir)? {
            self.ensure_scripts_subdir(subdir)?;
        }

        Ok(())
    }

    fn validate_context_name(
        &self,
        context_name: &str,
        manifest: Option<&ContextManifest>,
    ) -> Result<String> {
        let trimmed = context_name.trim();

        debug!("checking if context name is valid: {trimmed}");

        if !is_valid_class_name(trimmed) {
            return Err(SetupError::param(format!(
                "The class name passed for the new context is invalid: {trimmed:?}"
            )));
        }

        if !trimmed.ends_with(CONTEXT_SUFFIX) {
            return Err(SetupError::param(format!(
                "The class name passed for the new context must end with {CONTEXT_SUFFIX:?}: {trimmed:?}"
            )));
        }

        if trimmed == CONTEXT_SUFFIX {
            return Err(SetupError::param(format!(
                "The class name passed for the new context must not literally be {CONTEXT_SUFFIX:?}"
            )));
        }

        if let Some(manifest) = manifest {
            if manifest
                .contexts
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(trimmed))
            {
                return Err(SetupError::config(format!(
                    "The context type already exists: {trimmed}"
                )));
            }
        }

        let path = self.context_file_path(trimmed);
        if path.exists() {
            return Err(SetupError::config(format!(
                "Cannot write new file - a file with the context name already exists: {}",
                path.display()
            )));
        }

        info!("context name is valid: {trimmed}");
        Ok(trimmed.to_string())
    }

    fn validate_setup_type(&self, setup_type_name: &str) -> Result<DriverKind> {
        debug!("checking if setup type is valid: {setup_type_name}");

        if !is_valid_class_name(setup_type_name) {
            return Err(SetupError::param(format!(
                "The class name passed for the setup type is invalid: {setup_type_name:?}"
            )));
        }

        let kind = DriverKind::from_name(setup_type_name).ok_or_else(|| {
            SetupError::param(format!("Unable to find setup type: {setup_type_name:?}"))
        })?;

        info!("found setup type: {kind}");
        Ok(kind)
    }

    fn context_file_path(&self, context_name: &str) -> PathBuf {
        self.root.join(format!("{context_name}.rs"))
    }

    fn ensure_context_file(&self, context_name: &str, kind: DriverKind) -> Result<()> {
        let path = self.context_file_path(context_name);
        let boilerplate = Driver::new(kind).boilerplate(context_name);

        info!("creating file: {}", path.display());
        info!("new content for {context_name}.rs:\n---\n{boilerplate}---");

        std::fs::write(&path, boilerplate)?;
        Ok(())
    }

    fn ensure_migrations_folder(&self, context_name: &str) -> Result<()> {
        let base = self.root.join("migrations");
        if !base.exists() {
            info!("creating base migrations directory: {}", base.display());
            std::fs::create_dir_all(&base)?;
        }

        let subdir = base.join(format!("{context_name}Migrations"));
        if subdir.exists() {
            info!(
                "migrations directory already exists, skipping: {}",
                subdir.display()
            );
        } else {
            info!(
                "creating migrations subdirectory for new context: {}",
                subdir.display()
            );
            std::fs::create_dir_all(&subdir)?;
        }

        Ok(())
    }

    fn ensure_manifest_entry(
        &self,
        manifest_path: &Path,
        manifest: Option<ContextManifest>,
        context_name: &str,
        kind: DriverKind,
    ) -> Result<()> {
        let Some(mut manifest) = manifest else {
            warn!(
                "No {MANIFEST_FILE} found in the project directory - register the new context \
                 manually:"
            );
            info!(
                "  - name: {context_name}\n    setup: {}",
                kind.manifest_name()
            );
            return Ok(());
        };

        // Duplicate entries were already rejected during validation; reaching
        // here means the entry is new.
        info!(
            "adding context entry to manifest: {}",
            manifest_path.display()
        );
        manifest
            .contexts
            .push(ContextDescriptor::new(context_name, Some(kind)));
        manifest.save(manifest_path)?;
        Ok(())
    }

    fn ensure_scripts_subdir(&self, subdir: &str) -> Result<()> {
        let base = self.root.join("scripts");
        if !base.exists() {
            info!("creating scripts directory: {}", base.display());
            std::fs::create_dir_all(&base)?;
        }

        let path = base.join(subdir);
        if path.exists() {
            info!(
                "scripts subdirectory already exists, skipping: {}",
                path.display()
            );
        } else {
            info!("creating scripts subdirectory: {}", path.display());
            std::fs::create_dir_all(&path)?;
        }

        Ok(())
    }
}

/// Blank input counts as absent; path separators, quotes, and spaces are
/// rejected so the subdirectory stays a single path component.
fn validate_scripts_subdir(subdir: Option<&str>) -> Result<Option<&str>> {
    let Some(subdir) = subdir else {
        return Ok(None);
    };
    if subdir.trim().is_empty() {
        return Ok(None);
    }
    if subdir.contains(SCRIPTS_SUBDIR_INVALID_CHARS) {
        return Err(SetupError::param(format!(
            "The scripts subdirectory contains invalid characters: {subdir:?}"
        )));
    }
    Ok(Some(subdir))
}
