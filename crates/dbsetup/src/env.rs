//! Environment variable access with per-context key substitution.
//!
//! Contexts share the canonical `DB_*` keys but may remap individual keys to
//! context-specific variables (e.g. `DB_NAME` -> `DB_NAME_TEST`), letting
//! several contexts resolve distinct values from one process environment.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::{Result, SetupError};

/// Remaps one canonical env key to a context-specific one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSubstitution {
    pub from: String,
    pub to: String,
}

impl EnvSubstitution {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Source of environment values. The process environment in production; a
/// map-backed fake in tests so settings resolution stays deterministic.
pub trait EnvAccess: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// [`EnvAccess`] backed by the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvAccess for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Substitution-aware reader over an [`EnvAccess`] source.
pub struct EnvReader<'a> {
    env: &'a dyn EnvAccess,
    substitutions: &'a [EnvSubstitution],
}

impl<'a> EnvReader<'a> {
    pub fn new(env: &'a dyn EnvAccess, substitutions: &'a [EnvSubstitution]) -> Self {
        Self { env, substitutions }
    }

    /// The key actually looked up for a canonical key: the first matching
    /// substitution wins, otherwise the canonical key itself.
    pub fn actual_key<'k>(&'k self, canonical_key: &'k str) -> &'k str {
        self.substitutions
            .iter()
            .find(|s| s.from == canonical_key)
            .map(|s| s.to.as_str())
            .unwrap_or(canonical_key)
    }

    /// Optional lookup; blank values count as absent.
    pub fn get(&self, canonical_key: &str) -> Option<String> {
        self.env
            .get(self.actual_key(canonical_key))
            .filter(|v| !v.trim().is_empty())
    }

    /// Required lookup, failing with the actual (post-substitution) key name.
    pub fn required(&self, canonical_key: &str) -> Result<String> {
        let actual = self.actual_key(canonical_key);
        self.env
            .get(actual)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                SetupError::config(format!("Missing environment variable for key {actual}"))
            })
    }
}

/// Load `.env` from the working directory into the process environment,
/// exactly once per process. Subsequent calls are no-ops, including from
/// concurrent callers (benign re-entrancy, never re-execution).
pub fn ensure_env_loaded() {
    static LOADED: OnceLock<()> = OnceLock::new();
    LOADED.get_or_init(|| match dotenvy::dotenv() {
        Ok(path) => debug!("loaded environment variables from {:?}", path),
        Err(err) if err.not_found() => warn!("no .env file found in the working directory"),
        Err(err) => warn!("failed to load .env file: {err}"),
    });
}
