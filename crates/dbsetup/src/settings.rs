//! Resolved database settings from the environment.

use std::sync::OnceLock;

use crate::env::{ensure_env_loaded, EnvAccess, EnvReader, EnvSubstitution};
use crate::error::Result;

/// Canonical environment keys. Each one can be remapped per context through
/// an [`EnvSubstitution`] before lookup.
pub mod keys {
    pub const DB_HOST: &str = "DB_HOST";
    pub const DB_PORT: &str = "DB_PORT";
    pub const DB_NAME: &str = "DB_NAME";
    pub const DB_USER: &str = "DB_USER";
    pub const DB_PASSWORD: &str = "DB_PASSWORD";
    pub const DB_ROOT_USER: &str = "DB_ROOT_USER";
    pub const DB_ROOT_PASSWORD: &str = "DB_ROOT_PASSWORD";
    pub const POSTGRES_INCLUDE_ERROR_DETAIL: &str = "POSTGRES_INCLUDE_ERROR_DETAIL";
}

/// Connection settings resolved from the environment. All fields are required
/// except `include_error_detail`, which defaults to on and is only disabled
/// when `POSTGRES_INCLUDE_ERROR_DETAIL` is exactly `false` (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub host: String,
    pub port: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_root_user: String,
    pub db_root_password: String,
    pub include_error_detail: bool,
}

impl DbSettings {
    /// Resolve all required settings, applying substitutions first. Any
    /// missing or blank key aborts resolution with the actual key name.
    pub fn resolve(env: &dyn EnvAccess, substitutions: &[EnvSubstitution]) -> Result<Self> {
        ensure_env_loaded();

        let reader = EnvReader::new(env, substitutions);

        Ok(Self {
            host: reader.required(keys::DB_HOST)?,
            port: reader.required(keys::DB_PORT)?,
            db_name: reader.required(keys::DB_NAME)?,
            db_user: reader.required(keys::DB_USER)?,
            db_password: reader.required(keys::DB_PASSWORD)?,
            db_root_user: reader.required(keys::DB_ROOT_USER)?,
            db_root_password: reader.required(keys::DB_ROOT_PASSWORD)?,
            include_error_detail: reader
                .get(keys::POSTGRES_INCLUDE_ERROR_DETAIL)
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
        })
    }

    /// Secret values that must never appear in log output.
    pub fn secrets(&self) -> [&str; 2] {
        [&self.db_password, &self.db_root_password]
    }
}

/// Per-driver settings cache: resolution happens on first use and the result
/// is reused for the lifetime of the driver instance, so an instance running
/// Setup followed by Teardown reads the environment once.
pub struct LazySettings {
    substitutions: Vec<EnvSubstitution>,
    cell: OnceLock<DbSettings>,
}

impl LazySettings {
    pub fn new(substitutions: Vec<EnvSubstitution>) -> Self {
        Self {
            substitutions,
            cell: OnceLock::new(),
        }
    }

    pub fn get(&self, env: &dyn EnvAccess) -> Result<&DbSettings> {
        if let Some(settings) = self.cell.get() {
            return Ok(settings);
        }
        let resolved = DbSettings::resolve(env, &self.substitutions)?;
        Ok(self.cell.get_or_init(|| resolved))
    }
}
