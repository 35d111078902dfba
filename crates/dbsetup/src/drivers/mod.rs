//! Engine drivers for database and role provisioning.
//!
//! Each supported engine implements [`ProvisioningDriver`]; the [`Driver`]
//! enum provides static dispatch over the closed set of variants, so driver
//! selection is a table lookup rather than dynamic instantiation.

mod postgres;
mod sqlserver;

pub use postgres::PostgresDriver;
pub use sqlserver::SqlServerDriver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::ContextDescriptor;
use crate::error::Result;

/// The supported engine variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    Postgres,
    SqlServer,
}

impl DriverKind {
    /// Resolve a user-supplied driver-type name. Accepts both the manifest
    /// spellings (`postgres`, `sql_server`) and the setup-type names used in
    /// generated boilerplate (`PostgresSetup`, `SqlServerSetup`),
    /// case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "postgres" | "postgresql" | "postgressetup" => Some(Self::Postgres),
            "sql_server" | "sqlserver" | "mssql" | "sqlserversetup" => Some(Self::SqlServer),
            _ => None,
        }
    }

    /// Setup-type name as it appears in boilerplate and listings.
    pub fn setup_type_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgresSetup",
            Self::SqlServer => "SqlServerSetup",
        }
    }

    /// Spelling used in the context manifest.
    pub fn manifest_name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::SqlServer => "sql_server",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.setup_type_name())
    }
}

/// Capability set shared by all engine drivers.
#[async_trait]
pub trait ProvisioningDriver: Send + Sync {
    /// Idempotently create the context's role/login and database.
    async fn setup(&self) -> Result<()>;

    /// Idempotently drop the context's database and role/login, with
    /// dependency checks before anything shared is removed.
    async fn teardown(&self) -> Result<()>;

    /// Source text for a new context stub referencing this driver.
    fn boilerplate(&self, context_name: &str) -> String;
}

/// Static-dispatch wrapper over the driver variants.
pub enum Driver {
    Postgres(PostgresDriver),
    SqlServer(SqlServerDriver),
}

impl Driver {
    /// Construct the driver variant for a kind, with no substitutions.
    pub fn new(kind: DriverKind) -> Self {
        match kind {
            DriverKind::Postgres => Self::Postgres(PostgresDriver::new(Vec::new())),
            DriverKind::SqlServer => Self::SqlServer(SqlServerDriver::new(Vec::new())),
        }
    }

    /// Construct the driver for a context descriptor, carrying the context's
    /// env substitutions. Returns `None` when the descriptor declares no
    /// setup type.
    pub fn for_context(descriptor: &ContextDescriptor) -> Option<Self> {
        let kind = descriptor.setup?;
        let substitutions = descriptor.env_substitutions.clone();
        Some(match kind {
            DriverKind::Postgres => Self::Postgres(PostgresDriver::new(substitutions)),
            DriverKind::SqlServer => Self::SqlServer(SqlServerDriver::new(substitutions)),
        })
    }

    pub async fn setup(&self) -> Result<()> {
        match self {
            Self::Postgres(d) => d.setup().await,
            Self::SqlServer(d) => d.setup().await,
        }
    }

    pub async fn teardown(&self) -> Result<()> {
        match self {
            Self::Postgres(d) => d.teardown().await,
            Self::SqlServer(d) => d.teardown().await,
        }
    }

    pub fn boilerplate(&self, context_name: &str) -> String {
        match self {
            Self::Postgres(d) => d.boilerplate(context_name),
            Self::SqlServer(d) => d.boilerplate(context_name),
        }
    }
}
