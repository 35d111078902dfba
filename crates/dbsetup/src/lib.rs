//! # dbsetup
//!
//! Database and role provisioning for multi-context migration projects.
//!
//! This library is the thin administrative layer that sits in front of the
//! migration tooling: it creates and drops the role/login and database each
//! configured context needs, discovers contexts from a project manifest, and
//! scaffolds new context boilerplate.
//!
//! - **Idempotent provisioning**: every create/drop re-queries live state
//!   and skips work that is already done; repeated runs converge.
//! - **Two engines**: PostgreSQL ([`drivers::PostgresDriver`]) and
//!   SQL Server ([`drivers::SqlServerDriver`]), polymorphic over the
//!   [`drivers::ProvisioningDriver`] capability set.
//! - **Env-driven settings**: canonical `DB_*` keys with per-context
//!   substitutions, resolved lazily and exactly once per driver instance.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbsetup::context::ContextRegistry;
//! use dbsetup::drivers::Driver;
//!
//! # async fn run() -> dbsetup::Result<()> {
//! let registry = ContextRegistry::load("contexts.yaml")?;
//! let descriptor = registry.resolve("main")?;
//! if let Some(driver) = Driver::for_context(descriptor) {
//!     driver.setup().await?;
//! }
//! # Ok(()) }
//! ```

pub mod bootstrap;
pub mod conn;
pub mod context;
pub mod drivers;
pub mod env;
pub mod error;
pub mod ident;
pub mod scripts;
pub mod settings;

// Re-exports for convenient access
pub use context::{ContextDescriptor, ContextManifest, ContextRegistry};
pub use drivers::{Driver, DriverKind, PostgresDriver, ProvisioningDriver, SqlServerDriver};
pub use env::EnvSubstitution;
pub use error::{Result, SetupError};
pub use settings::DbSettings;
