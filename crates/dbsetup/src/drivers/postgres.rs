//! PostgreSQL provisioning driver.

use async_trait::async_trait;
use heck::ToSnakeCase;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, info, warn};

use super::ProvisioningDriver;
use crate::conn;
use crate::env::{EnvAccess, EnvSubstitution, ProcessEnv};
use crate::error::{Result, SetupError};
use crate::settings::{DbSettings, LazySettings};

const ROLE_EXISTS_SQL: &str =
    "SELECT EXISTS(SELECT FROM pg_catalog.pg_roles WHERE rolname = $1)";

const DB_EXISTS_SQL: &str =
    "SELECT EXISTS(SELECT datname FROM pg_catalog.pg_database WHERE lower(datname) = lower($1))";

const TERMINATE_BACKENDS_SQL: &str = "SELECT pg_terminate_backend(pg_stat_activity.pid) \
     FROM pg_stat_activity \
     WHERE pg_stat_activity.datname = $1 AND pid <> pg_backend_pid()";

const ROLE_HAS_DEPENDENT_DBS_SQL: &str = "SELECT EXISTS (\
     SELECT 1 FROM pg_database \
     WHERE datdba = (SELECT oid FROM pg_roles WHERE rolname = $1))";

fn create_role_sql(role: &str, password: &str) -> String {
    format!(
        "CREATE ROLE {role} WITH LOGIN NOSUPERUSER NOCREATEDB NOCREATEROLE INHERIT \
         NOREPLICATION CONNECTION LIMIT -1 PASSWORD '{}';",
        password.replace('\'', "''")
    )
}

fn create_db_sql(db_name: &str, owner: &str) -> String {
    format!("CREATE DATABASE {db_name} WITH OWNER = {owner} ENCODING = 'UTF8' CONNECTION LIMIT = -1;")
}

fn drop_db_sql(db_name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {db_name}")
}

fn drop_role_sql(role: &str) -> String {
    format!("DROP ROLE IF EXISTS {role}")
}

const BOILERPLATE: &str = r#"use dbsetup::context::ContextDescriptor;
use dbsetup::drivers::DriverKind;

/// Registry declaration for the PlaceholderDbContext database context.
pub fn placeholder_db_context() -> ContextDescriptor {
    ContextDescriptor::new("PlaceholderDbContext", Some(DriverKind::Postgres))
}
"#;

/// Provisions a role and database on a PostgreSQL server using root
/// credentials. Settings resolve lazily on first use and are cached for the
/// driver's lifetime.
pub struct PostgresDriver {
    settings: LazySettings,
    env: Box<dyn EnvAccess>,
}

impl PostgresDriver {
    pub fn new(substitutions: Vec<EnvSubstitution>) -> Self {
        Self::with_env(substitutions, Box::new(ProcessEnv))
    }

    pub fn with_env(substitutions: Vec<EnvSubstitution>, env: Box<dyn EnvAccess>) -> Self {
        Self {
            settings: LazySettings::new(substitutions),
            env,
        }
    }

    fn settings(&self) -> Result<&DbSettings> {
        self.settings.get(self.env.as_ref())
    }

    /// Open a root connection against the administrative database. The
    /// connection task ends when the returned client is dropped, so the
    /// socket is released on every exit path.
    async fn connect_root(&self, settings: &DbSettings) -> Result<Client> {
        let port: u16 = settings.port.parse().map_err(|_| {
            SetupError::config(format!(
                "DB_PORT is not a valid port number: {}",
                settings.port
            ))
        })?;

        let mut config = Config::new();
        config
            .host(&settings.host)
            .port(port)
            .dbname(conn::POSTGRES_ADMIN_DB)
            .user(&settings.db_root_user)
            .password(&settings.db_root_password);

        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("postgres connection closed with error: {e}");
            }
        });

        Ok(client)
    }

    /// Abort unless `name` survives the server's `quote_ident` unchanged.
    /// A name the server would need to quote is treated as an injection
    /// attempt, not escaped.
    async fn ensure_safe_identifier(client: &Client, what: &str, name: &str) -> Result<()> {
        let row = client.query_one("SELECT quote_ident($1)", &[&name]).await?;
        let quoted: String = row.get(0);
        if quoted != name {
            return Err(SetupError::safety(format!(
                "the {what} name did not pass the quote_ident round-trip test: {name}"
            )));
        }
        Ok(())
    }

    async fn role_exists(client: &Client, role: &str) -> Result<bool> {
        let row = client.query_one(ROLE_EXISTS_SQL, &[&role]).await?;
        Ok(row.get(0))
    }

    async fn db_exists(client: &Client, db_name: &str) -> Result<bool> {
        let row = client.query_one(DB_EXISTS_SQL, &[&db_name]).await?;
        Ok(row.get(0))
    }

    async fn role_has_dependent_objects(client: &Client, role: &str) -> Result<bool> {
        let row = client.query_one(ROLE_HAS_DEPENDENT_DBS_SQL, &[&role]).await?;
        Ok(row.get(0))
    }

    async fn drop_db(client: &Client, db_name: &str) -> Result<()> {
        if !Self::db_exists(client, db_name).await? {
            info!("database does not exist - skipping");
            return Ok(());
        }

        // Existing backends hold the database open; terminate them first.
        client.query(TERMINATE_BACKENDS_SQL, &[&db_name]).await?;
        client.batch_execute(&drop_db_sql(db_name)).await?;
        Ok(())
    }

    async fn drop_role(client: &Client, role: &str) -> Result<()> {
        if !Self::role_exists(client, role).await? {
            info!("no role found - skipping");
            return Ok(());
        }

        if Self::role_has_dependent_objects(client, role).await? {
            warn!(
                "the role has dependent database(s) and will not be dropped (it will be \
                 dropped when the last database is dropped if you passed multiple databases \
                 to operate on)"
            );
            return Ok(());
        }

        client.batch_execute(&drop_role_sql(role)).await?;
        Ok(())
    }
}

#[async_trait]
impl ProvisioningDriver for PostgresDriver {
    async fn setup(&self) -> Result<()> {
        let settings = self.settings()?;
        let root = conn::postgres_root(settings);
        info!(
            "creating database {} and role {} using root connection string: {}",
            settings.db_name,
            settings.db_user,
            conn::log_safe(&root, &settings.secrets())
        );

        let client = self.connect_root(settings).await?;

        Self::ensure_safe_identifier(&client, "role", &settings.db_user).await?;
        Self::ensure_safe_identifier(&client, "database", &settings.db_name).await?;

        if Self::role_exists(&client, &settings.db_user).await? {
            info!("role {} already exists, skipping", settings.db_user);
        } else {
            client
                .batch_execute(&create_role_sql(&settings.db_user, &settings.db_password))
                .await?;
            info!("created role {}", settings.db_user);
        }

        if Self::db_exists(&client, &settings.db_name).await? {
            info!("db {} already exists, skipping", settings.db_name);
        } else {
            client
                .batch_execute(&create_db_sql(&settings.db_name, &settings.db_user))
                .await?;
            info!(
                "created db {} with owner {}",
                settings.db_name, settings.db_user
            );
        }

        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        let settings = self.settings()?;
        let root = conn::postgres_root(settings);
        info!(
            "dropping database {} and role {} using root connection string: {}",
            settings.db_name,
            settings.db_user,
            conn::log_safe(&root, &settings.secrets())
        );

        let client = self.connect_root(settings).await?;

        Self::ensure_safe_identifier(&client, "role", &settings.db_user).await?;
        Self::ensure_safe_identifier(&client, "database", &settings.db_name).await?;

        info!("dropping database: {}", settings.db_name);
        Self::drop_db(&client, &settings.db_name).await?;

        info!("dropping role {}", settings.db_user);
        Self::drop_role(&client, &settings.db_user).await?;

        Ok(())
    }

    fn boilerplate(&self, context_name: &str) -> String {
        BOILERPLATE
            .replace("placeholder_db_context", &context_name.to_snake_case())
            .replace("PlaceholderDbContext", context_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_role_sql_flags() {
        let sql = create_role_sql("app_user", "s3cret");
        assert_eq!(
            sql,
            "CREATE ROLE app_user WITH LOGIN NOSUPERUSER NOCREATEDB NOCREATEROLE INHERIT \
             NOREPLICATION CONNECTION LIMIT -1 PASSWORD 's3cret';"
        );
    }

    #[test]
    fn test_create_role_sql_escapes_password_quotes() {
        let sql = create_role_sql("app_user", "pa'ss");
        assert!(sql.contains("PASSWORD 'pa''ss'"));
    }

    #[test]
    fn test_create_db_sql() {
        assert_eq!(
            create_db_sql("app_db", "app_user"),
            "CREATE DATABASE app_db WITH OWNER = app_user ENCODING = 'UTF8' CONNECTION LIMIT = -1;"
        );
    }

    #[test]
    fn test_drop_statements_use_if_exists() {
        assert_eq!(drop_db_sql("app_db"), "DROP DATABASE IF EXISTS app_db");
        assert_eq!(drop_role_sql("app_user"), "DROP ROLE IF EXISTS app_user");
    }

    #[test]
    fn test_terminate_backends_excludes_self() {
        assert!(TERMINATE_BACKENDS_SQL.contains("pid <> pg_backend_pid()"));
    }

    #[test]
    fn test_dependent_dbs_query_joins_on_datdba() {
        assert!(ROLE_HAS_DEPENDENT_DBS_SQL.contains("datdba"));
    }

    #[test]
    fn test_boilerplate_substitution() {
        let driver = PostgresDriver::new(Vec::new());
        let text = driver.boilerplate("OrdersDbContext");
        assert!(text.contains("pub fn orders_db_context()"));
        assert!(text.contains("\"OrdersDbContext\""));
        assert!(text.contains("DriverKind::Postgres"));
    }
}
