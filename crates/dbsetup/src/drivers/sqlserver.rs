//! SQL Server provisioning driver.
//!
//! SQL Server splits identity between a server login and a per-database
//! user, so setup and teardown have more steps than the Postgres driver:
//! login, database, database user, and role membership are each handled
//! separately with their own existence checks.

use async_trait::async_trait;
use heck::ToSnakeCase;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use super::ProvisioningDriver;
use crate::conn;
use crate::env::{EnvAccess, EnvSubstitution, ProcessEnv};
use crate::error::{Result, SetupError};
use crate::settings::{DbSettings, LazySettings};

type SqlClient = Client<Compat<TcpStream>>;

/// System databases excluded from the login-in-use scan.
const SYSTEM_DATABASES: &[&str] = &["master", "tempdb", "model", "msdb"];

const LIST_DATABASES_SQL: &str = "USE [master];SELECT name FROM sys.databases;";

fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

fn login_exists_sql(user: &str) -> String {
    format!("select count(1) from [sys].[server_principals] where [name]='{user}'")
}

fn create_login_sql(user: &str, password: &str) -> String {
    format!(
        "CREATE LOGIN [{user}] WITH PASSWORD = '{}';",
        escape_sql_string(password)
    )
}

fn database_exists_sql(db_name: &str) -> String {
    format!("select count(1) from [sys].[databases] where [name]='{db_name}'")
}

fn create_database_sql(db_name: &str) -> String {
    format!("CREATE DATABASE [{db_name}]")
}

fn user_exists_sql(db_name: &str, user: &str) -> String {
    format!("USE [{db_name}];select count(1) from [sys].[database_principals] where [name]='{user}'")
}

fn create_user_sql(db_name: &str, user: &str) -> String {
    format!("USE [{db_name}];CREATE USER {user} FOR LOGIN [{user}];")
}

fn ensure_user_roles_sql(db_name: &str, user: &str) -> String {
    format!(
        "USE [{db_name}];ALTER ROLE db_datareader ADD MEMBER [{user}];\
         ALTER ROLE db_datawriter ADD MEMBER [{user}];"
    )
}

fn set_single_user_sql(db_name: &str) -> String {
    format!("ALTER DATABASE {db_name} SET SINGLE_USER WITH ROLLBACK IMMEDIATE")
}

fn drop_database_sql(db_name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {db_name}")
}

fn drop_user_sql(user: &str) -> String {
    format!("USE [master]; DROP USER IF EXISTS {user}")
}

fn drop_login_sql(user: &str) -> String {
    format!("DROP LOGIN {user}")
}

fn user_in_database_sql(db_name: &str, user: &str) -> String {
    format!("USE [{db_name}];SELECT 1 FROM sys.database_principals WHERE name = '{user}';")
}

/// Reject names that cannot be safely embedded in administrative statements.
/// Unlike the Postgres quote_ident round-trip, this is a denylist check.
fn check_name_safety(db_name: &str, db_user: &str) -> Result<()> {
    if db_name.contains('\'') {
        return Err(SetupError::safety(format!(
            "Invalid database name has single quotes: {db_name}"
        )));
    }
    if db_user.contains('\'') {
        return Err(SetupError::safety(format!(
            "Invalid database user name has single quotes: {db_user}"
        )));
    }
    if db_name.trim() != db_name {
        return Err(SetupError::safety(
            "Database name must not have leading or trailing whitespace",
        ));
    }
    if db_user.trim() != db_user {
        return Err(SetupError::safety(
            "Database user must not have leading or trailing whitespace",
        ));
    }
    if db_user.eq_ignore_ascii_case("sa") {
        return Err(SetupError::safety(
            "Invalid database user - cannot use \"sa\" for an application-specific database",
        ));
    }
    Ok(())
}

const BOILERPLATE: &str = r#"use dbsetup::context::ContextDescriptor;
use dbsetup::drivers::DriverKind;

/// Registry declaration for the PlaceholderDbContext database context.
pub fn placeholder_db_context() -> ContextDescriptor {
    ContextDescriptor::new("PlaceholderDbContext", Some(DriverKind::SqlServer))
}
"#;

/// Provisions a login, database, database user, and role membership on a
/// SQL Server instance using root credentials.
pub struct SqlServerDriver {
    settings: LazySettings,
    env: Box<dyn EnvAccess>,
}

impl SqlServerDriver {
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

    /// Open a root connection against `master`. Dropping the client closes
    /// the underlying TCP stream.
    async fn connect_root(&self, settings: &DbSettings) -> Result<SqlClient> {
        let port: u16 = settings.port.parse().map_err(|_| {
            SetupError::config(format!(
                "DB_PORT is not a valid port number: {}",
                settings.port
            ))
        })?;

        let mut config = Config::new();
        config.host(&settings.host);
        config.port(port);
        config.database(conn::SQL_SERVER_ADMIN_DB);
        config.authentication(AuthMethod::sql_server(
            &settings.db_root_user,
            &settings.db_root_password,
        ));
        config.trust_cert();
        config.encryption(EncryptionLevel::Required);

        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write()).await?;
        Ok(client)
    }

    async fn scalar_count_is_positive(client: &mut SqlClient, sql: &str) -> Result<bool> {
        let row = client.simple_query(sql).await?.into_row().await?;
        let count: i32 = row.and_then(|r| r.get(0)).unwrap_or(0);
        Ok(count > 0)
    }

    async fn login_exists(client: &mut SqlClient, user: &str) -> Result<bool> {
        debug!("checking if login exists...");
        Self::scalar_count_is_positive(client, &login_exists_sql(user)).await
    }

    async fn database_exists(client: &mut SqlClient, db_name: &str) -> Result<bool> {
        debug!("checking if database exists...");
        Self::scalar_count_is_positive(client, &database_exists_sql(db_name)).await
    }

    async fn user_exists(client: &mut SqlClient, db_name: &str, user: &str) -> Result<bool> {
        debug!("checking if database user exists...");
        Self::scalar_count_is_positive(client, &user_exists_sql(db_name, user)).await
    }

    async fn ensure_login(client: &mut SqlClient, user: &str, password: &str) -> Result<()> {
        if Self::login_exists(client, user).await? {
            info!("login {user} already exists, skipping");
        } else {
            client.simple_query(&create_login_sql(user, password)).await?;
            info!("created login {user}");
        }
        Ok(())
    }

    async fn ensure_database(client: &mut SqlClient, db_name: &str) -> Result<()> {
        if Self::database_exists(client, db_name).await? {
            info!("database {db_name} already exists, skipping");
        } else {
            client.simple_query(&create_database_sql(db_name)).await?;
            info!("created database {db_name}");
        }
        Ok(())
    }

    async fn ensure_user(client: &mut SqlClient, db_name: &str, user: &str) -> Result<()> {
        if Self::user_exists(client, db_name, user).await? {
            info!("user {user} already exists in database {db_name}, skipping");
        } else {
            client.simple_query(&create_user_sql(db_name, user)).await?;
            info!("created user {user} in database {db_name}");
        }
        Ok(())
    }

    /// Role membership is re-applied every run, whether or not the user was
    /// just created.
    async fn ensure_user_roles(client: &mut SqlClient, db_name: &str, user: &str) -> Result<()> {
        info!("ensuring user belongs to roles db_datareader and db_datawriter");
        client
            .simple_query(&ensure_user_roles_sql(db_name, user))
            .await?;
        Ok(())
    }

    async fn drop_user(client: &mut SqlClient, db_name: &str, user: &str) -> Result<()> {
        if !Self::database_exists(client, db_name).await? {
            info!("database does not exist, no need to check database for user - skipping");
            return Ok(());
        }
        if Self::user_exists(client, db_name, user).await? {
            client.simple_query(&drop_user_sql(user)).await?;
            info!("dropped user {user}");
        } else {
            info!("user {user} does not exist in database {db_name} - skipping");
        }
        Ok(())
    }

    async fn drop_database(client: &mut SqlClient, db_name: &str) -> Result<()> {
        if Self::database_exists(client, db_name).await? {
            // Force off other sessions before the drop.
            client.simple_query(&set_single_user_sql(db_name)).await?;
            client.simple_query(&drop_database_sql(db_name)).await?;
            info!("dropped database {db_name}");
        } else {
            info!("database {db_name} does not exist - skipping");
        }
        Ok(())
    }

    async fn drop_login(client: &mut SqlClient, user: &str) -> Result<()> {
        let login_exists = Self::login_exists(client, user).await?;
        let login_in_use =
            login_exists && Self::is_login_used_by_any_database(client, user).await?;

        if login_in_use {
            warn!(
                "login {user} is still associated to a database user - skipping deletion \
                 (expected for multiple database shared user scenarios)"
            );
        } else if login_exists {
            info!("dropping login {user}...");
            client.simple_query(&drop_login_sql(user)).await?;
            info!("dropped login {user}");
        } else {
            info!("login {user} does not exist - skipping");
        }
        Ok(())
    }

    async fn is_login_used_by_any_database(client: &mut SqlClient, user: &str) -> Result<bool> {
        debug!("checking if any other database users are still associated with login {user}");
        let databases = Self::get_databases(client).await?;
        for db_name in databases {
            if SYSTEM_DATABASES.contains(&db_name.as_str()) {
                continue;
            }
            if Self::scalar_count_is_positive(client, &user_in_database_sql(&db_name, user)).await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn get_databases(client: &mut SqlClient) -> Result<Vec<String>> {
        let rows = client
            .simple_query(LIST_DATABASES_SQL)
            .await?
            .into_first_result()
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get::<&str, _>(0).map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl ProvisioningDriver for SqlServerDriver {
    async fn setup(&self) -> Result<()> {
        let settings = self.settings()?;
        let root = conn::sql_server_root(settings);
        info!(
            "creating database {} and user {} (server login and database user) using root \
             connection string: {}",
            settings.db_name,
            settings.db_user,
            conn::log_safe(&root, &settings.secrets())
        );

        check_name_safety(&settings.db_name, &settings.db_user)?;

        let mut client = self.connect_root(settings).await?;

        Self::ensure_login(&mut client, &settings.db_user, &settings.db_password).await?;
        Self::ensure_database(&mut client, &settings.db_name).await?;
        Self::ensure_user(&mut client, &settings.db_name, &settings.db_user).await?;
        Self::ensure_user_roles(&mut client, &settings.db_name, &settings.db_user).await?;

        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        let settings = self.settings()?;
        let root = conn::sql_server_root(settings);
        info!(
            "tearing down database {} and user {} using connection string: {}",
            settings.db_name,
            settings.db_user,
            conn::log_safe(&root, &settings.secrets())
        );

        check_name_safety(&settings.db_name, &settings.db_user)?;

        let mut client = self.connect_root(settings).await?;

        Self::drop_user(&mut client, &settings.db_name, &settings.db_user).await?;
        Self::drop_database(&mut client, &settings.db_name).await?;
        Self::drop_login(&mut client, &settings.db_user).await?;

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
    fn test_name_safety_rejects_quotes() {
        assert!(check_name_safety("app'db", "app_user").is_err());
        assert!(check_name_safety("app_db", "app'user").is_err());
    }

    #[test]
    fn test_name_safety_rejects_whitespace() {
        assert!(check_name_safety(" app_db", "app_user").is_err());
        assert!(check_name_safety("app_db", "app_user ").is_err());
    }

    #[test]
    fn test_name_safety_rejects_sa_case_insensitive() {
        for user in ["sa", "SA", "Sa"] {
            let err = check_name_safety("app_db", user).unwrap_err();
            assert!(err.to_string().contains("sa"), "user {user:?}");
        }
    }

    #[test]
    fn test_name_safety_accepts_normal_names() {
        assert!(check_name_safety("app_db", "app_user").is_ok());
    }

    #[test]
    fn test_create_login_escapes_password() {
        let sql = create_login_sql("app_user", "pa'ss");
        assert!(sql.contains("PASSWORD = 'pa''ss'"));
        assert!(sql.starts_with("CREATE LOGIN [app_user]"));
    }

    #[test]
    fn test_drop_sequence_statements() {
        assert_eq!(
            set_single_user_sql("app_db"),
            "ALTER DATABASE app_db SET SINGLE_USER WITH ROLLBACK IMMEDIATE"
        );
        assert_eq!(drop_database_sql("app_db"), "DROP DATABASE IF EXISTS app_db");
        assert_eq!(drop_user_sql("app_user"), "USE [master]; DROP USER IF EXISTS app_user");
    }

    #[test]
    fn test_ensure_roles_adds_reader_and_writer() {
        let sql = ensure_user_roles_sql("app_db", "app_user");
        assert!(sql.contains("db_datareader"));
        assert!(sql.contains("db_datawriter"));
        assert!(sql.starts_with("USE [app_db];"));
    }

    #[test]
    fn test_system_databases_excluded_from_scan() {
        for db in ["master", "tempdb", "model", "msdb"] {
            assert!(SYSTEM_DATABASES.contains(&db));
        }
    }

    #[test]
    fn test_boilerplate_references_sql_server() {
        let driver = SqlServerDriver::new(Vec::new());
        let text = driver.boilerplate("OrdersDbContext");
        assert!(text.contains("DriverKind::SqlServer"));
        assert!(text.contains("pub fn orders_db_context()"));
    }
}
