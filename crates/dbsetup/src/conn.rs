//! Connection string construction and log redaction.
//!
//! These are pure builders: live connections are configured programmatically
//! by the drivers, while these strings are the logged/displayed contract and
//! what migration tooling downstream consumes.

use crate::settings::DbSettings;

/// Administrative database used for provisioning on each engine.
pub const POSTGRES_ADMIN_DB: &str = "postgres";
pub const SQL_SERVER_ADMIN_DB: &str = "master";

const MASK: &str = "*****";

/// Npgsql-style PostgreSQL connection string.
pub fn postgres(
    host: &str,
    port: &str,
    db_name: &str,
    user: &str,
    password: &str,
    include_error_detail: bool,
) -> String {
    let mut conn =
        format!("Host={host};Port={port};Database={db_name};User Id={user};Password={password};");
    if include_error_detail {
        conn.push_str("Include Error Detail=true;");
    }
    conn
}

/// SQL Server connection string.
pub fn sql_server(host: &str, port: &str, db_name: &str, user: &str, password: &str) -> String {
    format!(
        "Server={host},{port};Database={db_name};User Id={user};Password={password};TrustServerCertificate=True;"
    )
}

/// Root connection string targeting the Postgres administrative database.
pub fn postgres_root(settings: &DbSettings) -> String {
    postgres(
        &settings.host,
        &settings.port,
        POSTGRES_ADMIN_DB,
        &settings.db_root_user,
        &settings.db_root_password,
        settings.include_error_detail,
    )
}

/// Root-credentialed connection string targeting the application database,
/// for handing to migration tooling.
pub fn postgres_migrations(settings: &DbSettings) -> String {
    postgres(
        &settings.host,
        &settings.port,
        &settings.db_name,
        &settings.db_root_user,
        &settings.db_root_password,
        settings.include_error_detail,
    )
}

/// Root connection string targeting the SQL Server administrative database.
pub fn sql_server_root(settings: &DbSettings) -> String {
    sql_server(
        &settings.host,
        &settings.port,
        SQL_SERVER_ADMIN_DB,
        &settings.db_root_user,
        &settings.db_root_password,
    )
}

/// Root-credentialed connection string targeting the application database.
pub fn sql_server_migrations(settings: &DbSettings) -> String {
    sql_server(
        &settings.host,
        &settings.port,
        &settings.db_name,
        &settings.db_root_user,
        &settings.db_root_password,
    )
}

/// Replace every occurrence of each secret with a fixed mask. Empty secrets
/// are skipped so redaction can never blank out the whole string.
pub fn log_safe(connection_string: &str, secrets: &[&str]) -> String {
    let mut safe = connection_string.to_string();
    for secret in secrets {
        if !secret.is_empty() {
            safe = safe.replace(secret, MASK);
        }
    }
    safe
}
