//! SQL script loading with placeholder substitution.
//!
//! Migration scripts live under the project `scripts/` directory and may
//! reference deployment-specific values through placeholder tokens. The
//! replacer is handed in as a constructed collaborator so tests and callers
//! control substitution explicitly.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;

/// Token replaced by [`DefaultSqlPlaceholderReplacer`].
pub const DB_USER_TOKEN: &str = ":DB_USER";

/// Applies placeholder substitutions to raw script text.
pub trait SqlPlaceholderReplacer: Send + Sync {
    fn replace_placeholders(&self, sql: &str) -> String;
}

/// Replaces the `:DB_USER` token with the resolved database user.
pub struct DefaultSqlPlaceholderReplacer {
    db_user: String,
}

impl DefaultSqlPlaceholderReplacer {
    pub fn new(db_user: impl Into<String>) -> Self {
        Self {
            db_user: db_user.into(),
        }
    }
}

impl SqlPlaceholderReplacer for DefaultSqlPlaceholderReplacer {
    fn replace_placeholders(&self, sql: &str) -> String {
        sql.replace(DB_USER_TOKEN, &self.db_user)
    }
}

/// Loads scripts from a scripts directory and applies placeholder
/// replacement before handing the text to the migration tooling.
pub struct ScriptLoader {
    scripts_dir: PathBuf,
    replacer: Box<dyn SqlPlaceholderReplacer>,
}

impl ScriptLoader {
    pub fn new(scripts_dir: impl Into<PathBuf>, replacer: Box<dyn SqlPlaceholderReplacer>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            replacer,
        }
    }

    /// Read `scripts/<relative_path>` and substitute placeholders.
    pub fn load_script(&self, relative_path: &str) -> Result<String> {
        let path = self.scripts_dir.join(relative_path);
        let sql = std::fs::read_to_string(path)?;
        Ok(self.replacer.replace_placeholders(&sql))
    }
}

/// Seam for the external migration runner. Schema migration execution is
/// delegated entirely; nothing in this crate implements or invokes it.
#[async_trait]
pub trait MigrationRunner {
    async fn apply_pending_migrations(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_replacer_substitutes_db_user() {
        let replacer = DefaultSqlPlaceholderReplacer::new("app_user");
        let sql = replacer.replace_placeholders("GRANT ALL ON SCHEMA public TO :DB_USER;");
        assert_eq!(sql, "GRANT ALL ON SCHEMA public TO app_user;");
    }

    #[test]
    fn test_replacer_handles_multiple_occurrences() {
        let replacer = DefaultSqlPlaceholderReplacer::new("app_user");
        let sql = replacer.replace_placeholders(":DB_USER, :DB_USER");
        assert_eq!(sql, "app_user, app_user");
    }

    #[test]
    fn test_load_script_applies_replacements() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("grants")).unwrap();
        std::fs::write(
            dir.path().join("grants/initial.sql"),
            "ALTER TABLE person OWNER TO :DB_USER;",
        )
        .unwrap();

        let loader = ScriptLoader::new(
            dir.path(),
            Box::new(DefaultSqlPlaceholderReplacer::new("app_user")),
        );
        let sql = loader.load_script("grants/initial.sql").unwrap();
        assert_eq!(sql, "ALTER TABLE person OWNER TO app_user;");
    }

    #[test]
    fn test_load_script_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let loader = ScriptLoader::new(
            dir.path(),
            Box::new(DefaultSqlPlaceholderReplacer::new("app_user")),
        );
        assert!(loader.load_script("missing.sql").is_err());
    }
}
