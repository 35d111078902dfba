//! Error types for database setup and teardown operations.

use thiserror::Error;

/// Main error type for provisioning operations.
#[derive(Error, Debug)]
pub enum SetupError {
    /// User-supplied parameter error (bad command, unknown context name, etc.)
    #[error("{0}")]
    Param(String),

    /// Configuration error (missing environment variable, bad manifest)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identifier safety check failed before any SQL was executed
    #[error("Safety check failed: {0}")]
    Safety(String),

    /// PostgreSQL connection or query error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// SQL Server connection or query error
    #[error("SQL Server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    /// IO error (file operations, scaffolding)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error (context manifest)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// One or more contexts failed during a multi-context invocation. The
    /// per-context causes were already logged when they happened.
    #[error("{command} failed for context(s): {contexts}")]
    Operation { command: String, contexts: String },

    /// Programming error: broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SetupError {
    /// Create a Param error
    pub fn param(message: impl Into<String>) -> Self {
        SetupError::Param(message.into())
    }

    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        SetupError::Config(message.into())
    }

    /// Create a Safety error
    pub fn safety(message: impl Into<String>) -> Self {
        SetupError::Safety(message.into())
    }

    /// Create an Operation error summarizing per-context failures
    pub fn operation(command: impl Into<String>, failed: &[String]) -> Self {
        SetupError::Operation {
            command: command.into(),
            contexts: failed.join(", "),
        }
    }

    /// True for errors caused by bad user input rather than a failed operation.
    /// The CLI prints these with help text and without a diagnostic chain.
    pub fn is_param(&self) -> bool {
        matches!(self, SetupError::Param(_))
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, SetupError>;
