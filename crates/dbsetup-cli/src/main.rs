//! dbsetup CLI - database and role provisioning for migration contexts.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use comfy_table::Table;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn, Level};

use dbsetup::bootstrap::Bootstrapper;
use dbsetup::context::{ContextRegistry, MANIFEST_FILE};
use dbsetup::drivers::Driver;
use dbsetup::{Result, SetupError};

#[derive(Parser)]
#[command(name = "dbsetup")]
#[command(about = "Creates and drops databases and roles for migration contexts")]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Path to the context manifest
    #[arg(long, default_value = MANIFEST_FILE, global = true)]
    manifest: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and role/login for the given contexts
    Setup {
        /// Context names (case-insensitive; the DbContext suffix is optional)
        #[arg(required = true)]
        contexts: Vec<String>,
    },

    /// Drop the database and role/login for the given contexts
    Teardown {
        /// Context names (case-insensitive; the DbContext suffix is optional)
        #[arg(required = true)]
        contexts: Vec<String>,
    },

    /// List all contexts declared in the manifest
    List,

    /// Scaffold boilerplate for a new context
    Bootstrap {
        /// Name of the new context; must end with "DbContext"
        context_name: String,

        /// Setup type provisioning the context (PostgresSetup or SqlServerSetup)
        setup_type: String,

        /// Optional scripts subdirectory to create
        scripts_subdir: Option<String>,
    },
}

#[derive(Clone, Copy)]
enum Operation {
    Setup,
    Teardown,
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Teardown => "teardown",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version requests are not errors; everything else is a
            // parameter error and exits 1 with the rendered usage text.
            let code: u8 = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    if let Err(e) = setup_logging(&cli.verbosity, &cli.log_format) {
        eprintln!("{e}");
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_param() => {
            eprintln!("{e}\n");
            let _ = Cli::command().print_help();
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::List => list_contexts(&cli.manifest),
        Commands::Setup { contexts } => {
            operate(&cli.manifest, Operation::Setup, &contexts).await
        }
        Commands::Teardown { contexts } => {
            operate(&cli.manifest, Operation::Teardown, &contexts).await
        }
        Commands::Bootstrap {
            context_name,
            setup_type,
            scripts_subdir,
        } => Bootstrapper::in_current_dir()?.bootstrap(
            &context_name,
            &setup_type,
            scripts_subdir.as_deref(),
        ),
    }
}

fn load_registry(manifest: &Path) -> Result<ContextRegistry> {
    if !manifest.exists() {
        return Err(SetupError::param(format!(
            "No context manifest found at {} - run from the project directory or pass --manifest",
            manifest.display()
        )));
    }
    ContextRegistry::load(manifest)
}

/// Run setup or teardown for each named context in order. All names resolve
/// before any operation starts; a failing context is reported and the rest
/// are still attempted.
async fn operate(manifest: &Path, operation: Operation, names: &[String]) -> Result<()> {
    let registry = load_registry(manifest)?;

    let mut descriptors = Vec::with_capacity(names.len());
    for name in names {
        descriptors.push(registry.resolve(name)?.clone());
    }

    let mut failed = Vec::new();
    for descriptor in &descriptors {
        let Some(driver) = Driver::for_context(descriptor) else {
            warn!(
                "The context {:?} does not have a setup type - skipping",
                descriptor.name
            );
            continue;
        };

        info!(
            "Running {} for context {:?} using setup type {:?}",
            operation.name(),
            descriptor.name,
            descriptor.setup.map(|k| k.setup_type_name()).unwrap_or_default()
        );

        let result = match operation {
            Operation::Setup => driver.setup().await,
            Operation::Teardown => driver.teardown().await,
        };

        if let Err(e) = result {
            error!(
                "{} failed for context {}: {}",
                operation.name(),
                descriptor.name,
                e.format_detailed()
            );
            failed.push(descriptor.name.clone());
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(SetupError::operation(operation.name(), &failed))
    }
}

fn list_contexts(manifest: &Path) -> Result<()> {
    let registry = load_registry(manifest)?;

    if registry.is_empty() {
        warn!("No contexts declared in the manifest");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Context Name", "Setup Type", "Env Substitutions"]);

    for descriptor in registry.all() {
        let setup = match descriptor.setup {
            Some(kind) => kind.setup_type_name().to_string(),
            None => "(missing setup type)".to_string(),
        };
        let substitutions = descriptor
            .env_substitutions
            .iter()
            .map(|s| format!("{} -> {}", s.from, s.to))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![descriptor.name.clone(), setup, substitutions]);
    }

    println!("{table}");
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> std::result::Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
