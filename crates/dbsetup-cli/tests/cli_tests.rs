//! CLI integration tests for dbsetup.
//!
//! These tests verify command-line argument handling, help output, exit
//! codes, listing, and bootstrap scaffolding. Nothing here talks to a live
//! database server: provisioning paths are exercised up to settings
//! resolution against a scrubbed environment.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the dbsetup binary.
fn cmd() -> Command {
    Command::cargo_bin("dbsetup").unwrap()
}

/// Get a command running in a scratch project directory with a scrubbed
/// environment.
fn cmd_in(dir: &TempDir) -> Command {
    let mut c = cmd();
    c.current_dir(dir.path()).env_clear();
    c
}

fn write_manifest(dir: &TempDir) {
    std::fs::write(
        dir.path().join("contexts.yaml"),
        r#"contexts:
  - name: MainDbContext
    setup: postgres
  - name: TestDbContext
    setup: postgres
    env_substitutions:
      - from: DB_NAME
        to: DB_NAME_TEST
  - name: NoSetupTypeDbContext
"#,
    )
    .unwrap();
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_no_args_exits_1_and_lists_commands() {
    cmd()
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("setup"))
        .stderr(predicate::str::contains("teardown"))
        .stderr(predicate::str::contains("list"))
        .stderr(predicate::str::contains("bootstrap"));
}

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("setup"))
        .stdout(predicate::str::contains("teardown"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("bootstrap"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dbsetup"));
}

#[test]
fn test_unknown_command_exits_1() {
    cmd().arg("frobnicate").assert().failure().code(1);
}

// =============================================================================
// List Tests
// =============================================================================

#[test]
fn test_list_renders_contexts_table() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir);

    cmd_in(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("MainDbContext"))
        .stdout(predicate::str::contains("PostgresSetup"))
        .stdout(predicate::str::contains("(missing setup type)"))
        .stdout(predicate::str::contains("DB_NAME -> DB_NAME_TEST"));
}

#[test]
fn test_list_without_manifest_exits_1() {
    let dir = TempDir::new().unwrap();

    cmd_in(&dir)
        .arg("list")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No context manifest found"));
}

// =============================================================================
// Setup / Teardown Dispatch Tests
// =============================================================================

#[test]
fn test_setup_requires_context_names() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir);

    cmd_in(&dir).arg("setup").assert().failure().code(1);
}

#[test]
fn test_setup_unknown_context_suggests_list() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir);

    cmd_in(&dir)
        .args(["setup", "nonexistent"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("nonexistent"))
        .stderr(predicate::str::contains("list"));
}

#[test]
fn test_setup_context_without_setup_type_warns_and_succeeds() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir);

    cmd_in(&dir)
        .args(["setup", "NoSetupType"])
        .assert()
        .success()
        .stdout(predicate::str::contains("does not have a setup type"));
}

#[test]
fn test_setup_missing_environment_exits_1() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir);

    // The per-context cause is logged as it happens; the process-level error
    // on stderr is the summary.
    cmd_in(&dir)
        .args(["setup", "main"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Missing environment variable for key DB_HOST"))
        .stderr(predicate::str::contains("failed for context(s): MainDbContext"));
}

#[test]
fn test_teardown_resolves_names_before_operating() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir);

    // One good name plus one bad name fails at resolution, before any
    // teardown is attempted.
    cmd_in(&dir)
        .args(["teardown", "main", "nonexistent"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("nonexistent"));
}

#[test]
fn test_setup_substituted_context_reports_substituted_key() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir);

    // TestDbContext remaps DB_NAME to DB_NAME_TEST; the missing-variable
    // error must name the substituted key once resolution reaches it.
    cmd_in(&dir)
        .args(["setup", "test"])
        .env("DB_HOST", "localhost")
        .env("DB_PORT", "5432")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("DB_NAME_TEST"));
}

// =============================================================================
// Bootstrap Tests
// =============================================================================

#[test]
fn test_bootstrap_scaffolds_new_context() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir);

    cmd_in(&dir)
        .args(["bootstrap", "OrdersDbContext", "PostgresSetup", "orders"])
        .assert()
        .success();

    let stub = std::fs::read_to_string(dir.path().join("OrdersDbContext.rs")).unwrap();
    assert!(stub.contains("OrdersDbContext"));
    assert!(dir.path().join("migrations/OrdersDbContextMigrations").is_dir());
    assert!(dir.path().join("scripts/orders").is_dir());

    let manifest = std::fs::read_to_string(dir.path().join("contexts.yaml")).unwrap();
    assert!(manifest.contains("OrdersDbContext"));
}

#[test]
fn test_bootstrap_requires_dbcontext_suffix() {
    let dir = TempDir::new().unwrap();

    cmd_in(&dir)
        .args(["bootstrap", "Orders", "PostgresSetup"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("must end with"));
}

#[test]
fn test_bootstrap_unknown_setup_type_exits_1() {
    let dir = TempDir::new().unwrap();

    cmd_in(&dir)
        .args(["bootstrap", "OrdersDbContext", "OracleSetup"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unable to find setup type"));
}

#[test]
fn test_bootstrap_rejects_bad_scripts_subdir() {
    let dir = TempDir::new().unwrap();

    cmd_in(&dir)
        .args(["bootstrap", "OrdersDbContext", "PostgresSetup", "bad dir"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid characters"));
}

#[test]
fn test_bootstrap_missing_args_exits_1() {
    let dir = TempDir::new().unwrap();

    cmd_in(&dir)
        .args(["bootstrap", "OrdersDbContext"])
        .assert()
        .failure()
        .code(1);
}
