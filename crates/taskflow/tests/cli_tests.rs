//! Integration tests for the taskflow CLI.
//!
//! These tests verify the end-to-end behavior of all CLI commands.

use rstest::{fixture, rstest};
use std::process::Output;
use tempfile::TempDir;

mod common;
use common::run_taskflow_in_dir;

// ============================================================================
// Test Fixtures
// ============================================================================

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn run_ok(dir: &TempDir, args: &[&str]) -> String {
    let output = run_taskflow_in_dir(dir.path(), args);
    assert!(
        output.status.success(),
        "taskflow {args:?} failed: {}",
        stderr(&output)
    );
    stdout(&output)
}

fn json(dir: &TempDir, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["--json"];
    full.extend_from_slice(args);
    serde_json::from_str(&run_ok(dir, &full)).expect("valid JSON on stdout")
}

/// Provides a fresh temporary directory for each test
#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Initialized workspace with an admin signed in and a DMO project
#[fixture]
fn workspace() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp directory");
    run_ok(&temp, &["init", "--quiet"]);
    run_ok(
        &temp,
        &["user", "add", "alice", "--password", "pw", "--role", "admin"],
    );
    run_ok(&temp, &["login", "alice", "--password", "pw"]);
    run_ok(
        &temp,
        &["project", "create", "--name", "Demo", "--key", "DMO"],
    );
    temp
}

// ============================================================================
// Help and Init
// ============================================================================

#[rstest]
fn test_cli_help_shows_all_commands(temp_dir: TempDir) {
    let out = run_ok(&temp_dir, &["--help"]);
    for command in [
        "init", "user", "login", "logout", "whoami", "project", "create", "list", "show", "move",
        "update", "delete", "comment", "board", "stats", "sync", "watch",
    ] {
        assert!(out.contains(command), "help should list '{command}'");
    }
}

#[rstest]
fn test_cli_no_args(temp_dir: TempDir) {
    let out = run_ok(&temp_dir, &[]);
    assert!(out.contains("--help"));
}

#[rstest]
fn test_cli_init_creates_workspace(temp_dir: TempDir) {
    let out = run_ok(&temp_dir, &["init"]);
    assert!(out.contains("Initialized TaskFlow"));
    assert!(out.contains("local only"));

    let config = std::fs::read_to_string(temp_dir.path().join(".taskflow/config.yaml")).unwrap();
    assert!(config.contains("backend: file"));
    assert!(!config.contains("remote"));
    assert!(temp_dir.path().join(".taskflow/.gitignore").exists());
    assert!(temp_dir.path().join(".taskflow/data").is_dir());
}

#[rstest]
fn test_cli_init_with_remote(temp_dir: TempDir) {
    run_ok(
        &temp_dir,
        &[
            "init",
            "--quiet",
            "--api-url",
            "http://localhost:8000/api/v1",
            "--ws-url",
            "ws://localhost:8000/ws",
        ],
    );
    let config = std::fs::read_to_string(temp_dir.path().join(".taskflow/config.yaml")).unwrap();
    assert!(config.contains("http://localhost:8000/api/v1"));
    assert!(config.contains("ws://localhost:8000/ws"));
}

#[rstest]
fn test_cli_init_twice_fails(temp_dir: TempDir) {
    run_ok(&temp_dir, &["init", "--quiet"]);
    let output = run_taskflow_in_dir(temp_dir.path(), &["init", "--quiet"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("already initialized"));
}

#[rstest]
fn test_cli_init_rejects_bad_url(temp_dir: TempDir) {
    let output = run_taskflow_in_dir(temp_dir.path(), &["init", "--api-url", "localhost"]);
    assert!(!output.status.success());
    assert!(!temp_dir.path().join(".taskflow").exists());
}

#[rstest]
fn test_cli_outside_workspace_fails(temp_dir: TempDir) {
    let output = run_taskflow_in_dir(temp_dir.path(), &["list"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("taskflow init"));
}

// ============================================================================
// Accounts
// ============================================================================

#[rstest]
fn test_cli_login_flow(temp_dir: TempDir) {
    run_ok(&temp_dir, &["init", "--quiet"]);
    assert!(run_ok(&temp_dir, &["whoami"]).contains("Not logged in"));

    run_ok(
        &temp_dir,
        &["user", "add", "alice", "--password", "pw", "--role", "admin"],
    );
    let output = run_taskflow_in_dir(temp_dir.path(), &["login", "alice", "--password", "nope"]);
    assert!(!output.status.success());

    run_ok(&temp_dir, &["login", "alice", "--password", "pw"]);
    let me = json(&temp_dir, &["whoami"]);
    assert_eq!(me["user"], "alice");
    assert_eq!(me["role"], "admin");

    assert!(run_ok(&temp_dir, &["logout"]).contains("Logged out alice"));
    assert!(run_ok(&temp_dir, &["whoami"]).contains("Not logged in"));
}

#[rstest]
fn test_cli_member_cannot_add_admin(workspace: TempDir) {
    run_ok(&workspace, &["user", "add", "bob", "--password", "pw"]);
    run_ok(&workspace, &["login", "bob", "--password", "pw"]);

    let output = run_taskflow_in_dir(
        workspace.path(),
        &["user", "add", "eve", "--password", "pw", "--role", "admin"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Permission denied"));

    let users = json(&workspace, &["user", "list"]);
    assert_eq!(users.as_array().unwrap().len(), 2);
}

#[rstest]
fn test_cli_create_requires_login(temp_dir: TempDir) {
    run_ok(&temp_dir, &["init", "--quiet"]);
    let output = run_taskflow_in_dir(
        temp_dir.path(),
        &["create", "-P", "DMO", "--title", "Fix login"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not logged in"));
}

// ============================================================================
// Issues
// ============================================================================

#[rstest]
fn test_cli_create_and_list(workspace: TempDir) {
    let out = run_ok(
        &workspace,
        &[
            "create", "-P", "DMO", "--title", "Fix login", "--priority", "high", "--type", "bug",
        ],
    );
    assert!(out.contains("Created issue: DMO-101"));

    let issues = json(&workspace, &["list"]);
    let issues = issues.as_array().unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0]["human_code"], "DMO-101");
    assert_eq!(issues[0]["status"], "backlog");
    assert_eq!(issues[0]["priority"], "high");
    assert_eq!(issues[0]["type"], "bug");
    assert_eq!(issues[0]["creator"], "alice");

    let text = run_ok(&workspace, &["list"]);
    assert!(text.contains("DMO-101"));
    assert!(text.contains("Fix login"));
}

#[rstest]
fn test_cli_create_unknown_project(workspace: TempDir) {
    let output = run_taskflow_in_dir(
        workspace.path(),
        &["create", "-P", "NOPE", "--title", "Fix login"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Project 'NOPE' not found"));
}

#[rstest]
fn test_cli_list_filters(workspace: TempDir) {
    for title in ["Fix login", "Write docs", "Login page polish"] {
        run_ok(&workspace, &["create", "-P", "DMO", "--title", title]);
    }
    run_ok(&workspace, &["move", "DMO-102", "done"]);

    let done = json(&workspace, &["list", "--status", "done"]);
    assert_eq!(done.as_array().unwrap().len(), 1);
    assert_eq!(done[0]["human_code"], "DMO-102");

    let search = json(&workspace, &["list", "-q", "LOGIN"]);
    assert_eq!(search.as_array().unwrap().len(), 2);

    let limited = json(&workspace, &["list", "--recent", "-n", "1"]);
    assert_eq!(limited.as_array().unwrap().len(), 1);
}

#[rstest]
#[case::backlog("backlog", "Backlog")]
#[case::todo_alias("todo", "Backlog")]
#[case::in_progress("in_progress", "In Progress")]
#[case::in_progress_alias("in-progress", "In Progress")]
#[case::done("done", "Done")]
fn test_cli_move(workspace: TempDir, #[case] status: &str, #[case] label: &str) {
    run_ok(&workspace, &["create", "-P", "DMO", "--title", "Fix login"]);
    let out = run_ok(&workspace, &["move", "DMO-101", status]);
    assert!(out.contains(&format!("to {label}")), "{out}");
}

#[rstest]
fn test_cli_update_fields(workspace: TempDir) {
    run_ok(&workspace, &["create", "-P", "DMO", "--title", "Fix login"]);
    run_ok(
        &workspace,
        &[
            "update",
            "DMO-101",
            "--title",
            "Fix SSO login",
            "--priority",
            "low",
            "--type",
            "feature",
        ],
    );

    let issue = json(&workspace, &["show", "DMO-101"]);
    assert_eq!(issue["title"], "Fix SSO login");
    assert_eq!(issue["priority"], "low");
    assert_eq!(issue["type"], "feature");
    assert_eq!(issue["status"], "backlog");
}

#[rstest]
fn test_cli_update_needs_a_field(workspace: TempDir) {
    run_ok(&workspace, &["create", "-P", "DMO", "--title", "Fix login"]);
    let output = run_taskflow_in_dir(workspace.path(), &["update", "DMO-101"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Nothing to update"));
}

#[rstest]
fn test_cli_comment_and_show(workspace: TempDir) {
    run_ok(&workspace, &["create", "-P", "DMO", "--title", "Fix login"]);
    run_ok(&workspace, &["comment", "DMO-101", "first"]);
    run_ok(&workspace, &["comment", "DMO-101", "second"]);

    let out = run_ok(&workspace, &["show", "DMO-101"]);
    assert!(out.contains("Comments (2)"));
    let first = out.find("first").unwrap();
    let second = out.find("second").unwrap();
    assert!(first < second);
}

#[rstest]
fn test_cli_show_nonexistent_issue(workspace: TempDir) {
    let output = run_taskflow_in_dir(workspace.path(), &["show", "DMO-999"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not found"));
}

#[rstest]
fn test_cli_delete_is_admin_only(workspace: TempDir) {
    run_ok(&workspace, &["create", "-P", "DMO", "--title", "Fix login"]);
    run_ok(&workspace, &["user", "add", "bob", "--password", "pw"]);
    run_ok(&workspace, &["login", "bob", "--password", "pw"]);

    let output = run_taskflow_in_dir(workspace.path(), &["delete", "DMO-101"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Permission denied"));
    assert!(run_ok(&workspace, &["list"]).contains("DMO-101"));

    run_ok(&workspace, &["login", "alice", "--password", "pw"]);
    assert!(run_ok(&workspace, &["delete", "DMO-101"]).contains("Deleted issue: DMO-101"));
    assert!(run_ok(&workspace, &["list"]).contains("No issues found"));

    // Codes are never handed out twice.
    let out = run_ok(&workspace, &["create", "-P", "DMO", "--title", "Again"]);
    assert!(out.contains("DMO-102"));
}

// ============================================================================
// Board and statistics
// ============================================================================

#[rstest]
fn test_cli_board(workspace: TempDir) {
    run_ok(&workspace, &["create", "-P", "DMO", "--title", "Fix login"]);
    run_ok(&workspace, &["create", "-P", "DMO", "--title", "Write docs"]);
    run_ok(&workspace, &["move", "DMO-102", "in_progress"]);

    let out = run_ok(&workspace, &["board"]);
    let header = out.lines().next().unwrap();
    assert!(header.contains("Backlog (1)"));
    assert!(header.contains("In Progress (1)"));
    assert!(header.contains("Done (0)"));

    let board = json(&workspace, &["board"]);
    let columns = board.as_array().unwrap();
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[1]["status"], "in_progress");
    assert_eq!(columns[1]["issues"][0]["human_code"], "DMO-102");
}

#[rstest]
fn test_cli_stats(workspace: TempDir) {
    for title in ["One", "Two", "Three", "Four"] {
        run_ok(&workspace, &["create", "-P", "DMO", "--title", title]);
    }
    run_ok(&workspace, &["move", "DMO-101", "done"]);
    run_ok(&workspace, &["move", "DMO-102", "done"]);

    let stats = json(&workspace, &["stats"]);
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["percent_done"], 50);
    assert_eq!(stats["count_by_status"]["done"], 2);
    assert_eq!(stats["count_by_status"]["in_progress"], 0);

    let text = run_ok(&workspace, &["stats"]);
    assert!(text.contains("50%"));
    assert!(text.contains("local only"));
}

#[rstest]
fn test_cli_sync_needs_remote(workspace: TempDir) {
    let output = run_taskflow_in_dir(workspace.path(), &["sync"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No remote configured"));

    let output = run_taskflow_in_dir(workspace.path(), &["stats", "--server"]);
    assert!(!output.status.success());
}

#[rstest]
fn test_cli_projects(workspace: TempDir) {
    let output = run_taskflow_in_dir(
        workspace.path(),
        &["project", "create", "--name", "Again", "--key", "DMO"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("already in use"));

    run_ok(
        &workspace,
        &["project", "create", "--name", "Ops", "--key", "OPS"],
    );
    let projects = json(&workspace, &["project", "list"]);
    let keys: Vec<&str> = projects
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, ["DMO", "OPS"]);
}
