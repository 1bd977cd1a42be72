use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_aide_mem<I, S>(db: &PathBuf, args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_aide-mem"))
        .env_remove("AIDE_USER")
        .arg("--db")
        .arg(db)
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute aide-mem binary: {err}"))
}

fn run_ok<I, S>(db: &PathBuf, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_aide_mem(db, args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "aide-mem command failed (status={}):\nstdout:\n{stdout}\nstderr:\n{stderr}",
            output.status
        );
    }
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn add_then_recent_lists_records_oldest_first() {
    let dir = unique_temp_dir("aide-mem-recent");
    let db = dir.join("memory.sqlite3");

    assert_eq!(run_ok(&db, ["add", "hello", "there"]).trim(), "added id=1");
    assert_eq!(
        run_ok(&db, ["add", "--role", "assistant", "general", "greeting"]).trim(),
        "added id=2"
    );
    assert_eq!(run_ok(&db, ["add", "how", "are", "you"]).trim(), "added id=3");

    let listing = run_ok(&db, ["recent", "--n", "2"]);
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("[2] "));
    assert!(lines[0].contains("assistant/chat"));
    assert!(lines[0].ends_with(": general greeting"));
    assert!(lines[1].starts_with("[3] "));
    assert!(lines[1].ends_with(": how are you"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn search_and_forget_keyword_round_trip() {
    let dir = unique_temp_dir("aide-mem-search");
    let db = dir.join("memory.sqlite3");

    run_ok(&db, ["add", "--kind", "remembered", "likes", "dark", "roast", "coffee"]);
    run_ok(&db, ["add", "prefers", "tea", "in", "the", "evening"]);

    let found = run_ok(&db, ["search", "coffee"]);
    assert_eq!(found.lines().count(), 1);
    assert!(found.contains("user/remembered"));
    assert!(found.contains("likes dark roast coffee"));

    assert_eq!(
        run_ok(&db, ["forget-keyword", "coffee"]).trim(),
        "forgot 1 row(s) matching: coffee"
    );
    assert_eq!(run_ok(&db, ["search", "coffee"]).trim(), "");

    let including_deleted = run_ok(&db, ["search", "coffee", "--include-deleted"]);
    assert!(including_deleted.contains("(DELETED)"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn forget_id_is_scoped_to_the_user_namespace() {
    let dir = unique_temp_dir("aide-mem-scope");
    let db = dir.join("memory.sqlite3");

    run_ok(&db, ["--user", "alice", "add", "private", "note"]);

    assert_eq!(
        run_ok(&db, ["--user", "bob", "forget-id", "1"]).trim(),
        "forgot 0 row(s) with id=1"
    );
    assert_eq!(
        run_ok(&db, ["--user", "alice", "forget-id", "1"]).trim(),
        "forgot 1 row(s) with id=1"
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn clear_reports_the_affected_count() {
    let dir = unique_temp_dir("aide-mem-clear");
    let db = dir.join("memory.sqlite3");

    run_ok(&db, ["add", "one"]);
    run_ok(&db, ["add", "two"]);

    assert_eq!(run_ok(&db, ["clear"]).trim(), "cleared 2 row(s) for user=JD");
    assert_eq!(run_ok(&db, ["recent"]).trim(), "");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn blank_content_fails_with_nonzero_exit() {
    let dir = unique_temp_dir("aide-mem-blank");
    let db = dir.join("memory.sqlite3");

    let output = run_aide_mem(&db, ["add", "   "]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("content"), "stderr should name the invalid field: {stderr}");

    // Nothing was persisted by the failed write.
    assert_eq!(run_ok(&db, ["recent", "--include-deleted"]).trim(), "");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn db_subcommands_report_version_and_vacuum() {
    let dir = unique_temp_dir("aide-mem-db");
    let db = dir.join("memory.sqlite3");

    run_ok(&db, ["add", "seed", "row"]);
    assert_eq!(run_ok(&db, ["db", "schema-version"]).trim(), "schema_version=2");
    assert_eq!(run_ok(&db, ["db", "vacuum"]).trim(), "vacuum complete");

    let backup = dir.join("backup.sqlite3");
    let message = run_ok(&db, ["db", "backup", "--out", &backup.display().to_string()]);
    assert!(message.trim().starts_with("backup written to "));
    assert!(backup.exists());

    let _ = fs::remove_dir_all(dir);
}
