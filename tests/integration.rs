use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn docsync_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docsync"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("notes")).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n\nDeep learning frameworks like PyTorch are covered.",
    )
    .unwrap();
    fs::write(
        files_dir.join("notes/gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.\n\nKubernetes and Docker are mentioned here.",
    )
    .unwrap();
    fs::write(files_dir.join("diagram.png"), [0u8, 1, 2, 3]).unwrap();

    let config_content = format!(
        r#"[db]
metadata_path = "{root}/data/metadata.sqlite"
content_path = "{root}/data/content.sqlite"

[index]
root = "{root}/files"
extensions = ["md", "txt"]

[chunking]
chunk_size = 500
chunk_overlap = 200

[embedding]
provider = "hash"
dims = 128

[retrieval]
limit = 4
"#,
        root = root.display()
    );

    let config_path = config_dir.join("docsync.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docsync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docsync_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docsync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn touch_future(path: &Path) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(120))
        .unwrap();
}

#[test]
fn test_init_creates_both_databases() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docsync(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/metadata.sqlite").exists());
    assert!(tmp.path().join("data/content.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_docsync(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docsync(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sync_indexes_allow_listed_files() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docsync(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("discovered: 3"), "got: {}", stdout);
    assert!(stdout.contains("skipped extensions: 1"), "got: {}", stdout);
    assert!(stdout.contains("indexed: 3"), "got: {}", stdout);
    assert!(stdout.contains("failed: 0"), "got: {}", stdout);
    assert!(stdout.contains("ok"));
}

#[test]
fn test_sync_unchanged_tree_is_a_no_op() {
    let (_tmp, config_path) = setup_test_env();

    run_docsync(&config_path, &["sync"]);
    let (stdout, _, success) = run_docsync(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("current: 3"), "got: {}", stdout);
    assert!(stdout.contains("indexed: 0"), "got: {}", stdout);
    assert!(stdout.contains("reindexed: 0"), "got: {}", stdout);
    assert!(stdout.contains("purged: 0"), "got: {}", stdout);
}

#[test]
fn test_sync_reindexes_modified_file() {
    let (tmp, config_path) = setup_test_env();

    run_docsync(&config_path, &["sync"]);

    let alpha = tmp.path().join("files/alpha.md");
    fs::write(&alpha, "# Alpha Document Updated\n\nThis file was modified.").unwrap();
    touch_future(&alpha);

    let (stdout, _, _) = run_docsync(&config_path, &["sync"]);
    assert!(stdout.contains("reindexed: 1"), "got: {}", stdout);
    assert!(stdout.contains("current: 2"), "got: {}", stdout);

    let (stdout, _, _) = run_docsync(&config_path, &["search", "modified updated", "--limit", "1"]);
    assert!(stdout.contains("alpha.md"), "got: {}", stdout);
    assert!(stdout.contains("This file was modified"), "got: {}", stdout);
}

#[test]
fn test_sync_purges_deleted_file() {
    let (tmp, config_path) = setup_test_env();

    run_docsync(&config_path, &["sync"]);
    fs::remove_file(tmp.path().join("files/notes/gamma.txt")).unwrap();

    let (stdout, _, _) = run_docsync(&config_path, &["sync"]);
    assert!(stdout.contains("purged: 1"), "got: {}", stdout);

    let (stdout, _, _) = run_docsync(&config_path, &["stats"]);
    assert!(stdout.contains("Files:       2"), "got: {}", stdout);
}

#[test]
fn test_check_consistent_after_sync() {
    let (_tmp, config_path) = setup_test_env();

    run_docsync(&config_path, &["sync"]);
    let (stdout, stderr, success) = run_docsync(&config_path, &["check"]);
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("consistent"), "got: {}", stdout);
}

#[test]
fn test_check_recovers_lost_content_store() {
    let (tmp, config_path) = setup_test_env();

    run_docsync(&config_path, &["sync"]);
    let data = tmp.path().join("data");
    for name in ["content.sqlite", "content.sqlite-wal", "content.sqlite-shm"] {
        let _ = fs::remove_file(data.join(name));
    }

    let (stdout, _, success) = run_docsync(&config_path, &["check", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("HARD"), "got: {}", stdout);
    assert!(stdout.contains("dry run"), "got: {}", stdout);

    let (stdout, _, _) = run_docsync(&config_path, &["check"]);
    assert!(stdout.contains("cleared 3"), "got: {}", stdout);

    let (stdout, _, _) = run_docsync(&config_path, &["sync"]);
    assert!(stdout.contains("indexed: 3"), "got: {}", stdout);

    let (stdout, _, _) = run_docsync(&config_path, &["check"]);
    assert!(stdout.contains("consistent"), "got: {}", stdout);
}

#[test]
fn test_search_finds_relevant_file() {
    let (_tmp, config_path) = setup_test_env();

    run_docsync(&config_path, &["sync"]);
    let (stdout, _, success) = run_docsync(
        &config_path,
        &["search", "Rust programming cargo crates", "--limit", "1"],
    );
    assert!(success, "search failed");
    assert!(stdout.contains("file://"), "got: {}", stdout);
    assert!(stdout.contains("alpha.md"), "got: {}", stdout);
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();

    run_docsync(&config_path, &["sync"]);
    let (stdout, _, success) = run_docsync(&config_path, &["search", "  "]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_empty_index() {
    let (_tmp, config_path) = setup_test_env();

    run_docsync(&config_path, &["init"]);
    let (stdout, _, success) = run_docsync(&config_path, &["search", "anything"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();

    run_docsync(&config_path, &["sync"]);
    let (stdout, _, success) = run_docsync(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Files:       3"), "got: {}", stdout);
    assert!(stdout.contains("Chunks:      3"), "got: {}", stdout);
    assert!(stdout.contains("Vectors:     3 / 3 (100%)"), "got: {}", stdout);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docsync(&tmp.path().join("nope.toml"), &["sync"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "got: {}", stderr);
}
