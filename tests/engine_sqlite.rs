//! Engine properties against real SQLite stores.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use std::sync::Arc;

use docsync::config::{load_config, Config};
use docsync::embedding::{vec_to_blob, HashProvider};
use docsync::integrity::FindingKind;
use docsync::models::NANOS_PER_SEC;
use docsync::pipeline::Engine;
use docsync::store::{SqliteContentStore, SqliteMetadataStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write_config(root: &Path) -> Config {
    let config_path = root.join("docsync.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
metadata_path = "{root}/data/metadata.sqlite"
content_path = "{root}/data/content.sqlite"

[index]
root = "{root}/docs"
extensions = ["txt", "md", "csv"]

[chunking]
chunk_size = 20
chunk_overlap = 0

[embedding]
provider = "hash"
dims = 32
"#,
            root = root.display()
        ),
    )
    .unwrap();
    load_config(&config_path).unwrap()
}

fn setup() -> (TempDir, Config, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let config = write_config(tmp.path());
    let docs = fs::canonicalize(docs).unwrap();
    (tmp, config, docs)
}

fn set_mtime(path: &Path, millis: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_millis(millis))
        .unwrap();
}

fn key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[tokio::test]
async fn file_lifecycle_create_edit_delete() {
    let (_tmp, config, docs) = setup();
    let engine = Engine::open(&config).await.unwrap();
    let cancel = CancellationToken::new();

    let a = docs.join("A.txt");
    fs::write(&a, "one one one\n\ntwo two two\n\nthree three").unwrap();
    set_mtime(&a, 1_000_000);

    engine.run_pass(&cancel).await.unwrap();
    assert_eq!(engine.metadata.get(&key(&a)).await.unwrap(), Some(1_000 * NANOS_PER_SEC));
    let first = engine.content.chunks_for_path(&key(&a)).await.unwrap();
    assert_eq!(first.len(), 3);

    fs::write(&a, "one one one\n\ntwo two two\n\nthree three\n\nfour four").unwrap();
    set_mtime(&a, 2_000_000);
    let summary = engine.run_pass(&cancel).await.unwrap();
    assert_eq!(summary.reconcile.reindexed, 1);

    let second = engine.content.chunks_for_path(&key(&a)).await.unwrap();
    assert_eq!(second.len(), 4);
    assert!(second.iter().all(|c| first.iter().all(|f| f.id != c.id)));
    assert_eq!(engine.content.count().await.unwrap(), 4);
    assert_eq!(engine.content.indexed_count().await.unwrap(), 4);
    assert_eq!(engine.metadata.get(&key(&a)).await.unwrap(), Some(2_000 * NANOS_PER_SEC));

    fs::remove_file(&a).unwrap();
    let summary = engine.run_pass(&cancel).await.unwrap();
    let purge = summary.purge.unwrap();
    assert_eq!(purge.removed_paths, vec![key(&a)]);
    assert_eq!(purge.chunks_deleted, 4);
    assert_eq!(engine.content.count().await.unwrap(), 0);
    assert_eq!(engine.content.indexed_count().await.unwrap(), 0);
    assert_eq!(engine.metadata.row_count().await.unwrap(), 0);
}

#[tokio::test]
async fn stores_survive_reopen() {
    let (_tmp, config, docs) = setup();
    fs::write(docs.join("a.md"), "alpha").unwrap();
    fs::write(docs.join("b.csv"), "name,team\nada,core\n").unwrap();

    {
        let engine = Engine::open(&config).await.unwrap();
        engine.run_pass(&CancellationToken::new()).await.unwrap();
    }

    let engine = Engine::open(&config).await.unwrap();
    let summary = engine.run_pass(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.reconcile.current, 2);
    assert_eq!(summary.reconcile.indexed, 0);
    assert_eq!(engine.metadata.row_count().await.unwrap(), 2);

    let csv = engine
        .content
        .chunks_for_path(&key(&docs.join("b.csv")))
        .await
        .unwrap();
    let text: Vec<&str> = csv.iter().map(|c| c.text.as_str()).collect();
    assert!(text.join("\n").contains("name: ada"), "{:?}", text);
}

#[tokio::test]
async fn unsupported_listed_extension_is_retried_each_pass() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let mut config = write_config(tmp.path());
    config.index.extensions.push("rtf".to_string());
    fs::write(docs.join("letter.rtf"), "{\\rtf1 hi}").unwrap();

    let engine = Engine::open(&config).await.unwrap();
    for _ in 0..2 {
        let summary = engine.run_pass(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.reconcile.unsupported, 1);
        assert_eq!(engine.metadata.row_count().await.unwrap(), 0);
    }
}

#[tokio::test]
async fn corrupt_vector_triggers_full_reindex() {
    let (_tmp, config, docs) = setup();
    fs::write(docs.join("a.md"), "alpha beta").unwrap();
    fs::write(docs.join("b.md"), "gamma delta").unwrap();

    let engine = Engine::open(&config).await.unwrap();
    engine.run_pass(&CancellationToken::new()).await.unwrap();

    // Damage one stored vector so its width no longer matches.
    let (_, content_pool) = docsync::db::connect(&config).await.unwrap();
    sqlx::query("UPDATE chunk_vectors SET embedding = ? WHERE source_path = ?")
        .bind(vec_to_blob(&[1.0, 2.0, 3.0]))
        .bind(key(&docs.join("a.md")))
        .execute(&content_pool)
        .await
        .unwrap();

    let report = engine.integrity_checker().check(true).await.unwrap();
    assert!(report.has(FindingKind::ProbeCorruption));
    assert_eq!(report.cleared, 0);

    let summary = engine.run_pass(&CancellationToken::new()).await.unwrap();
    let integrity = summary.integrity.unwrap();
    assert!(integrity.needs_recovery());
    assert_eq!(integrity.cleared, 2);
    assert_eq!(summary.reconcile.indexed, 2);

    // every path was rewritten; no duplicate or damaged chunk remains
    assert_eq!(engine.content.count().await.unwrap(), 2);
    let after = engine.integrity_checker().check(true).await.unwrap();
    assert!(after.findings.is_empty(), "{:?}", after.findings);
}

#[tokio::test]
async fn file_deleted_during_recovery_is_purged() {
    let (_tmp, config, docs) = setup();
    fs::write(docs.join("a.md"), "alpha beta").unwrap();
    fs::write(docs.join("b.md"), "gamma delta").unwrap();

    let engine = Engine::open(&config).await.unwrap();
    engine.run_pass(&CancellationToken::new()).await.unwrap();

    let (_, content_pool) = docsync::db::connect(&config).await.unwrap();
    sqlx::query("UPDATE chunk_vectors SET embedding = ? WHERE source_path = ?")
        .bind(vec_to_blob(&[1.0, 2.0, 3.0]))
        .bind(key(&docs.join("b.md")))
        .execute(&content_pool)
        .await
        .unwrap();
    fs::remove_file(docs.join("b.md")).unwrap();

    let summary = engine.run_pass(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.integrity.unwrap().cleared, 2);
    assert_eq!(summary.reconcile.indexed, 1);
    let purge = summary.purge.unwrap();
    assert_eq!(purge.removed_paths, vec![key(&docs.join("b.md"))]);
    assert_eq!(purge.chunks_deleted, 1);
    assert!(engine
        .content
        .chunks_for_path(&key(&docs.join("b.md")))
        .await
        .unwrap()
        .is_empty());

    // the damaged chunk left with the file; later passes are quiet
    let next = engine.run_pass(&CancellationToken::new()).await.unwrap();
    let integrity = next.integrity.unwrap();
    assert!(integrity.findings.is_empty(), "{:?}", integrity.findings);
    assert_eq!(integrity.cleared, 0);
    assert_eq!(next.reconcile.current, 1);
    assert_eq!(engine.metadata.row_count().await.unwrap(), 1);
    assert_eq!(engine.content.count().await.unwrap(), 1);
}

#[tokio::test]
async fn narrow_provider_never_marks_files_indexed() {
    let (_tmp, config, docs) = setup();
    fs::write(docs.join("a.md"), "alpha").unwrap();
    docsync::migrate::run_migrations(&config).await.unwrap();
    let (metadata_pool, content_pool) = docsync::db::connect(&config).await.unwrap();
    let engine = Engine::new(
        config.clone(),
        Arc::new(SqliteMetadataStore::new(metadata_pool)),
        Arc::new(SqliteContentStore::new(content_pool, 32)),
        Arc::new(HashProvider::new(16)),
    );

    for _ in 0..2 {
        let summary = engine.run_pass(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.reconcile.failed, 1);
        assert_eq!(summary.reconcile.indexed, 0);
        assert_eq!(summary.integrity.unwrap().cleared, 0);
        assert_eq!(engine.metadata.row_count().await.unwrap(), 0);
        assert_eq!(engine.content.count().await.unwrap(), 0);
    }
}

#[tokio::test]
async fn mismatched_dims_are_corruption() {
    let (_tmp, config, docs) = setup();
    fs::write(docs.join("a.md"), "alpha").unwrap();
    let engine = Engine::open(&config).await.unwrap();
    engine.run_pass(&CancellationToken::new()).await.unwrap();

    let (_, content_pool) = docsync::db::connect(&config).await.unwrap();
    let wider = SqliteContentStore::new(content_pool, 64);
    let err = docsync::store::ContentStore::search(&wider, &[0.0; 64], 1)
        .await
        .unwrap_err();
    assert!(err.is_corruption());
}
