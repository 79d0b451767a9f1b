#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingSink, count_rows, temp_db};
use sql_writeback::prelude::*;

fn config(db: &common::TempDb) -> StoreConfig {
    StoreConfig::sqlite(&db.path)
        .with_flush_interval(Duration::from_secs(3600))
        .with_name("tests")
}

#[tokio::test]
async fn connect_opens_the_database_eagerly() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let store = SqlStore::connect(config(&db)).await?;
    assert!(db.path.exists());
    assert_eq!(store.database_type(), DatabaseType::Sqlite);
    assert_eq!(store.name(), "tests");
    store.shutdown().await
}

#[tokio::test]
async fn connect_fails_for_an_unreachable_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = Arc::new(RecordingSink::default());
    let cfg = StoreConfig::sqlite(dir.path().join("missing").join("db.sqlite"));
    let res = SqlStore::connect_with_events(cfg, sink.clone()).await;
    assert!(res.is_err());
    // startup failures are returned, not escalated
    assert!(!sink.shutdown_requested());
}

#[tokio::test]
async fn connect_rejects_empty_pools() {
    let db = temp_db();
    let res = SqlStore::connect(config(&db).with_read_pool_size(0)).await;
    assert!(matches!(res, Err(SqlWritebackError::ConfigError(_))));
}

#[tokio::test]
async fn buffered_writes_are_readable_after_flush() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let store = SqlStore::connect(config(&db)).await?;
    let writer = store.writer();
    writer.create_table(
        "players",
        ["id INTEGER PRIMARY KEY AUTOINCREMENT", "name TEXT", "joined TEXT"],
    )?;
    writer.insert("players", [("name", "ann"), ("joined", "NOW()")])?;
    writer.insert("players", [("name", "bo"), ("joined", "NOW()")])?;
    writer.update("players", [("name", "bob")], [("name", "bo")])?;

    writer.flush().await?;
    let result = store
        .read("SELECT name, joined FROM players ORDER BY id")
        .await
        .into_result()?;
    assert_eq!(result.column("name"), [Some("ann"), Some("bob")]);
    assert!(result.get(0, "joined").is_some());

    writer.delete("players", [("name", "ann")])?;
    writer.flush().await?;
    let result = store.read("SELECT COUNT(*) AS n FROM players").await;
    assert_eq!(result.get(0, "n"), Some("1"));

    store.shutdown().await
}

#[tokio::test]
async fn read_translates_dialect_tokens() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let store = SqlStore::connect(config(&db)).await?;
    // NOW() is rewritten to the embedded spelling before it reaches SQLite
    let result = store
        .read("SELECT NOW() IS NOT NULL AS ok")
        .await
        .into_result()?;
    assert_eq!(result.get(0, "ok"), Some("1"));
    store.shutdown().await
}

#[tokio::test]
async fn shutdown_commits_what_is_buffered() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let store = SqlStore::connect(config(&db)).await?;
    store.writer().create_table("kv", ["k TEXT"])?;
    for i in 0..10 {
        store.writer().insert("kv", [("k", format!("key-{i}"))])?;
    }
    store.shutdown().await?;

    assert_eq!(count_rows(&db, "kv"), 10);
    assert!(store.read_pool().is_closed());
    let after = store.read("SELECT 1").await;
    assert!(matches!(
        after.error(),
        Some(SqlWritebackError::ConnectionError(_))
    ));
    Ok(())
}

#[tokio::test]
async fn sync_queue_writes_on_demand() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let store = SqlStore::connect(config(&db)).await?;
    let queue = store.sync_queue();

    queue.queue("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)").await;
    queue.queue_insert("kv", [("k", "a"), ("v", "1")]).await?;
    queue.queue_insert("kv", [("k", "b"), ("v", "2")]).await?;
    queue.queue_update("kv", [("v", "20")], [("k", "b")]).await?;
    assert_eq!(queue.queue_len().await, 4);
    assert_eq!(store.writer().buffer_len(), 0);

    let result = queue.write_queue().await?;
    assert!(result.is_success(), "unexpected {result:?}");
    assert_eq!(queue.queue_len().await, 0);
    let read = store.read("SELECT v FROM kv WHERE k = 'b'").await;
    assert_eq!(read.get(0, "v"), Some("20"));

    assert_eq!(queue.write_queue().await?.status(), WriteStatus::Empty);
    store.shutdown().await
}

#[tokio::test]
async fn sync_queue_hands_back_remaining_statements() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let store = SqlStore::connect(config(&db)).await?;
    let queue = store.sync_queue();
    queue
        .queue_all([
            QueryAndParams::from("CREATE TABLE kv (k TEXT)"),
            QueryAndParams::from("INSERT INTO nowhere VALUES (1)"),
            QueryAndParams::from("INSERT INTO kv VALUES ('a')"),
        ])
        .await;

    let result = queue.write_queue().await?;
    assert_eq!(result.status(), WriteStatus::Error);
    assert_eq!(result.remaining().len(), 2);
    assert_eq!(queue.queue_len().await, 0, "nothing is retried automatically");

    queue.queue_all(result.remaining().to_vec()).await;
    assert!(queue.write_queue().await?.is_success());
    assert_eq!(count_rows(&db, "kv"), 1);

    let none: [(&str, &str); 0] = [];
    assert!(matches!(
        queue.queue_delete("kv", none).await,
        Err(SqlWritebackError::ParameterError(_))
    ));
    store.shutdown().await
}

#[tokio::test]
async fn lock_writes_disables_commits() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let store = SqlStore::connect(config(&db)).await?;
    store.writer().create_table("kv", ["k TEXT"])?;
    store.writer().flush().await?;

    store.lock_writes();
    store.writer().insert("kv", [("k", "never")])?;
    match store.writer().flush().await? {
        FlushOutcome::Written(result) => assert_eq!(result.status(), WriteStatus::Disabled),
        other => panic!("expected a written batch, got {other:?}"),
    }
    let result = store.read("SELECT COUNT(*) AS n FROM kv").await;
    assert_eq!(result.get(0, "n"), Some("0"));
    Ok(())
}
