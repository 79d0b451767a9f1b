#![cfg(feature = "postgres")]

use std::env;
use std::time::Duration;

use sql_writeback::prelude::*;

/// Connection settings from `SQL_WRITEBACK_PG_{HOST,PORT,DB,USER,PASSWORD}`.
fn pg_config() -> StoreConfig {
    let var = |name: &str, default: &str| env::var(name).unwrap_or_else(|_| default.to_string());
    StoreConfig::postgres(
        var("SQL_WRITEBACK_PG_HOST", "localhost"),
        var("SQL_WRITEBACK_PG_PORT", "5432").parse().expect("port"),
        var("SQL_WRITEBACK_PG_DB", "postgres"),
        var("SQL_WRITEBACK_PG_USER", "postgres"),
        var("SQL_WRITEBACK_PG_PASSWORD", "postgres"),
    )
    .with_flush_interval(Duration::from_secs(3600))
}

#[tokio::test]
#[ignore = "needs a running PostgreSQL server"]
async fn postgres_round_trip_with_translated_tokens() -> Result<(), SqlWritebackError> {
    let store = SqlStore::connect(pg_config()).await?;
    assert_eq!(store.database_type(), DatabaseType::Postgres);
    let writer = store.writer();

    writer.enqueue("DROP TABLE IF EXISTS writeback_events");
    writer.create_table(
        "writeback_events",
        ["id INTEGER PRIMARY KEY AUTOINCREMENT", "name TEXT", "at TIMESTAMP"],
    )?;
    writer.insert("writeback_events", [("name", "a"), ("at", "NOW()")])?;
    writer.enqueue(QueryAndParams::new(
        "INSERT INTO writeback_events (name, at) VALUES ($1, datetime('NOW', 'localtime'))",
        vec![RowValues::Text("b".into())],
    ));
    writer.flush().await?;

    let result = store
        .read("SELECT id, name FROM writeback_events ORDER BY id")
        .await
        .into_result()?;
    assert_eq!(result.column("name"), [Some("a"), Some("b")]);
    assert_eq!(result.get(0, "id"), Some("1"));

    writer.enqueue("DROP TABLE writeback_events");
    store.shutdown().await
}

#[tokio::test]
#[ignore = "needs a running PostgreSQL server"]
async fn postgres_failed_statement_rolls_back() -> Result<(), SqlWritebackError> {
    let store = SqlStore::connect(pg_config()).await?;
    let queue = store.sync_queue();
    queue.queue("CREATE TEMP TABLE IF NOT EXISTS wb_tmp (k TEXT)").await;
    assert!(queue.write_queue().await?.is_success());

    queue.queue("INSERT INTO wb_tmp VALUES ('a')").await;
    queue.queue("INSERT INTO wb_missing VALUES ('b')").await;
    let result = queue.write_queue().await?;
    assert_eq!(result.status(), WriteStatus::Error);
    assert_eq!(result.failed().map(|f| f.position), Some(1));
    assert_eq!(result.remaining().len(), 1);

    let queue_again = store.sync_queue();
    queue_again.queue("INSERT INTO wb_tmp VALUES ('c')").await;
    assert!(queue_again.write_queue().await?.is_success());
    store.shutdown().await
}

#[tokio::test]
#[ignore = "needs a running PostgreSQL server"]
async fn postgres_reads_numeric_and_other_server_types() -> Result<(), SqlWritebackError> {
    let store = SqlStore::connect(pg_config()).await?;

    let sums = store
        .read("SELECT SUM(x::bigint) AS total, AVG(x) AS mean FROM generate_series(1, 4) AS t(x)")
        .await
        .into_result()?;
    assert_eq!(sums.get(0, "total"), Some("10"));
    assert_eq!(sums.get(0, "mean").map(|m| m.starts_with("2.5")), Some(true));

    let result = store
        .read(
            "SELECT 12345.67::numeric AS price, \
             '-0.05'::numeric AS delta, \
             'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11'::uuid AS id, \
             '1 day 02:03:04'::interval AS span, \
             '13:14:15'::time AS at, \
             '10.0.0.1'::inet AS host, \
             NULL::numeric AS missing",
        )
        .await
        .into_result()?;
    assert_eq!(result.get(0, "price"), Some("12345.67"));
    assert_eq!(result.get(0, "delta"), Some("-0.05"));
    assert_eq!(result.get(0, "id"), Some("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"));
    assert_eq!(result.get(0, "span"), Some("1 day 02:03:04"));
    assert_eq!(result.get(0, "at"), Some("13:14:15"));
    assert_eq!(result.get(0, "host"), Some("10.0.0.1"));
    assert_eq!(result.get(0, "missing"), None);

    store.shutdown().await
}
