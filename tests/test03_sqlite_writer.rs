#![cfg(feature = "sqlite")]

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{TempDb, count_rows, sqlite_backend, temp_db};
use sql_writeback::prelude::*;
use tokio::sync::oneshot;

fn writer(db: &TempDb) -> SqlWriter {
    let pool = ConnectionPool::new(sqlite_backend(db), 1, false, Arc::new(TracingEventSink), "tests")
        .expect("pool");
    SqlWriter::new(pool, WriterOptions::new(Dialect::Embedded))
}

fn assert_written_ok(outcome: FlushOutcome) {
    match outcome {
        FlushOutcome::Written(result) => assert!(result.is_success(), "unexpected {result:?}"),
        other => panic!("expected a written batch, got {other:?}"),
    }
}

#[tokio::test]
async fn flush_of_empty_buffer_is_empty() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    assert!(matches!(writer.flush().await?, FlushOutcome::Empty));
    assert!(!writer.is_flush_active());
    Ok(())
}

#[tokio::test]
async fn flush_commits_buffer_in_order() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    writer.create_table("events", ["id INTEGER PRIMARY KEY AUTOINCREMENT", "task INTEGER", "seq INTEGER"])?;

    let mut producers = Vec::new();
    for task in 0..4_i64 {
        let writer = writer.clone();
        producers.push(tokio::spawn(async move {
            for seq in 0..50_i64 {
                writer.enqueue(QueryAndParams::new(
                    "INSERT INTO events (task, seq) VALUES (?1, ?2)",
                    vec![RowValues::Int(task), RowValues::Int(seq)],
                ));
                tokio::task::yield_now().await;
            }
        }));
    }
    for producer in producers {
        producer.await.expect("producer");
    }
    assert_eq!(writer.buffer_len(), 201);

    assert_written_ok(writer.flush().await?);
    assert_eq!(writer.buffer_len(), 0);

    let conn = rusqlite::Connection::open(&db.path).expect("open");
    let mut stmt = conn
        .prepare("SELECT task, seq FROM events ORDER BY id")
        .expect("prepare");
    let rows: Vec<(i64, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(rows.len(), 200);
    let mut last: HashMap<i64, i64> = HashMap::new();
    for (task, seq) in rows {
        if let Some(prev) = last.insert(task, seq) {
            assert!(seq > prev, "task {task} wrote {seq} after {prev}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn failed_statement_is_dropped_and_the_rest_requeued() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    writer.create_table("kv", ["k TEXT PRIMARY KEY", "v TEXT"])?;
    writer.insert("kv", [("k", "a"), ("v", "1")])?;
    writer.enqueue("INSERT INTO missing_table VALUES (1)");
    writer.insert("kv", [("k", "b"), ("v", "2")])?;

    match writer.flush().await? {
        FlushOutcome::Written(result) => {
            assert_eq!(result.status(), WriteStatus::Error);
            assert_eq!(result.failed().map(|f| f.position), Some(2));
        }
        other => panic!("expected a written batch, got {other:?}"),
    }

    // newer statements queue behind the restored ones
    writer.insert("kv", [("k", "c"), ("v", "3")])?;
    let pending: Vec<String> = writer
        .pending_statements()
        .into_iter()
        .map(|s| s.query)
        .collect();
    assert_eq!(
        pending,
        [
            "CREATE TABLE IF NOT EXISTS kv (k TEXT PRIMARY KEY, v TEXT)",
            "INSERT INTO kv (k, v) VALUES ('a', '1')",
            "INSERT INTO kv (k, v) VALUES ('b', '2')",
            "INSERT INTO kv (k, v) VALUES ('c', '3')",
        ]
    );

    assert_written_ok(writer.flush().await?);
    assert_eq!(count_rows(&db, "kv"), 3);
    Ok(())
}

#[tokio::test]
async fn locked_writes_keep_the_batch_buffered() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    writer.create_table("kv", ["k TEXT"])?;
    writer.lock_writes();

    match writer.flush().await? {
        FlushOutcome::Written(result) => assert_eq!(result.status(), WriteStatus::Disabled),
        other => panic!("expected a written batch, got {other:?}"),
    }
    assert_eq!(writer.buffer_len(), 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn overlapping_flush_is_skipped() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    writer.create_table("kv", ["k TEXT"])?;

    // hold the only connection so the first flush parks in acquire
    let held = writer.pool().acquire().await?;
    let first = {
        let writer = writer.clone();
        tokio::spawn(async move { writer.flush().await })
    };
    while !writer.is_flush_active() {
        tokio::task::yield_now().await;
    }

    writer.enqueue("INSERT INTO kv VALUES ('late')");
    assert!(matches!(writer.flush().await?, FlushOutcome::Skipped));
    assert_eq!(writer.buffer_len(), 2, "enqueue is not blocked by a running flush");

    drop(held);
    assert_written_ok(first.await.expect("first flush")?);
    assert!(!writer.is_flush_active());
    assert_eq!(writer.buffer_len(), 0, "statements queued before the drain ride along");
    assert_eq!(count_rows(&db, "kv"), 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn abandoned_flush_keeps_its_statements() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    writer.create_table("kv", ["k TEXT"])?;
    writer.enqueue("INSERT INTO kv VALUES ('kept')");

    let held = writer.pool().acquire().await?;
    let timed_out = tokio::time::timeout(Duration::from_millis(50), writer.flush()).await;
    assert!(timed_out.is_err(), "flush should still be waiting for a connection");
    assert_eq!(writer.buffer_len(), 2, "nothing is drained before a connection is held");
    assert!(writer.is_flush_active());

    drop(held);
    tokio::time::timeout(Duration::from_secs(5), writer.wait_until_idle())
        .await
        .expect("abandoned flush still completes");
    assert_eq!(writer.buffer_len(), 0);
    assert_eq!(count_rows(&db, "kv"), 1);
    writer.shutdown().await
}

#[tokio::test(flavor = "current_thread")]
async fn shutdown_waits_for_the_running_flush() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    writer.create_table("kv", ["k TEXT"])?;
    for i in 0..5 {
        writer.insert("kv", [("k", format!("early-{i}"))])?;
    }

    let held = writer.pool().acquire().await?;
    let flush = {
        let writer = writer.clone();
        tokio::spawn(async move { writer.flush().await })
    };
    while !writer.is_flush_active() {
        tokio::task::yield_now().await;
    }

    let shutdown = {
        let writer = writer.clone();
        tokio::spawn(async move { writer.shutdown().await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!shutdown.is_finished(), "shutdown must wait for the in-flight flush");

    drop(held);
    // once the running flush has drained the buffer, queue more behind it
    while writer.buffer_len() > 0 {
        tokio::task::yield_now().await;
    }
    for i in 0..5 {
        writer.insert("kv", [("k", format!("late-{i}"))])?;
    }

    assert_written_ok(flush.await.expect("flush task")?);
    shutdown.await.expect("shutdown task")?;
    assert_eq!(count_rows(&db, "kv"), 10);
    assert!(writer.pool().is_closed());
    Ok(())
}

#[tokio::test]
async fn after_write_runs_once_the_buffer_is_saved() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    writer.create_table("kv", ["k TEXT"])?;
    writer.enqueue("INSERT INTO kv VALUES ('x')");

    let (tx, rx) = oneshot::channel();
    let path = db.path.clone();
    let callback = writer.after_write(move || async move {
        let conn = rusqlite::Connection::open(path).expect("open");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .expect("count");
        let _ = tx.send(count);
    });

    tokio::task::yield_now().await;
    assert_written_ok(writer.flush().await?);
    callback.await.expect("callback task");
    assert_eq!(rx.await.expect("callback result"), 1);
    Ok(())
}

#[tokio::test]
async fn scheduled_flush_saves_the_buffer() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    writer.start(Duration::from_millis(20)).await;
    writer.create_table("kv", ["k TEXT"])?;
    writer.enqueue("INSERT INTO kv VALUES ('tick')");

    tokio::time::timeout(Duration::from_secs(5), writer.wait_until_idle())
        .await
        .expect("timer flushed the buffer");
    assert_eq!(count_rows(&db, "kv"), 1);
    writer.shutdown().await
}

#[tokio::test]
async fn shutdown_drains_everything_buffered() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    writer.start(Duration::from_secs(3600)).await;
    writer.create_table("kv", ["k TEXT"])?;
    for i in 0..25 {
        writer.insert("kv", [("k", i.to_string())])?;
    }

    writer.shutdown().await?;
    assert_eq!(count_rows(&db, "kv"), 25);
    assert!(writer.pool().is_closed());
    assert!(writer.is_stopped());
    assert!(matches!(writer.flush().await?, FlushOutcome::Skipped));
    // a second shutdown is a no-op
    writer.shutdown().await
}

#[tokio::test]
async fn shutdown_skips_failing_statements() -> Result<(), SqlWritebackError> {
    let db = temp_db();
    let writer = writer(&db);
    writer.create_table("kv", ["k TEXT"])?;
    writer.enqueue("INSERT INTO kv VALUES ('a')");
    writer.enqueue("INSERT INTO nowhere VALUES ('b')");
    writer.enqueue("INSERT INTO kv VALUES ('c')");
    writer.enqueue("INSERT INTO nowhere VALUES ('d')");

    writer.shutdown().await?;
    assert_eq!(count_rows(&db, "kv"), 2);
    assert_eq!(writer.buffer_len(), 0);
    Ok(())
}
