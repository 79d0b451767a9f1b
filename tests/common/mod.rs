#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sql_writeback::prelude::*;
use tempfile::TempDir;

/// A scratch directory holding one database file path.
pub struct TempDb {
    _dir: TempDir,
    pub path: PathBuf,
}

pub fn temp_db() -> TempDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("writeback.db");
    TempDb { _dir: dir, path }
}

pub fn sqlite_backend(db: &TempDb) -> Arc<Backend> {
    Arc::new(Backend::Sqlite(SqliteOptions::new(&db.path)))
}

/// Event sink that remembers everything it was told.
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<(Severity, String)>>,
    pub shutdown_requested: AtomicBool,
}

impl RecordingSink {
    pub fn severe_count(&self) -> usize {
        self.messages
            .lock()
            .expect("messages")
            .iter()
            .filter(|(severity, _)| *severity == Severity::Severe)
            .count()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

impl EventSink for RecordingSink {
    fn log(&self, severity: Severity, message: &str) {
        self.messages
            .lock()
            .expect("messages")
            .push((severity, message.to_string()));
    }

    fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }
}

/// Count rows of `table` straight from the file, bypassing every pool.
pub fn count_rows(db: &TempDb, table: &str) -> i64 {
    let conn = rusqlite::Connection::open(&db.path).expect("open db");
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .expect("count rows")
}
