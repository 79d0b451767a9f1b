mod connection;

pub use connection::{Connection, ConnectionState};

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;

use crate::backend::Backend;
use crate::error::SqlWritebackError;
use crate::events::EventSink;

struct PoolState {
    idle: VecDeque<Connection>,
    active: BTreeSet<usize>,
    closed: bool,
}

struct PoolInner {
    state: Mutex<PoolState>,
    // One permit per idle connection.
    available: Semaphore,
    locks: Vec<Arc<AtomicBool>>,
    read_only: bool,
}

impl PoolInner {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn release(&self, conn: Connection) {
        let to_close = {
            let mut state = self.lock_state();
            state.active.remove(&conn.id());
            if state.closed {
                Some(conn)
            } else {
                state.idle.push_back(conn);
                None
            }
        };
        match to_close {
            Some(mut conn) => conn.close(),
            None => self.available.add_permits(1),
        }
    }
}

/// A fixed set of reusable connections, each either idle or checked out.
///
/// `acquire` waits (without a timeout) until a connection is idle; waiters are served in
/// arrival order. Connections open their sessions lazily on first use.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Build a pool of `size` connections for the given role.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ConfigError` if `size` is zero.
    pub fn new(
        backend: Arc<Backend>,
        size: usize,
        read_only: bool,
        events: Arc<dyn EventSink>,
        name: &str,
    ) -> Result<Self, SqlWritebackError> {
        if size == 0 {
            return Err(SqlWritebackError::ConfigError(
                "connection pool size must be at least 1".into(),
            ));
        }
        let name: Arc<str> = Arc::from(name);
        let idle: VecDeque<Connection> = (0..size)
            .map(|id| {
                Connection::with_events(
                    Arc::clone(&backend),
                    read_only,
                    Arc::clone(&events),
                    Arc::clone(&name),
                )
                .with_id(id)
            })
            .collect();
        let locks = idle.iter().map(Connection::lock_flag).collect();
        Ok(Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    idle,
                    active: BTreeSet::new(),
                    closed: false,
                }),
                available: Semaphore::new(size),
                locks,
                read_only,
            }),
        })
    }

    /// Check out an idle connection, waiting for a release if none is idle.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ConnectionError` once the pool has been closed.
    pub async fn acquire(&self) -> Result<PooledConnection, SqlWritebackError> {
        let permit = self
            .inner
            .available
            .acquire()
            .await
            .map_err(|_| SqlWritebackError::ConnectionError("connection pool closed".into()))?;
        permit.forget();

        let conn = {
            let mut state = self.inner.lock_state();
            let conn = state.idle.pop_front();
            if let Some(conn) = &conn {
                state.active.insert(conn.id());
            }
            conn
        };
        match conn {
            Some(conn) => Ok(PooledConnection {
                conn: Some(conn),
                pool: Arc::clone(&self.inner),
            }),
            None => Err(SqlWritebackError::ConnectionError(
                "connection pool closed".into(),
            )),
        }
    }

    /// Return a connection to the pool. Dropping the guard does the same.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Make every later write on `conn` roll back instead of committing.
    pub fn lock(&self, conn: &PooledConnection) {
        conn.lock();
    }

    /// Lock every connection of the pool, idle or checked out.
    pub fn lock_all(&self) {
        for flag in &self.inner.locks {
            flag.store(true, Ordering::SeqCst);
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.locks.len()
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.lock_state().idle.len()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.lock_state().active.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock_state().closed
    }

    /// Close idle sessions and refuse further checkouts. Checked-out connections are closed
    /// when they come back; pending `acquire` calls fail.
    pub fn close(&self) {
        let idle: Vec<Connection> = {
            let mut state = self.inner.lock_state();
            state.closed = true;
            state.idle.drain(..).collect()
        };
        self.inner.available.close();
        for mut conn in idle {
            conn.close();
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("ConnectionPool")
            .field("size", &self.inner.locks.len())
            .field("idle", &state.idle.len())
            .field("active", &state.active)
            .field("read_only", &self.inner.read_only)
            .field("closed", &state.closed)
            .finish()
    }
}

/// A checked-out connection. Goes back to its pool when dropped.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.conn).finish()
    }
}
