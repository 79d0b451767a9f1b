use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::{Backend, Session};
use crate::error::SqlWritebackError;
use crate::events::{EventSink, Severity, TracingEventSink};
use crate::results::{FailedStatement, QueryResult, WriteResult};
use crate::types::QueryAndParams;

/// Health of the physical session behind a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session has been opened yet.
    Uninitialized,
    /// The last check passed.
    Valid,
    /// The last check failed; the next use reopens.
    Invalid,
}

/// Owns one physical session and runs transactional batch writes and single reads on it.
///
/// The session is opened lazily and checked before every use. A session that fails its check
/// is closed and reopened once; if it is still unusable the event sink is told and asked to
/// shut the host down.
pub struct Connection {
    id: usize,
    backend: Arc<Backend>,
    read_only: bool,
    locked: Arc<AtomicBool>,
    state: ConnectionState,
    session: Option<Session>,
    events: Arc<dyn EventSink>,
    name: Arc<str>,
}

impl Connection {
    #[must_use]
    pub fn new(backend: Arc<Backend>, read_only: bool) -> Self {
        Self::with_events(backend, read_only, Arc::new(TracingEventSink), Arc::from("sql-writeback"))
    }

    #[must_use]
    pub fn with_events(
        backend: Arc<Backend>,
        read_only: bool,
        events: Arc<dyn EventSink>,
        name: Arc<str>,
    ) -> Self {
        Self {
            id: 0,
            backend,
            read_only,
            locked: Arc::new(AtomicBool::new(false)),
            state: ConnectionState::Uninitialized,
            session: None,
            events,
            name,
        }
    }

    pub(crate) fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub(crate) fn lock_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.locked)
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Change the declared role. A role change closes the current session; the next use
    /// reopens it with the new role.
    pub fn set_read_only(&mut self, read_only: bool) {
        if self.read_only != read_only {
            self.read_only = read_only;
            self.close();
            self.state = ConnectionState::Uninitialized;
        }
    }

    /// From now on every write rolls back instead of committing.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Close the current session (if any) and open a new one for the declared role.
    ///
    /// # Errors
    /// Propagates the driver error when the session cannot be opened.
    pub async fn open(&mut self) -> Result<(), SqlWritebackError> {
        self.close();
        let session = self.backend.open(self.read_only).await?;
        self.session = Some(session);
        Ok(())
    }

    /// Drop the physical session.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            tracing::debug!(connection = self.id, "closed database session");
        }
    }

    /// Execute `statements` in one transaction.
    ///
    /// - empty batch: `Empty`, no I/O
    /// - locked at commit time: everything rolls back, `Disabled`
    /// - first failing statement: everything rolls back, `Error` with that statement and the
    ///   rest of the batch as `remaining`
    /// - otherwise: commit, `Success`
    pub async fn write(&mut self, statements: Vec<QueryAndParams>) -> WriteResult {
        if statements.is_empty() {
            return WriteResult::Empty;
        }
        if let Err(cause) = self.prepare(true).await {
            return WriteResult::Error {
                failed: None,
                cause,
                remaining: statements,
            };
        }
        let Some(session) = self.session.as_ref() else {
            return WriteResult::Error {
                failed: None,
                cause: SqlWritebackError::ConnectionError("no open session".into()),
                remaining: statements,
            };
        };

        if let Err(cause) = session.begin().await {
            self.invalidate();
            return WriteResult::Error {
                failed: None,
                cause,
                remaining: statements,
            };
        }

        let mut failure = None;
        for (position, statement) in statements.iter().enumerate() {
            if let Err(cause) = session.execute(statement).await {
                failure = Some((position, cause));
                break;
            }
        }

        if let Some((position, cause)) = failure {
            if let Err(rollback_err) = session.rollback().await {
                tracing::error!(
                    connection = self.id,
                    error = %rollback_err,
                    "rollback failed; session will be reopened"
                );
                self.invalidate();
                return WriteResult::Error {
                    failed: None,
                    cause,
                    remaining: statements,
                };
            }
            let mut remaining = statements;
            let statement = remaining.remove(position);
            return WriteResult::Error {
                failed: Some(FailedStatement {
                    position,
                    statement,
                }),
                cause,
                remaining,
            };
        }

        if self.is_locked() {
            if let Err(err) = session.rollback().await {
                tracing::error!(connection = self.id, error = %err, "rollback of locked write failed");
                self.invalidate();
            }
            return WriteResult::Disabled {
                discarded: statements,
            };
        }

        match session.commit().await {
            Ok(()) => WriteResult::Success {
                committed: statements,
            },
            Err(cause) => {
                if session.rollback().await.is_err() {
                    self.invalidate();
                }
                WriteResult::Error {
                    failed: None,
                    cause,
                    remaining: statements,
                }
            }
        }
    }

    /// Run one query and stringify every cell. Failures are captured in the result.
    pub async fn read(&mut self, statement: &QueryAndParams) -> QueryResult {
        if let Err(err) = self.prepare(false).await {
            return QueryResult::from_error(err, statement.query.clone());
        }
        let Some(session) = self.session.as_ref() else {
            return QueryResult::from_error(
                SqlWritebackError::ConnectionError("no open session".into()),
                statement.query.clone(),
            );
        };
        match session.query(statement).await {
            Ok(result) => result,
            Err(err) => QueryResult::from_error(err, statement.query.clone()),
        }
    }

    /// Validate the session, reopening it once if needed.
    async fn prepare(&mut self, for_write: bool) -> Result<(), SqlWritebackError> {
        if self.check_valid(for_write).await {
            return Ok(());
        }
        if self.state == ConnectionState::Valid {
            tracing::warn!(connection = self.id, "database session failed validation; reopening");
        }
        self.state = ConnectionState::Invalid;
        if let Err(err) = self.open().await {
            tracing::error!(connection = self.id, error = %err, "database connection error");
        }
        if self.check_valid(for_write).await {
            return Ok(());
        }
        self.state = ConnectionState::Invalid;
        Err(self.escalate())
    }

    async fn check_valid(&mut self, for_write: bool) -> bool {
        let valid = match self.session.as_ref() {
            Some(session) => session.is_valid(self.read_only, for_write).await,
            None => false,
        };
        if valid {
            self.state = ConnectionState::Valid;
        }
        valid
    }

    fn invalidate(&mut self) {
        self.close();
        self.state = ConnectionState::Invalid;
    }

    fn escalate(&self) -> SqlWritebackError {
        let access = if self.read_only { "readable" } else { "writable" };
        let message = format!(
            "[{}] fatal database connection error; make sure the database is unlocked and {access}. Disabling {}.",
            self.name, self.name
        );
        self.events.log(Severity::Severe, &message);
        self.events.request_shutdown();
        SqlWritebackError::ConnectionUnhealthy(message)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("read_only", &self.read_only)
            .field("locked", &self.is_locked())
            .field("state", &self.state)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
