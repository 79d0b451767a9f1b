use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::translation::{Dialect, translate_dialect};
use crate::types::QueryAndParams;

/// A buffered statement and the sequence number it was given on arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStatement {
    pub sequence_id: u64,
    pub statement: QueryAndParams,
}

#[derive(Default)]
struct BufferState {
    next_sequence: u64,
    entries: BTreeMap<u64, QueryAndParams>,
}

/// Ordered holding area for statements waiting to be flushed.
///
/// Sequence ids are handed out under the same lock that inserts the entry, so a drain never
/// observes a gap that a slower producer fills in later. The lock is only held for a map insert
/// or a swap, never across I/O.
pub struct WriteBuffer {
    state: Mutex<BufferState>,
    dialect: Dialect,
}

impl WriteBuffer {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            dialect,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn lock_state(&self) -> MutexGuard<'_, BufferState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Translate the statement text to this buffer's dialect and buffer it.
    /// Returns the assigned sequence id.
    pub fn enqueue(&self, statement: QueryAndParams) -> u64 {
        let QueryAndParams { query, params } = statement;
        let query = translate_dialect(&query, self.dialect).into_owned();
        self.enqueue_raw(QueryAndParams { query, params })
    }

    /// Buffer the statement text as given.
    pub fn enqueue_raw(&self, statement: QueryAndParams) -> u64 {
        let mut state = self.lock_state();
        let sequence_id = state.next_sequence;
        state.next_sequence += 1;
        state.entries.insert(sequence_id, statement);
        sequence_id
    }

    /// Enqueue several statements; they receive consecutive sequence ids.
    pub fn enqueue_all<I>(&self, statements: I) -> Vec<u64>
    where
        I: IntoIterator<Item = QueryAndParams>,
    {
        let translated: Vec<QueryAndParams> = statements
            .into_iter()
            .map(|s| QueryAndParams {
                query: translate_dialect(&s.query, self.dialect).into_owned(),
                params: s.params,
            })
            .collect();
        let mut state = self.lock_state();
        translated
            .into_iter()
            .map(|statement| {
                let sequence_id = state.next_sequence;
                state.next_sequence += 1;
                state.entries.insert(sequence_id, statement);
                sequence_id
            })
            .collect()
    }

    /// Take everything buffered right now, in ascending sequence order.
    pub fn drain(&self) -> Vec<PendingStatement> {
        let entries = std::mem::take(&mut self.lock_state().entries);
        entries
            .into_iter()
            .map(|(sequence_id, statement)| PendingStatement {
                sequence_id,
                statement,
            })
            .collect()
    }

    /// Put drained statements back under their original ids, ahead of anything newer.
    pub fn restore<I>(&self, statements: I)
    where
        I: IntoIterator<Item = PendingStatement>,
    {
        let mut state = self.lock_state();
        for pending in statements {
            state.entries.insert(pending.sequence_id, pending.statement);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_state().entries.is_empty()
    }

    /// Copy of the buffered statements, in order.
    #[must_use]
    pub fn pending(&self) -> Vec<QueryAndParams> {
        self.lock_state().entries.values().cloned().collect()
    }
}
