//! Stream-id allocation and per-stream completion slots.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use cassandra_core::{CassandraError, Result};

use super::StreamData;

/// Ids are non-negative, so at most `i16::MAX + 1` can be in flight.
const MAX_IN_FLIGHT: usize = i16::MAX as usize + 1;

/// The map from in-flight stream id to its completion slot.
///
/// Issuing callers insert concurrently; the background reader removes.
/// Ids come from a wrapping counter that skips ids still in flight, so an
/// id is never reused while its request is outstanding. Allocation and
/// registration happen under one lock to keep that invariant.
#[derive(Debug)]
pub(crate) struct StreamTable {
    inner: Mutex<TableInner>,
}

#[derive(Debug)]
struct TableInner {
    pending: HashMap<i16, oneshot::Sender<Result<StreamData>>>,
    next_id: i16,
}

impl StreamTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                pending: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Allocates an unused stream id and registers a completion slot for
    /// it, returning the receiving end.
    pub fn register(&self) -> Result<(i16, oneshot::Receiver<Result<StreamData>>)> {
        let mut inner = self.inner.lock().expect("stream table lock poisoned");
        if inner.pending.len() >= MAX_IN_FLIGHT {
            return Err(CassandraError::Connection(
                "all stream ids are in flight".to_string(),
            ));
        }
        loop {
            let id = inner.next_id;
            inner.next_id = if id == i16::MAX { 0 } else { id + 1 };
            if !inner.pending.contains_key(&id) {
                let (sender, receiver) = oneshot::channel();
                inner.pending.insert(id, sender);
                return Ok((id, receiver));
            }
        }
    }

    /// Removes and returns the slot for a stream id, if one is pending.
    pub fn complete(&self, id: i16) -> Option<oneshot::Sender<Result<StreamData>>> {
        self.inner
            .lock()
            .expect("stream table lock poisoned")
            .pending
            .remove(&id)
    }

    /// Drops the slot for a stream id without resolving it (the request
    /// was never written).
    pub fn discard(&self, id: i16) {
        self.inner
            .lock()
            .expect("stream table lock poisoned")
            .pending
            .remove(&id);
    }

    /// Resolves every pending slot with a connection error so no caller
    /// awaits forever.
    pub fn fail_all(&self, reason: &str) {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock().expect("stream table lock poisoned");
            inner.pending.drain().collect()
        };
        for (_, sender) in drained {
            let _ = sender.send(Err(CassandraError::Connection(reason.to_string())));
        }
    }

    /// Returns the number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner
            .lock()
            .expect("stream table lock poisoned")
            .pending
            .len()
    }
}
