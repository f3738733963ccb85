//! The pending-result table: one entry per query between enqueue and
//! delivery.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use querygate_proto::{FrontendMessageKind, FrontendToClient, HttpResponse};
use tokio::sync::{mpsc, oneshot};
use tonic::Status;

use crate::error::FrontendError;

/// What a waiting handler eventually receives.
pub(crate) type ExecResult = Result<HttpResponse, FrontendError>;

/// Outgoing half of a Process stream, used to push CANCEL at the worker
/// currently running a query.
pub(crate) type StreamSender = mpsc::Sender<Result<FrontendToClient, Status>>;

struct PendingEntry {
    tx: oneshot::Sender<ExecResult>,
    /// Set once the query is dispatched; identifies where CANCEL must go.
    dispatched_to: Option<StreamSender>,
    /// The dispatching stream went away before an answer arrived.
    worker_lost: bool,
}

/// Correlation table from query id to the handler waiting on it.
///
/// Entries are inserted before the query can reach any worker and removed
/// exactly once: on delivery, or by the handler tearing the query down.
#[derive(Default)]
pub(crate) struct PendingResults {
    entries: Mutex<HashMap<u64, PendingEntry>>,
}

impl PendingResults {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates the entry for a new query and hands back the delivery slot.
    pub(crate) fn register(&self, query_id: u64) -> oneshot::Receiver<ExecResult> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(
            query_id,
            PendingEntry {
                tx,
                dispatched_to: None,
                worker_lost: false,
            },
        );
        rx
    }

    /// Marks the query as dispatched on `stream`. Returns false if the entry
    /// is already gone (the handler cancelled while the query sat queued),
    /// in which case the caller must not send the request out.
    pub(crate) fn record_dispatch(&self, query_id: u64, stream: StreamSender) -> bool {
        match self.lock().get_mut(&query_id) {
            Some(entry) => {
                entry.dispatched_to = Some(stream);
                true
            }
            None => false,
        }
    }

    /// Delivers a result and removes the entry. Returns false for unknown
    /// ids (late results after cancellation or deadline) which the caller
    /// drops.
    pub(crate) fn deliver(&self, query_id: u64, result: ExecResult) -> bool {
        let entry = self.lock().remove(&query_id);
        match entry {
            Some(entry) => {
                // The receiver may have raced away; either way the entry is
                // consumed and a duplicate delivery will be dropped.
                let _ = entry.tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Removes the entry without delivering. Returns the stream that holds
    /// the in-flight query, if it was dispatched.
    pub(crate) fn cancel(&self, query_id: u64) -> Option<StreamSender> {
        self.lock().remove(&query_id).and_then(|e| e.dispatched_to)
    }

    /// Flags every query dispatched on `stream` as orphaned. The entries
    /// themselves stay: an out-of-band QueryResult may still land, and the
    /// waiting handler reports the loss once its deadline elapses.
    pub(crate) fn mark_worker_lost(&self, stream: &StreamSender) {
        for entry in self.lock().values_mut() {
            if entry
                .dispatched_to
                .as_ref()
                .is_some_and(|tx| tx.same_channel(stream))
            {
                entry.worker_lost = true;
            }
        }
    }

    /// Whether the query was dispatched to a worker that has since gone
    /// away without answering.
    pub(crate) fn is_worker_lost(&self, query_id: u64) -> bool {
        self.lock().get(&query_id).is_some_and(|e| e.worker_lost)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Fails every outstanding query. Used once shutdown gives up waiting.
    pub(crate) fn fail_all(&self) {
        let entries = std::mem::take(&mut *self.lock());
        for (_, entry) in entries {
            let _ = entry.tx.send(Err(FrontendError::Stopped));
        }
    }
}

/// Builds the CANCEL control message for a query.
pub(crate) fn cancel_message(query_id: u64) -> FrontendToClient {
    FrontendToClient {
        kind: FrontendMessageKind::Cancel as i32,
        query_id,
        http_request: None,
    }
}
