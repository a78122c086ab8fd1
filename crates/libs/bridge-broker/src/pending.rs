use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bridge_ipc::{RequestId, Response};
use tokio::sync::oneshot;

/// Outcome of offering a response to the pending table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Resolved,
    /// No entry for the request id: unknown, already answered, or timed out.
    NoWaiter,
    /// The entry existed but its waiter was dropped before it could be resolved.
    WaiterGone,
}

struct PendingEntry {
    token: u64,
    resolver: oneshot::Sender<Response>,
}

/// In-flight requests keyed by request id, each resolvable exactly once.
///
/// Every entry carries a token so a stale waiter can only remove its own
/// entry, never a later request that reused the id.
#[derive(Default)]
pub(crate) struct PendingRequests {
    next_token: AtomicU64,
    entries: Mutex<HashMap<RequestId, PendingEntry>>,
}

impl PendingRequests {
    /// Install a waiter for `request_id`. Returns `None` if one is already pending.
    pub(crate) fn insert(&self, request_id: &str) -> Option<(u64, oneshot::Receiver<Response>)> {
        let mut entries = self.entries.lock().expect("pending table mutex poisoned");
        if entries.contains_key(request_id) {
            return None;
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (resolver, waiter) = oneshot::channel();
        entries.insert(request_id.to_string(), PendingEntry { token, resolver });
        Some((token, waiter))
    }

    /// Remove the entry for `request_id` if it still belongs to `token`.
    pub(crate) fn remove(&self, request_id: &str, token: u64) -> bool {
        let mut entries = self.entries.lock().expect("pending table mutex poisoned");
        match entries.get(request_id) {
            Some(entry) if entry.token == token => {
                entries.remove(request_id);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn resolve(&self, response: Response) -> Resolution {
        let entry = self
            .entries
            .lock()
            .expect("pending table mutex poisoned")
            .remove(response.request_id.as_str());
        match entry {
            Some(entry) => match entry.resolver.send(response) {
                Ok(()) => Resolution::Resolved,
                Err(_) => Resolution::WaiterGone,
            },
            None => Resolution::NoWaiter,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("pending table mutex poisoned")
            .len()
    }

    /// Drop every entry; their waiters observe a closed channel.
    pub(crate) fn clear(&self) {
        self.entries
            .lock()
            .expect("pending table mutex poisoned")
            .clear();
    }
}

/// Removes a pending entry when a `send` stops waiting without a resolution,
/// whether by timeout or because its future was dropped.
pub(crate) struct PendingGuard<'a> {
    table: &'a PendingRequests,
    request_id: RequestId,
    token: u64,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(table: &'a PendingRequests, request_id: RequestId, token: u64) -> Self {
        Self {
            table,
            request_id,
            token,
            armed: true,
        }
    }

    /// The entry has already left the table; nothing to clean up.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.table.remove(&self.request_id, self.token) {
            log::debug!("broker: dropped pending request {}", self.request_id);
        }
    }
}
