//! Callback correlation between requests and asynchronous replies.
//!
//! Each outstanding request holds a one-shot continuation keyed by its
//! callback id. A continuation fires at most once; resolving an unknown id
//! is a quiet no-op. Entries whose owner never replies (validator
//! disconnected mid-flight) are reclaimed by a periodic TTL sweep rather
//! than leaking forever.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use uuid::Uuid;

struct CallbackEntry<T> {
    tx: oneshot::Sender<T>,
    registered_at: Instant,
}

/// Correlation table mapping callback ids to one-shot continuations.
///
/// Interior-locked; clone the surrounding `Arc` to share between the
/// dispatch path and connection handlers.
pub struct CallbackMap<T> {
    entries: Mutex<HashMap<Uuid, CallbackEntry<T>>>,
}

impl<T> CallbackMap<T> {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Register a continuation for `callback_id`. Returns the receiver the
    /// caller awaits; dropping the map-side sender (via [`sweep`]) cancels
    /// it quietly.
    ///
    /// [`sweep`]: CallbackMap::sweep
    pub fn insert(&self, callback_id: Uuid) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(callback_id, CallbackEntry { tx, registered_at: Instant::now() });
        rx
    }

    /// Invoke and remove the continuation for `callback_id`, if present.
    /// Returns whether an entry existed.
    pub fn resolve(&self, callback_id: Uuid, payload: T) -> bool {
        let entry = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.remove(&callback_id)
        };
        match entry {
            Some(entry) => {
                // The receiver may already be gone; either way the entry is consumed.
                let _ = entry.tx.send(payload);
                true
            }
            None => false,
        }
    }

    /// Remove entries older than `ttl`, cancelling their receivers.
    /// Returns the number of entries reclaimed.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.registered_at.elapsed() < ttl);
        before - entries.len()
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for CallbackMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
