//! The callback table maps the opaque tokens that travel over the wire to
//! the closures this process registered.
//!
//! The daemon never interprets a token; it just echoes it back when a
//! watch fires or a provide is asked for.  Tokens start at 1 because 0 is
//! the unregister sentinel on the wire.

use std::collections::HashMap;
use std::sync::Arc;

/// Called when a watched path changes.  Receives the changed path, the
/// private token from registration, and the new value (empty on deletion).
pub type WatchCallback = Arc<dyn Fn(&str, u64, &[u8]) -> bool + Send + Sync>;

/// Called when the daemon asks this process for a provided value.
/// Receives the requested path and the private token from registration;
/// returning None (or empty bytes) reads as absent.
pub type ProvideCallback = Arc<dyn Fn(&str, u64) -> Option<Vec<u8>> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Callback {
    Watch(WatchCallback),
    Provide(ProvideCallback),
}

struct Entry {
    // The pattern (or exact path, for providers) the callback was
    // registered under, so unwatch/unprovide can clear local state.
    pattern: String,
    callback: Callback,
}

#[derive(Default)]
pub(crate) struct CallbackTable {
    next: u64,
    entries: HashMap<u64, Entry>,
}

impl CallbackTable {
    /// Stores a callback and returns its wire token.
    pub(crate) fn insert(&mut self, pattern: String, callback: Callback) -> u64 {
        self.next += 1;
        let token = self.next;
        self.entries.insert(token, Entry { pattern, callback });
        token
    }

    /// Drops every watch callback registered under the pattern, matching
    /// the daemon-side unwatch semantics.
    pub(crate) fn remove_watches(&mut self, pattern: &str) {
        self.entries
            .retain(|_, e| !(e.pattern == pattern && matches!(e.callback, Callback::Watch(_))));
    }

    /// Drops every provide callback registered under the path.
    pub(crate) fn remove_providers(&mut self, path: &str) {
        self.entries
            .retain(|_, e| !(e.pattern == path && matches!(e.callback, Callback::Provide(_))));
    }

    pub(crate) fn watch(&self, token: u64) -> Option<WatchCallback> {
        match self.entries.get(&token) {
            Some(Entry {
                callback: Callback::Watch(cb),
                ..
            }) => Some(Arc::clone(cb)),
            _ => None,
        }
    }

    pub(crate) fn provide(&self, token: u64) -> Option<ProvideCallback> {
        match self.entries.get(&token) {
            Some(Entry {
                callback: Callback::Provide(cb),
                ..
            }) => Some(Arc::clone(cb)),
            _ => None,
        }
    }
}
