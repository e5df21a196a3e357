//! Registries for the two kinds of callback registration.
//!
//! Watchers are keyed by (pattern, owner, cb): re-registering the same
//! triple only replaces the private token, and unregistering clears every
//! entry the owner holds for the pattern.  Providers are keyed by exact
//! path: the most recent registration wins whoever owns it, and the
//! recorded owner gates unregistration.
//!
//! Both registries are plain maps; the server wraps them in RwLocks and
//! snapshots entries out of them before doing anything slow.

use std::collections::BTreeMap;

use datastore::Pattern;

/// One watcher registration, as snapshotted for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watcher {
    pub pattern: Pattern,
    pub owner: u64,
    pub cb: u64,
    pub priv_: u64,
}

#[derive(Debug, Default)]
pub struct WatcherRegistry {
    // BTreeMap so equal registrations always dispatch in the same order.
    entries: BTreeMap<(Pattern, u64, u64), u64>,
}

impl WatcherRegistry {
    /// Adds a watcher, or replaces the private token of an identical
    /// (pattern, owner, cb) registration.
    pub fn register(&mut self, pattern: Pattern, owner: u64, cb: u64, priv_: u64) {
        debug!("Watch '{}' for owner {} (cb {:#x})", pattern.as_str(), owner, cb);
        self.entries.insert((pattern, owner, cb), priv_);
    }

    /// Removes every watcher the owner registered for this pattern,
    /// whatever cb each was registered with.  Unknown registrations are
    /// fine to remove.
    pub fn unregister(&mut self, pattern: &Pattern, owner: u64) {
        debug!("Unwatch '{}' for owner {}", pattern.as_str(), owner);
        self.entries
            .retain(|(p, o, _), _| !(p == pattern && *o == owner));
    }

    /// Snapshots every watcher whose pattern matches the changed path.
    pub fn matching(&self, path: &str) -> Vec<Watcher> {
        self.entries
            .iter()
            .filter(|((pattern, _, _), _)| pattern.matches(path))
            .map(|((pattern, owner, cb), priv_)| Watcher {
                pattern: pattern.clone(),
                owner: *owner,
                cb: *cb,
                priv_: *priv_,
            })
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One provider registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub owner: u64,
    pub cb: u64,
    pub priv_: u64,
}

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    entries: BTreeMap<String, Provider>,
}

impl ProviderRegistry {
    /// Claims read-resolution of an exact path.  A later registration
    /// replaces an earlier one regardless of owner.
    pub fn register<S: Into<String>>(&mut self, path: S, owner: u64, cb: u64, priv_: u64) {
        let path = path.into();
        debug!("Provide '{}' by owner {} (cb {:#x})", path, owner, cb);
        self.entries.insert(path, Provider { owner, cb, priv_ });
    }

    /// Releases the claim, but only for the owner that currently holds it;
    /// a stale owner can't tear down a newer registration.
    pub fn unregister(&mut self, path: &str, owner: u64) {
        if self.entries.get(path).map(|p| p.owner) == Some(owner) {
            debug!("Unprovide '{}' by owner {}", path, owner);
            self.entries.remove(path);
        }
    }

    pub fn lookup(&self, path: &str) -> Option<&Provider> {
        self.entries.get(path)
    }
}
