//! The controller module carries out the six server operations against the
//! shared state.  The handlers in server::mod hand it deserialized
//! requests; everything here is already past HTTP.
//!
//! Locking rules, which the reentrancy guarantees depend on:
//! * the store write lock is held for the in-memory mutation and the
//!   notification enqueue, never across an RPC;
//! * registry locks are taken after the store lock when both are needed,
//!   and entries are cloned out before any RPC;
//! * the only RPC issued from a request handler is the provider call in
//!   `get`, which runs with no locks held.

use snafu::{OptionExt, ResultExt};

use datastore::{path, Pattern};

use super::error::{self, Result};
use super::notify::Notification;
use super::SharedData;

/// Stores a value, detects whether it changed, and queues notifications
/// for matching watchers.  An empty value is a deletion.
pub(super) fn set(data: &SharedData, request: model::Set) -> Result<()> {
    path::validate_exact(&request.path).context(error::InvalidPathSnafu)?;

    let mut store = data.store.write().ok().context(error::StoreLockSnafu)?;
    let old = store.set(&request.path, &request.value).unwrap_or_default();

    // Absent and empty compare equal, so a delete of a missing path is not
    // a change and notifies nobody.
    if old != request.value {
        let watchers = data
            .watchers
            .read()
            .ok()
            .context(error::RegistryLockSnafu)?
            .matching(&request.path);
        if !watchers.is_empty() {
            // Enqueued under the store lock; see the notify module for why.
            // The receiver only disappears at shutdown.
            let _ = data.notify.send(Notification {
                path: request.path,
                value: request.value,
                watchers,
            });
        }
    }
    Ok(())
}

/// Reads a value: the store wins, then a registered provider, then absent.
/// The provider call blocks this request until the provider answers or the
/// transport gives up; its failure reads as absence, not as an error.
pub(super) async fn get(data: &SharedData, request: model::Get) -> Result<model::GetResult> {
    path::validate_exact(&request.path).context(error::InvalidPathSnafu)?;

    {
        let store = data.store.read().ok().context(error::StoreLockSnafu)?;
        if let Some(value) = store.get(&request.path) {
            return Ok(model::GetResult {
                value: value.to_vec(),
            });
        }
    }

    let provider = data
        .providers
        .read()
        .ok()
        .context(error::RegistryLockSnafu)?
        .lookup(&request.path)
        .cloned();

    let value = match provider {
        Some(provider) => {
            let endpoint = constants::callback_socket(&data.socket_base, provider.owner);
            let call = model::Provide {
                path: request.path.clone(),
                owner: provider.owner,
                cb: provider.cb,
                priv_: provider.priv_,
            };
            match rpc::call::<_, _, _, model::GetResult>(
                &endpoint,
                "/provide",
                &call,
                data.rpc_timeout,
            )
            .await
            {
                Ok(result) => result.value,
                Err(e) => {
                    warn!("Provider for '{}' failed: {}", request.path, e);
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    Ok(model::GetResult { value })
}

/// Lists the direct children of a directory.  Providers don't participate.
pub(super) fn search(data: &SharedData, request: model::Search) -> Result<model::SearchResult> {
    let root = path::search_root(&request.path).context(error::InvalidPathSnafu)?;
    let store = data.store.read().ok().context(error::StoreLockSnafu)?;
    Ok(model::SearchResult {
        paths: store.search(root),
    })
}

/// Removes a subtree; every removed entry notifies its watchers as if it
/// had been set to empty.
pub(super) fn prune(data: &SharedData, request: model::Prune) -> Result<()> {
    path::validate_exact(&request.path).context(error::InvalidPathSnafu)?;

    let mut store = data.store.write().ok().context(error::StoreLockSnafu)?;
    let removed = store.prune(&request.path);
    if !removed.is_empty() {
        let watchers = data
            .watchers
            .read()
            .ok()
            .context(error::RegistryLockSnafu)?;
        for (path, _) in removed {
            let matched = watchers.matching(&path);
            if !matched.is_empty() {
                let _ = data.notify.send(Notification {
                    path,
                    value: Vec::new(),
                    watchers: matched,
                });
            }
        }
    }
    Ok(())
}

/// Registers a watcher, or unregisters the owner's watchers for the
/// pattern when cb is zero.
pub(super) fn watch(data: &SharedData, request: model::Watch) -> Result<()> {
    let pattern = Pattern::parse(&request.path).context(error::InvalidPathSnafu)?;
    let mut watchers = data.watchers.write().ok().context(error::RegistryLockSnafu)?;
    if request.cb == 0 {
        watchers.unregister(&pattern, request.owner);
    } else {
        watchers.register(pattern, request.owner, request.cb, request.priv_);
    }
    Ok(())
}

/// Registers a provider for an exact path, or unregisters the owner's
/// provider when cb is zero.
pub(super) fn provide(data: &SharedData, request: model::Provide) -> Result<()> {
    path::validate_exact(&request.path).context(error::InvalidPathSnafu)?;
    let mut providers = data
        .providers
        .write()
        .ok()
        .context(error::RegistryLockSnafu)?;
    if request.cb == 0 {
        providers.unregister(&request.path, request.owner);
    } else {
        providers.register(request.path, request.owner, request.cb, request.priv_);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::super::notify::Notification;
    use super::super::registry::{ProviderRegistry, WatcherRegistry};
    use super::super::SharedData;
    use datastore::Tree;
    use maplit::hashset;
    use std::collections::HashSet;
    use std::sync::RwLock;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn shared() -> (SharedData, UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let data = SharedData {
            store: RwLock::new(Tree::new()),
            watchers: RwLock::new(WatcherRegistry::default()),
            providers: RwLock::new(ProviderRegistry::default()),
            notify: tx,
            // Nothing listens here; provider calls fail fast and read as
            // absent, which is what the tests want.
            socket_base: "/tmp/apteryx-test-missing.sock".to_string(),
            rpc_timeout: Duration::from_millis(250),
        };
        (data, rx)
    }

    fn set(data: &SharedData, path: &str, value: &[u8]) {
        super::set(
            data,
            model::Set {
                path: path.to_string(),
                value: value.to_vec(),
            },
        )
        .unwrap();
    }

    fn watch(data: &SharedData, pattern: &str, owner: u64, cb: u64, priv_: u64) {
        super::watch(
            data,
            model::Watch {
                path: pattern.to_string(),
                value: Vec::new(),
                owner,
                cb,
                priv_,
            },
        )
        .unwrap();
    }

    async fn get(data: &SharedData, path: &str) -> Vec<u8> {
        super::get(
            data,
            model::Get {
                path: path.to_string(),
            },
        )
        .await
        .unwrap()
        .value
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (data, _rx) = shared();
        set(&data, "/entity/zones/private/name", b"private");
        assert_eq!(get(&data, "/entity/zones/private/name").await, b"private");

        set(&data, "/entity/zones/private/name", b"");
        assert!(get(&data, "/entity/zones/private/name").await.is_empty());
    }

    #[test]
    fn set_rejects_bad_paths() {
        let (data, _rx) = shared();
        for path in ["relative", "/trailing/", "/wild/*", "/a//b"] {
            let result = super::set(
                &data,
                model::Set {
                    path: path.to_string(),
                    value: b"x".to_vec(),
                },
            );
            assert!(result.is_err(), "expected '{}' to be refused", path);
        }
    }

    #[test]
    fn search_is_strict_about_form() {
        let (data, _rx) = shared();
        set(&data, "/entity/zones/private", b"-");
        let bare = super::search(
            &data,
            model::Search {
                path: "/entity/zones".to_string(),
            },
        );
        assert!(bare.is_err());

        let dir = super::search(
            &data,
            model::Search {
                path: "/entity/zones/".to_string(),
            },
        )
        .unwrap();
        assert_eq!(dir.paths, vec!["/entity/zones/private"]);
    }

    #[test]
    fn change_notifies_matching_watchers_once() {
        let (data, mut rx) = shared();
        watch(&data, "/z/s", 1, 0x10, 0x12345678);
        set(&data, "/z/s", b"up");

        let n = rx.try_recv().unwrap();
        assert_eq!(n.path, "/z/s");
        assert_eq!(n.value, b"up");
        assert_eq!(n.watchers.len(), 1);
        assert_eq!(n.watchers[0].cb, 0x10);
        assert_eq!(n.watchers[0].priv_, 0x12345678);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unchanged_set_does_not_notify() {
        let (data, mut rx) = shared();
        set(&data, "/z/s", b"up");
        watch(&data, "/z/s", 1, 0x10, 0);
        set(&data, "/z/s", b"up");
        assert!(rx.try_recv().is_err());

        // Deleting something absent is also not a change.
        set(&data, "/z/other", b"");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unwatch_stops_notifications() {
        let (data, mut rx) = shared();
        watch(&data, "/z/s", 1, 0x10, 0);
        set(&data, "/z/s", b"up");
        assert!(rx.try_recv().is_ok());

        watch(&data, "/z/s", 1, 0, 0);
        set(&data, "/z/s", b"down");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn wildcard_watch_sees_subtree_changes_only() {
        let (data, mut rx) = shared();
        watch(&data, "/e/z/*", 1, 0x10, 0);

        set(&data, "/e/z/p/s", b"x");
        let n = rx.try_recv().unwrap();
        assert_eq!((n.path.as_str(), n.value.as_slice()), ("/e/z/p/s", &b"x"[..]));

        set(&data, "/e/z/p/s", b"");
        let n = rx.try_recv().unwrap();
        assert_eq!(n.path, "/e/z/p/s");
        assert!(n.value.is_empty());

        set(&data, "/e/o/s", b"y");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn mid_path_wildcard_watch_never_fires() {
        let (data, mut rx) = shared();
        watch(&data, "/e/z/*/state", 1, 0x10, 0);
        set(&data, "/e/z/pub/state", b"up");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn one_level_watch_fires_one_level_down() {
        let (data, mut rx) = shared();
        watch(&data, "/e/z/", 1, 0x10, 0);

        set(&data, "/e/z/state", b"up");
        assert!(rx.try_recv().is_ok());

        set(&data, "/e/z/deeper/state", b"up");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn prune_notifies_each_removed_entry_as_deletion() {
        let (data, mut rx) = shared();
        set(&data, "/interfaces/eth0", b"-");
        set(&data, "/interfaces/eth0/state", b"up");
        set(&data, "/entities/zones/public", b"-");
        watch(&data, "/interfaces/*", 1, 0x10, 0);

        super::prune(
            &data,
            model::Prune {
                path: "/interfaces".to_string(),
            },
        )
        .unwrap();

        let mut notified = HashSet::new();
        while let Ok(n) = rx.try_recv() {
            assert!(n.value.is_empty());
            notified.insert(n.path);
        }
        assert_eq!(
            notified,
            hashset!(
                "/interfaces/eth0".to_string(),
                "/interfaces/eth0/state".to_string()
            ),
        );
    }

    #[test]
    fn prune_missing_subtree_is_ok() {
        let (data, _rx) = shared();
        super::prune(
            &data,
            model::Prune {
                path: "/nothere".to_string(),
            },
        )
        .unwrap();
    }

    #[tokio::test]
    async fn get_prefers_stored_value_over_provider() {
        let (data, _rx) = shared();
        set(&data, "/if/eth0/state", b"stored");
        super::provide(
            &data,
            model::Provide {
                path: "/if/eth0/state".to_string(),
                owner: 1,
                cb: 0x10,
                priv_: 0,
            },
        )
        .unwrap();

        // The store answers; the (unreachable) provider is never asked.
        assert_eq!(get(&data, "/if/eth0/state").await, b"stored");
    }

    #[tokio::test]
    async fn get_with_unreachable_provider_reads_as_absent() {
        let (data, _rx) = shared();
        super::provide(
            &data,
            model::Provide {
                path: "/if/eth0/state".to_string(),
                owner: 1,
                cb: 0x10,
                priv_: 0,
            },
        )
        .unwrap();

        assert!(get(&data, "/if/eth0/state").await.is_empty());
    }

    #[tokio::test]
    async fn get_without_provider_is_absent() {
        let (data, _rx) = shared();
        assert!(get(&data, "/if/eth0/state").await.is_empty());
    }

    #[test]
    fn notifications_for_one_path_stay_in_set_order() {
        let (data, mut rx) = shared();
        watch(&data, "/z/s", 1, 0x10, 0);
        set(&data, "/z/s", b"1");
        set(&data, "/z/s", b"2");
        set(&data, "/z/s", b"3");

        let order: Vec<Vec<u8>> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|n| n.value)
            .collect();
        assert_eq!(order, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
    }
}
