/*!
# Background

apteryxd is the Apteryx daemon: the single process on a host that owns the
authoritative path/value tree, the watcher registry and the provider
registry.  Every other process reaches it through the client library over a
well-known Unix-domain socket.

The daemon answers six requests.  `set`, `get`, `search` and `prune`
operate on the tree; `watch` and `provide` register (or unregister)
callbacks that live in other processes.  When a `set` or `prune` changes a
path, matching watchers are notified over each owner's callback socket;
when a `get` misses the tree but a provider claims the path, the daemon
asks that provider for the value before answering.

Watch delivery is ordered but not awaited: the originating `set` returns as
soon as the tree is updated, and a dedicated notifier task drains the
delivery queue.  See the server module for the locking rules that make the
reentrant cases (a watcher that calls back into the daemon from inside its
callback) safe.
*/

#![deny(rust_2018_idioms)]

#[macro_use]
extern crate log;

pub mod server;

pub use server::serve;
