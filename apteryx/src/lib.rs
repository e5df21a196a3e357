#![deny(rust_2018_idioms)]

/*!
# Background

The apteryx library is how a process participates in the shared
configuration and state database: set and get values by path, search a
directory level, prune a subtree, watch paths for changes, and provide
values on demand.  The daemon (apteryxd) owns the data; this library owns
the conversation with it.

# Library

Everything hangs off an [`Apteryx`] handle:

```no_run
use apteryx::{Apteryx, Config};

let client = Apteryx::new(Config::default()).unwrap();
client.set("/interfaces/eth0/state", b"up").unwrap();
assert_eq!(client.get("/interfaces/eth0/state").unwrap(), Some(b"up".to_vec()));
```

The handle is cheap to clone, and clones nest: the callback server and the
request runtime live until the last clone is dropped.  The surface is
blocking so it works the same from plain threads and from inside watch and
provide callbacks (which may reenter the API freely).

Watching and providing make this process an RPC server too: the first
`watch` or `provide` lazily starts a callback server on a socket derived
from the daemon's socket and this process's id, and the daemon calls back
into it.  Callbacks are referenced over the wire by opaque tokens, never
by anything another process could dereference.
*/

mod callbacks;
pub mod error;
mod listener;

pub use callbacks::{ProvideCallback, WatchCallback};
pub use error::{Error, Result};

use log::debug;
use snafu::{OptionExt, ResultExt};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use callbacks::{Callback, CallbackTable};
use datastore::{path, Pattern};

/// Where the daemon lives and how long we wait for it.
#[derive(Debug, Clone)]
pub struct Config {
    /// The daemon's socket; also the base name the callback server's
    /// socket is derived from.
    pub socket: PathBuf,
    /// Applied to every request/response pair, in both directions.
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: constants::APTERYX_SOCKET.into(),
            timeout: Duration::from_secs(constants::RPC_TIMEOUT_SECS),
        }
    }
}

/// A handle on the shared database.  Clones share one connection config,
/// callback table and callback server.
#[derive(Clone)]
pub struct Apteryx {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    owner: u64,
    // Drives outbound requests; block_on is safe from any thread that
    // isn't itself inside an async context, including the callback
    // server's blocking pool.
    runtime: tokio::runtime::Runtime,
    callbacks: Arc<Mutex<CallbackTable>>,
    listener: Mutex<Option<listener::Listener>>,
}

impl Apteryx {
    /// Creates a handle talking to the daemon named by the config.
    pub fn new(config: Config) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("apteryx-rpc")
            .enable_all()
            .build()
            .context(error::RuntimeSnafu)?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                owner: std::process::id() as u64,
                runtime,
                callbacks: Arc::new(Mutex::new(CallbackTable::default())),
                listener: Mutex::new(None),
            }),
        })
    }

    /// Releases this handle.  Dropping it does the same; the callback
    /// server stops once the last clone is gone.
    pub fn shutdown(self) {}

    /// Stores a value at a path.  An empty value removes the entry, so a
    /// reader can't tell "empty" from "absent" - that's the data model.
    pub fn set<S: AsRef<str>>(&self, path: S, value: &[u8]) -> Result<()> {
        let path = path.as_ref();
        path::validate_exact(path).context(error::InvalidPathSnafu)?;

        let request = model::Set {
            path: path.to_string(),
            value: value.to_vec(),
        };
        self.block_on(rpc::send(
            &self.inner.config.socket,
            "/set",
            &request,
            self.inner.config.timeout,
        ))
        .context(error::RequestSnafu { what: "set" })
    }

    /// Reads the value at a path; None means absent.  If another process
    /// provides the path, this call blocks until it answers or the
    /// transport gives up.
    pub fn get<S: AsRef<str>>(&self, path: S) -> Result<Option<Vec<u8>>> {
        let path = path.as_ref();
        path::validate_exact(path).context(error::InvalidPathSnafu)?;

        let request = model::Get {
            path: path.to_string(),
        };
        let result: model::GetResult = self
            .block_on(rpc::call(
                &self.inner.config.socket,
                "/get",
                &request,
                self.inner.config.timeout,
            ))
            .context(error::RequestSnafu { what: "get" })?;

        Ok(if result.value.is_empty() {
            None
        } else {
            Some(result.value)
        })
    }

    /// Lists the direct children of a directory, one level only.  The
    /// path must be a root spelling or end in '/'.
    pub fn search<S: AsRef<str>>(&self, path: S) -> Result<Vec<String>> {
        let root = path::search_root(path.as_ref()).context(error::InvalidPathSnafu)?;

        let request = model::Search { path: root };
        let result: model::SearchResult = self
            .block_on(rpc::call(
                &self.inner.config.socket,
                "/search",
                &request,
                self.inner.config.timeout,
            ))
            .context(error::RequestSnafu { what: "search" })?;
        Ok(result.paths)
    }

    /// Removes a path and all reachable children.
    pub fn prune<S: AsRef<str>>(&self, path: S) -> Result<()> {
        let path = path.as_ref();
        path::validate_exact(path).context(error::InvalidPathSnafu)?;

        let request = model::Prune {
            path: path.to_string(),
        };
        self.block_on(rpc::send(
            &self.inner.config.socket,
            "/prune",
            &request,
            self.inner.config.timeout,
        ))
        .context(error::RequestSnafu { what: "prune" })
    }

    /// Watches a pattern for changes.  The callback receives the changed
    /// path, the private token given here, and the new value (empty on
    /// deletion).  Patterns: an exact path, `P/` for one level below P,
    /// `P/*` for the whole subtree, or a root spelling for everything.
    pub fn watch<S, F>(&self, pattern: S, callback: F, priv_: u64) -> Result<()>
    where
        S: AsRef<str>,
        F: Fn(&str, u64, &[u8]) -> bool + Send + Sync + 'static,
    {
        let pattern = Pattern::parse(pattern.as_ref()).context(error::InvalidPathSnafu)?;

        // The daemon may notify the moment registration lands, so the
        // callback server goes up first.
        self.start_listener()?;
        let cb = self
            .lock_callbacks()?
            .insert(pattern.as_str().to_string(), Callback::Watch(Arc::new(callback)));

        let request = model::Watch {
            path: pattern.as_str().to_string(),
            value: Vec::new(),
            owner: self.inner.owner,
            cb,
            priv_,
        };
        let registered = self
            .block_on(rpc::send(
                &self.inner.config.socket,
                "/watch",
                &request,
                self.inner.config.timeout,
            ))
            .context(error::RequestSnafu { what: "watch" });

        if registered.is_err() {
            // Registration never landed; the token is dead weight.
            self.lock_callbacks()?.remove_watches(pattern.as_str());
        }
        registered
    }

    /// Stops watching a pattern: every watcher this process registered
    /// for it is removed, and its callbacks are forgotten locally.
    pub fn unwatch<S: AsRef<str>>(&self, pattern: S) -> Result<()> {
        let pattern = Pattern::parse(pattern.as_ref()).context(error::InvalidPathSnafu)?;

        let request = model::Watch {
            path: pattern.as_str().to_string(),
            value: Vec::new(),
            owner: self.inner.owner,
            cb: 0,
            priv_: 0,
        };
        self.block_on(rpc::send(
            &self.inner.config.socket,
            "/watch",
            &request,
            self.inner.config.timeout,
        ))
        .context(error::RequestSnafu { what: "unwatch" })?;

        self.lock_callbacks()?.remove_watches(pattern.as_str());
        Ok(())
    }

    /// Provides the value of an exact path on demand: whenever anyone
    /// gets the path and the store has no value, the daemon asks the
    /// callback.  Returning None (or empty bytes) reads as absent.
    pub fn provide<S, F>(&self, path: S, callback: F, priv_: u64) -> Result<()>
    where
        S: AsRef<str>,
        F: Fn(&str, u64) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        let path = path.as_ref();
        path::validate_exact(path).context(error::InvalidPathSnafu)?;

        self.start_listener()?;
        let cb = self
            .lock_callbacks()?
            .insert(path.to_string(), Callback::Provide(Arc::new(callback)));

        let request = model::Provide {
            path: path.to_string(),
            owner: self.inner.owner,
            cb,
            priv_,
        };
        let registered = self
            .block_on(rpc::send(
                &self.inner.config.socket,
                "/provide",
                &request,
                self.inner.config.timeout,
            ))
            .context(error::RequestSnafu { what: "provide" });

        if registered.is_err() {
            self.lock_callbacks()?.remove_providers(path);
        }
        registered
    }

    /// Withdraws this process's provider for a path.
    pub fn unprovide<S: AsRef<str>>(&self, path: S) -> Result<()> {
        let path = path.as_ref();
        path::validate_exact(path).context(error::InvalidPathSnafu)?;

        let request = model::Provide {
            path: path.to_string(),
            owner: self.inner.owner,
            cb: 0,
            priv_: 0,
        };
        self.block_on(rpc::send(
            &self.inner.config.socket,
            "/provide",
            &request,
            self.inner.config.timeout,
        ))
        .context(error::RequestSnafu { what: "unprovide" })?;

        self.lock_callbacks()?.remove_providers(path);
        Ok(())
    }

    /// Prints a path and all reachable children to the sink, one
    /// "path value" line per stored entry.  Accepts an exact path or a
    /// root spelling.
    pub fn dump<S: AsRef<str>, W: Write>(&self, path: S, sink: &mut W) -> Result<()> {
        let path = path.as_ref();

        let directory = if path::is_root(path) {
            String::new()
        } else {
            path::validate_exact(path).context(error::InvalidPathSnafu)?;
            if let Some(value) = self.get(path)? {
                writeln!(sink, "{:<64}{}", path, String::from_utf8_lossy(&value))
                    .context(error::DumpWriteSnafu)?;
            }
            format!("{}/", path)
        };

        for child in self.search(directory)? {
            self.dump(&child, sink)?;
        }
        Ok(())
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.inner.runtime.block_on(future)
    }

    fn lock_callbacks(&self) -> Result<std::sync::MutexGuard<'_, CallbackTable>> {
        self.inner
            .callbacks
            .lock()
            .ok()
            .context(error::CallbackLockSnafu)
    }

    /// Starts the callback server if it isn't already running.
    fn start_listener(&self) -> Result<()> {
        let mut listener = self
            .inner
            .listener
            .lock()
            .ok()
            .context(error::CallbackLockSnafu)?;
        if listener.is_none() {
            let socket = constants::callback_socket(
                self.inner.config.socket.display().to_string(),
                self.inner.owner,
            );
            debug!("Starting callback server on {}", socket);
            *listener = Some(listener::start(socket, Arc::clone(&self.inner.callbacks))?);
        }
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // The last handle is going away; stop the callback server with
        // its usual grace period.
        if let Some(listener) = self.listener.lock().ok().and_then(|mut l| l.take()) {
            listener.stop(&self.runtime);
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Apteryx, Config, Error};
    use std::time::Duration;

    fn client() -> Apteryx {
        // Points at nothing; only validation-level behaviour is exercised.
        Apteryx::new(Config {
            socket: "/tmp/apteryx-test-unused.sock".into(),
            timeout: Duration::from_millis(100),
        })
        .unwrap()
    }

    #[test]
    fn default_config_uses_shared_constants() {
        let config = Config::default();
        assert_eq!(config.socket.to_str(), Some(constants::APTERYX_SOCKET));
        assert_eq!(
            config.timeout,
            Duration::from_secs(constants::RPC_TIMEOUT_SECS)
        );
    }

    #[test]
    fn invalid_paths_never_reach_the_wire() {
        let client = client();
        // These fail fast even though no daemon is listening.
        assert!(matches!(
            client.set("relative/path", b"x"),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            client.get("/trailing/"),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            client.prune("/wild/*"),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            client.search("/bare/path"),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            client.provide("/a/", |_, _| None, 0),
            Err(Error::InvalidPath { .. })
        ));
    }

    #[test]
    fn unreachable_daemon_is_a_request_error() {
        let client = client();
        assert!(matches!(
            client.set("/a/b", b"x"),
            Err(Error::Request { what: "set", .. })
        ));
    }
}
