use snafu::Snafu;
use std::io;

/// Possible errors from client operations.  Failures are local to the
/// failing call; nothing here is retried.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{}", source))]
    InvalidPath { source: datastore::Error },

    #[snafu(display("Request '{}' failed: {}", what, source))]
    Request { what: &'static str, source: rpc::Error },

    #[snafu(display("Failed to start request runtime: {}", source))]
    Runtime { source: io::Error },

    #[snafu(display("Failed to spawn callback server thread: {}", source))]
    ListenerSpawn { source: io::Error },

    #[snafu(display("Callback server failed to start on {}", socket))]
    ListenerStart { socket: String },

    #[snafu(display("Another thread poisoned the callback lock by panicking"))]
    CallbackLock,

    #[snafu(display("Failed to write dump output: {}", source))]
    DumpWrite { source: io::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
