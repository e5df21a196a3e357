/*!
  This crate contains constants shared across multiple Apteryx crates
*/

// Shared RPC settings
pub const APTERYX_SOCKET: &str = "/run/apteryx.sock";

/// Number of worker threads serving RPCs, both in the daemon and in each
/// process's callback server.  More than one is required so that callbacks
/// can reenter the API without starving themselves of a worker.
pub const RPC_WORKERS: usize = 4;

/// How long we wait for any single request/response pair, in seconds.
pub const RPC_TIMEOUT_SECS: u64 = 5;

/// How long shutdown waits for the callback server to drain before forcing
/// it down, in seconds.
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

/// The callback server for a process listens next to the daemon's socket,
/// with the process id appended, e.g. "/run/apteryx.sock.1234".
pub fn callback_socket<S: AsRef<str>>(base: S, owner: u64) -> String {
    format!("{}.{}", base.as_ref(), owner)
}
