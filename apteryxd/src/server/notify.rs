//! Watch notification delivery.
//!
//! Dispatch is decoupled from the request that caused it: `set` and
//! `prune` enqueue a batch here and return, and a single notifier task
//! drains the queue, sending one `/watch` RPC per matched watcher.  The
//! single consumer is what turns queue order into delivery order; the
//! producers enqueue while they still hold the store write lock, so queue
//! order is also store-mutation order.  Delivery failures are logged and
//! dropped.

use std::time::Duration;

use tokio::sync::mpsc;

use super::registry::Watcher;

/// One changed path and the watchers snapshotted for it at mutation time.
#[derive(Debug)]
pub(crate) struct Notification {
    pub path: String,
    pub value: Vec<u8>,
    pub watchers: Vec<Watcher>,
}

pub(crate) type Queue = mpsc::UnboundedSender<Notification>;

/// Starts the notifier task and hands back the queue it drains.
pub(crate) fn start(socket_base: String, timeout: Duration) -> Queue {
    let (tx, rx) = mpsc::unbounded_channel();
    actix_web::rt::spawn(run(socket_base, timeout, rx));
    tx
}

async fn run(
    socket_base: String,
    timeout: Duration,
    mut queue: mpsc::UnboundedReceiver<Notification>,
) {
    while let Some(notification) = queue.recv().await {
        deliver(&socket_base, timeout, notification).await;
    }
    debug!("Notifier stopping, queue closed");
}

async fn deliver(socket_base: &str, timeout: Duration, notification: Notification) {
    for watcher in &notification.watchers {
        let endpoint = constants::callback_socket(socket_base, watcher.owner);
        let message = model::Watch {
            path: notification.path.clone(),
            value: notification.value.clone(),
            owner: watcher.owner,
            cb: watcher.cb,
            priv_: watcher.priv_,
        };
        // Best effort; the change that caused this already succeeded.
        if let Err(e) = rpc::send(&endpoint, "/watch", &message, timeout).await {
            warn!(
                "Dropped notification for '{}' to owner {}: {}",
                notification.path, watcher.owner, e
            );
        }
    }
}
