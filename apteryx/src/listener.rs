//! The callback server: the inbound half of a participating process.
//!
//! The daemon delivers watch notifications and provide requests to a
//! per-process Unix-domain socket.  We serve it from a dedicated thread
//! running its own actix system, with a small worker pool so a callback
//! that reenters the client API can't starve delivery for everyone else.
//! User callbacks run on the blocking pool, where driving the handle's
//! request runtime is safe.
//!
//! The server handle we keep is the wake-up channel for shutdown: stop is
//! requested gracefully first, bounded by a grace period, then forced.

use actix_web::{web, App, HttpResponse, HttpServer};
use log::{error, warn};
use snafu::{OptionExt, ResultExt};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::callbacks::CallbackTable;
use crate::error::{self, Result};

struct ListenerData {
    callbacks: Arc<Mutex<CallbackTable>>,
}

pub(crate) struct Listener {
    handle: actix_web::dev::ServerHandle,
    thread: thread::JoinHandle<()>,
    socket: String,
}

/// Starts the callback server on the given socket and hands back its
/// lifecycle handle.  Returns once the socket is bound and the server is
/// accepting, so a registration sent afterwards can be delivered to.
pub(crate) fn start(socket: String, callbacks: Arc<Mutex<CallbackTable>>) -> Result<Listener> {
    let (tx, rx) = mpsc::channel();
    let bind_socket = socket.clone();

    let thread = thread::Builder::new()
        .name("apteryx-listener".to_string())
        .spawn(move || {
            let system = actix_web::rt::System::new();
            let served: std::io::Result<()> = system.block_on(async move {
                let data = web::Data::new(ListenerData { callbacks });
                // A process that died without shutdown leaves its socket
                // file behind; it's ours to replace.
                let _ = std::fs::remove_file(&bind_socket);
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(data.clone())
                        .route("/watch", web::post().to(watch))
                        .route("/provide", web::post().to(provide))
                })
                .workers(constants::RPC_WORKERS)
                .bind_uds(&bind_socket)?
                .run();
                // Hand the stop handle back to the spawning thread; if the
                // bind failed we never get here and the spawner times out.
                let _ = tx.send(server.handle());
                server.await
            });
            if let Err(e) = served {
                error!("Callback server exited with error: {}", e);
            }
        })
        .context(error::ListenerSpawnSnafu)?;

    let handle = rx
        .recv_timeout(Duration::from_secs(constants::SHUTDOWN_GRACE_SECS))
        .ok()
        .context(error::ListenerStartSnafu {
            socket: socket.as_str(),
        })?;

    Ok(Listener {
        handle,
        thread,
        socket,
    })
}

impl Listener {
    /// Stops the server, waiting out in-flight callbacks for a bounded
    /// grace period before forcing the issue, then joins the thread.
    pub(crate) fn stop(self, runtime: &tokio::runtime::Runtime) {
        let grace = Duration::from_secs(constants::SHUTDOWN_GRACE_SECS);
        let graceful = runtime
            .block_on(async { tokio::time::timeout(grace, self.handle.stop(true)).await });
        if graceful.is_err() {
            warn!("Callback server still busy after {:?}, stopping it hard", grace);
            runtime.block_on(self.handle.stop(false));
        }
        if self.thread.join().is_err() {
            error!("Callback server thread panicked");
        }
        let _ = std::fs::remove_file(&self.socket);
    }
}

/// Delivery half of the watch method: look up the echoed token and run the
/// callback it names.  Unknown tokens answer harmlessly; the registration
/// was probably just removed.
async fn watch(request: web::Json<model::Watch>, data: web::Data<ListenerData>) -> HttpResponse {
    let message = request.into_inner();
    let callback = data
        .callbacks
        .lock()
        .ok()
        .and_then(|table| table.watch(message.cb));

    match callback {
        Some(callback) => {
            // The callback may reenter the client API, so it runs on the
            // blocking pool rather than on this worker.
            let ran = web::block(move || {
                callback(&message.path, message.priv_, &message.value);
            })
            .await;
            if ran.is_err() {
                error!("Watch callback panicked");
            }
        }
        None => warn!(
            "Watch delivery for '{}' named unknown callback {:#x}",
            message.path, message.cb
        ),
    }
    HttpResponse::NoContent().finish()
}

/// Delivery half of the provide method: ask the named callback for the
/// value.  Anything that goes wrong reads as absent (empty).
async fn provide(
    request: web::Json<model::Provide>,
    data: web::Data<ListenerData>,
) -> HttpResponse {
    let message = request.into_inner();
    let callback = data
        .callbacks
        .lock()
        .ok()
        .and_then(|table| table.provide(message.cb));

    let value = match callback {
        Some(callback) => {
            match web::block(move || callback(&message.path, message.priv_)).await {
                Ok(value) => value.unwrap_or_default(),
                Err(_) => {
                    error!("Provide callback panicked");
                    Vec::new()
                }
            }
        }
        None => {
            warn!(
                "Provide request for '{}' named unknown callback {:#x}",
                message.path, message.cb
            );
            Vec::new()
        }
    };

    HttpResponse::Ok().json(model::GetResult { value })
}
