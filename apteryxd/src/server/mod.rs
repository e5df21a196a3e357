//! The server module owns the RPC surface.  It interfaces with the store
//! and the registries through the server::controller module.

mod controller;
mod error;
mod notify;
mod registry;

pub use error::Error;

use actix_web::{
    body::BoxBody, web, App, HttpRequest, HttpResponse, HttpServer, Responder, ResponseError,
};
use datastore::Tree;
use error::Result;
use http::StatusCode;
use registry::{ProviderRegistry, WatcherRegistry};
use snafu::ResultExt;
use std::fs::{set_permissions, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync;
use std::time::Duration;

// Router

/// This is the primary interface of the module.  It defines the server and
/// application that actix spawns for requests, starts the notifier task,
/// and creates the shared state that handler methods use to reach the
/// store and registries.
pub async fn serve<P>(socket_path: P, threads: usize) -> Result<()>
where
    P: AsRef<Path>,
{
    let socket_base = socket_path.as_ref().display().to_string();
    let rpc_timeout = Duration::from_secs(constants::RPC_TIMEOUT_SECS);

    // SharedData gives us a convenient way to make data available to handler methods when it
    // doesn't come from the request itself.
    let shared_data = web::Data::new(SharedData {
        store: sync::RwLock::new(Tree::new()),
        watchers: sync::RwLock::new(WatcherRegistry::default()),
        providers: sync::RwLock::new(ProviderRegistry::default()),
        notify: notify::start(socket_base.clone(), rpc_timeout),
        socket_base,
        rpc_timeout,
    });

    // A daemon that died without cleanup leaves its socket file behind;
    // it's ours to replace.
    let _ = std::fs::remove_file(socket_path.as_ref());

    let http_server = HttpServer::new(move || {
        App::new()
            // This makes the shared state available to handler methods
            // merely by having a Data parameter.
            .app_data(shared_data.clone())
            .route("/set", web::post().to(set))
            .route("/get", web::post().to(get))
            .route("/search", web::post().to(search))
            .route("/prune", web::post().to(prune))
            .route("/watch", web::post().to(watch))
            .route("/provide", web::post().to(provide))
    })
    .workers(threads)
    .bind_uds(socket_path.as_ref())
    .context(error::BindSocketSnafu {
        path: socket_path.as_ref(),
    })?;

    // Any process on the host may participate.
    let mode = 0o666;
    let perms = Permissions::from_mode(mode);
    set_permissions(socket_path.as_ref(), perms).context(error::SetPermissionsSnafu { mode })?;

    http_server.run().await.context(error::ServerStartSnafu)
}

// Handler methods called by the router

/// Store a value at a path; an empty value deletes.  Watchers of the path
/// are notified after we reply.
async fn set(request: web::Json<model::Set>, data: web::Data<SharedData>) -> Result<HttpResponse> {
    controller::set(&data, request.into_inner())?;
    Ok(HttpResponse::NoContent().finish()) // 204
}

/// Read the value at a path, delegating to a provider on a store miss.
async fn get(request: web::Json<model::Get>, data: web::Data<SharedData>) -> Result<GetResponse> {
    let result = controller::get(&data, request.into_inner()).await?;
    Ok(GetResponse(result))
}

/// List the direct children of a directory path.
async fn search(
    request: web::Json<model::Search>,
    data: web::Data<SharedData>,
) -> Result<SearchResponse> {
    let result = controller::search(&data, request.into_inner())?;
    Ok(SearchResponse(result))
}

/// Remove a path and everything below it.
async fn prune(
    request: web::Json<model::Prune>,
    data: web::Data<SharedData>,
) -> Result<HttpResponse> {
    controller::prune(&data, request.into_inner())?;
    Ok(HttpResponse::NoContent().finish()) // 204
}

/// Register (cb != 0) or unregister (cb == 0) a watcher for a pattern.
async fn watch(
    request: web::Json<model::Watch>,
    data: web::Data<SharedData>,
) -> Result<HttpResponse> {
    controller::watch(&data, request.into_inner())?;
    Ok(HttpResponse::NoContent().finish()) // 204
}

/// Register (cb != 0) or unregister (cb == 0) a provider for a path.
async fn provide(
    request: web::Json<model::Provide>,
    data: web::Data<SharedData>,
) -> Result<HttpResponse> {
    controller::provide(&data, request.into_inner())?;
    Ok(HttpResponse::NoContent().finish()) // 204
}

impl ResponseError for Error {
    /// Maps our error types to the HTTP response type that makes sense.
    fn status_code(&self) -> StatusCode {
        use Error::*;
        match self {
            // 400 Bad Request
            InvalidPath { .. } => StatusCode::BAD_REQUEST,

            // 500 Internal Server Error
            StoreLock => StatusCode::INTERNAL_SERVER_ERROR,
            RegistryLock => StatusCode::INTERNAL_SERVER_ERROR,
            ResponseSerialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            BindSocket { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SetPermissions { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ServerStart { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// SharedData is responsible for any data needed by handlers that isn't
/// provided by the client in the request.
pub(crate) struct SharedData {
    store: sync::RwLock<Tree>,
    watchers: sync::RwLock<WatcherRegistry>,
    providers: sync::RwLock<ProviderRegistry>,
    notify: notify::Queue,
    socket_base: String,
    rpc_timeout: Duration,
}

/// Helper macro for implementing the actix-web Responder trait for a type.
/// $for: the type for which we implement Responder.
/// $self: just pass "self"  (macro hygiene requires this)
/// $serialize_expr: the thing to serialize for a response; this is just "self" again if $for
///    implements Serialize, or is "self.0" for a newtype over something implementing Serialize
macro_rules! impl_responder_for {
    ($for:ident, $self:ident, $serialize_expr:expr) => (
        impl Responder for $for {
            type Body = BoxBody;
            fn respond_to($self, _req: &HttpRequest) -> HttpResponse {
                let body = match serde_json::to_string(&$serialize_expr) {
                    Ok(s) => s,
                    Err(e) => return Error::ResponseSerialization { source: e }.into(),
                };
                HttpResponse::Ok()
                    .content_type("application/json")
                    .body(body)
            }
        }
    )
}

/// This lets us respond from our handler methods with a GetResult (or
/// Result<GetResult>); an empty value means the path is absent.
struct GetResponse(model::GetResult);
impl_responder_for!(GetResponse, self, self.0);

/// This lets us respond from our handler methods with a SearchResult (or
/// Result<SearchResult>)
struct SearchResponse(model::SearchResult);
impl_responder_for!(SearchResponse, self, self.0);
