use actix_web::{HttpResponseBuilder, ResponseError};
use snafu::Snafu;
use std::io;
use std::path::PathBuf;

// We want server (router/handler) and controller errors together so it's easy to define response
// error codes for all the high-level types of errors that could happen during a request.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    // Request errors
    #[snafu(display("{}", source))]
    InvalidPath { source: datastore::Error },

    // Server errors
    #[snafu(display("Another thread poisoned the store lock by panicking"))]
    StoreLock,

    #[snafu(display("Another thread poisoned a registry lock by panicking"))]
    RegistryLock,

    #[snafu(display("Unable to serialize response: {}", source))]
    ResponseSerialization { source: serde_json::Error },

    #[snafu(display("Unable to bind to {}: {}", path.display(), source))]
    BindSocket { path: PathBuf, source: io::Error },

    #[snafu(display(
        "Failed to set file permissions on the socket to {:o}: {}",
        mode,
        source
    ))]
    SetPermissions { source: io::Error, mode: u32 },

    #[snafu(display("Unable to start server: {}", source))]
    ServerStart { source: io::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for actix_web::HttpResponse {
    fn from(e: Error) -> Self {
        // Include the error message in the response.  The daemon is only
        // exposed locally over a Unix-domain socket, so we're not worried
        // about exposing error details.
        HttpResponseBuilder::new(e.status_code()).body(format!("{}", e))
    }
}
