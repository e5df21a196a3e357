#![deny(rust_2018_idioms)]

//! The rpc library carries one request/response pair over a Unix-domain
//! socket: serialize the request to JSON, POST it to a route on the given
//! socket, and read the JSON reply, all under a single timeout.
//!
//! Both directions of Apteryx traffic use it: clients talking to the
//! daemon's well-known socket, and the daemon calling back into a client's
//! per-process callback socket.  Failures are surfaced to the caller and
//! logged; there is no retry at this layer.

// Think "reqwest" but for Unix-domain sockets.  Would be nice to use the simpler reqwest instead
// of hyper, but it lacks Unix-domain socket support:
// https://github.com/seanmonstar/reqwest/issues/39

use hyper::{body, header, Body, Client, Request};
use hyper_unix_connector::{UnixClient, Uri};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::{ensure, OptionExt, ResultExt};
use std::path::Path;
use std::time::Duration;

mod error {
    use snafu::Snafu;
    use std::time::Duration;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Failed to serialize request for {}: {}", route, source))]
        RequestSerialize {
            route: String,
            source: serde_json::Error,
        },

        #[snafu(display("Failed to build request: {}", source))]
        RequestSetup { source: http::Error },

        #[snafu(display("Failed to send request to {}: {}", route, source))]
        RequestSend {
            route: String,
            source: hyper::Error,
        },

        #[snafu(display("No response from {} within {:?}", route, timeout))]
        NoResponse { route: String, timeout: Duration },

        #[snafu(display("Status {} from {}: {}", code.as_str(), route, body))]
        ResponseStatus {
            code: http::StatusCode,
            route: String,
            body: String,
        },

        #[snafu(display("Failed to read body of response: {}", source))]
        ResponseBodyRead { source: hyper::Error },

        #[snafu(display("Failed to parse response from {}: {}", route, source))]
        ResponseParse {
            route: String,
            source: serde_json::Error,
        },

        #[snafu(display("Empty response from {}", route))]
        ResponseEmpty { route: String },
    }
}
pub use error::Error;
pub type Result<T> = std::result::Result<T, error::Error>;

/// Sends a request and returns its deserialized JSON response.
///
/// The socket is specified as a path, for example "/run/apteryx.sock", and
/// the route as a string, for example "/get".  The whole exchange runs
/// under the given timeout; an elapsed timeout surfaces as `NoResponse`.
pub async fn call<P, S, Req, Resp>(
    socket_path: P,
    route: S,
    request: &Req,
    timeout: Duration,
) -> Result<Resp>
where
    P: AsRef<Path>,
    S: AsRef<str>,
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let route = route.as_ref();
    let response = raw_request(socket_path, route, request, timeout).await?;
    ensure!(!response.is_empty(), error::ResponseEmptySnafu { route });
    serde_json::from_str(&response).context(error::ResponseParseSnafu { route })
}

/// Sends a request whose response carries no data; any 2xx reply counts as
/// success.
pub async fn send<P, S, Req>(
    socket_path: P,
    route: S,
    request: &Req,
    timeout: Duration,
) -> Result<()>
where
    P: AsRef<Path>,
    S: AsRef<str>,
    Req: Serialize,
{
    let route = route.as_ref();
    raw_request(socket_path, route, request, timeout).await?;
    Ok(())
}

/// Makes the HTTP request to the Unix-domain socket and returns the
/// response body on success.
async fn raw_request<P, Req>(
    socket_path: P,
    route: &str,
    request: &Req,
    timeout: Duration,
) -> Result<String>
where
    P: AsRef<Path>,
    Req: Serialize,
{
    // We talk over a local Unix-domain socket to the server.
    let client = Client::builder().build::<_, Body>(UnixClient);
    let uri: hyper::Uri = Uri::new(socket_path, route).into();

    let data = serde_json::to_string(request).context(error::RequestSerializeSnafu { route })?;
    let request = Request::builder()
        .method("POST")
        .uri(&uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(data))
        .context(error::RequestSetupSnafu)?;

    let exchange = async {
        let res = client
            .request(request)
            .await
            .context(error::RequestSendSnafu { route })?;
        let status = res.status();

        let body_bytes = body::to_bytes(res.into_body())
            .await
            .context(error::ResponseBodyReadSnafu)?;
        let body = String::from_utf8_lossy(&body_bytes).to_string();

        // Error if the response status is not in the 2xx range.
        ensure!(
            status.is_success(),
            error::ResponseStatusSnafu {
                code: status,
                route,
                body,
            }
        );

        debug!("{} responded {}", route, status);
        Ok(body)
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .ok()
        .context(error::NoResponseSnafu { route, timeout })?
}
