use snafu::Snafu;

/// Possible errors from datastore operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Invalid path '{}': {}", path, msg))]
    InvalidPath { path: String, msg: String },
}

pub type Result<T> = std::result::Result<T, Error>;
