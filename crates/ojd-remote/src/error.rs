use ojd_tree::FetchError;
use reqwest::StatusCode;
use thiserror::Error;

use crate::client::Service;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("No {0} API Token set")]
    MissingToken(Service),
    #[error("Failed to create HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("{service} integration error for {url}: {source}")]
    Http {
        service: Service,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Server response: {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("Unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<RemoteError> for FetchError {
    fn from(error: RemoteError) -> Self {
        FetchError::remote(error)
    }
}
