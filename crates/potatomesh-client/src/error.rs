use potatomesh_core::MeshError;
use reqwest::StatusCode;
use thiserror::Error;

use crate::source::Feed;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{feed} feed failed: {source}")]
    Feed {
        feed: Feed,
        #[source]
        source: Box<ClientError>,
    },

    #[error(transparent)]
    Mesh(#[from] MeshError),
}

impl ClientError {
    pub fn feed(feed: Feed, source: ClientError) -> Self {
        ClientError::Feed {
            feed,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
