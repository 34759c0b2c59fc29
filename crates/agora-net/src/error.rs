use std::collections::HashMap;

use thiserror::Error;

/// Errors produced by the network layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// The base URL could not be parsed or adapted.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP transport failure: connection refused, TLS, timeouts, or a
    /// body that failed to decode.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an unexpected status code.
    #[error("Unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// The session cookie is missing or no longer accepted.
    #[error("Not authenticated")]
    Unauthorized,

    /// The login endpoint rejected the credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Registration was rejected; maps field names to reasons.
    #[error("Registration rejected")]
    Validation(HashMap<String, String>),

    /// The server answered 2xx but the body was missing required data.
    #[error("Malformed response from {endpoint}: {detail}")]
    MalformedResponse { endpoint: String, detail: String },

    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;
