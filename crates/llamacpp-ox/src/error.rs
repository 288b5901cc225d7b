use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to a llama.cpp server
#[derive(Debug, Error)]
pub enum LlamaCppError {
    /// Connection, timeout or body-read failure in the HTTP client
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("llama.cpp server error {status}: {body}")]
    Server { status: u16, body: String },

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Caller supplied options that cannot form a request
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The image input could not be turned into an upload
    #[error("Image encoding failed: {0}")]
    Image(String),
}

/// Parse an error response from the llama.cpp server.
///
/// A JSON body is kept as compact JSON; anything else is passed through as text.
pub(crate) fn parse_error_response(status: reqwest::StatusCode, bytes: &bytes::Bytes) -> LlamaCppError {
    let body = match serde_json::from_slice::<Value>(bytes) {
        Ok(json) => json.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    };

    LlamaCppError::Server {
        status: status.as_u16(),
        body,
    }
}
