// Typed errors with thiserror. Surface meaningful messages to JS.
// See DESIGN.md: Error handling

use thiserror::Error;

use crate::types::RequestToken;

/// Viewer error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f64),

    #[error("Failed to load media '{asset}': {reason}")]
    MediaLoad { asset: String, reason: String },

    #[error("Stale completion for request {token} (current is {current})")]
    StaleRequest {
        token: RequestToken,
        current: RequestToken,
    },

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Browser API error: {0}")]
    Js(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ViewerError {
    /// Stale completions are expected after a switch and are dropped quietly.
    pub fn is_stale(&self) -> bool {
        matches!(self, ViewerError::StaleRequest { .. })
    }
}

impl From<serde_json::Error> for ViewerError {
    fn from(err: serde_json::Error) -> Self {
        ViewerError::Serialization(err.to_string())
    }
}

impl From<ViewerError> for wasm_bindgen::JsValue {
    fn from(err: ViewerError) -> Self {
        wasm_bindgen::JsValue::from_str(&err.to_string())
    }
}
