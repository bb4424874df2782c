//! Error types for the VK audio client.

use thiserror::Error;

/// Errors that can occur when scraping VK audio endpoints.
#[derive(Debug, Error)]
pub enum VkAudioError {
    /// HTTP transport error (connection refused, timeout, TLS failure, etc.).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The owner's audio or playlists are hidden from the current session.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// No user is configured. Call `login` first.
    #[error("not logged in")]
    NotLoggedIn,

    /// The catalog answered with an error string instead of a payload.
    ///
    /// Cookies have already been reloaded when this is returned; repeating
    /// the request once usually succeeds.
    #[error("stale session, request should be retried: {0}")]
    RetryRequest(String),

    /// An obfuscated audio URL could not be decoded.
    #[error("cannot decode audio url: {0}")]
    Decode(String),

    /// A response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Parse(String),

    /// Failed to parse a JSON body or embedded JSON fragment.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error (session read/write, upload read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for other errors (e.g. missing config directory).
    #[error("{0}")]
    Other(String),
}

impl VkAudioError {
    pub(crate) fn access_denied(what: &str, owner_id: i64) -> Self {
        Self::AccessDenied(format!("you don't have permissions to browse {owner_id}'s {what}"))
    }
}

/// Convenience alias for `Result<T, VkAudioError>`.
pub type Result<T> = std::result::Result<T, VkAudioError>;
