//! Error types for notification delivery.

use feedwatch_core::WatchError;
use thiserror::Error;

/// Notification delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Transport credentials are missing
    #[error("Notifier not configured: {0}")]
    NotConfigured(String),

    /// The endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Request timed out
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Could not reach the endpoint
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Any other HTTP client failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The message was rejected before sending
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl NotifyError {
    /// Classify a non-success HTTP status.
    ///
    /// The body is shortened so error logs stay one line.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let body = match body.char_indices().nth(MAX_BODY_CHARS) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        NotifyError::Status { status, body }
    }

    /// Classify a client error. The request URL is stripped because it
    /// carries the bot token.
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            NotifyError::Timeout(timeout_secs)
        } else if err.is_connect() {
            NotifyError::ConnectionFailed(err.without_url().to_string())
        } else {
            NotifyError::Http(err.without_url())
        }
    }

    /// Check if this error is a network-related error.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            NotifyError::Timeout(_) | NotifyError::ConnectionFailed(_) | NotifyError::Http(_)
        )
    }

    /// Check if the remote side rejected the credentials.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, NotifyError::Status { status: 401 | 403 | 404, .. })
    }

    /// Get suggested action for this error.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            NotifyError::NotConfigured(_) => {
                "Set botToken and chatId with `feedwatch config set`."
            }
            NotifyError::Status { status: 400, .. } => "Check the chat id.",
            e if e.is_auth_error() => "Check the bot token.",
            NotifyError::Timeout(_) | NotifyError::ConnectionFailed(_) => {
                "Check your network connection."
            }
            _ => "Check the logs for details.",
        }
    }
}

const MAX_BODY_CHARS: usize = 200;

impl From<NotifyError> for WatchError {
    fn from(err: NotifyError) -> Self {
        WatchError::notify("notifier", err.to_string())
    }
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
