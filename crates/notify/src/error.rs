//! Error types for the notification system.

use thiserror::Error;

/// Errors that can occur when sending notifications.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel is not configured
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// The service answered with a non-success status
    #[error("{channel} returned {status}: {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },
}
