//! Error Types

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    /// A live session already exists for this user
    #[error("Session already active for user {0}")]
    Conflict(i64),

    /// No live session exists for this user
    #[error("No active session for user {0}")]
    NoActiveSession(i64),

    /// The session timed out before the form was completed
    #[error("Session expired for user {0}")]
    Expired(i64),

    /// The session was cancelled by the user
    #[error("Session cancelled for user {0}")]
    Cancelled(i64),

    /// Persistence failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Outbound message delivery failed
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Storage(_) | SessionError::Delivery(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            SessionError::Conflict(_) => {
                "You already have a signup in progress. Answer the last question or send /cancel to start over."
            }
            SessionError::NoActiveSession(_) => {
                "There is no signup in progress. Send /start to begin."
            }
            SessionError::Expired(_) => {
                "Your signup timed out. Send /start to begin again."
            }
            SessionError::Cancelled(_) => {
                "Your signup was cancelled. Send /start to begin again."
            }
            _ => "Something went wrong. Please try again in a moment.",
        }
    }
}
