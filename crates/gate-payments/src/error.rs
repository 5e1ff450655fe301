//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Payment-gateway API error (checkout creation and similar)
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Status lookup failed after the bounded retries; the event should be
    /// redelivered by the source
    #[error("Payment lookup failed: {0}")]
    Lookup(String),

    /// Inbound event or metadata failed schema validation
    #[error("Malformed payment data: {0}")]
    Malformed(String),

    /// Persistence error (ledger or accounts)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Membership provisioning failed in a way no fallback covers
    #[error("Provisioning failed fatally: {0}")]
    ProvisionFatal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Lookup(_) | PaymentError::Storage(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Gateway(_) => "Payment processing failed. Please try again.",
            PaymentError::ProvisionFatal(_) => {
                "Your payment was received. We're finalizing your access and will message you shortly."
            }
            _ => "An error occurred processing your request. Please try again.",
        }
    }
}
