//! Application State

use std::sync::Arc;

use gate_core::{NotificationGateway, SessionStore};
use gate_payments::{AccountStore, BackUrls, PaymentEventProcessor, PaymentGateway};

/// Checkout wiring shared by the inbound-message flow
#[derive(Clone)]
pub struct CheckoutConfig {
    pub back_urls: BackUrls,
    pub notification_url: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Live intake sessions, one per user
    pub sessions: Arc<SessionStore>,

    /// Subscription accounts
    pub accounts: Arc<dyn AccountStore>,

    /// Payment gateway (checkout creation)
    pub payments: Arc<dyn PaymentGateway>,

    /// Idempotent webhook processor
    pub processor: Arc<PaymentEventProcessor>,

    /// Outbound messaging
    pub notifier: Arc<dyn NotificationGateway>,

    /// Checkout URLs
    pub checkout: CheckoutConfig,
}
