//! member-gate server
//!
//! Axum-based server wiring the intake sessions, the Mercado Pago payment
//! flow, and the Telegram delivery/provisioning client together.

mod config;
mod handlers;
mod state;
mod telegram;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gate_core::{ExpiryReceiver, MemoryFormStore, NotificationGateway, SessionStore, UserId};
use gate_payments::{
    MembershipProvisioner, MemoryAccountStore, MemoryPaymentLedger, MercadoPagoClient,
    PaymentEventProcessor, PaymentGateway,
};

use crate::config::Config;
use crate::handlers::{health_check, inbound_message, payment_webhook};
use crate::state::{AppState, CheckoutConfig};
use crate::telegram::TelegramClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Collaborators
    let telegram = Arc::new(TelegramClient::new(
        config.telegram_token.clone(),
        config.group_chat_id,
    ));
    let notifier: Arc<dyn NotificationGateway> = telegram.clone();
    let payments: Arc<dyn PaymentGateway> =
        Arc::new(MercadoPagoClient::new(config.mercadopago_token.clone()));

    // Stores
    let accounts = Arc::new(MemoryAccountStore::new());
    let ledger = Arc::new(MemoryPaymentLedger::new());
    let forms = Arc::new(MemoryFormStore::new());

    // Sessions
    let (sessions, expiry_rx) = SessionStore::new(config.session_timeout, forms);
    let sessions = Arc::new(sessions);
    tokio::spawn(drain_expirations(expiry_rx, notifier.clone()));

    // Payment processing
    let provisioner = MembershipProvisioner::new(telegram.clone());
    let mut processor = PaymentEventProcessor::new(
        payments.clone(),
        accounts.clone(),
        ledger,
        provisioner,
        notifier.clone(),
    );
    if let Some(operator) = config.operator_chat_id {
        processor = processor.with_operator_chat(UserId(operator));
        tracing::info!(chat = operator, "Operator alerts enabled");
    }

    let state = AppState {
        sessions,
        accounts,
        payments,
        processor: Arc::new(processor),
        notifier,
        checkout: CheckoutConfig {
            back_urls: config.back_urls.clone(),
            notification_url: config.notification_url(),
        },
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/inbound", post(inbound_message))
        .route("/webhook/payments", post(payment_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "member-gate server running");
    tracing::info!("  GET  /health           - Health check");
    tracing::info!("  POST /inbound          - Inbound message events");
    tracing::info!("  POST /webhook/payments - Payment notifications");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Tell users whose sessions timed out to start over.
async fn drain_expirations(mut expiry_rx: ExpiryReceiver, notifier: Arc<dyn NotificationGateway>) {
    while let Some(expired) = expiry_rx.recv().await {
        let text = "Your signup timed out. Send /start to begin again.";
        if let Err(e) = notifier.send_message(expired.user_id, text).await {
            tracing::warn!(user = %expired.user_id, error = %e, "Expiry notice failed");
        }
    }
}
