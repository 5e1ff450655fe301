//! HTTP Handlers
//!
//! Two inbound surfaces: discrete `{chat_id, text}` message events from the
//! transport adapter, and payment notifications from the gateway. Replies
//! go out through the notification gateway, never in the HTTP response.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use gate_core::{NotificationGateway, SessionError, Turn, UserId};
use gate_payments::{
    AccountStore, CheckoutRequest, PaymentGateway, PaymentMetadata, PaymentNotification,
};

use crate::state::AppState;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// One inbound message event from the messaging transport
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub text: String,
}

#[derive(Serialize)]
pub struct AckResponse {
    pub status: &'static str,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Inbound message event from the transport adapter
pub async fn inbound_message(
    State(state): State<AppState>,
    Json(message): Json<InboundMessage>,
) -> Json<AckResponse> {
    let user = UserId(message.chat_id);
    let text = message.text.trim().to_string();

    handle_inbound(&state, user, &text).await;

    Json(AckResponse { status: "ok" })
}

/// Payment event webhook.
///
/// The body is taken as a raw string: a malformed payload is acknowledged
/// and dropped rather than bounced, because the gateway retries on error
/// responses and no retry will fix bad JSON. Only transient failures
/// (status lookup, storage) answer non-2xx to request redelivery.
pub async fn payment_webhook(State(state): State<AppState>, body: String) -> StatusCode {
    let notification: PaymentNotification = match serde_json::from_str(&body) {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable webhook payload; acknowledging");
            return StatusCode::OK;
        }
    };

    match state.processor.process_notification(&notification).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Webhook processed");
            StatusCode::OK
        }
        Err(e) if e.is_retryable() => {
            tracing::warn!(error = %e, "Webhook processing failed; requesting redelivery");
            StatusCode::BAD_GATEWAY
        }
        Err(e) => {
            tracing::error!(error = %e, "Webhook processing failed");
            StatusCode::OK
        }
    }
}

// ============================================================================
// Inbound routing
// ============================================================================

async fn handle_inbound(state: &AppState, user: UserId, text: &str) {
    if let Some(command) = parse_command(text) {
        handle_command(state, user, command).await;
        return;
    }

    match state.sessions.advance(user, text) {
        Ok(Turn::Prompt(prompt)) => {
            reply(state, user, prompt.text()).await;
        }
        Ok(Turn::CommandIgnored) => {
            tracing::debug!(user = %user, "Command ignored inside session");
        }
        Ok(Turn::Completed(form)) => {
            send_checkout_link(state, user, &form).await;
        }
        Err(e) => {
            reply(state, user, e.user_message()).await;
        }
    }
}

async fn handle_command(state: &AppState, user: UserId, command: &str) {
    match command {
        "/start" => {
            match state.accounts.get(user) {
                Ok(Some(account)) if account.is_active() => {
                    reply(state, user, "You're an active subscriber! Access is released.").await;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    // Treat as not subscribed; the signup flow still works.
                    tracing::warn!(user = %user, error = %e, "Account lookup failed");
                }
            }

            match state.sessions.begin(user) {
                Ok(prompt) => reply(state, user, prompt.text()).await,
                Err(e @ SessionError::Conflict(_)) => reply(state, user, e.user_message()).await,
                Err(e) => {
                    tracing::error!(user = %user, error = %e, "Failed to start session");
                    reply(state, user, e.user_message()).await;
                }
            }
        }
        "/cancel" => match state.sessions.cancel(user) {
            Ok(()) => reply(state, user, "Signup cancelled. Send /start whenever you're ready.").await,
            Err(e) => reply(state, user, e.user_message()).await,
        },
        other => {
            // Unknown commands are swallowed while a session is live so they
            // are never consumed as field input.
            if state.sessions.is_active(user) {
                tracing::debug!(user = %user, command = %other, "Ignoring command during session");
            } else {
                reply(state, user, "Unknown command. Send /start to sign up.").await;
            }
        }
    }
}

async fn send_checkout_link(state: &AppState, user: UserId, form: &gate_core::CompletedForm) {
    let request = CheckoutRequest::monthly_subscription(
        PaymentMetadata::for_form(user, form),
        state.checkout.back_urls.clone(),
        state.checkout.notification_url.clone(),
    );

    match state.payments.create_checkout(request).await {
        Ok(link) => {
            let text = format!(
                "Thanks, {}! Complete your subscription here:\n{}\n\nYour access will be released automatically after payment.",
                form.name, link.url
            );
            reply(state, user, &text).await;
        }
        Err(e) => {
            tracing::error!(user = %user, error = %e, "Checkout creation failed");
            reply(
                state,
                user,
                "We couldn't create your payment link. Send /start to try again.",
            )
            .await;
        }
    }
}

async fn reply(state: &AppState, user: UserId, text: &str) {
    if let Err(e) = state.notifier.send_message(user, text).await {
        tracing::warn!(user = %user, error = %e, "Reply delivery failed");
    }
}

/// Extract the command name from a message, if any.
///
/// `/start@SomeBot arg` parses as `/start`.
fn parse_command(text: &str) -> Option<&str> {
    if !text.starts_with('/') {
        return None;
    }
    let token = text.split_whitespace().next()?;
    Some(token.split('@').next().unwrap_or(token))
}
