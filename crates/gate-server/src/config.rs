//! Server Configuration
//!
//! Everything comes from the environment. Required variables abort startup;
//! the process must not serve traffic half-configured.

use std::time::Duration;

use anyhow::{Context, Result};

use gate_payments::BackUrls;

/// Runtime configuration for the gate server
#[derive(Clone, Debug)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: String,

    /// Mercado Pago access token
    pub mercadopago_token: String,

    /// Chat id of the private group being gated
    pub group_chat_id: i64,

    /// Optional chat that receives operator alerts
    pub operator_chat_id: Option<i64>,

    /// Listen address
    pub bind_addr: String,

    /// Externally reachable base URL (webhook target)
    pub public_base_url: String,

    /// Intake session timeout
    pub session_timeout: Duration,

    /// Checkout redirect URLs
    pub back_urls: BackUrls,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let telegram_token =
            std::env::var("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN not set")?;
        let mercadopago_token =
            std::env::var("MERCADOPAGO_TOKEN").context("MERCADOPAGO_TOKEN not set")?;
        let group_chat_id = std::env::var("GROUP_CHAT_ID")
            .context("GROUP_CHAT_ID not set")?
            .parse::<i64>()
            .context("GROUP_CHAT_ID is not a valid chat id")?;

        let operator_chat_id = match std::env::var("OPERATOR_CHAT_ID") {
            Ok(raw) => Some(
                raw.parse::<i64>()
                    .context("OPERATOR_CHAT_ID is not a valid chat id")?,
            ),
            Err(_) => None,
        };

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into());

        let session_timeout = std::env::var("SESSION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(Duration::from_secs(600), Duration::from_secs);

        let url_or = |var: &str, path: &str| {
            std::env::var(var).unwrap_or_else(|_| format!("{public_base_url}{path}"))
        };
        let back_urls = BackUrls {
            success: url_or("CHECKOUT_SUCCESS_URL", "/checkout/success"),
            failure: url_or("CHECKOUT_FAILURE_URL", "/checkout/failure"),
            pending: url_or("CHECKOUT_PENDING_URL", "/checkout/pending"),
        };

        Ok(Self {
            telegram_token,
            mercadopago_token,
            group_chat_id,
            operator_chat_id,
            bind_addr,
            public_base_url,
            session_timeout,
            back_urls,
        })
    }

    /// Where the payment gateway should post events
    pub fn notification_url(&self) -> String {
        format!("{}/webhook/payments", self.public_base_url)
    }
}
