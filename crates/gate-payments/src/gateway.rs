//! Payment Gateway Integration
//!
//! Abstraction over the checkout/status-lookup API plus the Mercado Pago
//! HTTP implementation. The inbound webhook only carries a payment id; the
//! authoritative status always comes from [`PaymentGateway::get_payment`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gate_core::{CompletedForm, UserId};

use crate::error::{PaymentError, Result};

/// How many times the status lookup is attempted before giving up and
/// letting the event source redeliver.
const LOOKUP_ATTEMPTS: u32 = 3;

/// Base delay between lookup attempts; grows linearly per attempt.
const LOOKUP_BACKOFF: Duration = Duration::from_millis(500);

/// Gateway-reported payment status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Approved,
    Pending,
    Rejected,
    Other(String),
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "approved" => PaymentStatus::Approved,
            "pending" | "in_process" | "authorized" => PaymentStatus::Pending,
            "rejected" | "cancelled" | "refunded" | "charged_back" => PaymentStatus::Rejected,
            other => PaymentStatus::Other(other.to_string()),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, PaymentStatus::Approved)
    }
}

/// Metadata attached to a checkout and echoed back by the gateway.
///
/// This is the one place webhook-supplied data crosses into the core, so it
/// is validated as a whole here: a payment without a user id cannot be
/// applied and is ignored upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl PaymentMetadata {
    /// Build the metadata sent with a checkout for a completed intake form.
    pub fn for_form(user_id: UserId, form: &CompletedForm) -> Self {
        Self {
            user_id,
            name: Some(form.name.clone()),
            email: Some(form.email.clone()),
            phone: Some(form.phone.clone()),
        }
    }

    /// Validate raw gateway metadata. Fails when the user id is missing or
    /// not an integer.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let user_id = value
            .get("user_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| PaymentError::Malformed("metadata missing user_id".into()))?;

        let field = |key: &str| {
            value
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };

        Ok(Self {
            user_id: UserId(user_id),
            name: field("name"),
            email: field("email"),
            phone: field("phone"),
        })
    }

    fn to_value(&self) -> serde_json::Value {
        let mut map = BTreeMap::new();
        map.insert("user_id".to_string(), serde_json::json!(self.user_id.0));
        for (key, value) in [
            ("name", &self.name),
            ("email", &self.email),
            ("phone", &self.phone),
        ] {
            if let Some(v) = value {
                map.insert(key.to_string(), serde_json::json!(v));
            }
        }
        serde_json::json!(map)
    }
}

/// Redirect URLs for the hosted checkout page
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

/// Request to create a hosted checkout
#[derive(Clone, Debug)]
pub struct CheckoutRequest {
    /// Line-item title shown on the checkout page
    pub title: String,

    /// Price in minor units (cents)
    pub unit_price_cents: i64,

    /// ISO currency code
    pub currency: String,

    /// Redirects after the hosted flow
    pub back_urls: BackUrls,

    /// Where the gateway posts payment events
    pub notification_url: String,

    /// Echoed back on the payment object
    pub metadata: PaymentMetadata,
}

impl CheckoutRequest {
    /// The product this bot sells: one month of access.
    pub fn monthly_subscription(
        metadata: PaymentMetadata,
        back_urls: BackUrls,
        notification_url: impl Into<String>,
    ) -> Self {
        Self {
            title: "Assinatura Mensal".into(),
            unit_price_cents: 2990,
            currency: "BRL".into(),
            back_urls,
            notification_url: notification_url.into(),
            metadata,
        }
    }
}

/// Result of creating a checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutLink {
    /// Gateway preference/session id
    pub id: String,

    /// URL to send the user to
    pub url: String,
}

/// Authoritative payment state from the status lookup
#[derive(Clone, Debug)]
pub struct PaymentDetails {
    pub status: PaymentStatus,

    /// Raw metadata as returned by the gateway; validated by the processor
    /// at the trust boundary.
    pub metadata: serde_json::Value,
}

/// Payment gateway client trait (Strategy pattern)
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout and return the link for the user
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutLink>;

    /// Look up the authoritative status of a payment by gateway id
    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails>;
}

// ============================================================================
// Mercado Pago client
// ============================================================================

#[derive(Serialize)]
struct PreferenceItem {
    title: String,
    quantity: u32,
    unit_price: f64,
    currency_id: String,
}

#[derive(Serialize)]
struct PreferenceBody {
    items: Vec<PreferenceItem>,
    back_urls: BackUrls,
    notification_url: String,
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: Option<String>,
    sandbox_init_point: Option<String>,
}

#[derive(Deserialize)]
struct PaymentResponse {
    status: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// Mercado Pago HTTP client
pub struct MercadoPagoClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl MercadoPagoClient {
    /// Create a client with an access token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.mercadopago.com".into(),
            token: token.into(),
        }
    }

    /// Create from the `MERCADOPAGO_TOKEN` environment variable
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("MERCADOPAGO_TOKEN")
            .map_err(|_| PaymentError::Config("MERCADOPAGO_TOKEN not set".into()))?;
        Ok(Self::new(token))
    }

    /// Point the client at a different API host (tests, sandboxes)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentDetails> {
        let url = format!("{}/v1/payments/{}", self.base_url, payment_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PaymentError::Lookup(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Lookup(format!(
                "status lookup for {} returned {}",
                payment_id,
                response.status()
            )));
        }

        let payment: PaymentResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Lookup(e.to_string()))?;

        Ok(PaymentDetails {
            status: PaymentStatus::parse(&payment.status),
            metadata: payment.metadata,
        })
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutLink> {
        let body = PreferenceBody {
            items: vec![PreferenceItem {
                title: request.title,
                quantity: 1,
                unit_price: request.unit_price_cents as f64 / 100.0,
                currency_id: request.currency,
            }],
            back_urls: request.back_urls,
            notification_url: request.notification_url,
            metadata: request.metadata.to_value(),
        };

        let url = format!("{}/checkout/preferences", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Gateway(format!(
                "preference creation returned {}",
                response.status()
            )));
        }

        let preference: PreferenceResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        let checkout_url = preference
            .init_point
            .or(preference.sandbox_init_point)
            .ok_or_else(|| PaymentError::Gateway("no checkout URL returned".into()))?;

        Ok(CheckoutLink {
            id: preference.id,
            url: checkout_url,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails> {
        lookup_with_retry(payment_id, || self.fetch_payment(payment_id)).await
    }
}

/// Drive a status lookup through the bounded retry policy.
async fn lookup_with_retry<F, Fut>(payment_id: &str, mut fetch: F) -> Result<PaymentDetails>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<PaymentDetails>>,
{
    let mut last_err = None;

    for attempt in 1..=LOOKUP_ATTEMPTS {
        match fetch().await {
            Ok(details) => return Ok(details),
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment_id,
                    attempt,
                    error = %e,
                    "Payment lookup attempt failed"
                );
                last_err = Some(e);
                if attempt < LOOKUP_ATTEMPTS {
                    tokio::time::sleep(LOOKUP_BACKOFF * attempt).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| PaymentError::Lookup("no attempts made".into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(PaymentStatus::parse("approved"), PaymentStatus::Approved);
        assert_eq!(PaymentStatus::parse("pending"), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::parse("in_process"), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::parse("rejected"), PaymentStatus::Rejected);
        assert_eq!(
            PaymentStatus::parse("mystery"),
            PaymentStatus::Other("mystery".into())
        );
        assert!(PaymentStatus::Approved.is_approved());
        assert!(!PaymentStatus::Pending.is_approved());
    }

    #[test]
    fn test_metadata_requires_user_id() {
        let ok = serde_json::json!({
            "user_id": 42,
            "name": "Maria",
            "email": "maria@example.com",
        });
        let meta = PaymentMetadata::from_value(&ok).unwrap();
        assert_eq!(meta.user_id, UserId(42));
        assert_eq!(meta.name.as_deref(), Some("Maria"));
        assert_eq!(meta.phone, None);

        let missing = serde_json::json!({ "name": "Maria" });
        assert!(PaymentMetadata::from_value(&missing).is_err());

        let wrong_type = serde_json::json!({ "user_id": "42abc" });
        assert!(PaymentMetadata::from_value(&wrong_type).is_err());
    }

    #[test]
    fn test_metadata_round_trip() {
        let form = CompletedForm {
            name: "Maria".into(),
            email: "maria@example.com".into(),
            phone: "+5511987654321".into(),
        };
        let meta = PaymentMetadata::for_form(UserId(7), &form);
        let parsed = PaymentMetadata::from_value(&meta.to_value()).unwrap();
        assert_eq!(parsed, meta);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_gives_up_after_bounded_attempts() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let calls = AtomicU32::new(0);
        let err = lookup_with_retry("pay_1", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PaymentError::Lookup("gateway unreachable".into())) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PaymentError::Lookup(_)));
        assert_eq!(calls.load(Ordering::SeqCst), LOOKUP_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_recovers_on_a_later_attempt() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let calls = AtomicU32::new(0);
        let details = lookup_with_retry("pay_1", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(PaymentError::Lookup("gateway unreachable".into()))
                } else {
                    Ok(PaymentDetails {
                        status: PaymentStatus::Approved,
                        metadata: serde_json::json!({}),
                    })
                }
            }
        })
        .await
        .unwrap();

        assert!(details.status.is_approved());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_monthly_subscription_defaults() {
        let meta = PaymentMetadata {
            user_id: UserId(1),
            name: None,
            email: None,
            phone: None,
        };
        let urls = BackUrls {
            success: "https://example.com/ok".into(),
            failure: "https://example.com/fail".into(),
            pending: "https://example.com/pending".into(),
        };
        let req = CheckoutRequest::monthly_subscription(meta, urls, "https://example.com/hook");
        assert_eq!(req.unit_price_cents, 2990);
        assert_eq!(req.currency, "BRL");
    }
}
