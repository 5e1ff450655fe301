//! Payment Event Processing
//!
//! Idempotent reconciliation of inbound payment notifications. The webhook
//! id is only a hint: the authoritative status comes from a gateway lookup,
//! and the dedup ledger guarantees at most one activation per payment id no
//! matter how many times the event is delivered.

use std::sync::Arc;

use serde::Deserialize;

use gate_core::{NotificationGateway, UserId};

use crate::account::{AccountStore, ContactInfo, LedgerEntry, PaymentLedger};
use crate::error::Result;
use crate::gateway::{PaymentGateway, PaymentMetadata};
use crate::provision::{MembershipProvisioner, ProvisionOutcome};

/// Inbound payment event as posted by the gateway.
///
/// Anything that isn't `{"type": "payment", "data": {"id": ...}}` is
/// acknowledged and ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct PaymentNotification {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<NotificationData>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NotificationData {
    #[serde(default)]
    pub id: Option<NotificationId>,
}

/// The gateway sends the id as a string or a number depending on the event
/// source.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum NotificationId {
    Text(String),
    Number(i64),
}

impl NotificationId {
    fn to_payment_id(&self) -> String {
        match self {
            NotificationId::Text(s) => s.clone(),
            NotificationId::Number(n) => n.to_string(),
        }
    }
}

impl PaymentNotification {
    /// Extract the payment id if this is a well-formed payment event
    pub fn payment_id(&self) -> Option<String> {
        if self.kind.as_deref() != Some("payment") {
            return None;
        }
        self.data
            .as_ref()
            .and_then(|d| d.id.as_ref())
            .map(NotificationId::to_payment_id)
    }
}

/// Result of processing one payment event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The account was activated and provisioning ran
    Activated { user_id: UserId },

    /// This payment id was applied before; nothing happened
    AlreadyProcessed,

    /// Not a payment event, not approved, or unusable metadata
    Ignored,
}

/// Idempotent handler for payment-status notifications
pub struct PaymentEventProcessor {
    gateway: Arc<dyn PaymentGateway>,
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn PaymentLedger>,
    provisioner: MembershipProvisioner,
    notifier: Arc<dyn NotificationGateway>,
    operator_chat: Option<UserId>,
}

impl PaymentEventProcessor {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        accounts: Arc<dyn AccountStore>,
        ledger: Arc<dyn PaymentLedger>,
        provisioner: MembershipProvisioner,
        notifier: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            gateway,
            accounts,
            ledger,
            provisioner,
            notifier,
            operator_chat: None,
        }
    }

    /// Route fatal provisioning failures to this chat
    pub fn with_operator_chat(mut self, operator_chat: UserId) -> Self {
        self.operator_chat = Some(operator_chat);
        self
    }

    /// Handle a raw inbound notification
    pub async fn process_notification(&self, notification: &PaymentNotification) -> Result<Outcome> {
        match notification.payment_id() {
            Some(payment_id) => self.process(&payment_id).await,
            None => {
                tracing::debug!(kind = ?notification.kind, "Ignoring non-payment event");
                Ok(Outcome::Ignored)
            }
        }
    }

    /// Apply the side effects for one payment id, exactly once.
    ///
    /// Lookup failures propagate so the transport can answer non-2xx and
    /// get the event redelivered; everything after the ledger insert is
    /// logged but never rolled back.
    pub async fn process(&self, payment_id: &str) -> Result<Outcome> {
        if self.ledger.contains(payment_id)? {
            tracing::debug!(payment_id = %payment_id, "Duplicate payment event");
            return Ok(Outcome::AlreadyProcessed);
        }

        // The webhook body is untrusted; confirm with the gateway.
        let details = self.gateway.get_payment(payment_id).await?;

        if !details.status.is_approved() {
            tracing::info!(
                payment_id = %payment_id,
                status = ?details.status,
                "Payment not approved; ignoring"
            );
            return Ok(Outcome::Ignored);
        }

        let metadata = match PaymentMetadata::from_value(&details.metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(payment_id = %payment_id, error = %e, "Unusable payment metadata");
                return Ok(Outcome::Ignored);
            }
        };
        let user_id = metadata.user_id;

        // The ledger insert closes the race between near-simultaneous
        // deliveries of the same id: exactly one caller wins.
        let entry = LedgerEntry::approved(payment_id, user_id);
        if !self.ledger.insert_if_absent(entry)? {
            tracing::debug!(payment_id = %payment_id, "Lost dedup race; already applied");
            return Ok(Outcome::AlreadyProcessed);
        }

        let account = self
            .accounts
            .activate(user_id, payment_id, ContactInfo::from(&metadata))?;
        tracing::info!(
            payment_id = %payment_id,
            user = %user_id,
            created_at = %account.created_at,
            "Account activated"
        );

        self.grant_access(user_id).await;

        Ok(Outcome::Activated { user_id })
    }

    /// Provision group access and notify the user. Failures here are a
    /// reconciliation concern, not a reason to reprocess the payment.
    async fn grant_access(&self, user_id: UserId) {
        let text = match self.provisioner.provision(user_id).await {
            Ok(ProvisionOutcome::Joined) => {
                "Payment approved! You've been added to the group. Welcome!".to_string()
            }
            Ok(ProvisionOutcome::Invited(link)) => format!(
                "Payment approved! Join the group through your personal link (valid once): {}",
                link.url
            ),
            Err(e) => {
                tracing::error!(user = %user_id, error = %e, "Fatal provisioning failure");
                self.alert_operator(&format!(
                    "Provisioning failed for user {user_id}: {e}. Manual grant required."
                ))
                .await;
                "Payment approved! We're finalizing your access and will message you shortly."
                    .to_string()
            }
        };

        if let Err(e) = self.notifier.send_message(user_id, &text).await {
            tracing::warn!(user = %user_id, error = %e, "Approval notification failed");
        }
    }

    async fn alert_operator(&self, text: &str) {
        let Some(operator) = self.operator_chat else {
            return;
        };
        if let Err(e) = self.notifier.send_message(operator, text).await {
            tracing::warn!(error = %e, "Operator alert failed");
        }
    }
}
