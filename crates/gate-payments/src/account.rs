//! Accounts and the Dedup Ledger
//!
//! `UserAccount` is the persisted subscription state; the ledger records
//! every payment id that has been applied and is the single serialization
//! point across duplicate webhook deliveries.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gate_core::UserId;

use crate::error::{PaymentError, Result};
use crate::gateway::PaymentMetadata;

/// Subscription status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

/// Contact details merged from payment metadata
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<&PaymentMetadata> for ContactInfo {
    fn from(meta: &PaymentMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            email: meta.email.clone(),
            phone: meta.phone.clone(),
        }
    }
}

/// A user's subscription record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    pub status: AccountStatus,

    /// The gateway payment id that activated this account
    pub subscription_ref: Option<String>,

    pub contact: ContactInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Account storage trait
pub trait AccountStore: Send + Sync {
    /// Get an account by user id
    fn get(&self, user_id: UserId) -> Result<Option<UserAccount>>;

    /// Activate an account, creating it if needed.
    ///
    /// `created_at` is preserved for existing accounts; `updated_at` is
    /// always bumped. Contact fields present in `contact` overwrite stored
    /// ones; absent fields are left alone.
    fn activate(
        &self,
        user_id: UserId,
        subscription_ref: &str,
        contact: ContactInfo,
    ) -> Result<UserAccount>;
}

/// One applied payment event
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub payment_id: String,
    pub user_id: UserId,
    pub status: String,
    pub applied_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn approved(payment_id: impl Into<String>, user_id: UserId) -> Self {
        Self {
            payment_id: payment_id.into(),
            user_id,
            status: "approved".into(),
            applied_at: Utc::now(),
        }
    }
}

/// Dedup ledger trait
pub trait PaymentLedger: Send + Sync {
    /// Whether a payment id has already been applied
    fn contains(&self, payment_id: &str) -> Result<bool>;

    /// Insert the entry unless the payment id is already present.
    ///
    /// Returns `true` when this call inserted the entry, `false` for a
    /// duplicate. The check and insert are atomic.
    fn insert_if_absent(&self, entry: LedgerEntry) -> Result<bool>;
}

/// In-memory account store (for development/testing)
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<UserId, UserAccount>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryAccountStore {
    fn get(&self, user_id: UserId) -> Result<Option<UserAccount>> {
        let accounts = self
            .accounts
            .read()
            .map_err(|e| PaymentError::Storage(e.to_string()))?;
        Ok(accounts.get(&user_id).cloned())
    }

    fn activate(
        &self,
        user_id: UserId,
        subscription_ref: &str,
        contact: ContactInfo,
    ) -> Result<UserAccount> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|e| PaymentError::Storage(e.to_string()))?;
        let now = Utc::now();

        let account = accounts
            .entry(user_id)
            .and_modify(|account| {
                account.status = AccountStatus::Active;
                account.subscription_ref = Some(subscription_ref.to_string());
                if contact.name.is_some() {
                    account.contact.name = contact.name.clone();
                }
                if contact.email.is_some() {
                    account.contact.email = contact.email.clone();
                }
                if contact.phone.is_some() {
                    account.contact.phone = contact.phone.clone();
                }
                account.updated_at = now;
            })
            .or_insert_with(|| UserAccount {
                user_id,
                status: AccountStatus::Active,
                subscription_ref: Some(subscription_ref.to_string()),
                contact,
                created_at: now,
                updated_at: now,
            });

        Ok(account.clone())
    }
}

/// In-memory dedup ledger (for development/testing)
#[derive(Default)]
pub struct MemoryPaymentLedger {
    entries: RwLock<HashMap<String, LedgerEntry>>,
}

impl MemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PaymentLedger for MemoryPaymentLedger {
    fn contains(&self, payment_id: &str) -> Result<bool> {
        let entries = self
            .entries
            .read()
            .map_err(|e| PaymentError::Storage(e.to_string()))?;
        Ok(entries.contains_key(payment_id))
    }

    fn insert_if_absent(&self, entry: LedgerEntry) -> Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| PaymentError::Storage(e.to_string()))?;

        if entries.contains_key(&entry.payment_id) {
            return Ok(false);
        }
        entries.insert(entry.payment_id.clone(), entry);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activate_creates_then_preserves_created_at() {
        let store = MemoryAccountStore::new();
        let user = UserId(1);

        let first = store
            .activate(user, "pay_1", ContactInfo::default())
            .unwrap();
        assert!(first.is_active());
        assert_eq!(first.subscription_ref.as_deref(), Some("pay_1"));

        let second = store
            .activate(
                user,
                "pay_2",
                ContactInfo {
                    name: Some("Maria".into()),
                    ..ContactInfo::default()
                },
            )
            .unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.subscription_ref.as_deref(), Some("pay_2"));
        assert_eq!(second.contact.name.as_deref(), Some("Maria"));
    }

    #[test]
    fn test_activate_merges_without_clearing_contact() {
        let store = MemoryAccountStore::new();
        let user = UserId(2);

        store
            .activate(
                user,
                "pay_1",
                ContactInfo {
                    email: Some("maria@example.com".into()),
                    ..ContactInfo::default()
                },
            )
            .unwrap();
        let account = store
            .activate(user, "pay_1", ContactInfo::default())
            .unwrap();
        assert_eq!(account.contact.email.as_deref(), Some("maria@example.com"));
    }

    #[test]
    fn test_ledger_insert_if_absent() {
        let ledger = MemoryPaymentLedger::new();
        let entry = LedgerEntry::approved("pay_1", UserId(1));

        assert!(ledger.insert_if_absent(entry.clone()).unwrap());
        assert!(!ledger.insert_if_absent(entry).unwrap());
        assert!(ledger.contains("pay_1").unwrap());
        assert!(!ledger.contains("pay_2").unwrap());
        assert_eq!(ledger.len(), 1);
    }
}
