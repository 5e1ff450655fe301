//! # gate-payments
//!
//! Payment reconciliation and membership provisioning for member-gate.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────────┐    ┌──────────────────┐
//! │   webhook    │───▶│ PaymentEventProcessor │───▶│ MembershipProv.  │
//! │ {type, id}   │    │  ledger ⇒ lookup ⇒    │    │  add_member or   │
//! └──────────────┘    │  activate exactly once│    │  invite fallback │
//!                     └──────────────────────┘    └──────────────────┘
//! ```
//!
//! The gateway may deliver the same event many times; the dedup ledger is
//! the single serialization point that turns at-least-once delivery into
//! exactly-once side effects. The inbound id is treated as a hint and
//! confirmed with a status lookup before anything is applied.

mod account;
mod error;
mod gateway;
mod processor;
mod provision;

pub use account::{
    AccountStatus, AccountStore, ContactInfo, LedgerEntry, MemoryAccountStore,
    MemoryPaymentLedger, PaymentLedger, UserAccount,
};
pub use error::{PaymentError, Result};
pub use gateway::{
    BackUrls, CheckoutLink, CheckoutRequest, MercadoPagoClient, PaymentDetails, PaymentGateway,
    PaymentMetadata, PaymentStatus,
};
pub use processor::{Outcome, PaymentEventProcessor, PaymentNotification};
pub use provision::{
    GroupProvider, InviteLink, MembershipProvisioner, ProviderError, ProvisionOutcome,
};
