//! # gate-core
//!
//! Conversational intake sessions for member-gate.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     SessionStore                          │
//! │  ┌──────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │ one Session  │  │  per-session│  │   FormStore     │  │
//! │  │  per user    │──│  timer task │──│   (on complete) │  │
//! │  └──────────────┘  └─────────────┘  └─────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`Session`] is a small state machine that asks for name, email, and
//! phone in order, validating each answer. The [`SessionStore`] owns every
//! live session, enforces one per user, and arms a cancellable timer per
//! session; timeouts are reported on an expiry channel so the caller can
//! tell the user to restart.

pub mod error;
pub mod form;
pub mod gateway;
pub mod session;
pub mod store;

pub use error::{Result, SessionError};
pub use form::{CompletedForm, ContactForm};
pub use gateway::NotificationGateway;
pub use session::{Prompt, Session, SessionId, Stage, Turn, UserId};
pub use store::{ExpiredSession, ExpiryReceiver, FormRecord, FormStore, MemoryFormStore, SessionStore};
