//! Notification Gateway
//!
//! Abstraction over the outbound half of the messaging channel. Implement
//! this per platform: Telegram, WhatsApp, a test recorder, etc.

use async_trait::async_trait;

use crate::error::Result;
use crate::session::UserId;

/// Outbound message delivery (Strategy pattern)
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Deliver a plain-text message to the user
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<()>;
}

/// Recording gateway for tests: keeps every message in memory.
#[derive(Default)]
pub struct RecordingGateway {
    sent: std::sync::Mutex<Vec<(UserId, String)>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user_id: UserId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((user_id, text.to_string()));
        Ok(())
    }
}
