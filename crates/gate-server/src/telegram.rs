//! Telegram Bot API Client
//!
//! Implements both outbound collaborator traits against the Bot API:
//! [`NotificationGateway`] via `sendMessage`, and [`GroupProvider`] via
//! `approveChatJoinRequest` with a `createChatInviteLink` fallback.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use gate_core::{NotificationGateway, SessionError, UserId};
use gate_payments::{GroupProvider, InviteLink, ProviderError};

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: serde::de::Deserialize<'de>"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Deserialize)]
struct ChatInviteLink {
    invite_link: String,
}

/// Bot API client for one bot and one gated group
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    group_chat_id: i64,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, group_chat_id: i64) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.telegram.org".into(),
            token: token.into(),
            group_chat_id,
        }
    }

    /// Point the client at a different API host (tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Recoverable(e.to_string()))?;

        let status = response.status();
        let api: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ProviderError::Recoverable(e.to_string()))?;

        if !api.ok {
            let description = api
                .description
                .unwrap_or_else(|| format!("{method} returned {status}"));
            // 401/403 mean the bot itself is misconfigured (bad token, not
            // an admin of the group); nothing per-user will fix that.
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ProviderError::Fatal(description));
            }
            return Err(ProviderError::Recoverable(description));
        }

        api.result
            .ok_or_else(|| ProviderError::Recoverable(format!("{method} returned no result")))
    }
}

#[async_trait]
impl NotificationGateway for TelegramClient {
    async fn send_message(&self, user_id: UserId, text: &str) -> gate_core::Result<()> {
        let body = json!({ "chat_id": user_id.0, "text": text });
        self.call::<serde_json::Value>("sendMessage", body)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl GroupProvider for TelegramClient {
    async fn add_member(&self, user_id: UserId) -> Result<(), ProviderError> {
        let body = json!({
            "chat_id": self.group_chat_id,
            "user_id": user_id.0,
        });
        // Succeeds only when the user has a pending join request; Telegram
        // rejects the direct path for everyone else and we fall back to an
        // invite link.
        self.call::<bool>("approveChatJoinRequest", body)
            .await
            .map(|_| ())
    }

    async fn create_invite_link(
        &self,
        member_limit: u32,
        expires_in: Duration,
    ) -> Result<InviteLink, ProviderError> {
        let expire_date = Utc::now().timestamp() + expires_in.as_secs() as i64;
        let body = json!({
            "chat_id": self.group_chat_id,
            "member_limit": member_limit,
            "expire_date": expire_date,
        });
        let link: ChatInviteLink = self.call("createChatInviteLink", body).await?;
        Ok(InviteLink {
            url: link.invite_link,
        })
    }
}
