//! Membership Provisioning
//!
//! Grants group access after an approved payment. Direct add is attempted
//! once; a recoverable rejection (privacy settings, user never opened the
//! chat) falls back to a single-use, time-bounded invite link. Auth and
//! configuration failures are fatal and belong to the operator, not the
//! user.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use gate_core::UserId;

use crate::error::{PaymentError, Result};

/// Group/membership provider failure
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider rejected this particular grant; a fallback may work
    #[error("Provider rejected grant: {0}")]
    Recoverable(String),

    /// Auth/configuration failure; no fallback applies
    #[error("Provider failure: {0}")]
    Fatal(String),
}

/// A single-use invitation artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InviteLink {
    pub url: String,
}

/// Group/membership provider trait (Strategy pattern)
#[async_trait]
pub trait GroupProvider: Send + Sync {
    /// Add the user to the group directly
    async fn add_member(&self, user_id: UserId) -> std::result::Result<(), ProviderError>;

    /// Create an invite link limited to `member_limit` uses, expiring after
    /// `expires_in`
    async fn create_invite_link(
        &self,
        member_limit: u32,
        expires_in: Duration,
    ) -> std::result::Result<InviteLink, ProviderError>;
}

/// How access was ultimately granted
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The user is in the group
    Joined,

    /// The user must join through this single-use link
    Invited(InviteLink),
}

/// Grants group access with an invite-link fallback
pub struct MembershipProvisioner {
    provider: Arc<dyn GroupProvider>,
    invite_ttl: Duration,
}

impl MembershipProvisioner {
    /// Default lifetime of a fallback invite link
    pub const DEFAULT_INVITE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(provider: Arc<dyn GroupProvider>) -> Self {
        Self {
            provider,
            invite_ttl: Self::DEFAULT_INVITE_TTL,
        }
    }

    pub fn with_invite_ttl(mut self, invite_ttl: Duration) -> Self {
        self.invite_ttl = invite_ttl;
        self
    }

    /// Grant access for `user_id`.
    ///
    /// The direct add is attempted exactly once. On a recoverable rejection
    /// exactly one invite link is created instead. Fatal provider failures
    /// propagate as [`PaymentError::ProvisionFatal`].
    pub async fn provision(&self, user_id: UserId) -> Result<ProvisionOutcome> {
        match self.provider.add_member(user_id).await {
            Ok(()) => {
                tracing::info!(user = %user_id, "Member added directly");
                Ok(ProvisionOutcome::Joined)
            }
            Err(ProviderError::Recoverable(reason)) => {
                tracing::warn!(
                    user = %user_id,
                    reason = %reason,
                    "Direct add rejected; falling back to invite link"
                );
                let link = self
                    .provider
                    .create_invite_link(1, self.invite_ttl)
                    .await
                    .map_err(|e| PaymentError::ProvisionFatal(e.to_string()))?;
                Ok(ProvisionOutcome::Invited(link))
            }
            Err(ProviderError::Fatal(reason)) => Err(PaymentError::ProvisionFatal(reason)),
        }
    }
}
