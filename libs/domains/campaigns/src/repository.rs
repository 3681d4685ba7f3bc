use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CampaignError, CampaignResult};
use crate::models::{
    Campaign, CampaignFilter, CampaignStats, CampaignStatus, EmailConfig, NewCampaign,
    RecipientStatus,
};
use crate::vault::EncryptedSecret;

/// Campaign persistence, always scoped by owner at the edges.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// Persist a new `draft` campaign with zeroed counters
    async fn create(&self, owner_id: Uuid, input: NewCampaign) -> CampaignResult<Campaign>;

    /// Get a campaign only if `owner_id` owns it
    async fn find_for_owner(&self, id: Uuid, owner_id: Uuid) -> CampaignResult<Option<Campaign>>;

    async fn find_by_id(&self, id: Uuid) -> CampaignResult<Option<Campaign>>;

    /// Atomically move to `to` if the current status is one of `from`.
    /// Returns `false` when the campaign was in any other state.
    async fn try_transition(
        &self,
        id: Uuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> CampaignResult<bool>;

    async fn update_status(&self, id: Uuid, status: CampaignStatus) -> CampaignResult<()>;

    /// Record one recipient's outcome and return the adjusted counters
    async fn update_recipient_outcome(
        &self,
        id: Uuid,
        index: usize,
        status: RecipientStatus,
        error: Option<String>,
    ) -> CampaignResult<CampaignStats>;

    /// Put recipients back to `pending`, removing them from the counters
    async fn reset_recipients(&self, id: Uuid, indexes: Vec<usize>) -> CampaignResult<CampaignStats>;

    /// Owner's campaigns matching `filter`, newest first
    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        filter: CampaignFilter,
    ) -> CampaignResult<Vec<Campaign>>;
}

/// Sender credentials, at most one per (user, sender email).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailConfigRepository: Send + Sync {
    /// Insert, or replace the secret of an existing entry
    async fn upsert(
        &self,
        user_id: Uuid,
        sender_email: &str,
        secret: EncryptedSecret,
    ) -> CampaignResult<EmailConfig>;

    async fn find(&self, user_id: Uuid, sender_email: &str) -> CampaignResult<Option<EmailConfig>>;

    async fn list(&self, user_id: Uuid) -> CampaignResult<Vec<EmailConfig>>;

    /// Returns `false` if nothing was stored
    async fn delete(&self, user_id: Uuid, sender_email: &str) -> CampaignResult<bool>;
}

/// In-memory campaign store (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryCampaignRepository {
    campaigns: Arc<RwLock<HashMap<Uuid, Campaign>>>,
}

impl InMemoryCampaignRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_campaign<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Campaign) -> CampaignResult<T>,
    ) -> CampaignResult<T> {
        let mut campaigns = self.campaigns.write().await;
        let campaign = campaigns.get_mut(&id).ok_or(CampaignError::NotFound(id))?;
        f(campaign)
    }
}

#[async_trait]
impl CampaignRepository for InMemoryCampaignRepository {
    async fn create(&self, owner_id: Uuid, input: NewCampaign) -> CampaignResult<Campaign> {
        let campaign = Campaign::new(owner_id, input);
        self.campaigns
            .write()
            .await
            .insert(campaign.id, campaign.clone());

        tracing::info!(
            campaign_id = %campaign.id,
            recipients = campaign.stats.total,
            "Created campaign"
        );
        Ok(campaign)
    }

    async fn find_for_owner(&self, id: Uuid, owner_id: Uuid) -> CampaignResult<Option<Campaign>> {
        let campaigns = self.campaigns.read().await;
        Ok(campaigns
            .get(&id)
            .filter(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> CampaignResult<Option<Campaign>> {
        Ok(self.campaigns.read().await.get(&id).cloned())
    }

    async fn try_transition(
        &self,
        id: Uuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> CampaignResult<bool> {
        self.with_campaign(id, |campaign| {
            if !from.contains(&campaign.status) {
                return Ok(false);
            }
            campaign.status = to;
            campaign.updated_at = Utc::now();
            Ok(true)
        })
        .await
    }

    async fn update_status(&self, id: Uuid, status: CampaignStatus) -> CampaignResult<()> {
        self.with_campaign(id, |campaign| {
            campaign.status = status;
            campaign.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn update_recipient_outcome(
        &self,
        id: Uuid,
        index: usize,
        status: RecipientStatus,
        error: Option<String>,
    ) -> CampaignResult<CampaignStats> {
        self.with_campaign(id, |campaign| campaign.apply_outcome(index, status, error))
            .await
    }

    async fn reset_recipients(&self, id: Uuid, indexes: Vec<usize>) -> CampaignResult<CampaignStats> {
        self.with_campaign(id, |campaign| campaign.reset_recipients(&indexes))
            .await
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        filter: CampaignFilter,
    ) -> CampaignResult<Vec<Campaign>> {
        let campaigns = self.campaigns.read().await;

        let mut result: Vec<Campaign> = campaigns
            .values()
            .filter(|c| c.owner_id == owner_id && filter.matches(c.status))
            .cloned()
            .collect();

        // v7 ids break ties between campaigns created in the same instant
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(result)
    }
}

/// In-memory credential store (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryEmailConfigRepository {
    configs: Arc<RwLock<HashMap<(Uuid, String), EmailConfig>>>,
}

impl InMemoryEmailConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.configs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.configs.read().await.is_empty()
    }
}

#[async_trait]
impl EmailConfigRepository for InMemoryEmailConfigRepository {
    async fn upsert(
        &self,
        user_id: Uuid,
        sender_email: &str,
        secret: EncryptedSecret,
    ) -> CampaignResult<EmailConfig> {
        let mut configs = self.configs.write().await;
        let now = Utc::now();

        let config = configs
            .entry((user_id, sender_email.to_string()))
            .and_modify(|existing| {
                existing.encrypted_app_password = secret.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| EmailConfig {
                id: Uuid::now_v7(),
                user_id,
                sender_email: sender_email.to_string(),
                encrypted_app_password: secret,
                created_at: now,
                updated_at: now,
            });

        Ok(config.clone())
    }

    async fn find(&self, user_id: Uuid, sender_email: &str) -> CampaignResult<Option<EmailConfig>> {
        let configs = self.configs.read().await;
        Ok(configs.get(&(user_id, sender_email.to_string())).cloned())
    }

    async fn list(&self, user_id: Uuid) -> CampaignResult<Vec<EmailConfig>> {
        let configs = self.configs.read().await;
        let mut result: Vec<EmailConfig> = configs
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn delete(&self, user_id: Uuid, sender_email: &str) -> CampaignResult<bool> {
        let mut configs = self.configs.write().await;
        Ok(configs.remove(&(user_id, sender_email.to_string())).is_some())
    }
}
