//! Dispatch orchestration
//!
//! One dispatch opens one verified relay session and fans the recipients out
//! onto a [`JoinSet`]. Each task only returns its outcome; the loop draining
//! the set is the single writer of recipient state and counters.

use core_config::{ConfigError, FromEnv, env_parse};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CampaignError, CampaignResult};
use crate::mailer::{MailConnector, MailSession, OutgoingEmail, SmtpCredentials};
use crate::models::{Campaign, CampaignStats, CampaignStatus, DispatchSummary, RecipientStatus};
use crate::repository::{CampaignRepository, EmailConfigRepository};
use crate::template::html_to_text;
use crate::vault::CredentialCipher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Upper bound for a single recipient send
    pub send_timeout: Duration,
    /// Sends in flight at once within one dispatch
    pub max_concurrent_sends: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(30),
            max_concurrent_sends: 5,
        }
    }
}

impl FromEnv for DispatchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let secs = env_parse("SEND_TIMEOUT_SECS", defaults.send_timeout.as_secs())?;
        let max_concurrent_sends =
            env_parse("MAX_CONCURRENT_SENDS", defaults.max_concurrent_sends)?;
        Ok(Self {
            send_timeout: Duration::from_secs(secs.max(1)),
            max_concurrent_sends: max_concurrent_sends.max(1),
        })
    }
}

pub struct Dispatcher<R: CampaignRepository, E: EmailConfigRepository> {
    campaigns: Arc<R>,
    configs: Arc<E>,
    cipher: CredentialCipher,
    connector: Arc<dyn MailConnector>,
    config: DispatchConfig,
}

impl<R: CampaignRepository, E: EmailConfigRepository> Dispatcher<R, E> {
    pub fn new(
        campaigns: Arc<R>,
        configs: Arc<E>,
        cipher: CredentialCipher,
        connector: Arc<dyn MailConnector>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            campaigns,
            configs,
            cipher,
            connector,
            config,
        }
    }

    /// Send a `draft` campaign to every recipient.
    ///
    /// Setup failures (missing, unreadable or rejected credential) abort before
    /// any send; the last two also mark the campaign `failed`. A campaign that
    /// is not `draft`, or that another dispatch claims first, is rejected with
    /// [`CampaignError::InvalidState`].
    pub async fn dispatch(
        &self,
        owner_id: Uuid,
        sender_name: &str,
        id: Uuid,
    ) -> CampaignResult<DispatchSummary> {
        let campaign = self.load(owner_id, id).await?;
        if campaign.status != CampaignStatus::Draft {
            return Err(CampaignError::InvalidState {
                id,
                status: campaign.status,
            });
        }

        let session = match self.open_session(owner_id, &campaign).await {
            Ok(session) => session,
            Err(e) => {
                if matches!(
                    e,
                    CampaignError::Decryption(_)
                        | CampaignError::Authentication(_)
                        | CampaignError::RelayUnavailable(_)
                ) {
                    self.fail_draft(id, &e).await;
                }
                return Err(e);
            }
        };

        self.admit(id, CampaignStatus::Draft).await?;

        let indexes: Vec<usize> = (0..campaign.recipients.len()).collect();
        self.fan_out(&campaign, indexes, session, sender_name, campaign.stats)
            .await
    }

    /// Retry every recipient of a `failed` campaign that was not delivered.
    ///
    /// Recipients already `sent` are left alone. A credential problem leaves
    /// the campaign `failed`.
    pub async fn resend_failed(
        &self,
        owner_id: Uuid,
        sender_name: &str,
        id: Uuid,
    ) -> CampaignResult<DispatchSummary> {
        let campaign = self.load(owner_id, id).await?;
        if campaign.status != CampaignStatus::Failed {
            return Err(CampaignError::InvalidState {
                id,
                status: campaign.status,
            });
        }

        let session = self.open_session(owner_id, &campaign).await?;
        self.admit(id, CampaignStatus::Failed).await?;

        // Re-read under the claim; counters may have moved since `load`.
        let claimed = self.campaigns.find_by_id(id).await?.ok_or(CampaignError::NotFound(id))?;
        let indexes = claimed.unsent_indexes();
        let stats = self.campaigns.reset_recipients(id, indexes.clone()).await?;

        info!(campaign_id = %id, retrying = indexes.len(), "Resending undelivered recipients");
        self.fan_out(&claimed, indexes, session, sender_name, stats).await
    }

    async fn load(&self, owner_id: Uuid, id: Uuid) -> CampaignResult<Campaign> {
        self.campaigns
            .find_for_owner(id, owner_id)
            .await?
            .ok_or(CampaignError::NotFound(id))
    }

    async fn open_session(
        &self,
        owner_id: Uuid,
        campaign: &Campaign,
    ) -> CampaignResult<Arc<dyn MailSession>> {
        let config = self
            .configs
            .find(owner_id, &campaign.sender_email)
            .await?
            .ok_or_else(|| CampaignError::ConfigurationMissing(campaign.sender_email.clone()))?;

        let password = self.cipher.decrypt(&config.encrypted_app_password)?;
        let credentials = SmtpCredentials {
            username: config.sender_email,
            password,
        };

        Ok(self.connector.connect(&credentials).await?)
    }

    /// Claim the campaign for sending; only one caller wins.
    async fn admit(&self, id: Uuid, from: CampaignStatus) -> CampaignResult<()> {
        if self
            .campaigns
            .try_transition(id, &[from], CampaignStatus::Processing)
            .await?
        {
            return Ok(());
        }

        let status = self
            .campaigns
            .find_by_id(id)
            .await?
            .map(|c| c.status)
            .unwrap_or(CampaignStatus::Processing);
        warn!(campaign_id = %id, %status, "Dispatch rejected, campaign already claimed");
        Err(CampaignError::InvalidState { id, status })
    }

    /// Move a still-`draft` campaign to `failed`; returns whether it moved.
    async fn fail_draft(&self, id: Uuid, cause: &CampaignError) -> bool {
        match self
            .campaigns
            .try_transition(id, &[CampaignStatus::Draft], CampaignStatus::Failed)
            .await
        {
            Ok(true) => {
                warn!(campaign_id = %id, error = %cause, "Campaign failed before sending");
                true
            }
            Ok(false) => {
                debug!(
                    campaign_id = %id,
                    error = %cause,
                    "Setup failed but campaign is no longer a draft, status left unchanged"
                );
                false
            }
            Err(e) => {
                error!(campaign_id = %id, error = %e, "Failed to mark campaign failed");
                false
            }
        }
    }

    async fn fan_out(
        &self,
        campaign: &Campaign,
        indexes: Vec<usize>,
        session: Arc<dyn MailSession>,
        sender_name: &str,
        mut stats: CampaignStats,
    ) -> CampaignResult<DispatchSummary> {
        let id = campaign.id;
        let timeout = self.config.send_timeout;
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_sends.max(1)));
        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::with_capacity(indexes.len());

        for index in indexes {
            let Some(recipient) = campaign.recipients.get(index) else {
                continue;
            };
            let email = compose(campaign, index, sender_name);
            let session = Arc::clone(&session);
            let to = recipient.email.clone();
            let permits = Arc::clone(&permits);

            let handle = tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (index, to, Err("send cancelled".to_string()));
                };
                let outcome = match tokio::time::timeout(timeout, session.send(&email)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("send timed out after {}s", timeout.as_secs())),
                };
                (index, to, outcome)
            });
            task_index.insert(handle.id(), index);
        }

        let mut persist_error = None;

        while let Some(joined) = tasks.join_next_with_id().await {
            let (index, status, message) = match joined {
                Ok((_, (index, _, Ok(())))) => (index, RecipientStatus::Sent, None),
                Ok((_, (index, to, Err(message)))) => {
                    warn!(campaign_id = %id, recipient = %to, error = %message, "Send failed");
                    (index, RecipientStatus::Failed, Some(message))
                }
                Err(join_error) => {
                    let Some(&index) = task_index.get(&join_error.id()) else {
                        continue;
                    };
                    error!(campaign_id = %id, index, error = %join_error, "Send task aborted");
                    (index, RecipientStatus::Failed, Some("send task aborted".to_string()))
                }
            };

            match self
                .campaigns
                .update_recipient_outcome(id, index, status, message)
                .await
            {
                Ok(updated) => stats = updated,
                Err(e) => {
                    error!(campaign_id = %id, index, error = %e, "Failed to record outcome");
                    if persist_error.is_none() {
                        persist_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = persist_error {
            if let Err(mark) = self.campaigns.update_status(id, CampaignStatus::Failed).await {
                error!(campaign_id = %id, error = %mark, "Failed to mark campaign failed");
            }
            return Err(e);
        }

        let status = if stats.failed == 0 {
            CampaignStatus::Completed
        } else {
            CampaignStatus::Failed
        };
        self.campaigns.update_status(id, status).await?;

        info!(
            campaign_id = %id,
            %status,
            sent = stats.sent,
            failed = stats.failed,
            "Campaign dispatch finished"
        );

        Ok(DispatchSummary {
            campaign_id: id,
            status,
            sent: stats.sent,
            failed: stats.failed,
        })
    }
}

fn compose(campaign: &Campaign, index: usize, sender_name: &str) -> OutgoingEmail {
    let recipient = &campaign.recipients[index];
    let html_body = recipient.body_or(&campaign.body).to_string();
    let from_name = if sender_name.trim().is_empty() {
        campaign.sender_email.clone()
    } else {
        sender_name.to_string()
    };

    OutgoingEmail {
        from_name,
        from_email: campaign.sender_email.clone(),
        to_name: recipient.name.clone(),
        to_email: recipient.email.clone(),
        subject: recipient.subject_or(&campaign.subject).to_string(),
        text_body: html_to_text(&html_body),
        html_body,
    }
}
