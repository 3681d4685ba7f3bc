use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::{Set, Unchanged};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::{campaign, email_config};
use crate::error::{CampaignError, CampaignResult};
use crate::models::{
    Campaign, CampaignFilter, CampaignStats, CampaignStatus, EmailConfig, NewCampaign,
    RecipientStatus,
};
use crate::repository::{CampaignRepository, EmailConfigRepository};
use crate::vault::EncryptedSecret;

pub struct PgCampaignRepository {
    db: DatabaseConnection,
}

impl PgCampaignRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Load the row under `SELECT ... FOR UPDATE`, apply `f`, and write the
    /// recipients and counters back in the same transaction.
    async fn mutate_recipients<T, F>(&self, id: Uuid, f: F) -> CampaignResult<T>
    where
        F: FnOnce(&mut Campaign) -> CampaignResult<T> + Send,
        T: Send,
    {
        let txn = self.db.begin().await?;

        let model = campaign::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(CampaignError::NotFound(id))?;

        let mut current = Campaign::try_from(model)?;
        let result = f(&mut current)?;

        campaign::ActiveModel {
            id: Unchanged(id),
            recipients: Set(campaign::recipients_json(&current)?),
            sent: Set(current.stats.sent as i32),
            failed: Set(current.stats.failed as i32),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .update(&txn)
        .await?;

        txn.commit().await?;
        Ok(result)
    }

    async fn exists(&self, id: Uuid) -> CampaignResult<bool> {
        Ok(campaign::Entity::find_by_id(id).one(&self.db).await?.is_some())
    }
}

#[async_trait]
impl CampaignRepository for PgCampaignRepository {
    async fn create(&self, owner_id: Uuid, input: NewCampaign) -> CampaignResult<Campaign> {
        let campaign = Campaign::new(owner_id, input);
        let model = campaign::ActiveModel::try_from(&campaign)?
            .insert(&self.db)
            .await?;

        tracing::info!(
            campaign_id = %model.id,
            recipients = model.total,
            "Created campaign"
        );
        Campaign::try_from(model)
    }

    async fn find_for_owner(&self, id: Uuid, owner_id: Uuid) -> CampaignResult<Option<Campaign>> {
        campaign::Entity::find_by_id(id)
            .filter(campaign::Column::OwnerId.eq(owner_id))
            .one(&self.db)
            .await?
            .map(Campaign::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> CampaignResult<Option<Campaign>> {
        campaign::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Campaign::try_from)
            .transpose()
    }

    async fn try_transition(
        &self,
        id: Uuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> CampaignResult<bool> {
        let patch = campaign::ActiveModel {
            status: Set(to.to_string()),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };

        let result = campaign::Entity::update_many()
            .set(patch)
            .filter(campaign::Column::Id.eq(id))
            .filter(campaign::Column::Status.is_in(from.iter().map(|s| s.to_string())))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 1 {
            return Ok(true);
        }
        if !self.exists(id).await? {
            return Err(CampaignError::NotFound(id));
        }
        Ok(false)
    }

    async fn update_status(&self, id: Uuid, status: CampaignStatus) -> CampaignResult<()> {
        let patch = campaign::ActiveModel {
            status: Set(status.to_string()),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };

        let result = campaign::Entity::update_many()
            .set(patch)
            .filter(campaign::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(CampaignError::NotFound(id));
        }
        Ok(())
    }

    async fn update_recipient_outcome(
        &self,
        id: Uuid,
        index: usize,
        status: RecipientStatus,
        error: Option<String>,
    ) -> CampaignResult<CampaignStats> {
        self.mutate_recipients(id, move |c| c.apply_outcome(index, status, error))
            .await
    }

    async fn reset_recipients(&self, id: Uuid, indexes: Vec<usize>) -> CampaignResult<CampaignStats> {
        self.mutate_recipients(id, move |c| c.reset_recipients(&indexes))
            .await
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        filter: CampaignFilter,
    ) -> CampaignResult<Vec<Campaign>> {
        let mut query = campaign::Entity::find().filter(campaign::Column::OwnerId.eq(owner_id));

        if let Some(statuses) = filter.status {
            query = query.filter(
                campaign::Column::Status.is_in(statuses.iter().map(|s| s.to_string())),
            );
        }

        query
            .order_by_desc(campaign::Column::CreatedAt)
            .order_by_desc(campaign::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Campaign::try_from)
            .collect()
    }
}

pub struct PgEmailConfigRepository {
    db: DatabaseConnection,
}

impl PgEmailConfigRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EmailConfigRepository for PgEmailConfigRepository {
    async fn upsert(
        &self,
        user_id: Uuid,
        sender_email: &str,
        secret: EncryptedSecret,
    ) -> CampaignResult<EmailConfig> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let model = email_config::ActiveModel {
            id: Set(Uuid::now_v7()),
            user_id: Set(user_id),
            sender_email: Set(sender_email.to_string()),
            ciphertext: Set(secret.ciphertext),
            iv: Set(secret.iv),
            auth_tag: Set(secret.auth_tag),
            created_at: Set(now),
            updated_at: Set(now),
        };

        email_config::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    email_config::Column::UserId,
                    email_config::Column::SenderEmail,
                ])
                .update_columns([
                    email_config::Column::Ciphertext,
                    email_config::Column::Iv,
                    email_config::Column::AuthTag,
                    email_config::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(&self.db)
            .await?;

        tracing::info!(%user_id, sender_email, "Stored email configuration");

        self.find(user_id, sender_email).await?.ok_or_else(|| {
            CampaignError::Internal(format!("Email configuration for {} vanished after upsert", sender_email))
        })
    }

    async fn find(&self, user_id: Uuid, sender_email: &str) -> CampaignResult<Option<EmailConfig>> {
        Ok(email_config::Entity::find()
            .filter(email_config::Column::UserId.eq(user_id))
            .filter(email_config::Column::SenderEmail.eq(sender_email))
            .one(&self.db)
            .await?
            .map(EmailConfig::from))
    }

    async fn list(&self, user_id: Uuid) -> CampaignResult<Vec<EmailConfig>> {
        Ok(email_config::Entity::find()
            .filter(email_config::Column::UserId.eq(user_id))
            .order_by_asc(email_config::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(EmailConfig::from)
            .collect())
    }

    async fn delete(&self, user_id: Uuid, sender_email: &str) -> CampaignResult<bool> {
        let result = email_config::Entity::delete_many()
            .filter(email_config::Column::UserId.eq(user_id))
            .filter(email_config::Column::SenderEmail.eq(sender_email))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }
}
