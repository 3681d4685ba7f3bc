use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CampaignError, CampaignResult};
use crate::models::{Campaign, CampaignStats, CampaignStatus, Recipient};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "campaigns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_id: Uuid,
    pub sender_email: String,
    #[sea_orm(column_type = "Text")]
    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub body: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub recipients: Json,
    pub status: String,
    pub total: i32,
    pub sent: i32,
    pub failed: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Campaign {
    type Error = CampaignError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let status = model.status.parse::<CampaignStatus>().map_err(|_| {
            CampaignError::Internal(format!(
                "Campaign {} has unknown status '{}'",
                model.id, model.status
            ))
        })?;
        let recipients: Vec<Recipient> = serde_json::from_value(model.recipients).map_err(|e| {
            CampaignError::Internal(format!("Campaign {} has unreadable recipients: {}", model.id, e))
        })?;

        Ok(Self {
            id: model.id,
            owner_id: model.owner_id,
            sender_email: model.sender_email,
            subject: model.subject,
            body: model.body,
            recipients,
            status,
            stats: CampaignStats {
                total: model.total.max(0) as u32,
                sent: model.sent.max(0) as u32,
                failed: model.failed.max(0) as u32,
            },
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }
}

pub(crate) fn recipients_json(campaign: &Campaign) -> CampaignResult<Json> {
    serde_json::to_value(&campaign.recipients)
        .map_err(|e| CampaignError::Internal(format!("Failed to serialize recipients: {}", e)))
}

impl TryFrom<&Campaign> for ActiveModel {
    type Error = CampaignError;

    fn try_from(campaign: &Campaign) -> Result<Self, Self::Error> {
        Ok(ActiveModel {
            id: Set(campaign.id),
            owner_id: Set(campaign.owner_id),
            sender_email: Set(campaign.sender_email.clone()),
            subject: Set(campaign.subject.clone()),
            body: Set(campaign.body.clone()),
            recipients: Set(recipients_json(campaign)?),
            status: Set(campaign.status.to_string()),
            total: Set(campaign.stats.total as i32),
            sent: Set(campaign.stats.sent as i32),
            failed: Set(campaign.stats.failed as i32),
            created_at: Set(campaign.created_at.into()),
            updated_at: Set(campaign.updated_at.into()),
        })
    }
}
