use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::EmailConfig;
use crate::vault::EncryptedSecret;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub sender_email: String,
    #[sea_orm(column_type = "Text")]
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for EmailConfig {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            sender_email: model.sender_email,
            encrypted_app_password: EncryptedSecret {
                ciphertext: model.ciphertext,
                iv: model.iv,
                auth_tag: model.auth_tag,
            },
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}
