use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::mailer::MailError;
use crate::models::CampaignStatus;
use crate::vault::VaultError;

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Campaign not found: {0}")]
    NotFound(Uuid),

    #[error("No email configuration for {0}")]
    EmailConfigNotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("No email configuration found for sender {0}")]
    ConfigurationMissing(String),

    #[error("Stored credential could not be decrypted: {0}")]
    Decryption(#[from] VaultError),

    #[error("Mail relay rejected the credentials: {0}")]
    Authentication(String),

    #[error("Mail relay unavailable: {0}")]
    RelayUnavailable(String),

    #[error("Campaign {id} is {status}")]
    InvalidState { id: Uuid, status: CampaignStatus },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CampaignResult<T> = Result<T, CampaignError>;

impl From<MailError> for CampaignError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Authentication(msg) => CampaignError::Authentication(msg),
            MailError::Connection(msg) => CampaignError::RelayUnavailable(msg),
            other => CampaignError::Internal(other.to_string()),
        }
    }
}

impl From<sea_orm::DbErr> for CampaignError {
    fn from(err: sea_orm::DbErr) -> Self {
        CampaignError::Internal(format!("Database error: {}", err))
    }
}

impl From<CampaignError> for AppError {
    fn from(err: CampaignError) -> Self {
        match err {
            CampaignError::NotFound(id) => AppError::NotFound(format!("Campaign {} not found", id)),
            CampaignError::EmailConfigNotFound(sender) => {
                AppError::NotFound(format!("No email configuration for {}", sender))
            }
            CampaignError::Validation(msg) => AppError::BadRequest(msg),
            CampaignError::ConfigurationMissing(sender) => AppError::BadRequest(format!(
                "No email configuration found for {}. Add the sender's app password first",
                sender
            )),
            CampaignError::Decryption(e) => {
                AppError::InternalServerError(format!("Stored sender credential unreadable: {}", e))
            }
            CampaignError::Authentication(msg) => {
                tracing::warn!(reason = %msg, "Mail relay rejected sender credentials");
                AppError::BadRequest(
                    "Mail relay rejected the sender credentials. Check the app password"
                        .to_string(),
                )
            }
            CampaignError::RelayUnavailable(msg) => {
                AppError::ServiceUnavailable(format!("Mail relay unavailable: {}", msg))
            }
            CampaignError::InvalidState { id, status } => {
                AppError::Conflict(format!("Campaign {} is {}", id, status))
            }
            CampaignError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for CampaignError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
