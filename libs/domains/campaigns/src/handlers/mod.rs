//! HTTP surface. Every route expects the JWT middleware to have run so that
//! [`CurrentUser`](axum_helpers::CurrentUser) resolves.

use axum::Router;
use axum_helpers::errors::responses::{
    BadRequestResponse, BadRequestUuidResponse, BadRequestValidationResponse, ConflictResponse,
    InternalServerErrorResponse, NotFoundResponse, UnauthorizedResponse,
};
use utoipa::OpenApi;

use crate::models::{
    AddEmailConfig, Campaign, CampaignCreated, CampaignOverview, CampaignStats, CampaignStatus,
    CreateCampaign, DispatchSummary, EmailConfigView, Recipient, RecipientInput, RecipientStatus,
    RecipientSummary, RemoveEmailConfig, SentCampaign,
};
use crate::repository::{CampaignRepository, EmailConfigRepository};
use crate::service::{CampaignService, EmailConfigService};

pub mod campaigns;
pub mod email_configs;

#[derive(OpenApi)]
#[openapi(
    paths(
        campaigns::create_campaign,
        campaigns::list_campaigns,
        campaigns::campaign_stats,
        campaigns::get_campaign,
        campaigns::send_campaign,
        campaigns::resend_failed,
        email_configs::list_configs,
        email_configs::add_config,
        email_configs::remove_config,
    ),
    components(
        schemas(
            Campaign,
            CampaignCreated,
            CampaignOverview,
            CampaignStats,
            CampaignStatus,
            CreateCampaign,
            DispatchSummary,
            Recipient,
            RecipientInput,
            RecipientStatus,
            RecipientSummary,
            SentCampaign,
            AddEmailConfig,
            RemoveEmailConfig,
            EmailConfigView,
        ),
        responses(
            BadRequestResponse,
            BadRequestUuidResponse,
            BadRequestValidationResponse,
            ConflictResponse,
            InternalServerErrorResponse,
            NotFoundResponse,
            UnauthorizedResponse,
        )
    ),
    tags(
        (name = campaigns::TAG, description = "Campaign creation, dispatch and history"),
        (name = email_configs::TAG, description = "Sender credentials")
    )
)]
pub struct ApiDoc;

/// Campaign and email-config routes, mounted at `/campaigns` and `/email-configs`.
pub fn router<R, E>(campaigns: CampaignService<R, E>, email_configs: EmailConfigService<E>) -> Router
where
    R: CampaignRepository + 'static,
    E: EmailConfigRepository + 'static,
{
    Router::new()
        .nest("/campaigns", campaigns::router(campaigns))
        .nest("/email-configs", email_configs::router(email_configs))
}
