use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_helpers::{
    CurrentUser, UuidPath, ValidatedJson,
    errors::responses::{
        BadRequestResponse, BadRequestUuidResponse, BadRequestValidationResponse,
        ConflictResponse, InternalServerErrorResponse, NotFoundResponse, UnauthorizedResponse,
    },
};
use std::sync::Arc;

use crate::error::CampaignResult;
use crate::models::{
    Campaign, CampaignCreated, CampaignFilter, CampaignOverview, CampaignQuery, CreateCampaign,
    DispatchSummary, SentCampaign,
};
use crate::repository::{CampaignRepository, EmailConfigRepository};
use crate::service::CampaignService;

pub const TAG: &str = "campaigns";

type SharedService<R, E> = State<Arc<CampaignService<R, E>>>;

pub fn router<R, E>(service: CampaignService<R, E>) -> Router
where
    R: CampaignRepository + 'static,
    E: EmailConfigRepository + 'static,
{
    Router::new()
        .route("/", get(list_campaigns).post(create_campaign))
        .route("/stats", get(campaign_stats))
        .route("/{id}", get(get_campaign))
        .route("/{id}/send", post(send_campaign))
        .route("/{id}/resend-failed", post(resend_failed))
        .with_state(Arc::new(service))
}

/// Create a draft campaign
#[utoipa::path(
    post,
    path = "/campaigns",
    tag = TAG,
    request_body = CreateCampaign,
    responses(
        (status = 201, description = "Campaign stored as draft", body = CampaignCreated),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
pub(crate) async fn create_campaign<R: CampaignRepository, E: EmailConfigRepository>(
    State(service): SharedService<R, E>,
    user: CurrentUser,
    ValidatedJson(input): ValidatedJson<CreateCampaign>,
) -> CampaignResult<impl IntoResponse> {
    let campaign = service.create_campaign(user.id, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(CampaignCreated {
            campaign_id: campaign.id,
        }),
    ))
}

/// List campaigns, finished ones by default
#[utoipa::path(
    get,
    path = "/campaigns",
    tag = TAG,
    params(CampaignQuery),
    responses(
        (status = 200, description = "Campaigns, newest first", body = Vec<SentCampaign>),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
pub(crate) async fn list_campaigns<R: CampaignRepository, E: EmailConfigRepository>(
    State(service): SharedService<R, E>,
    user: CurrentUser,
    Query(query): Query<CampaignQuery>,
) -> CampaignResult<Json<Vec<SentCampaign>>> {
    let filter = CampaignFilter::try_from(query)?;
    let campaigns = if filter.status.is_none() {
        service.list_sent(user.id).await?
    } else {
        service.list_campaigns(user.id, filter).await?
    };
    Ok(Json(campaigns))
}

/// Aggregate counters across the caller's campaigns
#[utoipa::path(
    get,
    path = "/campaigns/stats",
    tag = TAG,
    responses(
        (status = 200, description = "Campaign overview", body = CampaignOverview),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
pub(crate) async fn campaign_stats<R: CampaignRepository, E: EmailConfigRepository>(
    State(service): SharedService<R, E>,
    user: CurrentUser,
) -> CampaignResult<Json<CampaignOverview>> {
    Ok(Json(service.overview(user.id).await?))
}

#[utoipa::path(
    get,
    path = "/campaigns/{id}",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Campaign ID")
    ),
    responses(
        (status = 200, description = "Campaign found", body = Campaign),
        (status = 400, response = BadRequestUuidResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
pub(crate) async fn get_campaign<R: CampaignRepository, E: EmailConfigRepository>(
    State(service): SharedService<R, E>,
    user: CurrentUser,
    UuidPath(id): UuidPath,
) -> CampaignResult<Json<Campaign>> {
    Ok(Json(service.get_campaign(user.id, id).await?))
}

/// Send a draft campaign to every recipient
///
/// Returns once every recipient has a final outcome.
#[utoipa::path(
    post,
    path = "/campaigns/{id}/send",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Campaign ID")
    ),
    responses(
        (status = 200, description = "Dispatch finished", body = DispatchSummary),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse),
        (status = 503, description = "Mail relay unreachable")
    )
)]
pub(crate) async fn send_campaign<R: CampaignRepository, E: EmailConfigRepository>(
    State(service): SharedService<R, E>,
    user: CurrentUser,
    UuidPath(id): UuidPath,
) -> CampaignResult<Json<DispatchSummary>> {
    Ok(Json(service.dispatch(user.id, &user.name, id).await?))
}

/// Retry the recipients of a failed campaign that were not delivered
#[utoipa::path(
    post,
    path = "/campaigns/{id}/resend-failed",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Campaign ID")
    ),
    responses(
        (status = 200, description = "Resend finished", body = DispatchSummary),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse),
        (status = 503, description = "Mail relay unreachable")
    )
)]
pub(crate) async fn resend_failed<R: CampaignRepository, E: EmailConfigRepository>(
    State(service): SharedService<R, E>,
    user: CurrentUser,
    UuidPath(id): UuidPath,
) -> CampaignResult<Json<DispatchSummary>> {
    Ok(Json(service.resend_failed(user.id, &user.name, id).await?))
}
