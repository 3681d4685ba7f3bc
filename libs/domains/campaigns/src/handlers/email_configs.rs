use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use axum_helpers::{
    CurrentUser, ValidatedJson,
    errors::responses::{
        BadRequestResponse, BadRequestValidationResponse, InternalServerErrorResponse,
        NotFoundResponse, UnauthorizedResponse,
    },
};
use std::sync::Arc;

use crate::error::CampaignResult;
use crate::models::{AddEmailConfig, EmailConfigView, RemoveEmailConfig};
use crate::repository::EmailConfigRepository;
use crate::service::EmailConfigService;

pub const TAG: &str = "email-configs";

pub fn router<E: EmailConfigRepository + 'static>(service: EmailConfigService<E>) -> Router {
    Router::new()
        .route(
            "/",
            get(list_configs).post(add_config).delete(remove_config),
        )
        .with_state(Arc::new(service))
}

/// Sender addresses the caller has credentials for
#[utoipa::path(
    get,
    path = "/email-configs",
    tag = TAG,
    responses(
        (status = 200, description = "Configured senders", body = Vec<EmailConfigView>),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
pub(crate) async fn list_configs<E: EmailConfigRepository>(
    State(service): State<Arc<EmailConfigService<E>>>,
    user: CurrentUser,
) -> CampaignResult<Json<Vec<EmailConfigView>>> {
    Ok(Json(service.list(user.id).await?))
}

/// Verify and store an app password for a sender address
///
/// The credential is checked against the mail relay first; nothing is
/// stored when the relay rejects it. Re-adding a sender replaces its password.
#[utoipa::path(
    post,
    path = "/email-configs",
    tag = TAG,
    request_body = AddEmailConfig,
    responses(
        (status = 201, description = "Credential verified and stored", body = EmailConfigView),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse),
        (status = 503, description = "Mail relay unreachable")
    )
)]
pub(crate) async fn add_config<E: EmailConfigRepository>(
    State(service): State<Arc<EmailConfigService<E>>>,
    user: CurrentUser,
    ValidatedJson(input): ValidatedJson<AddEmailConfig>,
) -> CampaignResult<impl IntoResponse> {
    let view = service.add(user.id, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    delete,
    path = "/email-configs",
    tag = TAG,
    request_body = RemoveEmailConfig,
    responses(
        (status = 204, description = "Credential removed"),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
pub(crate) async fn remove_config<E: EmailConfigRepository>(
    State(service): State<Arc<EmailConfigService<E>>>,
    user: CurrentUser,
    ValidatedJson(input): ValidatedJson<RemoveEmailConfig>,
) -> CampaignResult<StatusCode> {
    service.remove(user.id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}
