//! API routes module

use axum::{Router, middleware};
use axum_helpers::{JwtAuth, jwt_auth_middleware};
use domain_campaigns::{
    CampaignService, Dispatcher, EmailConfigService, MailConnector, PgCampaignRepository,
    PgEmailConfigRepository, handlers,
};
use std::sync::Arc;

use crate::state::AppState;

/// Create all API routes; every one requires a bearer token.
pub fn routes(state: &AppState) -> Router {
    let campaigns = Arc::new(PgCampaignRepository::new(state.db.clone()));
    let configs = Arc::new(PgEmailConfigRepository::new(state.db.clone()));
    let connector: Arc<dyn MailConnector> = state.connector.clone();

    let dispatcher = Dispatcher::new(
        campaigns.clone(),
        configs.clone(),
        state.cipher.clone(),
        connector.clone(),
        state.config.dispatch.clone(),
    );

    let auth = JwtAuth::new(&state.config.jwt);

    handlers::router(
        CampaignService::new(campaigns, dispatcher),
        EmailConfigService::new(configs, state.cipher.clone(), connector),
    )
    .layer(middleware::from_fn_with_state(auth, jwt_auth_middleware))
}
