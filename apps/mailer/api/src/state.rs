//! Application state management

use domain_campaigns::{CredentialCipher, SmtpConnector};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: crate::config::Config,
    pub db: DatabaseConnection,
    pub cipher: CredentialCipher,
    pub connector: Arc<SmtpConnector>,
}
