//! Campaigns Domain
//!
//! Bulk email campaigns sent through each user's own mail relay account.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints (JWT protected)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐     ┌──────────────┐
//! │   Service   │────▶│  Dispatcher  │  ← fan-out, per-recipient outcomes
//! └──────┬──────┘     └──┬────────┬──┘
//!        │               │        │
//! ┌──────▼──────┐  ┌─────▼────┐ ┌─▼──────┐
//! │ Repository  │  │  Vault   │ │ Mailer │  ← AES-256-GCM / SMTP relay
//! └──────┬──────┘  └──────────┘ └────────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Campaigns, recipients, email configs
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_campaigns::{
//!     handlers,
//!     dispatch::{DispatchConfig, Dispatcher},
//!     mailer::{SmtpConfig, SmtpConnector},
//!     repository::{InMemoryCampaignRepository, InMemoryEmailConfigRepository},
//!     service::{CampaignService, EmailConfigService},
//!     vault::CredentialCipher,
//! };
//!
//! let campaigns = Arc::new(InMemoryCampaignRepository::new());
//! let configs = Arc::new(InMemoryEmailConfigRepository::new());
//! let (cipher, _key) = CredentialCipher::generate();
//! let connector = Arc::new(SmtpConnector::new(SmtpConfig::default()));
//!
//! let dispatcher = Dispatcher::new(
//!     campaigns.clone(),
//!     configs.clone(),
//!     cipher.clone(),
//!     connector.clone(),
//!     DispatchConfig::default(),
//! );
//!
//! let router = handlers::router(
//!     CampaignService::new(campaigns, dispatcher),
//!     EmailConfigService::new(configs, cipher, connector),
//! );
//! ```

pub mod dispatch;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod template;
pub mod vault;

// Re-export commonly used types
pub use dispatch::{DispatchConfig, Dispatcher};
pub use error::{CampaignError, CampaignResult};
pub use mailer::{
    MailConnector, MailError, MailSession, OutgoingEmail, SmtpConfig, SmtpConnector,
    SmtpCredentials,
};
pub use models::{
    AddEmailConfig, Campaign, CampaignCreated, CampaignFilter, CampaignOverview, CampaignStats,
    CampaignStatus, CreateCampaign, DispatchSummary, EmailConfig, EmailConfigView, NewCampaign,
    Recipient, RecipientInput, RecipientStatus, RemoveEmailConfig, SentCampaign,
};
pub use postgres::{PgCampaignRepository, PgEmailConfigRepository};
pub use repository::{
    CampaignRepository, EmailConfigRepository, InMemoryCampaignRepository,
    InMemoryEmailConfigRepository,
};
pub use service::{CampaignService, EmailConfigService};
pub use vault::{CredentialCipher, EncryptedSecret, VaultConfig, VaultError};
