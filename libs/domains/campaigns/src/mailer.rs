//! Outbound mail relay.
//!
//! [`MailConnector::connect`] authenticates once per dispatch and hands back a
//! [`MailSession`] that every recipient send of that dispatch shares.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::PoolConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, info};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Authentication(String),

    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Message(String),

    #[error("{0}")]
    Delivery(String),
}

#[derive(Clone)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One fully personalized message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from_name: String,
    pub from_email: String,
    pub to_name: String,
    pub to_email: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Open an authenticated session, failing before any send if the relay
    /// refuses the credentials.
    async fn connect(
        &self,
        credentials: &SmtpCredentials,
    ) -> Result<Arc<dyn MailSession>, MailError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailSession: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SmtpTls {
    /// TLS from the first byte (port 465)
    Implicit,
    /// Plain connection upgraded with STARTTLS (port 587)
    StartTls,
    /// Unencrypted, for local capture servers only
    None,
}

/// Relay settings; credentials come from each user's email configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub tls: SmtpTls,
    pub pool_size: u32,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 465,
            tls: SmtpTls::Implicit,
            pool_size: 5,
        }
    }
}

impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: env_or_default("SMTP_HOST", &defaults.host),
            port: env_parse("SMTP_PORT", defaults.port)?,
            tls: env_parse("SMTP_TLS", defaults.tls)?,
            pool_size: env_parse("SMTP_POOL_SIZE", defaults.pool_size)?,
        })
    }
}

/// [`MailConnector`] backed by a lettre SMTP transport.
#[derive(Debug, Clone)]
pub struct SmtpConnector {
    config: SmtpConfig,
}

impl SmtpConnector {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_transport(
        &self,
        credentials: &SmtpCredentials,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let host = self.config.host.as_str();
        let builder = match self.config.tls {
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
        }
        .map_err(|e| MailError::Connection(format!("Failed to create SMTP relay: {}", e)))?;

        Ok(builder
            .port(self.config.port)
            .credentials(Credentials::new(
                credentials.username.clone(),
                credentials.password.clone(),
            ))
            .timeout(Some(COMMAND_TIMEOUT))
            .pool_config(PoolConfig::new().max_size(self.config.pool_size.max(1)))
            .build())
    }
}

#[async_trait]
impl MailConnector for SmtpConnector {
    async fn connect(
        &self,
        credentials: &SmtpCredentials,
    ) -> Result<Arc<dyn MailSession>, MailError> {
        let transport = self.build_transport(credentials)?;

        match transport.test_connection().await {
            Ok(true) => {
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    sender_email = %credentials.username,
                    "SMTP session verified"
                );
                Ok(Arc::new(SmtpSession { transport }))
            }
            Ok(false) => Err(MailError::Connection(
                "Relay did not accept the connection".to_string(),
            )),
            // 535 and friends: the relay heard us and said no
            Err(e) if e.is_permanent() => Err(MailError::Authentication(e.to_string())),
            Err(e) => Err(MailError::Connection(e.to_string())),
        }
    }
}

struct SmtpSession {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl MailSession for SmtpSession {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;

        debug!(recipient = %email.to_email, "Email sent");
        Ok(())
    }
}

fn parse_address(address: &str) -> Result<Address, MailError> {
    address
        .parse::<Address>()
        .map_err(|e| MailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

fn mailbox(name: &str, address: &str) -> Result<Mailbox, MailError> {
    let name = Some(name.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    Ok(Mailbox::new(name, parse_address(address)?))
}

/// `multipart/alternative` with the text part first.
pub fn build_message(email: &OutgoingEmail) -> Result<Message, MailError> {
    Message::builder()
        .from(mailbox(&email.from_name, &email.from_email)?)
        .to(mailbox(&email.to_name, &email.to_email)?)
        .subject(&email.subject)
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(email.text_body.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(email.html_body.clone()),
                ),
        )
        .map_err(|e| MailError::Message(e.to_string()))
}
