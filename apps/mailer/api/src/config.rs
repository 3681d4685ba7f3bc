//! Configuration for Mailer API

use axum_helpers::JwtConfig;
use core_config::{AppInfo, FromEnv, app_info, server::ServerConfig};
use database::postgres::PostgresConfig;
use domain_campaigns::{DispatchConfig, SmtpConfig, VaultConfig};

pub use core_config::Environment;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub environment: Environment,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub jwt: JwtConfig,
    pub vault: VaultConfig,
    pub smtp: SmtpConfig,
    pub dispatch: DispatchConfig,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            app: app_info!(),
            environment: Environment::from_env(),
            server: ServerConfig::from_env()?,
            postgres: PostgresConfig::from_env()?,
            jwt: JwtConfig::from_env()?,
            vault: VaultConfig::from_env()?,
            smtp: SmtpConfig::from_env()?,
            dispatch: DispatchConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "mailer-api-test-secret-0123456789abcdef";

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgresql://localhost/mailer")),
                ("JWT_SECRET", Some(SECRET)),
                ("PORT", Some("3010")),
                ("SMTP_PORT", Some("587")),
                ("SMTP_TLS", Some("starttls")),
                ("ENCRYPTION_KEY", None),
                ("SEND_TIMEOUT_SECS", Some("10")),
                ("MAX_CONCURRENT_SENDS", Some("8")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.server.port, 3010);
                assert_eq!(config.smtp.port, 587);
                assert!(config.vault.encryption_key.is_none());
                assert_eq!(config.dispatch.send_timeout.as_secs(), 10);
                assert_eq!(config.dispatch.max_concurrent_sends, 8);
                assert_eq!(config.app.name, "mailer_api");
            },
        );
    }

    #[test]
    fn test_config_requires_jwt_secret() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgresql://localhost/mailer")),
                ("JWT_SECRET", None),
            ],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(err.to_string().contains("JWT_SECRET"));
            },
        );
    }
}
