use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::dispatch::Dispatcher;
use crate::error::{CampaignError, CampaignResult};
use crate::mailer::{MailConnector, SmtpCredentials};
use crate::models::{
    AddEmailConfig, Campaign, CampaignFilter, CampaignOverview, CreateCampaign, DispatchSummary,
    EmailConfigView, NewCampaign, Recipient, RemoveEmailConfig, SentCampaign, normalize_email,
};
use crate::repository::{CampaignRepository, EmailConfigRepository};
use crate::template::find_undeclared_fields;
use crate::vault::CredentialCipher;

/// Service layer for campaign creation, queries and dispatch
pub struct CampaignService<R: CampaignRepository, E: EmailConfigRepository> {
    repository: Arc<R>,
    dispatcher: Dispatcher<R, E>,
}

impl<R: CampaignRepository, E: EmailConfigRepository> CampaignService<R, E> {
    pub fn new(repository: Arc<R>, dispatcher: Dispatcher<R, E>) -> Self {
        Self {
            repository,
            dispatcher,
        }
    }

    /// Validate and store a `draft` campaign.
    ///
    /// Every `{{field}}` in the subject or body must be supplied by at least
    /// one recipient row. Rows without personalized content get the campaign
    /// templates rendered with their own values.
    pub async fn create_campaign(
        &self,
        owner_id: Uuid,
        mut input: CreateCampaign,
    ) -> CampaignResult<Campaign> {
        input.sender_email = normalize_email(&input.sender_email);
        input
            .validate()
            .map_err(|e| CampaignError::Validation(e.to_string()))?;

        let known = input.declared_fields();
        let mut undeclared = find_undeclared_fields(&input.subject, &known);
        for field in find_undeclared_fields(&input.body, &known) {
            if !undeclared.contains(&field) {
                undeclared.push(field);
            }
        }
        if !undeclared.is_empty() {
            return Err(CampaignError::Validation(format!(
                "Template references fields not supplied by any recipient: {}",
                undeclared.join(", ")
            )));
        }

        let recipients = input
            .recipient_data
            .into_iter()
            .map(|row| Recipient::from_input(row, &input.subject, &input.body))
            .collect();

        self.repository
            .create(
                owner_id,
                NewCampaign {
                    sender_email: input.sender_email,
                    subject: input.subject,
                    body: input.body,
                    recipients,
                },
            )
            .await
    }

    pub async fn get_campaign(&self, owner_id: Uuid, id: Uuid) -> CampaignResult<Campaign> {
        self.repository
            .find_for_owner(id, owner_id)
            .await?
            .ok_or(CampaignError::NotFound(id))
    }

    pub async fn list_campaigns(
        &self,
        owner_id: Uuid,
        filter: CampaignFilter,
    ) -> CampaignResult<Vec<SentCampaign>> {
        let campaigns = self.repository.list_by_owner(owner_id, filter).await?;
        Ok(campaigns.into_iter().map(SentCampaign::from).collect())
    }

    /// Campaigns that finished dispatching, newest first
    pub async fn list_sent(&self, owner_id: Uuid) -> CampaignResult<Vec<SentCampaign>> {
        self.list_campaigns(owner_id, CampaignFilter::terminal()).await
    }

    pub async fn overview(&self, owner_id: Uuid) -> CampaignResult<CampaignOverview> {
        let campaigns = self
            .repository
            .list_by_owner(owner_id, CampaignFilter::default())
            .await?;
        Ok(CampaignOverview::from_campaigns(&campaigns))
    }

    pub async fn dispatch(
        &self,
        owner_id: Uuid,
        sender_name: &str,
        id: Uuid,
    ) -> CampaignResult<DispatchSummary> {
        self.dispatcher.dispatch(owner_id, sender_name, id).await
    }

    pub async fn resend_failed(
        &self,
        owner_id: Uuid,
        sender_name: &str,
        id: Uuid,
    ) -> CampaignResult<DispatchSummary> {
        self.dispatcher.resend_failed(owner_id, sender_name, id).await
    }
}

/// Service layer for sender credentials
pub struct EmailConfigService<E: EmailConfigRepository> {
    repository: Arc<E>,
    cipher: CredentialCipher,
    connector: Arc<dyn MailConnector>,
}

impl<E: EmailConfigRepository> EmailConfigService<E> {
    pub fn new(
        repository: Arc<E>,
        cipher: CredentialCipher,
        connector: Arc<dyn MailConnector>,
    ) -> Self {
        Self {
            repository,
            cipher,
            connector,
        }
    }

    /// Verify the credential against the relay, then encrypt and store it.
    /// Nothing is written when verification fails.
    pub async fn add(&self, user_id: Uuid, mut input: AddEmailConfig) -> CampaignResult<EmailConfigView> {
        input.sender_email = normalize_email(&input.sender_email);
        input
            .validate()
            .map_err(|e| CampaignError::Validation(e.to_string()))?;

        let credentials = SmtpCredentials {
            username: input.sender_email,
            password: input.app_password,
        };

        self.connector.connect(&credentials).await?;

        let secret = self.cipher.encrypt(&credentials.password)?;
        let config = self
            .repository
            .upsert(user_id, &credentials.username, secret)
            .await?;

        tracing::info!(
            %user_id,
            sender_email = %config.sender_email,
            "Email configuration verified and stored"
        );
        Ok(config.into())
    }

    pub async fn remove(&self, user_id: Uuid, mut input: RemoveEmailConfig) -> CampaignResult<()> {
        input.sender_email = normalize_email(&input.sender_email);
        input
            .validate()
            .map_err(|e| CampaignError::Validation(e.to_string()))?;

        let sender_email = input.sender_email;
        if !self.repository.delete(user_id, &sender_email).await? {
            return Err(CampaignError::EmailConfigNotFound(sender_email));
        }

        tracing::info!(%user_id, %sender_email, "Email configuration removed");
        Ok(())
    }

    pub async fn list(&self, user_id: Uuid) -> CampaignResult<Vec<EmailConfigView>> {
        let configs = self.repository.list(user_id).await?;
        Ok(configs.into_iter().map(EmailConfigView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchConfig;
    use crate::mailer::{MailError, MockMailConnector, MockMailSession};
    use crate::models::{CampaignStatus, RecipientInput};
    use crate::repository::{
        InMemoryEmailConfigRepository, MockCampaignRepository, MockEmailConfigRepository,
    };
    use std::collections::BTreeMap;

    fn campaign_service(
        repo: MockCampaignRepository,
    ) -> CampaignService<MockCampaignRepository, MockEmailConfigRepository> {
        let repo = Arc::new(repo);
        let dispatcher = Dispatcher::new(
            Arc::clone(&repo),
            Arc::new(MockEmailConfigRepository::new()),
            CredentialCipher::generate().0,
            Arc::new(MockMailConnector::new()),
            DispatchConfig::default(),
        );
        CampaignService::new(repo, dispatcher)
    }

    fn create_input(subject: &str, rows: Vec<RecipientInput>) -> CreateCampaign {
        CreateCampaign {
            subject: subject.into(),
            body: "<p>Hello {{name}}</p>".into(),
            sender_email: " Sender@Example.com ".into(),
            recipient_data: rows,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_undeclared_fields_before_store() {
        let mut repo = MockCampaignRepository::new();
        repo.expect_create().never();
        let service = campaign_service(repo);

        let input = create_input(
            "Hi {{name}} from {{city}}",
            vec![
                RecipientInput {
                    email: "a@x.com".into(),
                    ..Default::default()
                },
                RecipientInput {
                    email: "bad".into(),
                    ..Default::default()
                },
            ],
        );

        match service.create_campaign(Uuid::now_v7(), input).await {
            Err(CampaignError::Validation(msg)) => {
                assert!(msg.contains("name"));
                assert!(msg.contains("city"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_sender() {
        let mut repo = MockCampaignRepository::new();
        repo.expect_create().never();
        let service = campaign_service(repo);

        let mut input = create_input("Hi", vec![]);
        input.sender_email = "not-an-email".into();

        assert!(matches!(
            service.create_campaign(Uuid::now_v7(), input).await,
            Err(CampaignError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_renders_rows_and_normalizes_sender() {
        let owner = Uuid::now_v7();
        let mut repo = MockCampaignRepository::new();
        repo.expect_create()
            .withf(move |o, input| {
                *o == owner
                    && input.sender_email == "sender@example.com"
                    && input.recipients.len() == 1
                    && input.recipients[0].personalized_subject.as_deref() == Some("Hi Ada (Oslo)")
                    && input.recipients[0].personalized_body.as_deref() == Some("<p>Hello Ada</p>")
            })
            .times(1)
            .returning(|o, input| Ok(Campaign::new(o, input)));
        let service = campaign_service(repo);

        let input = create_input(
            "Hi {{name}} ({{city}})",
            vec![RecipientInput {
                name: Some("Ada".into()),
                email: "ada@example.com".into(),
                custom_fields: BTreeMap::from([("city".to_string(), "Oslo".to_string())]),
                ..Default::default()
            }],
        );

        let campaign = service.create_campaign(owner, input).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.stats.total, 1);
    }

    #[tokio::test]
    async fn test_get_campaign_not_owned_is_not_found() {
        let mut repo = MockCampaignRepository::new();
        repo.expect_find_for_owner().returning(|_, _| Ok(None));
        let service = campaign_service(repo);

        let id = Uuid::now_v7();
        assert!(matches!(
            service.get_campaign(Uuid::now_v7(), id).await,
            Err(CampaignError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_list_sent_uses_terminal_filter() {
        let mut repo = MockCampaignRepository::new();
        repo.expect_list_by_owner()
            .withf(|_, filter| *filter == CampaignFilter::terminal())
            .times(1)
            .returning(|_, _| Ok(vec![]));
        let service = campaign_service(repo);

        assert!(service.list_sent(Uuid::now_v7()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_config_with_rejected_password_stores_nothing() {
        let repo = Arc::new(InMemoryEmailConfigRepository::new());
        let mut connector = MockMailConnector::new();
        connector
            .expect_connect()
            .returning(|_| Err(MailError::Authentication("535 5.7.8 rejected".into())));

        let service = EmailConfigService::new(
            Arc::clone(&repo),
            CredentialCipher::generate().0,
            Arc::new(connector),
        );

        let result = service
            .add(
                Uuid::now_v7(),
                AddEmailConfig {
                    sender_email: "sender@example.com".into(),
                    app_password: "wrong".into(),
                },
            )
            .await;

        assert!(matches!(result, Err(CampaignError::Authentication(_))));
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_config_encrypts_before_storing() {
        let repo = Arc::new(InMemoryEmailConfigRepository::new());
        let (cipher, _) = CredentialCipher::generate();
        let mut connector = MockMailConnector::new();
        connector
            .expect_connect()
            .withf(|creds| creds.username == "sender@example.com")
            .returning(|_| Ok(Arc::new(MockMailSession::new())));

        let service = EmailConfigService::new(Arc::clone(&repo), cipher.clone(), Arc::new(connector));
        let user = Uuid::now_v7();

        let view = service
            .add(
                user,
                AddEmailConfig {
                    sender_email: "Sender@Example.com".into(),
                    app_password: "abcd efgh ijkl mnop".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(view.sender_email, "sender@example.com");

        let stored = repo.find(user, "sender@example.com").await.unwrap().unwrap();
        assert_ne!(stored.encrypted_app_password.ciphertext, "abcd efgh ijkl mnop");
        assert_eq!(
            cipher.decrypt(&stored.encrypted_app_password).unwrap(),
            "abcd efgh ijkl mnop"
        );
    }

    #[tokio::test]
    async fn test_remove_missing_config_is_not_found() {
        let mut repo = MockEmailConfigRepository::new();
        repo.expect_delete().returning(|_, _| Ok(false));
        let service = EmailConfigService::new(
            Arc::new(repo),
            CredentialCipher::generate().0,
            Arc::new(MockMailConnector::new()),
        );

        let result = service
            .remove(
                Uuid::now_v7(),
                RemoveEmailConfig {
                    sender_email: "gone@example.com".into(),
                },
            )
            .await;
        assert!(matches!(result, Err(CampaignError::EmailConfigNotFound(_))));
    }
}
