//! PostgreSQL repository tests
//!
//! Each test starts its own postgres container and runs the workspace
//! migrations against it.

use domain_campaigns::*;
use std::collections::BTreeMap;
use test_utils::{TestDataBuilder, TestDatabase};
use uuid::Uuid;

fn new_campaign(emails: &[String]) -> NewCampaign {
    NewCampaign {
        sender_email: "sender@example.com".into(),
        subject: "Hello {{name}}".into(),
        body: "<p>Hi {{name}}</p>".into(),
        recipients: emails
            .iter()
            .map(|email| {
                Recipient::from_input(
                    RecipientInput {
                        name: Some("Grace".into()),
                        email: email.clone(),
                        custom_fields: BTreeMap::from([("team".to_string(), "ops".to_string())]),
                        ..Default::default()
                    },
                    "Hello {{name}}",
                    "<p>Hi {{name}}</p>",
                )
            })
            .collect(),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_campaign_round_trips_recipients() {
    let db = TestDatabase::new().await;
    let repo = PgCampaignRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("pg_round_trip");
    let owner = builder.user_id();

    let created = repo
        .create(owner, new_campaign(&builder.recipient_emails(3)))
        .await
        .unwrap();

    let found = repo.find_for_owner(created.id, owner).await.unwrap().unwrap();
    assert_eq!(found.recipients.len(), 3);
    assert_eq!(found.recipients[0].personalized_subject.as_deref(), Some("Hello Grace"));
    assert_eq!(found.recipients[0].custom_fields["team"], "ops");
    assert_eq!(found.status, CampaignStatus::Draft);
    assert_eq!(found.stats.total, 3);

    assert!(repo.find_for_owner(created.id, Uuid::now_v7()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_try_transition_admits_once() {
    let db = TestDatabase::new().await;
    let repo = PgCampaignRepository::new(db.connection());
    let owner = Uuid::now_v7();
    let created = repo.create(owner, new_campaign(&[])).await.unwrap();

    let (first, second) = tokio::join!(
        repo.try_transition(created.id, &[CampaignStatus::Draft], CampaignStatus::Processing),
        repo.try_transition(created.id, &[CampaignStatus::Draft], CampaignStatus::Processing),
    );
    assert_ne!(first.unwrap(), second.unwrap());

    let missing = repo
        .try_transition(Uuid::now_v7(), &[CampaignStatus::Draft], CampaignStatus::Processing)
        .await;
    assert!(matches!(missing, Err(CampaignError::NotFound(_))));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_concurrent_outcomes_keep_counters_consistent() {
    let db = TestDatabase::new().await;
    let repo = std::sync::Arc::new(PgCampaignRepository::new(db.connection()));
    let builder = TestDataBuilder::from_test_name("pg_outcomes");
    let created = repo
        .create(builder.user_id(), new_campaign(&builder.recipient_emails(20)))
        .await
        .unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for index in 0..20 {
        let repo = repo.clone();
        let id = created.id;
        tasks.spawn(async move {
            let (status, error) = if index % 4 == 0 {
                (RecipientStatus::Failed, Some("550".to_string()))
            } else {
                (RecipientStatus::Sent, None)
            };
            repo.update_recipient_outcome(id, index, status, error).await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let stored = repo.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(stored.stats.sent, 15);
    assert_eq!(stored.stats.failed, 5);
    assert!(stored.recipients.iter().all(|r| r.status != RecipientStatus::Pending));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_list_by_owner_filters_status() {
    let db = TestDatabase::new().await;
    let repo = PgCampaignRepository::new(db.connection());
    let owner = Uuid::now_v7();

    let draft = repo.create(owner, new_campaign(&[])).await.unwrap();
    let done = repo.create(owner, new_campaign(&[])).await.unwrap();
    repo.update_status(done.id, CampaignStatus::Completed).await.unwrap();

    let all = repo.list_by_owner(owner, CampaignFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, done.id);

    let finished = repo.list_by_owner(owner, CampaignFilter::terminal()).await.unwrap();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].id, done.id);
    assert_ne!(finished[0].id, draft.id);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_email_config_upsert_and_delete() {
    let db = TestDatabase::new().await;
    let repo = PgEmailConfigRepository::new(db.connection());
    let (cipher, _) = CredentialCipher::generate();
    let builder = TestDataBuilder::from_test_name("pg_email_config");
    let user = builder.user_id();
    let sender = builder.email("sender");

    let first = repo
        .upsert(user, &sender, cipher.encrypt("old").unwrap())
        .await
        .unwrap();
    let second = repo
        .upsert(user, &sender, cipher.encrypt("new").unwrap())
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(cipher.decrypt(&second.encrypted_app_password).unwrap(), "new");
    assert_eq!(repo.list(user).await.unwrap().len(), 1);

    assert!(repo.delete(user, &sender).await.unwrap());
    assert!(!repo.delete(user, &sender).await.unwrap());
    assert!(repo.find(user, &sender).await.unwrap().is_none());
}
