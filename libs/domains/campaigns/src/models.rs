use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::{CampaignError, CampaignResult};
use crate::template;
use crate::vault::EncryptedSecret;

/// Campaign lifecycle
///
/// ```text
/// draft --dispatch--> processing --> completed | failed
/// draft --credential failure--> failed
/// failed --resend_failed--> processing
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Processing,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub const ALL: [CampaignStatus; 4] = [
        CampaignStatus::Draft,
        CampaignStatus::Processing,
        CampaignStatus::Completed,
        CampaignStatus::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }
}

/// Delivery state of a single recipient
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecipientStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

/// One addressee of a campaign with its personalized content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalized_subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalized_body: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub status: RecipientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Recipient {
    /// Build a stored recipient from an input row, rendering the campaign
    /// templates for whichever personalized parts the row did not supply.
    pub fn from_input(input: RecipientInput, subject: &str, body: &str) -> Self {
        let email = normalize_email(&input.email);
        let name = input
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| local_part(&email).to_string());

        let mut recipient = Self {
            name,
            email,
            personalized_subject: None,
            personalized_body: None,
            custom_fields: input.custom_fields,
            status: RecipientStatus::Pending,
            error: None,
        };

        let fields = recipient.fields();
        recipient.personalized_subject = Some(
            input
                .personalized_subject
                .unwrap_or_else(|| template::render(subject, &fields)),
        );
        recipient.personalized_body = Some(
            input
                .personalized_body
                .unwrap_or_else(|| template::render(body, &fields)),
        );
        recipient
    }

    /// Placeholder values for this row: custom fields plus `name` and `email`.
    pub fn fields(&self) -> HashMap<String, String> {
        let mut fields: HashMap<String, String> = self
            .custom_fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields.insert("name".to_string(), self.name.clone());
        fields.insert("email".to_string(), self.email.clone());
        fields
    }

    pub fn subject_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.personalized_subject.as_deref().unwrap_or(default)
    }

    pub fn body_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.personalized_body.as_deref().unwrap_or(default)
    }
}

/// Aggregate delivery counters; `sent + failed <= total` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CampaignStats {
    pub total: u32,
    pub sent: u32,
    pub failed: u32,
}

impl CampaignStats {
    pub fn pending(&self) -> u32 {
        self.total.saturating_sub(self.sent + self.failed)
    }

    fn remove(&mut self, status: RecipientStatus) {
        match status {
            RecipientStatus::Sent => self.sent = self.sent.saturating_sub(1),
            RecipientStatus::Failed => self.failed = self.failed.saturating_sub(1),
            RecipientStatus::Pending => {}
        }
    }

    fn add(&mut self, status: RecipientStatus) {
        match status {
            RecipientStatus::Sent => self.sent += 1,
            RecipientStatus::Failed => self.failed += 1,
            RecipientStatus::Pending => {}
        }
    }
}

/// Campaign entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub sender_email: String,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<Recipient>,
    pub status: CampaignStatus,
    pub stats: CampaignStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(owner_id: Uuid, input: NewCampaign) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner_id,
            sender_email: input.sender_email,
            subject: input.subject,
            body: input.body,
            stats: CampaignStats {
                total: input.recipients.len() as u32,
                sent: 0,
                failed: 0,
            },
            recipients: input.recipients,
            status: CampaignStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the outcome of one send, replacing any earlier outcome for the
    /// same recipient in the counters.
    pub fn apply_outcome(
        &mut self,
        index: usize,
        status: RecipientStatus,
        error: Option<String>,
    ) -> CampaignResult<CampaignStats> {
        let id = self.id;
        let recipient = self.recipients.get_mut(index).ok_or_else(|| {
            CampaignError::Internal(format!("Campaign {} has no recipient #{}", id, index))
        })?;

        self.stats.remove(recipient.status);
        recipient.status = status;
        recipient.error = error;
        self.stats.add(status);
        self.updated_at = Utc::now();

        Ok(self.stats)
    }

    /// Put the given recipients back to `pending`, clearing their errors.
    pub fn reset_recipients(&mut self, indexes: &[usize]) -> CampaignResult<CampaignStats> {
        for &index in indexes {
            self.apply_outcome(index, RecipientStatus::Pending, None)?;
        }
        Ok(self.stats)
    }

    /// Indexes of every recipient that has not been delivered.
    pub fn unsent_indexes(&self) -> Vec<usize> {
        self.recipients
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status != RecipientStatus::Sent)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Fully-prepared campaign handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaign {
    pub sender_email: String,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<Recipient>,
}

/// Request body for creating a campaign
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaign {
    #[validate(length(min = 1, max = 998, message = "Subject is required"))]
    pub subject: String,

    #[validate(length(min = 1, message = "Body is required"))]
    pub body: String,

    #[serde(deserialize_with = "deserialize_email")]
    #[validate(email(message = "Sender email must be a valid address"))]
    pub sender_email: String,

    #[serde(default)]
    #[validate(nested)]
    pub recipient_data: Vec<RecipientInput>,
}

impl CreateCampaign {
    /// Field names supplied by at least one recipient row.
    pub fn declared_fields(&self) -> HashSet<String> {
        let mut known = HashSet::new();
        for row in &self.recipient_data {
            known.insert("email".to_string());
            if row.name.as_deref().is_some_and(|n| !n.trim().is_empty()) {
                known.insert("name".to_string());
            }
            known.extend(row.custom_fields.keys().cloned());
        }
        known
    }
}

/// One uploaded contact row
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecipientInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[validate(custom(function = "validate_not_blank"))]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalized_subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalized_body: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

/// Response body for a created campaign
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCreated {
    pub campaign_id: Uuid,
}

/// Raw `?status=` query, a comma separated list of campaign statuses.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CampaignQuery {
    /// e.g. `completed` or `completed,failed`
    pub status: Option<String>,
}

/// Status filter for campaign listings; `None` matches every status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignFilter {
    pub status: Option<Vec<CampaignStatus>>,
}

impl CampaignFilter {
    /// Campaigns that finished dispatching.
    pub fn terminal() -> Self {
        Self {
            status: Some(vec![CampaignStatus::Completed, CampaignStatus::Failed]),
        }
    }

    pub fn matches(&self, status: CampaignStatus) -> bool {
        self.status
            .as_ref()
            .is_none_or(|wanted| wanted.contains(&status))
    }
}

impl TryFrom<CampaignQuery> for CampaignFilter {
    type Error = CampaignError;

    fn try_from(query: CampaignQuery) -> Result<Self, Self::Error> {
        let Some(raw) = query.status.filter(|s| !s.trim().is_empty()) else {
            return Ok(Self::default());
        };

        let statuses = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<CampaignStatus>()
                    .map_err(|_| CampaignError::Validation(format!("Unknown campaign status '{}'", s)))
            })
            .collect::<CampaignResult<Vec<_>>>()?;

        Ok(Self {
            status: Some(statuses),
        })
    }
}

/// Per-recipient view in a campaign listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecipientSummary {
    pub name: String,
    pub email: String,
    pub status: RecipientStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub custom_fields: BTreeMap<String, String>,
}

/// Listing projection of a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentCampaign {
    pub id: Uuid,
    pub subject: String,
    pub sender_email: String,
    pub recipient_count: usize,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub stats: CampaignStats,
    pub recipients: Vec<RecipientSummary>,
}

impl From<Campaign> for SentCampaign {
    fn from(campaign: Campaign) -> Self {
        Self {
            id: campaign.id,
            subject: campaign.subject,
            sender_email: campaign.sender_email,
            recipient_count: campaign.recipients.len(),
            status: campaign.status,
            created_at: campaign.created_at,
            stats: campaign.stats,
            recipients: campaign
                .recipients
                .into_iter()
                .map(|r| RecipientSummary {
                    name: r.name,
                    email: r.email,
                    status: r.status,
                    error: r.error,
                    custom_fields: r.custom_fields,
                })
                .collect(),
        }
    }
}

/// Aggregate counts across all of an owner's campaigns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignOverview {
    pub total: u64,
    pub draft: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_recipients: u64,
    pub total_sent: u64,
    pub total_failed: u64,
}

impl CampaignOverview {
    pub fn from_campaigns<'a>(campaigns: impl IntoIterator<Item = &'a Campaign>) -> Self {
        campaigns
            .into_iter()
            .fold(Self::default(), |mut overview, campaign| {
                overview.total += 1;
                match campaign.status {
                    CampaignStatus::Draft => overview.draft += 1,
                    CampaignStatus::Processing => overview.processing += 1,
                    CampaignStatus::Completed => overview.completed += 1,
                    CampaignStatus::Failed => overview.failed += 1,
                }
                overview.total_recipients += u64::from(campaign.stats.total);
                overview.total_sent += u64::from(campaign.stats.sent);
                overview.total_failed += u64::from(campaign.stats.failed);
                overview
            })
    }
}

/// Result of a dispatch or resend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub campaign_id: Uuid,
    pub status: CampaignStatus,
    pub sent: u32,
    pub failed: u32,
}

/// Stored sender credential
#[derive(Debug, Clone, PartialEq)]
pub struct EmailConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sender_email: String,
    pub encrypted_app_password: EncryptedSecret,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for adding or replacing a sender credential
#[derive(Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddEmailConfig {
    #[serde(deserialize_with = "deserialize_email")]
    #[validate(email(message = "Sender email must be a valid address"))]
    pub sender_email: String,

    #[validate(length(min = 1, message = "App password is required"))]
    pub app_password: String,
}

impl fmt::Debug for AddEmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddEmailConfig")
            .field("sender_email", &self.sender_email)
            .field("app_password", &"<redacted>")
            .finish()
    }
}

/// Request body for removing a sender credential
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveEmailConfig {
    #[serde(deserialize_with = "deserialize_email")]
    #[validate(email(message = "Sender email must be a valid address"))]
    pub sender_email: String,
}

/// Client view of a sender credential; never carries the secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfigView {
    pub sender_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EmailConfig> for EmailConfigView {
    fn from(config: EmailConfig) -> Self {
        Self {
            sender_email: config.sender_email,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trims and lowercases an address while deserializing, so `#[validate(email)]`
/// sees the stored form.
fn deserialize_email<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(|email| normalize_email(&email))
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("required");
        error.message = Some("Recipient email is required".into());
        return Err(error);
    }
    Ok(())
}

/// Part of an address before `@`, or the whole string when there is none.
pub fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign_with(statuses: &[RecipientStatus]) -> Campaign {
        let recipients = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| Recipient {
                name: format!("r{}", i),
                email: format!("r{}@example.com", i),
                personalized_subject: None,
                personalized_body: None,
                custom_fields: BTreeMap::new(),
                status: *status,
                error: None,
            })
            .collect();
        let mut campaign = Campaign::new(
            Uuid::now_v7(),
            NewCampaign {
                sender_email: "sender@example.com".into(),
                subject: "s".into(),
                body: "b".into(),
                recipients,
            },
        );
        campaign.stats.sent = statuses.iter().filter(|s| **s == RecipientStatus::Sent).count() as u32;
        campaign.stats.failed = statuses.iter().filter(|s| **s == RecipientStatus::Failed).count() as u32;
        campaign
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(CampaignStatus::Processing.to_string(), "processing");
        assert_eq!("failed".parse::<CampaignStatus>().unwrap(), CampaignStatus::Failed);
        assert_eq!(
            serde_json::to_value(RecipientStatus::Sent).unwrap(),
            serde_json::json!("sent")
        );
        assert!(CampaignStatus::Completed.is_terminal());
        assert!(!CampaignStatus::Processing.is_terminal());
    }

    #[test]
    fn test_recipient_from_input_defaults_name_and_renders() {
        let input = RecipientInput {
            email: "  Ada@Example.com ".into(),
            custom_fields: BTreeMap::from([("company".to_string(), "Acme".to_string())]),
            ..Default::default()
        };

        let recipient = Recipient::from_input(input, "Hi {{name}}", "<p>{{company}}</p>");

        assert_eq!(recipient.email, "ada@example.com");
        assert_eq!(recipient.name, "ada");
        assert_eq!(recipient.personalized_subject.as_deref(), Some("Hi ada"));
        assert_eq!(recipient.personalized_body.as_deref(), Some("<p>Acme</p>"));
        assert_eq!(recipient.status, RecipientStatus::Pending);
    }

    #[test]
    fn test_recipient_keeps_supplied_personalization() {
        let input = RecipientInput {
            name: Some("Grace".into()),
            email: "grace@example.com".into(),
            personalized_subject: Some("Custom".into()),
            ..Default::default()
        };

        let recipient = Recipient::from_input(input, "Hi {{name}}", "Body {{name}}");

        assert_eq!(recipient.subject_or("x"), "Custom");
        assert_eq!(recipient.body_or("x"), "Body Grace");
    }

    #[test]
    fn test_declared_fields_only_counts_supplied_names() {
        let input = CreateCampaign {
            subject: "Hi {{name}}".into(),
            body: "b".into(),
            sender_email: "s@example.com".into(),
            recipient_data: vec![
                RecipientInput {
                    email: "a@x.com".into(),
                    ..Default::default()
                },
                RecipientInput {
                    email: "bad".into(),
                    custom_fields: BTreeMap::from([("city".to_string(), "Oslo".to_string())]),
                    ..Default::default()
                },
            ],
        };

        let known = input.declared_fields();
        assert!(known.contains("email"));
        assert!(known.contains("city"));
        assert!(!known.contains("name"));
    }

    #[test]
    fn test_sender_email_normalized_before_validation() {
        let input: CreateCampaign = serde_json::from_value(serde_json::json!({
            "subject": "Hi",
            "body": "<p>Hi</p>",
            "senderEmail": " Sender@Example.com ",
            "recipientData": [{ "email": "grace@example.com" }]
        }))
        .unwrap();
        assert_eq!(input.sender_email, "sender@example.com");
        assert!(input.validate().is_ok());

        let remove: RemoveEmailConfig =
            serde_json::from_value(serde_json::json!({ "senderEmail": "\tA@B.io " })).unwrap();
        assert_eq!(remove.sender_email, "a@b.io");
    }

    #[test]
    fn test_blank_recipient_email_fails_validation() {
        let input = CreateCampaign {
            subject: "Hi".into(),
            body: "b".into(),
            sender_email: "s@example.com".into(),
            recipient_data: vec![
                RecipientInput {
                    email: "a@x.com".into(),
                    ..Default::default()
                },
                RecipientInput {
                    email: "  ".into(),
                    ..Default::default()
                },
            ],
        };

        let errors = input.validate().unwrap_err();
        assert!(errors.errors().contains_key("recipient_data"));
        assert!(!errors.errors().contains_key("sender_email"));
    }

    #[test]
    fn test_apply_outcome_replaces_previous_outcome() {
        let mut campaign = campaign_with(&[RecipientStatus::Pending, RecipientStatus::Pending]);

        campaign
            .apply_outcome(0, RecipientStatus::Failed, Some("boom".into()))
            .unwrap();
        let stats = campaign.apply_outcome(0, RecipientStatus::Sent, None).unwrap();

        assert_eq!(stats, CampaignStats { total: 2, sent: 1, failed: 0 });
        assert_eq!(campaign.recipients[0].error, None);
        assert!(campaign.apply_outcome(5, RecipientStatus::Sent, None).is_err());
    }

    #[test]
    fn test_reset_recipients_subtracts_failures() {
        let mut campaign = campaign_with(&[
            RecipientStatus::Sent,
            RecipientStatus::Failed,
            RecipientStatus::Failed,
        ]);

        let unsent = campaign.unsent_indexes();
        assert_eq!(unsent, vec![1, 2]);

        let stats = campaign.reset_recipients(&unsent).unwrap();
        assert_eq!(stats, CampaignStats { total: 3, sent: 1, failed: 0 });
        assert_eq!(stats.pending(), 2);
    }

    #[test]
    fn test_filter_parsing() {
        let filter = CampaignFilter::try_from(CampaignQuery {
            status: Some("completed, failed".into()),
        })
        .unwrap();
        assert_eq!(filter, CampaignFilter::terminal());
        assert!(!filter.matches(CampaignStatus::Draft));

        let all = CampaignFilter::try_from(CampaignQuery { status: None }).unwrap();
        assert!(all.matches(CampaignStatus::Draft));

        let bad = CampaignFilter::try_from(CampaignQuery {
            status: Some("sent".into()),
        });
        assert!(matches!(bad, Err(CampaignError::Validation(_))));
    }

    #[test]
    fn test_overview_aggregates() {
        let mut done = campaign_with(&[RecipientStatus::Sent, RecipientStatus::Failed]);
        done.status = CampaignStatus::Failed;
        let draft = campaign_with(&[RecipientStatus::Pending]);

        let overview = CampaignOverview::from_campaigns([&done, &draft]);

        assert_eq!(overview.total, 2);
        assert_eq!(overview.failed, 1);
        assert_eq!(overview.draft, 1);
        assert_eq!(overview.total_recipients, 3);
        assert_eq!(overview.total_sent, 1);
        assert_eq!(overview.total_failed, 1);
    }

    #[test]
    fn test_add_email_config_debug_redacts_password() {
        let input = AddEmailConfig {
            sender_email: "s@example.com".into(),
            app_password: "abcd efgh ijkl mnop".into(),
        };
        let rendered = format!("{:?}", input);
        assert!(!rendered.contains("abcd"));
        assert!(rendered.contains("<redacted>"));
    }
}
