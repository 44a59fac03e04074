/*!
 * Notification Models
 *
 * Data models for the notification engine including:
 * - Notification types with their template bindings and message kinds
 * - The notification status state machine
 * - Domain references, recipients and template bindings
 * - The durable history record and its request/response DTOs
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// ENUMS
// ============================================================================

/// Delivery medium of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Email,
    InApp,
}

impl MessageKind {
    /// Convert to database value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::InApp => "IN_APP",
        }
    }

    /// Parse from database value
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "EMAIL" => Some(Self::Email),
            "IN_APP" => Some(Self::InApp),
            _ => None,
        }
    }
}

/// Notification type enum
///
/// Every value carries a template name and a message kind; the rules
/// engine switches on the value, the dispatcher only consults the
/// lookup methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    // Programme lifecycle
    ProgrammeCreated,
    ProgrammeDayOne,
    // Programme start reminders
    ProgrammeUpdatedWeek12,
    ProgrammeUpdatedWeek8,
    ProgrammeUpdatedWeek4,
    ProgrammeUpdatedWeek2,
    ProgrammeUpdatedWeek1,
    ProgrammeUpdatedWeek0,
    // End of training (period of grace)
    ProgrammePogMonth12,
    ProgrammePogMonth6,
    // Placement
    PlacementUpdatedWeek12,
    PlacementRollout2024Correction,
    // In-app programme notifications
    EPortfolio,
    IndemnityInsurance,
    Ltft,
    Deferral,
    Sponsorship,
    // Regulator
    GmcUpdated,
    GmcRejectedLo,
    GmcRejectedTrainee,
    // LTFT form transitions
    LtftApproved,
    LtftApprovedTpd,
    LtftSubmitted,
    LtftSubmittedTpd,
    LtftUnsubmitted,
    LtftWithdrawn,
    LtftUpdated,
}

impl NotificationType {
    /// All notification types, for iteration over the closed set
    pub fn all() -> &'static [NotificationType] {
        &[
            Self::ProgrammeCreated,
            Self::ProgrammeDayOne,
            Self::ProgrammeUpdatedWeek12,
            Self::ProgrammeUpdatedWeek8,
            Self::ProgrammeUpdatedWeek4,
            Self::ProgrammeUpdatedWeek2,
            Self::ProgrammeUpdatedWeek1,
            Self::ProgrammeUpdatedWeek0,
            Self::ProgrammePogMonth12,
            Self::ProgrammePogMonth6,
            Self::PlacementUpdatedWeek12,
            Self::PlacementRollout2024Correction,
            Self::EPortfolio,
            Self::IndemnityInsurance,
            Self::Ltft,
            Self::Deferral,
            Self::Sponsorship,
            Self::GmcUpdated,
            Self::GmcRejectedLo,
            Self::GmcRejectedTrainee,
            Self::LtftApproved,
            Self::LtftApprovedTpd,
            Self::LtftSubmitted,
            Self::LtftSubmittedTpd,
            Self::LtftUnsubmitted,
            Self::LtftWithdrawn,
            Self::LtftUpdated,
        ]
    }

    /// Convert to database value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProgrammeCreated => "PROGRAMME_CREATED",
            Self::ProgrammeDayOne => "PROGRAMME_DAY_ONE",
            Self::ProgrammeUpdatedWeek12 => "PROGRAMME_UPDATED_WEEK_12",
            Self::ProgrammeUpdatedWeek8 => "PROGRAMME_UPDATED_WEEK_8",
            Self::ProgrammeUpdatedWeek4 => "PROGRAMME_UPDATED_WEEK_4",
            Self::ProgrammeUpdatedWeek2 => "PROGRAMME_UPDATED_WEEK_2",
            Self::ProgrammeUpdatedWeek1 => "PROGRAMME_UPDATED_WEEK_1",
            Self::ProgrammeUpdatedWeek0 => "PROGRAMME_UPDATED_WEEK_0",
            Self::ProgrammePogMonth12 => "PROGRAMME_POG_MONTH_12",
            Self::ProgrammePogMonth6 => "PROGRAMME_POG_MONTH_6",
            Self::PlacementUpdatedWeek12 => "PLACEMENT_UPDATED_WEEK_12",
            Self::PlacementRollout2024Correction => "PLACEMENT_ROLLOUT_2024_CORRECTION",
            Self::EPortfolio => "E_PORTFOLIO",
            Self::IndemnityInsurance => "INDEMNITY_INSURANCE",
            Self::Ltft => "LTFT",
            Self::Deferral => "DEFERRAL",
            Self::Sponsorship => "SPONSORSHIP",
            Self::GmcUpdated => "GMC_UPDATED",
            Self::GmcRejectedLo => "GMC_REJECTED_LO",
            Self::GmcRejectedTrainee => "GMC_REJECTED_TRAINEE",
            Self::LtftApproved => "LTFT_APPROVED",
            Self::LtftApprovedTpd => "LTFT_APPROVED_TPD",
            Self::LtftSubmitted => "LTFT_SUBMITTED",
            Self::LtftSubmittedTpd => "LTFT_SUBMITTED_TPD",
            Self::LtftUnsubmitted => "LTFT_UNSUBMITTED",
            Self::LtftWithdrawn => "LTFT_WITHDRAWN",
            Self::LtftUpdated => "LTFT_UPDATED",
        }
    }

    /// Parse from database value
    pub fn from_str(s: &str) -> Option<Self> {
        Self::all()
            .iter()
            .find(|notification_type| notification_type.as_str() == s)
            .copied()
    }

    /// Name of the template family backing this notification type
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::ProgrammeCreated => "programme-created",
            Self::ProgrammeDayOne => "programme-day-one",
            Self::ProgrammeUpdatedWeek12 => "programme-updated-week-12",
            Self::ProgrammeUpdatedWeek8 => "programme-updated-week-8",
            Self::ProgrammeUpdatedWeek4 => "programme-updated-week-4",
            Self::ProgrammeUpdatedWeek2 => "programme-updated-week-2",
            Self::ProgrammeUpdatedWeek1 => "programme-updated-week-1",
            Self::ProgrammeUpdatedWeek0 => "programme-updated-week-0",
            Self::ProgrammePogMonth12 => "programme-pog-month-12",
            Self::ProgrammePogMonth6 => "programme-pog-month-6",
            Self::PlacementUpdatedWeek12 => "placement-updated-week-12",
            Self::PlacementRollout2024Correction => "placement-rollout-2024-correction",
            Self::EPortfolio => "e-portfolio",
            Self::IndemnityInsurance => "indemnity-insurance",
            Self::Ltft => "ltft",
            Self::Deferral => "deferral",
            Self::Sponsorship => "sponsorship",
            Self::GmcUpdated => "gmc-updated",
            Self::GmcRejectedLo => "gmc-rejected-lo",
            Self::GmcRejectedTrainee => "gmc-rejected-trainee",
            Self::LtftApproved => "ltft-approved",
            Self::LtftApprovedTpd => "ltft-approved-tpd",
            Self::LtftSubmitted => "ltft-submitted",
            Self::LtftSubmittedTpd => "ltft-submitted-tpd",
            Self::LtftUnsubmitted => "ltft-unsubmitted",
            Self::LtftWithdrawn => "ltft-withdrawn",
            Self::LtftUpdated => "ltft-updated",
        }
    }

    /// Delivery medium for this notification type
    pub fn message_kind(&self) -> MessageKind {
        match self {
            Self::EPortfolio
            | Self::IndemnityInsurance
            | Self::Ltft
            | Self::Deferral
            | Self::Sponsorship => MessageKind::InApp,
            _ => MessageKind::Email,
        }
    }

    /// Whether this type is delivered by email
    pub fn is_email(&self) -> bool {
        self.message_kind() == MessageKind::Email
    }

    /// Whether this type is delivered in-app
    pub fn is_in_app(&self) -> bool {
        self.message_kind() == MessageKind::InApp
    }

    /// The programme start reminder for a given weeks-before milestone
    pub fn programme_week(weeks: u32) -> Option<Self> {
        match weeks {
            12 => Some(Self::ProgrammeUpdatedWeek12),
            8 => Some(Self::ProgrammeUpdatedWeek8),
            4 => Some(Self::ProgrammeUpdatedWeek4),
            2 => Some(Self::ProgrammeUpdatedWeek2),
            1 => Some(Self::ProgrammeUpdatedWeek1),
            0 => Some(Self::ProgrammeUpdatedWeek0),
            _ => None,
        }
    }
}

/// Notification status enum
///
/// Email records move SCHEDULED -> SENT | FAILED; in-app records move
/// SCHEDULED -> UNREAD and then between the read states. DELETED is
/// reachable from everywhere (deletion cascades).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Scheduled,
    Sent,
    Failed,
    Unread,
    Read,
    Archived,
    Deleted,
}

impl NotificationStatus {
    /// Convert to database value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Unread => "UNREAD",
            Self::Read => "READ",
            Self::Archived => "ARCHIVED",
            Self::Deleted => "DELETED",
        }
    }

    /// Parse from database value
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "SCHEDULED" => Some(Self::Scheduled),
            "SENT" => Some(Self::Sent),
            "FAILED" => Some(Self::Failed),
            "UNREAD" => Some(Self::Unread),
            "READ" => Some(Self::Read),
            "ARCHIVED" => Some(Self::Archived),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `target` is legal for the
    /// given message kind. Same-status transitions are allowed so that
    /// status updates are idempotent.
    pub fn can_transition(&self, target: NotificationStatus, kind: MessageKind) -> bool {
        if *self == target {
            return true;
        }
        match kind {
            MessageKind::Email => matches!(
                (self, target),
                (Self::Scheduled, Self::Sent)
                    | (Self::Scheduled, Self::Failed)
                    | (Self::Scheduled, Self::Deleted)
                    | (Self::Sent, Self::Deleted)
                    | (Self::Failed, Self::Deleted)
            ),
            MessageKind::InApp => matches!(
                (self, target),
                (Self::Scheduled, Self::Unread)
                    | (Self::Scheduled, Self::Deleted)
                    | (Self::Unread, Self::Read)
                    | (Self::Unread, Self::Archived)
                    | (Self::Unread, Self::Deleted)
                    | (Self::Read, Self::Unread)
                    | (Self::Read, Self::Archived)
                    | (Self::Read, Self::Deleted)
                    | (Self::Archived, Self::Deleted)
            ),
        }
    }

    /// Whether the record's reference, type, recipient and template are
    /// frozen (no further content mutation)
    pub fn is_content_frozen(&self) -> bool {
        !matches!(self, Self::Scheduled)
    }
}

/// The kind of domain object a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    ProgrammeMembership,
    Placement,
    LtftForm,
}

impl ReferenceKind {
    /// Convert to database value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProgrammeMembership => "PROGRAMME_MEMBERSHIP",
            Self::Placement => "PLACEMENT",
            Self::LtftForm => "LTFT",
        }
    }

    /// Parse from database value
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PROGRAMME_MEMBERSHIP" => Some(Self::ProgrammeMembership),
            "PLACEMENT" => Some(Self::Placement),
            "LTFT" => Some(Self::LtftForm),
            _ => None,
        }
    }
}

/// Identifies the domain object a notification is about; used for
/// de-duplication and deletion cascades
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    pub id: String,
}

impl Reference {
    pub fn programme_membership(id: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::ProgrammeMembership,
            id: id.into(),
        }
    }

    pub fn placement(id: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::Placement,
            id: id.into(),
        }
    }

    pub fn ltft_form(id: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::LtftForm,
            id: id.into(),
        }
    }
}

/// Target of a notification: the trainee, the medium and the contact
/// string (an email address for email, the trainee id for in-app)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub trainee_id: String,
    pub message_kind: MessageKind,
    pub contact: Option<String>,
}

/// A named, versioned template plus the resolved variable map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateBinding {
    pub name: String,
    pub version: String,
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl TemplateBinding {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            variables: serde_json::Map::new(),
        }
    }

    /// Insert a variable, returning self for chained construction
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// DATABASE MODELS
// ============================================================================

/// Notification history database model
///
/// One row per attempted delivery. `version` backs optimistic
/// concurrency on status updates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct History {
    pub id: Uuid,
    pub trainee_id: String,
    pub reference_kind: Option<String>,
    pub reference_id: Option<String>,
    pub notification_type: String,
    pub message_kind: String,
    pub contact: Option<String>,
    pub template_name: String,
    pub template_version: String,
    pub variables: sqlx::types::JsonValue,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub status: String,
    pub status_detail: Option<String>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub attachments: Option<sqlx::types::JsonValue>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl History {
    /// Build a SCHEDULED row for a future email dispatch
    pub fn scheduled(
        trainee_id: &str,
        reference: Option<&Reference>,
        notification_type: NotificationType,
        contact: Option<String>,
        template: &TemplateBinding,
        fire_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            trainee_id: trainee_id.to_string(),
            reference_kind: reference.map(|r| r.kind.as_str().to_string()),
            reference_id: reference.map(|r| r.id.clone()),
            notification_type: notification_type.as_str().to_string(),
            message_kind: notification_type.message_kind().as_str().to_string(),
            contact,
            template_name: template.name.clone(),
            template_version: template.version.clone(),
            variables: serde_json::Value::Object(template.variables.clone()),
            sent_at: fire_at,
            read_at: None,
            status: NotificationStatus::Scheduled.as_str().to_string(),
            status_detail: None,
            last_retry_at: None,
            attachments: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build an UNREAD in-app row, delivered on insert
    pub fn unread_in_app(
        trainee_id: &str,
        reference: Option<&Reference>,
        notification_type: NotificationType,
        template: &TemplateBinding,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            trainee_id: trainee_id.to_string(),
            reference_kind: reference.map(|r| r.kind.as_str().to_string()),
            reference_id: reference.map(|r| r.id.clone()),
            notification_type: notification_type.as_str().to_string(),
            message_kind: MessageKind::InApp.as_str().to_string(),
            contact: Some(trainee_id.to_string()),
            template_name: template.name.clone(),
            template_version: template.version.clone(),
            variables: serde_json::Value::Object(template.variables.clone()),
            sent_at: now,
            read_at: None,
            status: NotificationStatus::Unread.as_str().to_string(),
            status_detail: None,
            last_retry_at: None,
            attachments: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Typed notification type; None for unrecognised stored values
    pub fn notification_type(&self) -> Option<NotificationType> {
        NotificationType::from_str(&self.notification_type)
    }

    /// Typed status; None for unrecognised stored values
    pub fn status(&self) -> Option<NotificationStatus> {
        NotificationStatus::from_str(&self.status)
    }

    /// Typed message kind; None for unrecognised stored values
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_str(&self.message_kind)
    }

    /// Typed reference, when both columns are populated
    pub fn reference(&self) -> Option<Reference> {
        let kind = ReferenceKind::from_str(self.reference_kind.as_deref()?)?;
        Some(Reference {
            kind,
            id: self.reference_id.clone()?,
        })
    }

    /// Convert database model to response
    pub fn to_response(&self) -> HistoryResponse {
        HistoryResponse {
            id: self.id,
            trainee_id: self.trainee_id.clone(),
            reference: self.reference(),
            notification_type: self.notification_type.clone(),
            message_kind: self.message_kind.clone(),
            contact: self.contact.clone(),
            template_name: self.template_name.clone(),
            template_version: self.template_version.clone(),
            sent_at: self.sent_at,
            read_at: self.read_at,
            status: self.status.clone(),
            status_detail: self.status_detail.clone(),
            last_retry_at: self.last_retry_at,
        }
    }
}

// ============================================================================
// REQUEST / RESPONSE MODELS
// ============================================================================

/// History record response model (admin API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub id: Uuid,
    pub trainee_id: String,
    pub reference: Option<Reference>,
    pub notification_type: String,
    pub message_kind: String,
    pub contact: Option<String>,
    pub template_name: String,
    pub template_version: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub status: String,
    pub status_detail: Option<String>,
    pub last_retry_at: Option<DateTime<Utc>>,
}

/// Status update request (admin API, in-app read states)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    #[validate(length(min = 1, max = 20, message = "Status is required"))]
    pub status: String,

    #[validate(length(max = 255, message = "Status detail too long"))]
    pub status_detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_type_round_trips_through_strings() {
        for notification_type in NotificationType::all() {
            let parsed = NotificationType::from_str(notification_type.as_str());
            assert_eq!(parsed, Some(*notification_type));
        }
    }

    #[test]
    fn test_in_app_types_are_exactly_the_programme_five() {
        let in_app: Vec<_> = NotificationType::all()
            .iter()
            .filter(|t| t.is_in_app())
            .collect();
        assert_eq!(in_app.len(), 5);
        assert!(in_app.contains(&&NotificationType::EPortfolio));
        assert!(in_app.contains(&&NotificationType::IndemnityInsurance));
        assert!(in_app.contains(&&NotificationType::Ltft));
        assert!(in_app.contains(&&NotificationType::Deferral));
        assert!(in_app.contains(&&NotificationType::Sponsorship));
    }

    #[test]
    fn test_programme_week_lookup() {
        assert_eq!(
            NotificationType::programme_week(12),
            Some(NotificationType::ProgrammeUpdatedWeek12)
        );
        assert_eq!(
            NotificationType::programme_week(0),
            Some(NotificationType::ProgrammeUpdatedWeek0)
        );
        assert_eq!(NotificationType::programme_week(3), None);
    }

    #[test]
    fn test_email_status_machine() {
        use NotificationStatus::*;

        assert!(Scheduled.can_transition(Sent, MessageKind::Email));
        assert!(Scheduled.can_transition(Failed, MessageKind::Email));
        assert!(Sent.can_transition(Deleted, MessageKind::Email));
        assert!(Failed.can_transition(Deleted, MessageKind::Email));

        // Read states are for in-app records only
        assert!(!Sent.can_transition(Read, MessageKind::Email));
        assert!(!Sent.can_transition(Unread, MessageKind::Email));
        assert!(!Sent.can_transition(Archived, MessageKind::Email));
        // FAILED is terminal except for deletion
        assert!(!Failed.can_transition(Sent, MessageKind::Email));
    }

    #[test]
    fn test_in_app_status_machine() {
        use NotificationStatus::*;

        // In-app goes SCHEDULED -> UNREAD directly
        assert!(Scheduled.can_transition(Unread, MessageKind::InApp));
        assert!(!Scheduled.can_transition(Sent, MessageKind::InApp));
        assert!(!Scheduled.can_transition(Failed, MessageKind::InApp));

        assert!(Unread.can_transition(Read, MessageKind::InApp));
        assert!(Read.can_transition(Unread, MessageKind::InApp));
        assert!(Read.can_transition(Archived, MessageKind::InApp));
        assert!(Archived.can_transition(Deleted, MessageKind::InApp));
        assert!(!Archived.can_transition(Unread, MessageKind::InApp));
    }

    #[test]
    fn test_same_status_transition_is_idempotent() {
        use NotificationStatus::*;

        assert!(Sent.can_transition(Sent, MessageKind::Email));
        assert!(Unread.can_transition(Unread, MessageKind::InApp));
    }

    #[test]
    fn test_content_frozen_after_terminal_states() {
        assert!(!NotificationStatus::Scheduled.is_content_frozen());
        assert!(NotificationStatus::Sent.is_content_frozen());
        assert!(NotificationStatus::Failed.is_content_frozen());
    }

    #[test]
    fn test_history_ids_are_time_ordered() {
        let template = TemplateBinding::new("programme-created", "v1.0.0");
        let first = History::scheduled(
            "40",
            None,
            NotificationType::ProgrammeCreated,
            Some("t@example.com".to_string()),
            &template,
            Utc::now(),
        );
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = History::scheduled(
            "40",
            None,
            NotificationType::ProgrammeCreated,
            Some("t@example.com".to_string()),
            &template,
            Utc::now(),
        );
        assert!(first.id < second.id);
    }

    #[test]
    fn test_template_binding_builder() {
        let binding = TemplateBinding::new("ltft", "v1.0.0")
            .with("programmeName", "Cardiology ST3")
            .with("isValidGmc", true);

        assert_eq!(binding.variables["programmeName"], "Cardiology ST3");
        assert_eq!(binding.variables["isValidGmc"], true);
    }

    #[test]
    fn test_reference_round_trip() {
        let template = TemplateBinding::new("programme-created", "v1.0.0");
        let reference = Reference::programme_membership("pm-123");
        let row = History::scheduled(
            "40",
            Some(&reference),
            NotificationType::ProgrammeCreated,
            None,
            &template,
            Utc::now(),
        );

        assert_eq!(row.reference(), Some(reference));
    }
}
