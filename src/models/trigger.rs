/*!
 * Scheduled Trigger Models
 *
 * Durable trigger rows for the scheduler, the payload carried to fire
 * time, and the process-wide lock record used to coordinate replicas.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::notification::{NotificationType, Recipient, Reference, TemplateBinding};

/// Durable trigger row
///
/// At most one active trigger exists per `job_id`; rescheduling
/// replaces the row. A claimed row carries a lease (`lock_owner`,
/// `lock_until`); only the lease holder may dispatch it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduledTrigger {
    pub job_id: String,
    pub fire_at: DateTime<Utc>,
    pub payload: sqlx::types::JsonValue,
    /// The SCHEDULED history row materialised alongside this trigger
    pub history_id: Uuid,
    /// Dispatch attempts so far; drives retry back-off
    pub attempt: i32,
    pub lock_owner: Option<String>,
    pub lock_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTrigger {
    /// Deserialise the trigger payload
    pub fn payload(&self) -> Result<TriggerPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Everything the dispatch worker needs at fire time, resolved at
/// scheduling time so a fire can proceed without re-planning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub notification_type: NotificationType,
    pub recipient: Recipient,
    #[serde(default)]
    pub reference: Option<Reference>,
    pub template: TemplateBinding,
}

/// Process-wide lock record; write-once-per-tenure with an expiry that
/// must exceed the worst-case holder runtime
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessLock {
    pub name: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::MessageKind;

    #[test]
    fn test_trigger_payload_round_trips_through_json() {
        let payload = TriggerPayload {
            notification_type: NotificationType::ProgrammeCreated,
            recipient: Recipient {
                trainee_id: "40".to_string(),
                message_kind: MessageKind::Email,
                contact: Some("trainee@example.com".to_string()),
            },
            reference: Some(Reference::programme_membership("pm-1")),
            template: TemplateBinding::new("programme-created", "v1.0.0")
                .with("programmeName", "General Practice"),
        };

        let value = serde_json::to_value(&payload).unwrap();
        let trigger = ScheduledTrigger {
            job_id: "PROGRAMME_CREATED-pm-1".to_string(),
            fire_at: Utc::now(),
            payload: value,
            history_id: Uuid::now_v7(),
            attempt: 0,
            lock_owner: None,
            lock_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let decoded = trigger.payload().unwrap();
        assert_eq!(decoded.notification_type, NotificationType::ProgrammeCreated);
        assert_eq!(decoded.recipient.trainee_id, "40");
        assert_eq!(decoded.template.variables["programmeName"], "General Practice");
    }
}
