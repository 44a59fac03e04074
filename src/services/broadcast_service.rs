/*!
 * Broadcast Publisher Service
 *
 * Emits a lifecycle event to the configured topic every time a history
 * record is created, changes status, or is deleted. Transport errors
 * are swallowed and logged: the local history row is the source of
 * truth, and a failed broadcast must never fail the write that caused
 * it.
 */

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::BroadcastConfig;
use crate::models::{History, NotificationStatus};

/// Suffix marking a FIFO topic; such topics need a message group id so
/// one record's lifecycle events stay ordered
const FIFO_SUFFIX: &str = ".fifo";

/// Broadcast publisher
#[derive(Clone)]
pub struct BroadcastService {
    client: reqwest::Client,
    topic: Option<String>,
    event_attribute: Option<String>,
}

impl BroadcastService {
    /// Create a new broadcast publisher; a missing topic yields a no-op
    /// publisher
    pub fn new(client: reqwest::Client, config: &BroadcastConfig) -> Self {
        if config.topic.is_none() {
            warn!("Broadcast topic not configured - lifecycle events will not be published");
        }

        Self {
            client,
            topic: config.topic.clone(),
            event_attribute: config.event_attribute.clone(),
        }
    }

    /// Whether a publisher target is configured
    pub fn is_enabled(&self) -> bool {
        self.topic.is_some()
    }

    /// Publish the post-state of a created or updated history record.
    /// `subject` is populated for in-app records only.
    pub async fn publish_changed(&self, history: &History, subject: Option<String>) {
        let mut payload = json!({
            "id": history.id,
            "tisReference": history.reference(),
            "type": history.notification_type,
            "recipient": {
                "id": history.trainee_id,
                "type": history.message_kind,
                "contact": history.contact,
            },
            "template": {
                "name": history.template_name,
                "version": history.template_version,
                "variables": history.variables,
            },
            "sentAt": history.sent_at,
            "readAt": history.read_at,
            "status": history.status,
            "statusDetail": history.status_detail,
            "lastRetry": history.last_retry_at,
        });

        if let Some(subject) = subject {
            payload["subject"] = json!(subject);
        }

        self.publish(history.id, payload).await;
    }

    /// Publish a deletion: all fields null except the id, a DELETED
    /// status and the deletion time
    pub async fn publish_deleted(&self, history_id: Uuid) {
        let payload = json!({
            "id": history_id,
            "tisReference": null,
            "type": null,
            "recipient": null,
            "template": null,
            "sentAt": Utc::now(),
            "readAt": null,
            "status": NotificationStatus::Deleted.as_str(),
            "statusDetail": null,
            "lastRetry": null,
        });

        self.publish(history_id, payload).await;
    }

    async fn publish(&self, history_id: Uuid, payload: serde_json::Value) {
        let Some(topic) = &self.topic else {
            return;
        };

        let mut request = self.client.post(topic).json(&payload);

        if topic.ends_with(FIFO_SUFFIX) {
            request = request.header("message-group-id", Self::message_group_id(history_id));
        }

        if let Some(event_attribute) = &self.event_attribute {
            request = request.header("event-type", event_attribute);
        }

        match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(_) => {
                debug!("Broadcast published for history {}", history_id);
            }
            Err(e) => {
                // History remains authoritative; the failure is logged and dropped
                warn!("Broadcast failed for history {}: {}", history_id, e);
            }
        }
    }

    /// Message group id derived from the history id
    fn message_group_id(history_id: Uuid) -> String {
        format!("notification_event_{}", history_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_group_id_embeds_history_id() {
        let id = Uuid::now_v7();
        let group = BroadcastService::message_group_id(id);
        assert_eq!(group, format!("notification_event_{}", id));
    }

    #[test]
    fn test_unconfigured_publisher_is_noop() {
        let service = BroadcastService::new(
            reqwest::Client::new(),
            &BroadcastConfig {
                topic: None,
                event_attribute: None,
            },
        );
        assert!(!service.is_enabled());
    }

    #[test]
    fn test_fifo_suffix_detection() {
        assert!("notification-events.fifo".ends_with(FIFO_SUFFIX));
        assert!(!"notification-events".ends_with(FIFO_SUFFIX));
    }
}
