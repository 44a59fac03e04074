/*!
 * In-App Notifier Service
 *
 * Creates unread in-app records directly in the history store; there is
 * no scheduled dispatch for in-app notifications. Uniqueness holds per
 * (trainee, reference, type): a live record suppresses re-creation.
 */

use serde_json::Map;
use tracing::{debug, info};

use crate::models::{History, NotificationType, Reference, TemplateBinding};
use crate::services::history_service::HistoryService;
use crate::utils::DispatchError;

/// Detail recorded on rows whose real delivery was suppressed
pub const JUST_LOGGED_DETAIL: &str = "just logged";

/// In-app notifier
#[derive(Clone)]
pub struct InAppService {
    history: HistoryService,
}

impl InAppService {
    pub fn new(history: HistoryService) -> Self {
        Self { history }
    }

    /// Create an unread in-app record unless a live one already exists
    /// for (trainee, reference, type).
    ///
    /// Returns the created record, or None when suppressed by
    /// uniqueness. A `just_log` creation still writes the row so the
    /// audit trail matches the email path, with the suppression detail.
    pub async fn create_in_app(
        &self,
        trainee_id: &str,
        reference: &Reference,
        notification_type: NotificationType,
        version: &str,
        variables: Map<String, serde_json::Value>,
        just_log: bool,
    ) -> Result<Option<History>, DispatchError> {
        let existing = self
            .history
            .find_live_in_app(trainee_id, reference, notification_type)
            .await?;

        if let Some(existing) = existing {
            debug!(
                "Skipping {} for trainee {} ref {}: record {} already {}",
                notification_type.as_str(),
                trainee_id,
                reference.id,
                existing.id,
                existing.status
            );
            return Ok(None);
        }

        let mut template = TemplateBinding::new(notification_type.template_name(), version);
        template.variables = variables;

        let mut row =
            History::unread_in_app(trainee_id, Some(reference), notification_type, &template);
        if just_log {
            row.status_detail = Some(JUST_LOGGED_DETAIL.to_string());
        }

        let saved = self.history.save(&row).await?;

        info!(
            "Created in-app {} for trainee {} ref {} (just_log: {})",
            notification_type.as_str(),
            trainee_id,
            reference.id,
            just_log
        );

        Ok(Some(saved))
    }
}
