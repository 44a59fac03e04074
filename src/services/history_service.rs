/*!
 * History Store Service
 *
 * Persists notification history records and enforces the status state
 * machine. Every successful save or status change publishes exactly one
 * lifecycle event with the post-state; deletes publish the
 * delete-variant with just the id.
 *
 * Status updates use optimistic concurrency: a version column guards
 * the row, and a conflicting update re-reads and re-applies.
 */

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::models::{History, MessageKind, NotificationStatus, NotificationType, Reference};
use crate::services::broadcast_service::BroadcastService;
use crate::services::template_service::TemplateService;
use crate::utils::DispatchError;

/// Retries for optimistic-concurrency conflicts on one status update
const MAX_VERSION_CONFLICTS: u32 = 3;

const HISTORY_COLUMNS: &str = r#"
    id, trainee_id, reference_kind, reference_id, notification_type,
    message_kind, contact, template_name, template_version, variables,
    sent_at, read_at, status, status_detail, last_retry_at, attachments,
    version, created_at, updated_at
"#;

/// History store
#[derive(Clone)]
pub struct HistoryService {
    pool: PgPool,
    broadcast: BroadcastService,
    templates: TemplateService,
}

impl HistoryService {
    pub fn new(pool: PgPool, broadcast: BroadcastService, templates: TemplateService) -> Self {
        Self {
            pool,
            broadcast,
            templates,
        }
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Insert or replace a history record and publish the post-state
    pub async fn save(&self, history: &History) -> Result<History, DispatchError> {
        let saved = sqlx::query_as::<_, History>(&format!(
            r#"
            INSERT INTO notification_history (
                id, trainee_id, reference_kind, reference_id, notification_type,
                message_kind, contact, template_name, template_version, variables,
                sent_at, read_at, status, status_detail, last_retry_at, attachments,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (id) DO UPDATE SET
                contact = EXCLUDED.contact,
                template_name = EXCLUDED.template_name,
                template_version = EXCLUDED.template_version,
                variables = EXCLUDED.variables,
                sent_at = EXCLUDED.sent_at,
                read_at = EXCLUDED.read_at,
                status = EXCLUDED.status,
                status_detail = EXCLUDED.status_detail,
                last_retry_at = EXCLUDED.last_retry_at,
                attachments = EXCLUDED.attachments,
                version = notification_history.version + 1,
                updated_at = NOW()
            RETURNING {}
            "#,
            HISTORY_COLUMNS
        ))
        .bind(history.id)
        .bind(&history.trainee_id)
        .bind(&history.reference_kind)
        .bind(&history.reference_id)
        .bind(&history.notification_type)
        .bind(&history.message_kind)
        .bind(&history.contact)
        .bind(&history.template_name)
        .bind(&history.template_version)
        .bind(&history.variables)
        .bind(history.sent_at)
        .bind(history.read_at)
        .bind(&history.status)
        .bind(&history.status_detail)
        .bind(history.last_retry_at)
        .bind(&history.attachments)
        .bind(history.version)
        .bind(history.created_at)
        .bind(history.updated_at)
        .fetch_one(&self.pool)
        .await?;

        self.publish_changed(&saved).await;

        Ok(saved)
    }

    /// Insert a history row inside an existing transaction.
    ///
    /// The caller owns the commit and MUST publish the post-state via
    /// [`publish_changed`] afterwards; this keeps trigger and history
    /// writes atomic without publishing before the commit.
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Postgres>,
        history: &History,
    ) -> Result<History, sqlx::Error> {
        sqlx::query_as::<_, History>(&format!(
            r#"
            INSERT INTO notification_history (
                id, trainee_id, reference_kind, reference_id, notification_type,
                message_kind, contact, template_name, template_version, variables,
                sent_at, read_at, status, status_detail, last_retry_at, attachments,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {}
            "#,
            HISTORY_COLUMNS
        ))
        .bind(history.id)
        .bind(&history.trainee_id)
        .bind(&history.reference_kind)
        .bind(&history.reference_id)
        .bind(&history.notification_type)
        .bind(&history.message_kind)
        .bind(&history.contact)
        .bind(&history.template_name)
        .bind(&history.template_version)
        .bind(&history.variables)
        .bind(history.sent_at)
        .bind(history.read_at)
        .bind(&history.status)
        .bind(&history.status_detail)
        .bind(history.last_retry_at)
        .bind(&history.attachments)
        .bind(history.version)
        .bind(history.created_at)
        .bind(history.updated_at)
        .fetch_one(&mut **tx)
        .await
    }

    /// Transition a record to a new status, enforcing the state machine.
    ///
    /// Same-status updates are idempotent no-ops and publish nothing.
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: NotificationStatus,
        detail: Option<String>,
    ) -> Result<History, DispatchError> {
        for _ in 0..MAX_VERSION_CONFLICTS {
            let current = self
                .get(id)
                .await?
                .ok_or_else(|| DispatchError::NotFound(format!("History record {}", id)))?;

            let current_status = current.status().ok_or_else(|| {
                DispatchError::InvalidTransition(format!(
                    "History record {} has unknown status {}",
                    id, current.status
                ))
            })?;
            let kind = current.message_kind().ok_or_else(|| {
                DispatchError::InvalidTransition(format!(
                    "History record {} has unknown message kind {}",
                    id, current.message_kind
                ))
            })?;

            if !current_status.can_transition(new_status, kind) {
                return Err(DispatchError::InvalidTransition(format!(
                    "{} -> {} is not valid for {} notifications",
                    current_status.as_str(),
                    new_status.as_str(),
                    kind.as_str()
                )));
            }

            if current_status == new_status {
                debug!("History {} already {}; no-op", id, new_status.as_str());
                return Ok(current);
            }

            let read_at = if new_status == NotificationStatus::Read {
                Some(Utc::now())
            } else {
                current.read_at
            };

            let updated = sqlx::query_as::<_, History>(&format!(
                r#"
                UPDATE notification_history
                SET status = $3,
                    status_detail = $4,
                    read_at = $5,
                    version = version + 1,
                    updated_at = NOW()
                WHERE id = $1 AND version = $2
                RETURNING {}
                "#,
                HISTORY_COLUMNS
            ))
            .bind(id)
            .bind(current.version)
            .bind(new_status.as_str())
            .bind(&detail)
            .bind(read_at)
            .fetch_optional(&self.pool)
            .await?;

            match updated {
                Some(row) => {
                    self.publish_changed(&row).await;
                    return Ok(row);
                }
                None => {
                    // Version conflict; re-read and re-apply
                    debug!("Version conflict updating history {}; retrying", id);
                }
            }
        }

        Err(DispatchError::TransportTransient(format!(
            "Gave up updating history {} after repeated version conflicts",
            id
        )))
    }

    /// Stamp a retry attempt on a record
    pub async fn mark_retry(&self, id: Uuid) -> Result<History, DispatchError> {
        let updated = sqlx::query_as::<_, History>(&format!(
            r#"
            UPDATE notification_history
            SET last_retry_at = NOW(),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            HISTORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("History record {}", id)))?;

        self.publish_changed(&updated).await;

        Ok(updated)
    }

    /// Delete one of a trainee's records; publishes the delete-variant
    pub async fn delete_by_trainee_and_id(
        &self,
        trainee_id: &str,
        id: Uuid,
    ) -> Result<bool, DispatchError> {
        let deleted = sqlx::query_scalar::<_, Uuid>(
            r#"
            DELETE FROM notification_history
            WHERE id = $1 AND trainee_id = $2
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(trainee_id)
        .fetch_optional(&self.pool)
        .await?;

        match deleted {
            Some(id) => {
                self.broadcast.publish_deleted(id).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Mark every non-terminal record for a reference DELETED
    /// (domain-object deletion cascade)
    pub async fn mark_reference_deleted(
        &self,
        reference: &Reference,
    ) -> Result<u64, DispatchError> {
        let rows = sqlx::query_as::<_, History>(&format!(
            r#"
            UPDATE notification_history
            SET status = 'DELETED',
                version = version + 1,
                updated_at = NOW()
            WHERE reference_kind = $1
              AND reference_id = $2
              AND status NOT IN ('SENT', 'FAILED', 'DELETED')
            RETURNING {}
            "#,
            HISTORY_COLUMNS
        ))
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            self.publish_changed(row).await;
        }

        Ok(rows.len() as u64)
    }

    /// Hard-delete every record referencing a form
    /// (form-deletion cascade); publishes one delete per record
    pub async fn delete_by_reference(&self, reference: &Reference) -> Result<u64, DispatchError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            DELETE FROM notification_history
            WHERE reference_kind = $1 AND reference_id = $2
            RETURNING id
            "#,
        )
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .fetch_all(&self.pool)
        .await?;

        for id in &ids {
            self.broadcast.publish_deleted(*id).await;
        }

        Ok(ids.len() as u64)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Fetch one record by id
    pub async fn get(&self, id: Uuid) -> Result<Option<History>, DispatchError> {
        let history = sqlx::query_as::<_, History>(&format!(
            r#"SELECT {} FROM notification_history WHERE id = $1"#,
            HISTORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(history)
    }

    /// All of a trainee's records, newest first
    pub async fn find_by_trainee(&self, trainee_id: &str) -> Result<Vec<History>, DispatchError> {
        let rows = sqlx::query_as::<_, History>(&format!(
            r#"
            SELECT {}
            FROM notification_history
            WHERE trainee_id = $1
            ORDER BY sent_at DESC
            "#,
            HISTORY_COLUMNS
        ))
        .bind(trainee_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// A trainee's records for one reference and notification type
    pub async fn find_by_trainee_and_ref(
        &self,
        trainee_id: &str,
        reference: &Reference,
        notification_type: NotificationType,
    ) -> Result<Vec<History>, DispatchError> {
        let rows = sqlx::query_as::<_, History>(&format!(
            r#"
            SELECT {}
            FROM notification_history
            WHERE trainee_id = $1
              AND reference_kind = $2
              AND reference_id = $3
              AND notification_type = $4
            ORDER BY sent_at DESC
            "#,
            HISTORY_COLUMNS
        ))
        .bind(trainee_id)
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .bind(notification_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// The most recent record in a given status for (trainee, ref, type)
    pub async fn find_latest(
        &self,
        trainee_id: &str,
        reference: &Reference,
        notification_type: NotificationType,
        status: NotificationStatus,
    ) -> Result<Option<History>, DispatchError> {
        let row = sqlx::query_as::<_, History>(&format!(
            r#"
            SELECT {}
            FROM notification_history
            WHERE trainee_id = $1
              AND reference_kind = $2
              AND reference_id = $3
              AND notification_type = $4
              AND status = $5
            ORDER BY sent_at DESC
            LIMIT 1
            "#,
            HISTORY_COLUMNS
        ))
        .bind(trainee_id)
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .bind(notification_type.as_str())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// A trainee's FAILED records
    pub async fn find_failed_by_trainee(
        &self,
        trainee_id: &str,
    ) -> Result<Vec<History>, DispatchError> {
        let rows = sqlx::query_as::<_, History>(&format!(
            r#"
            SELECT {}
            FROM notification_history
            WHERE trainee_id = $1 AND status = 'FAILED'
            ORDER BY sent_at DESC
            "#,
            HISTORY_COLUMNS
        ))
        .bind(trainee_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Any live in-app record for (trainee, ref, type); backs the
    /// uniqueness rule for in-app notifications
    pub async fn find_live_in_app(
        &self,
        trainee_id: &str,
        reference: &Reference,
        notification_type: NotificationType,
    ) -> Result<Option<History>, DispatchError> {
        let row = sqlx::query_as::<_, History>(&format!(
            r#"
            SELECT {}
            FROM notification_history
            WHERE trainee_id = $1
              AND reference_kind = $2
              AND reference_id = $3
              AND notification_type = $4
              AND status IN ('UNREAD', 'READ', 'ARCHIVED')
            LIMIT 1
            "#,
            HISTORY_COLUMNS
        ))
        .bind(trainee_id)
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .bind(notification_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ========================================================================
    // BROADCAST
    // ========================================================================

    /// Publish the delete-variant for a record that no longer exists
    pub async fn broadcast_deleted(&self, id: Uuid) {
        self.broadcast.publish_deleted(id).await;
    }

    /// Publish the post-state of a record; in-app records carry a
    /// subject rebuilt from their template
    pub async fn publish_changed(&self, history: &History) {
        let subject = if history.message_kind() == Some(MessageKind::InApp) {
            let variables = history
                .variables
                .as_object()
                .cloned()
                .unwrap_or_default();
            self.templates.render_subject(
                MessageKind::InApp,
                &history.template_name,
                &history.template_version,
                &variables,
            )
        } else {
            None
        };

        self.broadcast.publish_changed(history, subject).await;
    }
}
