/*!
 * Scheduler Service
 *
 * Durable trigger scheduling with at-most-once firing across replicas:
 * - Triggers persist in the same store as history, co-located with the
 *   SCHEDULED row they represent and written in one transaction.
 * - `schedule` is idempotent by job id; rescheduling replaces.
 * - A process-wide scan lock elects the replica that polls for due
 *   triggers; each due trigger is claimed with a lease predicate
 *   ("lock_until < now") so a job in flight on another replica is
 *   never picked up twice.
 * - Fired jobs run on a bounded worker pool. Retryable failures re-use
 *   the trigger row with an incremented attempt and an exponential
 *   back-off fire time.
 * - Overdue triggers are drained immediately at startup; missed
 *   milestones are never dropped.
 */

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulingConfig;
use crate::models::{History, NotificationStatus, ProcessLock, ScheduledTrigger, TriggerPayload};
use crate::services::dispatch_service::DispatchService;
use crate::services::history_service::HistoryService;
use crate::utils::DispatchError;

/// Name of the process-wide lock electing the trigger-scanning replica
const SCAN_LOCK_NAME: &str = "trigger-scan";

/// Dispatch attempts before a retryable failure becomes FAILED
const MAX_DISPATCH_ATTEMPTS: i32 = 5;

/// Base and cap for the exponential retry back-off
const RETRY_BASE_SECONDS: i64 = 60;
const RETRY_CAP_SECONDS: i64 = 3600;

const TRIGGER_COLUMNS: &str = r#"
    job_id, fire_at, payload, history_id, attempt,
    lock_owner, lock_until, created_at, updated_at
"#;

/// Durable trigger scheduler
#[derive(Clone)]
pub struct SchedulerService {
    pool: PgPool,
    history: HistoryService,
    config: SchedulingConfig,
    /// Identity of this process for lease and lock ownership
    owner: String,
}

impl SchedulerService {
    pub fn new(pool: PgPool, history: HistoryService, config: SchedulingConfig) -> Self {
        Self {
            pool,
            history,
            config,
            owner: Uuid::new_v4().to_string(),
        }
    }

    /// Exponential back-off for a dispatch attempt, capped
    pub fn backoff(attempt: i32) -> Duration {
        let exponent = attempt.clamp(0, 30) as u32;
        let seconds = RETRY_BASE_SECONDS
            .saturating_mul(1i64 << exponent.min(20))
            .min(RETRY_CAP_SECONDS);
        Duration::seconds(seconds)
    }

    /// Uniform random jitter in [0, window)
    fn jitter(window: StdDuration) -> Duration {
        let window_secs = window.as_secs();
        if window_secs == 0 {
            return Duration::zero();
        }
        let offset = rand::thread_rng().gen_range(0..window_secs);
        Duration::seconds(offset as i64)
    }

    /// The effective fire time: near-term targets fire as soon as the
    /// configured notification delay allows, future targets get jitter
    fn effective_fire_at(
        &self,
        fire_at: DateTime<Utc>,
        jitter_window: StdDuration,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let min_delay =
            Duration::from_std(self.config.notification_delay).unwrap_or_else(|_| Duration::zero());
        let earliest = now + min_delay;

        if fire_at <= earliest {
            earliest
        } else {
            fire_at + Self::jitter(jitter_window)
        }
    }

    // ========================================================================
    // SCHEDULING
    // ========================================================================

    /// Persist a trigger and its SCHEDULED history row; idempotent by
    /// job id, an existing trigger is replaced in place.
    pub async fn schedule(
        &self,
        job_id: &str,
        fire_at: DateTime<Utc>,
        payload: &TriggerPayload,
        jitter_window: StdDuration,
    ) -> Result<ScheduledTrigger, DispatchError> {
        let now = Utc::now();
        let effective_fire_at = self.effective_fire_at(fire_at, jitter_window, now);
        let payload_json = serde_json::to_value(payload)
            .map_err(|e| DispatchError::Config(format!("Unserialisable trigger payload: {}", e)))?;

        let mut tx = self.pool.begin().await.map_err(DispatchError::Database)?;

        let existing = sqlx::query_as::<_, ScheduledTrigger>(&format!(
            r#"SELECT {} FROM scheduled_triggers WHERE job_id = $1 FOR UPDATE"#,
            TRIGGER_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (trigger, history_row) = match existing {
            Some(previous) => {
                let trigger = sqlx::query_as::<_, ScheduledTrigger>(&format!(
                    r#"
                    UPDATE scheduled_triggers
                    SET fire_at = $2,
                        payload = $3,
                        attempt = 0,
                        lock_owner = NULL,
                        lock_until = NULL,
                        updated_at = NOW()
                    WHERE job_id = $1
                    RETURNING {}
                    "#,
                    TRIGGER_COLUMNS
                ))
                .bind(job_id)
                .bind(effective_fire_at)
                .bind(&payload_json)
                .fetch_one(&mut *tx)
                .await?;

                let history_row = sqlx::query_as::<_, History>(
                    r#"
                    UPDATE notification_history
                    SET contact = $2,
                        template_name = $3,
                        template_version = $4,
                        variables = $5,
                        sent_at = $6,
                        version = version + 1,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'SCHEDULED'
                    RETURNING
                        id, trainee_id, reference_kind, reference_id, notification_type,
                        message_kind, contact, template_name, template_version, variables,
                        sent_at, read_at, status, status_detail, last_retry_at, attachments,
                        version, created_at, updated_at
                    "#,
                )
                .bind(previous.history_id)
                .bind(&payload.recipient.contact)
                .bind(&payload.template.name)
                .bind(&payload.template.version)
                .bind(serde_json::Value::Object(payload.template.variables.clone()))
                .bind(effective_fire_at)
                .fetch_one(&mut *tx)
                .await?;

                (trigger, history_row)
            }
            None => {
                let history_row = History::scheduled(
                    &payload.recipient.trainee_id,
                    payload.reference.as_ref(),
                    payload.notification_type,
                    payload.recipient.contact.clone(),
                    &payload.template,
                    effective_fire_at,
                );
                let history_row = HistoryService::insert_tx(&mut tx, &history_row).await?;

                let trigger = sqlx::query_as::<_, ScheduledTrigger>(&format!(
                    r#"
                    INSERT INTO scheduled_triggers (
                        job_id, fire_at, payload, history_id, attempt, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, 0, NOW(), NOW())
                    RETURNING {}
                    "#,
                    TRIGGER_COLUMNS
                ))
                .bind(job_id)
                .bind(effective_fire_at)
                .bind(&payload_json)
                .bind(history_row.id)
                .fetch_one(&mut *tx)
                .await?;

                (trigger, history_row)
            }
        };

        tx.commit().await.map_err(DispatchError::Database)?;

        self.history.publish_changed(&history_row).await;

        debug!(
            "Scheduled {} to fire at {} (intended {})",
            job_id, effective_fire_at, fire_at
        );

        Ok(trigger)
    }

    /// Cancel a scheduled job and delete its SCHEDULED history row.
    ///
    /// Cancellation is cooperative: a trigger currently leased to a
    /// dispatcher is mid-fire and the cancel becomes a no-op.
    pub async fn cancel(&self, job_id: &str) -> Result<bool, DispatchError> {
        let mut tx = self.pool.begin().await.map_err(DispatchError::Database)?;

        let history_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            DELETE FROM scheduled_triggers
            WHERE job_id = $1
              AND (lock_until IS NULL OR lock_until < NOW())
            RETURNING history_id
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(history_id) = history_id else {
            tx.commit().await.map_err(DispatchError::Database)?;
            debug!("Cancel of {} was a no-op (absent or mid-fire)", job_id);
            return Ok(false);
        };

        sqlx::query(
            r#"DELETE FROM notification_history WHERE id = $1 AND status = 'SCHEDULED'"#,
        )
        .bind(history_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await.map_err(DispatchError::Database)?;

        self.history.broadcast_deleted(history_id).await;

        info!("Cancelled scheduled job {}", job_id);
        Ok(true)
    }

    /// Cancel every scheduled job whose job id ends with the reference
    /// id (domain-object deletion cascade)
    pub async fn cancel_for_reference(&self, reference_id: &str) -> Result<u64, DispatchError> {
        let job_ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT job_id FROM scheduled_triggers
            WHERE job_id LIKE '%-' || $1
            "#,
        )
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        let mut cancelled = 0;
        for job_id in job_ids {
            if self.cancel(&job_id).await? {
                cancelled += 1;
            }
        }

        Ok(cancelled)
    }

    // ========================================================================
    // CLAIMING AND COMPLETION
    // ========================================================================

    /// Claim up to `limit` due triggers for this process with a lease
    pub async fn claim_due(&self, limit: i64) -> Result<Vec<ScheduledTrigger>, DispatchError> {
        let lease = Duration::from_std(self.config.lease_ttl).unwrap_or_else(|_| Duration::minutes(10));
        let lock_until = Utc::now() + lease;

        let claimed = sqlx::query_as::<_, ScheduledTrigger>(&format!(
            r#"
            UPDATE scheduled_triggers
            SET lock_owner = $1,
                lock_until = $2,
                updated_at = NOW()
            WHERE job_id IN (
                SELECT job_id FROM scheduled_triggers
                WHERE fire_at <= NOW()
                  AND (lock_until IS NULL OR lock_until < NOW())
                ORDER BY fire_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            TRIGGER_COLUMNS
        ))
        .bind(&self.owner)
        .bind(lock_until)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(claimed)
    }

    /// Jobs whose fire time has passed and that are not mid-fire
    pub async fn list_overdue(&self) -> Result<Vec<ScheduledTrigger>, DispatchError> {
        let overdue = sqlx::query_as::<_, ScheduledTrigger>(&format!(
            r#"
            SELECT {}
            FROM scheduled_triggers
            WHERE fire_at <= NOW()
              AND (lock_until IS NULL OR lock_until < NOW())
            ORDER BY fire_at ASC
            "#,
            TRIGGER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(overdue)
    }

    /// Remove a trigger after its job resolved (sent or failed).
    ///
    /// Guarded by lease ownership: a trigger rescheduled while the job
    /// was mid-fire has had its lease cleared and must survive.
    pub async fn complete(&self, job_id: &str) -> Result<(), DispatchError> {
        sqlx::query(r#"DELETE FROM scheduled_triggers WHERE job_id = $1 AND lock_owner = $2"#)
            .bind(job_id)
            .bind(&self.owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Release a trigger for a retry attempt with a back-off fire time.
    /// Owner-guarded for the same mid-fire reschedule race as `complete`.
    pub async fn release_for_retry(
        &self,
        job_id: &str,
        attempt: i32,
    ) -> Result<(), DispatchError> {
        let fire_at = Utc::now() + Self::backoff(attempt);

        sqlx::query(
            r#"
            UPDATE scheduled_triggers
            SET fire_at = $2,
                attempt = $3,
                lock_owner = NULL,
                lock_until = NULL,
                updated_at = NOW()
            WHERE job_id = $1 AND lock_owner = $4
            "#,
        )
        .bind(job_id)
        .bind(fire_at)
        .bind(attempt)
        .bind(&self.owner)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // PROCESS LOCK AND RUN LOOP
    // ========================================================================

    /// Try to take or renew the scan lock; only the holder polls for
    /// due triggers
    async fn try_acquire_scan_lock(&self) -> Result<bool, DispatchError> {
        let lease = Duration::from_std(self.config.lease_ttl).unwrap_or_else(|_| Duration::minutes(10));
        let expires_at = Utc::now() + lease;

        let lock = sqlx::query_as::<_, ProcessLock>(
            r#"
            INSERT INTO process_locks (name, owner, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at
            WHERE process_locks.owner = EXCLUDED.owner
               OR process_locks.expires_at < NOW()
            RETURNING name, owner, expires_at
            "#,
        )
        .bind(SCAN_LOCK_NAME)
        .bind(&self.owner)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lock.is_some_and(|lock| lock.owner == self.owner))
    }

    /// Run the scheduler loop until shutdown.
    ///
    /// Drains overdue triggers at startup, then polls on the configured
    /// cadence while holding the scan lock. Dispatches run on a bounded
    /// worker pool; shutdown waits up to the grace period for in-flight
    /// jobs.
    pub async fn run(
        self: Arc<Self>,
        dispatch: Arc<DispatchService>,
        shutdown: CancellationToken,
    ) {
        info!(
            "Scheduler starting (owner {}, {} workers)",
            self.owner, self.config.worker_count
        );

        let semaphore = Arc::new(Semaphore::new(self.config.worker_count));
        let batch_size = (self.config.worker_count * 2) as i64;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.try_acquire_scan_lock().await {
                Ok(true) => {
                    if let Err(e) = self.drain_due(&dispatch, &semaphore, batch_size).await {
                        error!("Trigger scan failed: {}", e);
                    }
                }
                Ok(false) => {
                    debug!("Scan lock held elsewhere; standing by");
                }
                Err(e) => {
                    error!("Scan lock acquisition failed: {}", e);
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        // Drain the worker pool with the configured grace period
        info!("Scheduler draining in-flight jobs");
        let drained = tokio::time::timeout(
            self.config.shutdown_grace,
            semaphore.acquire_many(self.config.worker_count as u32),
        )
        .await;
        match drained {
            Ok(_) => info!("Scheduler drained cleanly"),
            Err(_) => warn!("Shutdown grace period elapsed with jobs still in flight"),
        }
    }

    /// Claim due triggers and hand each to a pooled dispatch task
    async fn drain_due(
        &self,
        dispatch: &Arc<DispatchService>,
        semaphore: &Arc<Semaphore>,
        batch_size: i64,
    ) -> Result<(), DispatchError> {
        loop {
            let claimed = self.claim_due(batch_size).await?;
            if claimed.is_empty() {
                return Ok(());
            }

            debug!("Claimed {} due triggers", claimed.len());

            for trigger in claimed {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    return Ok(());
                };
                let scheduler = self.clone();
                let dispatch = dispatch.clone();

                tokio::spawn(async move {
                    scheduler.fire(&dispatch, trigger).await;
                    drop(permit);
                });
            }
        }
    }

    /// Fire one claimed trigger and resolve its outcome
    async fn fire(&self, dispatch: &DispatchService, trigger: ScheduledTrigger) {
        let job_id = trigger.job_id.clone();
        let history_id = trigger.history_id;
        let attempt = trigger.attempt;

        match dispatch.dispatch(&trigger).await {
            Ok(()) => {
                if let Err(e) = self.complete(&job_id).await {
                    error!("Failed to complete trigger {}: {}", job_id, e);
                }
            }
            Err(e) if e.is_retryable() && attempt + 1 < MAX_DISPATCH_ATTEMPTS => {
                warn!(
                    "Job {} failed (attempt {}): {}; retrying with back-off",
                    job_id, attempt, e
                );
                if let Err(retry_err) = self.release_for_retry(&job_id, attempt + 1).await {
                    error!("Failed to release {} for retry: {}", job_id, retry_err);
                }
                if let Err(history_err) = self.history.mark_retry(history_id).await {
                    error!(
                        "Failed to stamp retry on history {}: {}",
                        history_id, history_err
                    );
                }
            }
            Err(e) => {
                error!("Job {} failed permanently: {}", job_id, e);
                if let Err(history_err) = self
                    .history
                    .update_status(
                        history_id,
                        NotificationStatus::Failed,
                        Some(e.to_string()),
                    )
                    .await
                {
                    error!(
                        "Failed to record failure on history {}: {}",
                        history_id, history_err
                    );
                }
                if let Err(complete_err) = self.complete(&job_id).await {
                    error!("Failed to complete trigger {}: {}", job_id, complete_err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        assert_eq!(SchedulerService::backoff(0), Duration::seconds(60));
        assert_eq!(SchedulerService::backoff(1), Duration::seconds(120));
        assert_eq!(SchedulerService::backoff(2), Duration::seconds(240));
        assert_eq!(SchedulerService::backoff(3), Duration::seconds(480));
        // Capped at one hour
        assert_eq!(SchedulerService::backoff(10), Duration::seconds(3600));
        assert_eq!(SchedulerService::backoff(30), Duration::seconds(3600));
    }

    #[test]
    fn test_backoff_negative_attempt_clamps_to_base() {
        assert_eq!(SchedulerService::backoff(-1), Duration::seconds(60));
    }

    #[test]
    fn test_jitter_within_window() {
        let window = StdDuration::from_secs(3600);
        for _ in 0..100 {
            let jitter = SchedulerService::jitter(window);
            assert!(jitter >= Duration::zero());
            assert!(jitter < Duration::seconds(3600));
        }
    }

    #[test]
    fn test_zero_jitter_window() {
        assert_eq!(
            SchedulerService::jitter(StdDuration::ZERO),
            Duration::zero()
        );
    }
}
