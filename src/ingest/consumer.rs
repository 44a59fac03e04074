/*!
 * Queue Consumers
 *
 * One consumer task per configured queue. Messages move atomically from
 * the source list to a per-queue processing list (`BLMOVE`), flow
 * through a bounded channel into the ingest worker pool, and are only
 * removed from the processing list once their handler succeeds.
 * A handler failure classified as transient pushes the message back
 * onto the source list for redelivery; anything else is dropped with an
 * error log after the failure has been recorded.
 *
 * Back-pressure: a full channel blocks the consumer, which stops
 * pulling (and therefore acking) further messages.
 */

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{forms, gmc, ltft, placement, programme, IngestContext};
use crate::utils::DispatchError;

/// Seconds a BLMOVE blocks before re-checking for shutdown
const BLOCK_SECONDS: f64 = 5.0;

/// Operations signalled in the event envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Updated,
    Deleted,
}

/// Envelope wrapping every queued event. A bare record (no envelope)
/// is treated as an update.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default = "default_operation")]
    operation: Operation,
    record: serde_json::Value,
}

fn default_operation() -> Operation {
    Operation::Updated
}

/// Split a queue message into its operation and record payload
pub fn unwrap_envelope(body: &str) -> Result<(Operation, serde_json::Value), DispatchError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| DispatchError::Config(format!("Malformed queue message: {}", e)))?;

    if value.get("record").is_some() {
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| DispatchError::Config(format!("Malformed event envelope: {}", e)))?;
        Ok((envelope.operation, envelope.record))
    } else {
        Ok((Operation::Updated, value))
    }
}

/// A message pulled from a queue, pending ack
struct QueueMessage {
    queue: String,
    body: String,
}

/// Spawn all queue consumers and the ingest worker pool.
///
/// Returns once the tasks are running; they stop when `shutdown` fires.
pub async fn spawn_consumers(
    redis: ConnectionManager,
    context: IngestContext,
    channel_capacity: usize,
    shutdown: CancellationToken,
) {
    let (tx, rx) = mpsc::channel::<QueueMessage>(channel_capacity);

    let queue_names = [
        context.queues.programme.clone(),
        context.queues.placement.clone(),
        context.queues.gmc_update.clone(),
        context.queues.gmc_rejected.clone(),
        context.queues.ltft_updated.clone(),
        context.queues.ltft_updated_tpd.clone(),
        context.queues.coj_signed.clone(),
        context.queues.form_deleted.clone(),
    ];

    for queue in queue_names {
        let redis = redis.clone();
        let tx = tx.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            consume_queue(redis, queue, tx, shutdown).await;
        });
    }
    drop(tx);

    tokio::spawn(route_messages(redis, context, rx));

    info!("Queue consumers started");
}

/// Pull messages from one queue into the shared channel
async fn consume_queue(
    mut redis: ConnectionManager,
    queue: String,
    tx: mpsc::Sender<QueueMessage>,
    shutdown: CancellationToken,
) {
    let processing = processing_list(&queue);
    info!("Consuming queue {}", queue);

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let moved: Result<Option<String>, redis::RedisError> = redis
            .blmove(
                &queue,
                &processing,
                redis::Direction::Right,
                redis::Direction::Left,
                BLOCK_SECONDS,
            )
            .await;

        match moved {
            Ok(Some(body)) => {
                let message = QueueMessage {
                    queue: queue.clone(),
                    body,
                };
                // A full channel blocks here; the message stays on the
                // processing list un-acked until a worker frees up
                if tx.send(message).await.is_err() {
                    warn!("Ingest channel closed; stopping consumer for {}", queue);
                    break;
                }
            }
            Ok(None) => {
                // Block timeout; loop to re-check shutdown
            }
            Err(e) => {
                error!("Queue read failed for {}: {}", queue, e);
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    }

    info!("Consumer for {} stopped", queue);
}

/// Route channel messages to their handler and resolve the ack
async fn route_messages(
    redis: ConnectionManager,
    context: IngestContext,
    mut rx: mpsc::Receiver<QueueMessage>,
) {
    while let Some(message) = rx.recv().await {
        let mut redis = redis.clone();
        let processing = processing_list(&message.queue);

        match handle_message(&context, &message.queue, &message.body).await {
            Ok(()) => {
                ack(&mut redis, &processing, &message.body).await;
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    "Transient failure handling message on {}: {}; requeueing",
                    message.queue, e
                );
                let pushed: Result<(), redis::RedisError> =
                    redis.lpush(&message.queue, &message.body).await;
                if let Err(push_err) = pushed {
                    error!(
                        "Failed to requeue message on {}: {}; leaving on processing list",
                        message.queue, push_err
                    );
                    continue;
                }
                ack(&mut redis, &processing, &message.body).await;
            }
            Err(e) => {
                error!(
                    "Dropping message on {} after non-retryable failure: {}",
                    message.queue, e
                );
                ack(&mut redis, &processing, &message.body).await;
            }
        }
    }
}

/// Remove a handled message from its processing list
async fn ack(redis: &mut ConnectionManager, processing: &str, body: &str) {
    let removed: Result<i64, redis::RedisError> = redis.lrem(processing, 1, body).await;
    match removed {
        Ok(0) => debug!("Message already removed from {}", processing),
        Ok(_) => {}
        Err(e) => error!("Failed to ack message on {}: {}", processing, e),
    }
}

/// Dispatch one message to the handler for its queue
async fn handle_message(
    context: &IngestContext,
    queue: &str,
    body: &str,
) -> Result<(), DispatchError> {
    let (operation, record) = unwrap_envelope(body)?;

    let queues = &context.queues;
    if queue == queues.programme {
        match operation {
            Operation::Updated => programme::handle_updated(context, record).await,
            Operation::Deleted => programme::handle_deleted(context, record).await,
        }
    } else if queue == queues.placement {
        match operation {
            Operation::Updated => placement::handle_updated(context, record).await,
            Operation::Deleted => placement::handle_deleted(context, record).await,
        }
    } else if queue == queues.gmc_update {
        gmc::handle_updated(context, record).await
    } else if queue == queues.gmc_rejected {
        gmc::handle_rejected(context, record).await
    } else if queue == queues.ltft_updated {
        ltft::handle_updated(context, record).await
    } else if queue == queues.ltft_updated_tpd {
        ltft::handle_updated_tpd(context, record).await
    } else if queue == queues.coj_signed {
        forms::handle_coj_signed(context, record).await
    } else if queue == queues.form_deleted {
        forms::handle_form_deleted(context, record).await
    } else {
        Err(DispatchError::Config(format!("Unroutable queue {}", queue)))
    }
}

fn processing_list(queue: &str) -> String {
    format!("{}:processing", queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_record_defaults_to_updated() {
        let (operation, record) =
            unwrap_envelope(r#"{"tisId": "pm-1", "personId": "40"}"#).unwrap();
        assert_eq!(operation, Operation::Updated);
        assert_eq!(record["tisId"], "pm-1");
    }

    #[test]
    fn test_envelope_carries_operation() {
        let (operation, record) = unwrap_envelope(
            r#"{"operation": "DELETED", "record": {"tisId": "pm-1", "personId": "40"}}"#,
        )
        .unwrap();
        assert_eq!(operation, Operation::Deleted);
        assert_eq!(record["personId"], "40");
    }

    #[test]
    fn test_malformed_message_is_config_error() {
        let err = unwrap_envelope("not json").unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_processing_list_name() {
        assert_eq!(processing_list("tis-notify-programme-membership"),
            "tis-notify-programme-membership:processing");
    }
}
