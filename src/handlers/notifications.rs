/*!
 * Notification HTTP Handlers
 *
 * Handles HTTP requests for notification administration including:
 * - Listing a trainee's notification history
 * - Listing a trainee's failed notifications
 * - In-app status transitions (read/unread/archive)
 * - Re-running a failed notification under a fresh job id
 * - Deleting a notification
 * - The one-off placement rollout correction path
 */

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    handlers::AppState,
    ingest::placement::placement_variables,
    models::{
        History, HistoryResponse, NotificationStatus, NotificationType, PlacementEvent, Recipient,
        Reference, TemplateBinding, TriggerPayload, UpdateStatusRequest,
    },
    utils::{AppError, Result},
};

/// List a trainee's notification history, newest first
///
/// GET /api/v1/notifications/trainee/{trainee_id}
pub async fn list_for_trainee(
    State(state): State<AppState>,
    Path(trainee_id): Path<String>,
) -> Result<impl IntoResponse> {
    let rows = state.history.find_by_trainee(&trainee_id).await?;
    let responses: Vec<HistoryResponse> = rows.iter().map(History::to_response).collect();

    Ok(Json(responses))
}

/// List a trainee's failed notifications
///
/// GET /api/v1/notifications/trainee/{trainee_id}/failed
pub async fn list_failed_for_trainee(
    State(state): State<AppState>,
    Path(trainee_id): Path<String>,
) -> Result<impl IntoResponse> {
    let rows = state.history.find_failed_by_trainee(&trainee_id).await?;
    let responses: Vec<HistoryResponse> = rows.iter().map(History::to_response).collect();

    Ok(Json(responses))
}

/// Update a notification's status (in-app read states)
///
/// PUT /api/v1/notifications/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let status = NotificationStatus::from_str(&request.status)
        .ok_or_else(|| AppError::Validation(format!("Unknown status {}", request.status)))?;

    let updated = state
        .history
        .update_status(id, status, request.status_detail)
        .await?;

    Ok(Json(updated.to_response()))
}

/// Re-run a failed notification through the dispatch path under a
/// fresh job id
///
/// POST /api/v1/notifications/{id}/resend
pub async fn resend(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let row = state
        .history
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Notification {}", id)))?;

    if row.status() != Some(NotificationStatus::Failed) {
        return Err(AppError::Conflict(format!(
            "Only failed notifications can be re-run; {} is {}",
            id, row.status
        )));
    }

    let notification_type = row.notification_type().ok_or_else(|| {
        AppError::Internal(format!("Unknown notification type {}", row.notification_type))
    })?;
    let message_kind = row.message_kind().ok_or_else(|| {
        AppError::Internal(format!("Unknown message kind {}", row.message_kind))
    })?;

    let mut template = TemplateBinding::new(&row.template_name, &row.template_version);
    template.variables = row.variables.as_object().cloned().unwrap_or_default();

    let payload = TriggerPayload {
        notification_type,
        recipient: Recipient {
            trainee_id: row.trainee_id.clone(),
            message_kind,
            contact: row.contact.clone(),
        },
        reference: row.reference(),
        template,
    };

    let job_id = format!(
        "{}-resend-{}",
        notification_type.as_str(),
        Uuid::new_v4()
    );
    state
        .scheduler
        .schedule(&job_id, Utc::now(), &payload, std::time::Duration::ZERO)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "jobId": job_id, "originalId": id })),
    ))
}

/// Delete one of a trainee's notifications
///
/// DELETE /api/v1/notifications/trainee/{trainee_id}/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path((trainee_id, id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse> {
    let deleted = state.history.delete_by_trainee_and_id(&trainee_id, id).await?;

    if !deleted {
        return Err(AppError::NotFound(format!(
            "Notification {} for trainee {}",
            id, trainee_id
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// One-off placement rollout correction: always dispatches regardless
/// of pilot/rollout eligibility (a valid recipient is still required)
///
/// POST /api/v1/notifications/placement/rollout-correction
pub async fn placement_rollout_correction(
    State(state): State<AppState>,
    Json(event): Json<PlacementEvent>,
) -> Result<impl IntoResponse> {
    let notification_type = NotificationType::PlacementRollout2024Correction;

    let version = state
        .templates
        .pinned_version(notification_type)
        .map_err(AppError::from)?;
    let mut template = TemplateBinding::new(notification_type.template_name(), version);
    template.variables = placement_variables(&event);

    let reference = Reference::placement(&event.tis_id);
    let row = History::scheduled(
        &event.person_id,
        Some(&reference),
        notification_type,
        None,
        &template,
        Utc::now(),
    );
    let row = state.history.save(&row).await?;

    let payload = TriggerPayload {
        notification_type,
        recipient: Recipient {
            trainee_id: event.person_id.clone(),
            message_kind: notification_type.message_kind(),
            contact: None,
        },
        reference: Some(reference),
        template,
    };

    match state.dispatch.execute(&payload, row.id).await {
        Ok(()) => Ok((StatusCode::ACCEPTED, Json(json!({ "id": row.id })))),
        Err(e) => {
            state
                .history
                .update_status(row.id, NotificationStatus::Failed, Some(e.to_string()))
                .await
                .ok();
            Err(AppError::from(e))
        }
    }
}
