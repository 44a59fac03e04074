/*!
 * Placement Ingest
 *
 * A placement schedules its 12-week reminder; a deadline already in
 * the past cancels rather than fires late, and a deleted placement
 * cancels its jobs and marks surviving history rows deleted.
 */

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::IngestContext;
use crate::models::{
    NotificationType, PlacementEvent, Recipient, Reference, TemplateBinding, TriggerPayload,
};
use crate::services::rules_service::RulesService;
use crate::utils::DispatchError;

/// Handle a placement create/update snapshot
pub async fn handle_updated(context: &IngestContext, record: Value) -> Result<(), DispatchError> {
    let event: PlacementEvent = serde_json::from_value(record)
        .map_err(|e| DispatchError::Config(format!("Malformed placement: {}", e)))?;
    let now = Utc::now();
    let reference = Reference::placement(&event.tis_id);
    let job_id = RulesService::job_id(NotificationType::PlacementUpdatedWeek12, &event.tis_id);

    let Some(plan) = context
        .rules
        .plan_placement_notification(&event.tis_id, event.start_date, now)
    else {
        debug!(
            "Placement {} has no upcoming 12-week deadline; cancelling any scheduled reminder",
            event.tis_id
        );
        context.scheduler.cancel(&job_id).await?;
        return Ok(());
    };

    let user = context.recipient.resolve(&event.person_id).await?;
    let email = user.and_then(|u| u.email);

    let version = context
        .templates
        .pinned_version(NotificationType::PlacementUpdatedWeek12)?;
    let mut template = TemplateBinding::new(
        NotificationType::PlacementUpdatedWeek12.template_name(),
        version,
    );
    template.variables = placement_variables(&event);

    let payload = TriggerPayload {
        notification_type: NotificationType::PlacementUpdatedWeek12,
        recipient: Recipient {
            trainee_id: event.person_id.clone(),
            message_kind: NotificationType::PlacementUpdatedWeek12.message_kind(),
            contact: email,
        },
        reference: Some(reference),
        template,
    };

    context
        .scheduler
        .schedule(&job_id, plan.fire_at, &payload, std::time::Duration::ZERO)
        .await?;

    info!(
        "Placement {} ingested for trainee {}; reminder scheduled",
        event.tis_id, event.person_id
    );

    Ok(())
}

/// Handle a placement deletion
pub async fn handle_deleted(context: &IngestContext, record: Value) -> Result<(), DispatchError> {
    let event: PlacementEvent = serde_json::from_value(record)
        .map_err(|e| DispatchError::Config(format!("Malformed placement: {}", e)))?;
    let reference = Reference::placement(&event.tis_id);

    let cancelled = context.scheduler.cancel_for_reference(&event.tis_id).await?;
    let deleted = context.history.mark_reference_deleted(&reference).await?;

    info!(
        "Placement {} deleted: {} jobs cancelled, {} history rows marked deleted",
        event.tis_id, cancelled, deleted
    );

    Ok(())
}

/// The variables a placement notification binds
pub fn placement_variables(event: &PlacementEvent) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert("startDate".to_string(), json!(event.start_date));
    variables.insert("placementType".to_string(), json!(event.placement_type));
    variables.insert("specialty".to_string(), json!(event.specialty));
    variables.insert("owner".to_string(), json!(event.managing_deanery));
    variables
}
