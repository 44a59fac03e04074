/*!
 * Form Lifecycle Ingest
 *
 * Conditions-of-Joining signatures make the PROGRAMME_CREATED reminder
 * redundant; generic form deletions cascade onto every history row that
 * references the form.
 */

use serde_json::Value;
use tracing::info;

use super::IngestContext;
use crate::models::{CojSignedEvent, FormDeletedEvent, NotificationType, Reference};
use crate::services::rules_service::RulesService;
use crate::utils::DispatchError;

/// Handle a Conditions of Joining signature: any still-scheduled
/// PROGRAMME_CREATED job for the membership is no longer needed
pub async fn handle_coj_signed(
    context: &IngestContext,
    record: Value,
) -> Result<(), DispatchError> {
    let event: CojSignedEvent = serde_json::from_value(record)
        .map_err(|e| DispatchError::Config(format!("Malformed COJ signature: {}", e)))?;

    let job_id = RulesService::job_id(NotificationType::ProgrammeCreated, &event.tis_id);
    let cancelled = context.scheduler.cancel(&job_id).await?;

    info!(
        "COJ signed for programme membership {} (trainee {}); PROGRAMME_CREATED {}",
        event.tis_id,
        event.person_id,
        if cancelled { "cancelled" } else { "not scheduled" }
    );

    Ok(())
}

/// Handle a form deletion: cascade-delete the history rows referencing
/// the form
pub async fn handle_form_deleted(
    context: &IngestContext,
    record: Value,
) -> Result<(), DispatchError> {
    let event: FormDeletedEvent = serde_json::from_value(record)
        .map_err(|e| DispatchError::Config(format!("Malformed form deletion: {}", e)))?;

    let reference = Reference::ltft_form(&event.form_ref);
    let deleted = context.history.delete_by_reference(&reference).await?;

    info!(
        "Form {} deleted for trainee {}; {} history rows removed",
        event.form_ref, event.trainee_id, deleted
    );

    Ok(())
}
