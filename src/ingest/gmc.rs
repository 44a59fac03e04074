/*!
 * GMC Ingest
 *
 * Regulator updates notify the trainee's local office contacts; a
 * rejection additionally notifies the trainee with the contacted LO
 * addresses threaded into the template. Both are immediate dispatch
 * paths with no durable trigger.
 */

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::IngestContext;
use crate::models::{
    ContactType, History, HrefType, NotificationStatus, NotificationType, Recipient,
    TemplateBinding, TriggerPayload,
};
use crate::services::ContactService;
use crate::utils::DispatchError;

/// Handle a GMC details update: one email per distinct LO email contact
pub async fn handle_updated(context: &IngestContext, record: Value) -> Result<(), DispatchError> {
    let event: crate::models::GmcUpdateEvent = serde_json::from_value(record)
        .map_err(|e| DispatchError::Config(format!("Malformed GMC update: {}", e)))?;

    let mut variables = Map::new();
    variables.insert("gmcNumber".to_string(), json!(event.gmc_number));
    variables.insert("gmcStatus".to_string(), json!(event.gmc_status));
    variables.insert("trigger".to_string(), json!(event.trigger));

    let addresses =
        distinct_lo_email_contacts(context, &event.trainee_id, ContactType::GmcUpdate).await;
    if addresses.is_empty() {
        warn!(
            "No LO email contacts for trainee {}; GMC update not sent",
            event.trainee_id
        );
        return Ok(());
    }

    for address in &addresses {
        dispatch_immediate(
            context,
            NotificationType::GmcUpdated,
            &event.trainee_id,
            address,
            variables.clone(),
        )
        .await?;
    }

    info!(
        "GMC update for trainee {} dispatched to {} LO contact(s)",
        event.trainee_id,
        addresses.len()
    );

    Ok(())
}

/// Handle a GMC details rejection: LO contacts plus the trainee, with
/// the contacted LO addresses in the trainee's template
pub async fn handle_rejected(context: &IngestContext, record: Value) -> Result<(), DispatchError> {
    let event: crate::models::GmcRejectedEvent = serde_json::from_value(record)
        .map_err(|e| DispatchError::Config(format!("Malformed GMC rejection: {}", e)))?;

    let mut variables = Map::new();
    variables.insert("gmcNumber".to_string(), json!(event.gmc_number));
    variables.insert("gmcStatus".to_string(), json!(event.gmc_status));
    variables.insert("reason".to_string(), json!(event.reason));

    let addresses =
        distinct_lo_email_contacts(context, &event.trainee_id, ContactType::GmcUpdate).await;

    for address in &addresses {
        dispatch_immediate(
            context,
            NotificationType::GmcRejectedLo,
            &event.trainee_id,
            address,
            variables.clone(),
        )
        .await?;
    }

    // The trainee's copy lists the LO addresses that were contacted
    let user = context.recipient.resolve(&event.trainee_id).await?;
    let Some(trainee_email) = user.and_then(|u| u.email) else {
        warn!(
            "No email for trainee {}; GMC rejection notice not sent to trainee",
            event.trainee_id
        );
        return Ok(());
    };

    let mut trainee_variables = variables.clone();
    trainee_variables.insert("cc_of".to_string(), json!(addresses));

    dispatch_immediate(
        context,
        NotificationType::GmcRejectedTrainee,
        &event.trainee_id,
        &trainee_email,
        trainee_variables,
    )
    .await?;

    info!(
        "GMC rejection for trainee {} dispatched ({} LO contacts + trainee)",
        event.trainee_id,
        addresses.len()
    );

    Ok(())
}

/// The trainee's distinct LO email contacts of one directory type;
/// URL and free-text entries are skipped
async fn distinct_lo_email_contacts(
    context: &IngestContext,
    trainee_id: &str,
    contact_type: ContactType,
) -> Vec<String> {
    let contacts = context
        .contacts
        .list_trainee_contacts(trainee_id, contact_type)
        .await;

    let mut seen = std::collections::HashSet::new();
    contacts
        .into_iter()
        .filter(|c| ContactService::classify(&c.contact) == HrefType::ProtocolEmail)
        .filter(|c| seen.insert(c.contact.clone()))
        .map(|c| c.contact)
        .collect()
}

/// Write the SCHEDULED row and run the dispatch pipeline immediately.
/// Transient failures propagate for queue redelivery; permanent ones
/// resolve the row FAILED and move on.
async fn dispatch_immediate(
    context: &IngestContext,
    notification_type: NotificationType,
    trainee_id: &str,
    address: &str,
    variables: Map<String, Value>,
) -> Result<(), DispatchError> {
    let version = context.templates.pinned_version(notification_type)?;
    let mut template = TemplateBinding::new(notification_type.template_name(), version);
    template.variables = variables;

    let row = History::scheduled(
        trainee_id,
        None,
        notification_type,
        Some(address.to_string()),
        &template,
        Utc::now(),
    );
    let row = context.history.save(&row).await?;

    let payload = TriggerPayload {
        notification_type,
        recipient: Recipient {
            trainee_id: trainee_id.to_string(),
            message_kind: notification_type.message_kind(),
            contact: Some(address.to_string()),
        },
        reference: None,
        template,
    };

    match context.dispatch.execute(&payload, row.id).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_retryable() => Err(e),
        Err(e) => {
            warn!(
                "{} to {} failed permanently: {}",
                notification_type.as_str(),
                address,
                e
            );
            context
                .history
                .update_status(row.id, NotificationStatus::Failed, Some(e.to_string()))
                .await?;
            Ok(())
        }
    }
}
