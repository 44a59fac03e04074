/*!
 * LTFT Ingest
 *
 * LTFT form transitions drive two channels: the trainee channel maps
 * the form state onto its notification family, the TPD channel (a
 * separate queue) notifies the Training Programme Director on
 * approvals and submissions only. Both carry a resolved contacts map
 * keyed by local office contact type, and both are immediate dispatch
 * paths.
 */

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::IngestContext;
use crate::models::{
    ContactType, History, LtftUpdateEvent, NotificationStatus, NotificationType, Recipient,
    Reference, TemplateBinding, TriggerPayload,
};
use crate::services::contact_service::ContactService;
use crate::services::rules_service::RulesService;
use crate::utils::DispatchError;

/// Local office contact types resolved into every LTFT template
const LTFT_CONTACT_TYPES: [ContactType; 4] = [
    ContactType::Ltft,
    ContactType::LtftSupport,
    ContactType::SupportedReturnToTraining,
    ContactType::TssSupport,
];

/// Handle an LTFT form transition on the trainee channel
pub async fn handle_updated(context: &IngestContext, record: Value) -> Result<(), DispatchError> {
    let event: LtftUpdateEvent = serde_json::from_value(record)
        .map_err(|e| DispatchError::Config(format!("Malformed LTFT update: {}", e)))?;

    let notification_type = RulesService::ltft_notification_type(event.current_state());

    let user = context.recipient.resolve(&event.trainee_id).await?;
    let Some(email) = user.and_then(|u| u.email) else {
        warn!(
            "No email for trainee {}; {} not sent",
            event.trainee_id,
            notification_type.as_str()
        );
        return Ok(());
    };

    let variables = ltft_variables(context, &event).await;

    dispatch_ltft(context, notification_type, &event, &email, variables).await?;

    info!(
        "LTFT {} for trainee {} dispatched as {}",
        event.form_ref.as_deref().unwrap_or("<unknown>"),
        event.trainee_id,
        notification_type.as_str()
    );

    Ok(())
}

/// Handle an LTFT form transition on the TPD channel
pub async fn handle_updated_tpd(
    context: &IngestContext,
    record: Value,
) -> Result<(), DispatchError> {
    let event: LtftUpdateEvent = serde_json::from_value(record)
        .map_err(|e| DispatchError::Config(format!("Malformed LTFT update: {}", e)))?;

    let Some(notification_type) =
        RulesService::ltft_tpd_notification_type(event.current_state())
    else {
        debug!(
            "LTFT state {:?} has no TPD notification; skipping",
            event.current_state()
        );
        return Ok(());
    };

    let tpd_email = event
        .discussions
        .as_ref()
        .and_then(|d| d.tpd_email.clone())
        .filter(|email| !email.trim().is_empty());
    let Some(tpd_email) = tpd_email else {
        warn!(
            "No TPD email on LTFT form {}; {} not sent",
            event.form_ref.as_deref().unwrap_or("<unknown>"),
            notification_type.as_str()
        );
        return Ok(());
    };

    let variables = ltft_variables(context, &event).await;

    dispatch_ltft(context, notification_type, &event, &tpd_email, variables).await?;

    info!(
        "LTFT {} TPD notification dispatched to {}",
        event.form_ref.as_deref().unwrap_or("<unknown>"),
        tpd_email
    );

    Ok(())
}

/// The variables an LTFT notification binds: form fields, the resolved
/// contacts map, and the event snapshot verbatim under `var` so the
/// notification can be replayed without re-fetching the form
async fn ltft_variables(context: &IngestContext, event: &LtftUpdateEvent) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert("formRef".to_string(), json!(event.form_ref));
    variables.insert("formName".to_string(), json!(event.form_name));
    variables.insert("state".to_string(), json!(event.current_state()));
    variables.insert(
        "stateDetail".to_string(),
        json!(event.status.current.detail),
    );
    variables.insert("timestamp".to_string(), json!(event.timestamp));
    if let Some(discussions) = &event.discussions {
        variables.insert("tpdName".to_string(), json!(discussions.tpd_name));
    }
    variables.insert("var".to_string(), json!(event));

    let deanery = event
        .programme_membership
        .as_ref()
        .and_then(|pm| pm.managing_deanery.as_deref());
    let directory = context.contacts.list_contacts(deanery).await;

    let mut contacts = Map::new();
    for contact_type in LTFT_CONTACT_TYPES {
        let (contact, href_type) = ContactService::resolve_contact_with_href(
            &directory,
            contact_type,
            ContactType::TssSupport,
        );
        contacts.insert(
            contact_type.as_str().to_string(),
            json!({ "contact": contact, "hrefType": href_type.as_str() }),
        );
    }
    variables.insert("contacts".to_string(), Value::Object(contacts));

    variables
}

/// Write the SCHEDULED row and dispatch immediately
async fn dispatch_ltft(
    context: &IngestContext,
    notification_type: NotificationType,
    event: &LtftUpdateEvent,
    address: &str,
    variables: Map<String, Value>,
) -> Result<(), DispatchError> {
    let version = context.templates.pinned_version(notification_type)?;
    let mut template = TemplateBinding::new(notification_type.template_name(), version);
    template.variables = variables;

    let reference = event.form_ref.as_deref().map(Reference::ltft_form);

    let row = History::scheduled(
        &event.trainee_id,
        reference.as_ref(),
        notification_type,
        Some(address.to_string()),
        &template,
        Utc::now(),
    );
    let row = context.history.save(&row).await?;

    let payload = TriggerPayload {
        notification_type,
        recipient: Recipient {
            trainee_id: event.trainee_id.clone(),
            message_kind: notification_type.message_kind(),
            contact: Some(address.to_string()),
        },
        reference,
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
