/*!
 * Programme Membership Ingest
 *
 * Translates programme membership snapshots into the scheduled and
 * in-app notifications they owe, reconciling against prior history:
 * deferrals reschedule PROGRAMME_CREATED with the original lead time,
 * CCT extensions reschedule the POG notification, reminders whose
 * deadline has passed are cancelled rather than sent late, and in-app
 * rows are unique per (trainee, reference, type).
 */

use chrono::{NaiveDate, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::IngestContext;
use crate::models::{
    ContactType, History, MessageKind, NotificationStatus, NotificationType,
    ProgrammeMembershipEvent, Recipient, Reference, TemplateBinding, TriggerPayload,
};
use crate::services::contact_service::{ContactService, DEFAULT_CONTACT};
use crate::services::rules_service::{EligibilityFlags, RulesService, REMINDER_WEEKS};
use crate::utils::DispatchError;

/// Handle a programme membership create/update snapshot
pub async fn handle_updated(context: &IngestContext, record: Value) -> Result<(), DispatchError> {
    let event: ProgrammeMembershipEvent = serde_json::from_value(record)
        .map_err(|e| DispatchError::Config(format!("Malformed programme membership: {}", e)))?;
    let now = Utc::now();
    let reference = Reference::programme_membership(&event.tis_id);

    if context.rules.is_programme_membership_excluded(&event, now) {
        debug!(
            "Programme membership {} excluded; cancelling any scheduled notifications",
            event.tis_id
        );
        context.scheduler.cancel_for_reference(&event.tis_id).await?;
        return Ok(());
    }

    let user = context.recipient.resolve(&event.person_id).await?;
    let email = user.as_ref().and_then(|u| u.email.clone());
    let variables = base_variables(&event);

    let planned = context.rules.plan_programme_notifications(&event, now);

    // Week reminders and day one: schedule what is planned, cancel the
    // rest so a shortened lead never fires late
    for notification_type in reminder_types() {
        let job_id = RulesService::job_id(notification_type, &event.tis_id);
        match planned
            .iter()
            .find(|p| p.notification_type == notification_type)
        {
            Some(plan) => {
                let payload = payload_for(
                    context,
                    notification_type,
                    &event.person_id,
                    &reference,
                    email.clone(),
                    variables.clone(),
                )?;
                let jitter = if plan.day_of_milestone {
                    context.day_of_jitter
                } else {
                    std::time::Duration::ZERO
                };
                context
                    .scheduler
                    .schedule(&job_id, plan.fire_at, &payload, jitter)
                    .await?;
            }
            None => {
                context.scheduler.cancel(&job_id).await?;
            }
        }
    }

    reconcile_programme_created(context, &event, &reference, email.clone(), &variables, now)
        .await?;
    reconcile_pog(context, &event, &reference, email.clone(), &variables).await?;
    create_in_app_rows(context, &event, &reference, user.as_ref()).await?;

    info!(
        "Programme membership {} ingested for trainee {}",
        event.tis_id, event.person_id
    );

    Ok(())
}

/// Handle a programme membership deletion: cancel everything scheduled
/// and mark the surviving non-terminal history rows deleted
pub async fn handle_deleted(context: &IngestContext, record: Value) -> Result<(), DispatchError> {
    let event: ProgrammeMembershipEvent = serde_json::from_value(record)
        .map_err(|e| DispatchError::Config(format!("Malformed programme membership: {}", e)))?;
    let reference = Reference::programme_membership(&event.tis_id);

    let cancelled = context.scheduler.cancel_for_reference(&event.tis_id).await?;
    let deleted = context.history.mark_reference_deleted(&reference).await?;

    info!(
        "Programme membership {} deleted: {} jobs cancelled, {} history rows marked deleted",
        event.tis_id, cancelled, deleted
    );

    Ok(())
}

/// Day-one plus the week-K reminder types
fn reminder_types() -> Vec<NotificationType> {
    let mut types = vec![NotificationType::ProgrammeDayOne];
    types.extend(REMINDER_WEEKS.iter().filter_map(|w| NotificationType::programme_week(*w)));
    types
}

/// PROGRAMME_CREATED reconciliation: first ingest schedules it, a
/// deferral reschedules it with the original lead time, any other
/// change leaves the sent notification alone
async fn reconcile_programme_created(
    context: &IngestContext,
    event: &ProgrammeMembershipEvent,
    reference: &Reference,
    email: Option<String>,
    variables: &Map<String, Value>,
    now: chrono::DateTime<Utc>,
) -> Result<(), DispatchError> {
    let job_id = RulesService::job_id(NotificationType::ProgrammeCreated, &event.tis_id);
    let payload = payload_for(
        context,
        NotificationType::ProgrammeCreated,
        &event.person_id,
        reference,
        email,
        variables.clone(),
    )?;

    let prior_sent = context
        .history
        .find_latest(
            &event.person_id,
            reference,
            NotificationType::ProgrammeCreated,
            NotificationStatus::Sent,
        )
        .await?;

    match prior_sent {
        None => {
            context
                .scheduler
                .schedule(&job_id, now, &payload, std::time::Duration::ZERO)
                .await?;
        }
        Some(sent_row) => {
            let old_start = date_variable(&sent_row, "startDate");
            let (Some(old_start), Some(new_start)) = (old_start, event.start_date) else {
                return Ok(());
            };

            if context.rules.is_deferral(old_start, new_start) {
                let fire_at = context.rules.deferred_fire_time(
                    old_start,
                    sent_row.sent_at,
                    new_start,
                    now,
                );
                info!(
                    "Deferral detected for programme membership {}; rescheduling PROGRAMME_CREATED to {}",
                    event.tis_id, fire_at
                );
                // The original history row stays untouched; the fresh job
                // writes its own row
                context
                    .scheduler
                    .schedule(&job_id, fire_at, &payload, std::time::Duration::ZERO)
                    .await?;
            }
        }
    }

    Ok(())
}

/// POG reconciliation: schedule the planned notification unless an
/// already-sent one exists without a qualifying CCT extension; cancel
/// whichever POG notification is no longer planned
async fn reconcile_pog(
    context: &IngestContext,
    event: &ProgrammeMembershipEvent,
    reference: &Reference,
    email: Option<String>,
    variables: &Map<String, Value>,
) -> Result<(), DispatchError> {
    let now = Utc::now();
    let planned = context.rules.plan_pog_notification(event, now);

    for pog_type in [
        NotificationType::ProgrammePogMonth12,
        NotificationType::ProgrammePogMonth6,
    ] {
        let job_id = RulesService::job_id(pog_type, &event.tis_id);
        let plan = planned
            .as_ref()
            .filter(|p| p.notification_type == pog_type);

        let Some(plan) = plan else {
            context.scheduler.cancel(&job_id).await?;
            continue;
        };

        let prior_sent = context
            .history
            .find_latest(&event.person_id, reference, pog_type, NotificationStatus::Sent)
            .await?;

        if let Some(sent_row) = &prior_sent {
            let old_cct = date_variable(sent_row, "cctDate");
            let extension = match (old_cct, event.cct_date()) {
                (Some(old), Some(new)) => context.rules.is_pog_extension(old, new),
                _ => false,
            };
            if !extension {
                debug!(
                    "{} already sent for {} and CCT not extended; leaving as-is",
                    pog_type.as_str(),
                    event.tis_id
                );
                continue;
            }
        }

        let payload = payload_for(
            context,
            pog_type,
            &event.person_id,
            reference,
            email.clone(),
            variables.clone(),
        )?;
        context
            .scheduler
            .schedule(&job_id, plan.fire_at, &payload, context.day_of_jitter)
            .await?;
    }

    Ok(())
}

/// The in-app notifications owed at programme-create time
async fn create_in_app_rows(
    context: &IngestContext,
    event: &ProgrammeMembershipEvent,
    reference: &Reference,
    user: Option<&crate::models::UserDetails>,
) -> Result<(), DispatchError> {
    let base_flags = EligibilityFlags {
        valid_recipient: context
            .recipient
            .is_valid_recipient(&event.person_id, MessageKind::InApp)
            .await?,
        messaging_enabled: context
            .recipient
            .is_messaging_enabled(&event.person_id)
            .await?,
        has_dummy_role: user.is_some_and(|u| context.recipient.user_has_dummy_role(u)),
        whitelisted: context.recipient.is_whitelisted(&event.person_id),
        contact_missing: false,
    };

    for notification_type in context.rules.plan_programme_in_app() {
        let mut variables = Map::new();
        variables.insert("programmeName".to_string(), json!(event.programme_name));
        variables.insert("startDate".to_string(), json!(event.start_date));

        if notification_type == NotificationType::IndemnityInsurance {
            variables.insert(
                "blockIndemnity".to_string(),
                json!(event.has_block_indemnity()),
            );
        }

        // A directory miss on an LO-targeted type suppresses that row
        let mut contact_missing = false;
        if let Some(contact_type) = local_office_contact_type(notification_type) {
            let directory = context
                .contacts
                .list_contacts(event.managing_deanery.as_deref())
                .await;
            let (contact, href_type) = ContactService::resolve_contact_with_href(
                &directory,
                contact_type,
                ContactType::TssSupport,
            );
            contact_missing = contact == DEFAULT_CONTACT;
            variables.insert("localOfficeContact".to_string(), json!(contact));
            variables.insert(
                "localOfficeContactType".to_string(),
                json!(href_type.as_str()),
            );
        }

        let flags = EligibilityFlags {
            contact_missing,
            ..base_flags
        };
        let just_log = user.is_none() || RulesService::just_log(flags);

        let version = context.templates.pinned_version(notification_type)?;
        context
            .in_app
            .create_in_app(
                &event.person_id,
                reference,
                notification_type,
                &version,
                variables,
                just_log,
            )
            .await?;
    }

    Ok(())
}

/// Which in-app notifications carry a local office contact, and of
/// what directory type
fn local_office_contact_type(notification_type: NotificationType) -> Option<ContactType> {
    match notification_type {
        NotificationType::Ltft => Some(ContactType::Ltft),
        NotificationType::Deferral => Some(ContactType::Deferral),
        NotificationType::Sponsorship => Some(ContactType::Sponsorship),
        _ => None,
    }
}

/// The variables every programme notification binds
fn base_variables(event: &ProgrammeMembershipEvent) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert("programmeName".to_string(), json!(event.programme_name));
    variables.insert("startDate".to_string(), json!(event.start_date));
    variables.insert("owner".to_string(), json!(event.managing_deanery));
    variables.insert("cctDate".to_string(), json!(event.cct_date()));
    variables.insert(
        "responsibleOfficer".to_string(),
        json!(event.responsible_officer),
    );
    variables.insert("designatedBody".to_string(), json!(event.designated_body));
    if let Some(coj) = &event.conditions_of_joining {
        variables.insert("cojSyncedAt".to_string(), json!(coj.synced_at));
    }
    variables
}

/// Build a trigger payload with the pinned template version
fn payload_for(
    context: &IngestContext,
    notification_type: NotificationType,
    trainee_id: &str,
    reference: &Reference,
    contact: Option<String>,
    variables: Map<String, Value>,
) -> Result<TriggerPayload, DispatchError> {
    let version = context.templates.pinned_version(notification_type)?;
    let mut template = TemplateBinding::new(notification_type.template_name(), version);
    template.variables = variables;

    Ok(TriggerPayload {
        notification_type,
        recipient: Recipient {
            trainee_id: trainee_id.to_string(),
            message_kind: notification_type.message_kind(),
            contact,
        },
        reference: Some(reference.clone()),
        template,
    })
}

/// Read a date variable back off a stored history row
fn date_variable(row: &History, key: &str) -> Option<NaiveDate> {
    row.variables
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}
