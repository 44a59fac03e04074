/*!
 * Dispatch Worker Service
 *
 * Executes a fired job: refresh the recipient, re-check the rules just
 * in time, populate the standard template variables, render, hand to
 * the transport (honouring the just-log suppression), record the
 * outcome in history and broadcast it.
 *
 * Also the entry point for the immediate dispatch paths (GMC, LTFT):
 * those run the same pipeline without a durable trigger.
 */

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    ContactType, HrefType, MessageKind, NotificationStatus, NotificationType, ReferenceKind,
    ScheduledTrigger, TriggerPayload, UserDetails,
};
use crate::services::contact_service::{ContactService, DEFAULT_CONTACT};
use crate::services::email_service::EmailService;
use crate::services::history_service::HistoryService;
use crate::services::in_app_service::JUST_LOGGED_DETAIL;
use crate::services::recipient_service::RecipientService;
use crate::services::rules_service::{EligibilityFlags, RulesService};
use crate::services::template_service::TemplateService;
use crate::utils::validators::GmcValidator;
use crate::utils::DispatchError;

/// Detail recorded when the just-in-time re-check no longer applies
pub const CRITERIA_NOT_MET_DETAIL: &str = "criteria not met";

/// Dispatch worker
#[derive(Clone)]
pub struct DispatchService {
    history: HistoryService,
    recipient: RecipientService,
    contacts: ContactService,
    templates: TemplateService,
    email: EmailService,
}

impl DispatchService {
    pub fn new(
        history: HistoryService,
        recipient: RecipientService,
        contacts: ContactService,
        templates: TemplateService,
        email: EmailService,
    ) -> Self {
        Self {
            history,
            recipient,
            contacts,
            templates,
            email,
        }
    }

    /// Execute a fired trigger
    pub async fn dispatch(&self, trigger: &ScheduledTrigger) -> Result<(), DispatchError> {
        let payload = trigger
            .payload()
            .map_err(|e| DispatchError::Config(format!("Unreadable trigger payload: {}", e)))?;

        self.execute(&payload, trigger.history_id).await
    }

    /// Run the dispatch pipeline for a payload whose SCHEDULED history
    /// row already exists. Shared by the scheduler fire path and the
    /// immediate (GMC / LTFT) paths.
    pub async fn execute(
        &self,
        payload: &TriggerPayload,
        history_id: Uuid,
    ) -> Result<(), DispatchError> {
        let notification_type = payload.notification_type;
        let trainee_id = &payload.recipient.trainee_id;

        // Refresh the recipient; a missing profile completes as just-logged
        let user = self.recipient.resolve(trainee_id).await?;

        let contact = self.refresh_contact(payload, user.as_ref());

        // Just-in-time applicability re-check
        let criteria_met = self.recheck_criteria(payload).await?;

        // Owner (deanery) contact resolution, ahead of the suppression
        // decision: a directory miss on a notification that links to
        // the local office must suppress real delivery
        let owner = payload
            .template
            .variables
            .get("owner")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let owner_contact = match &owner {
            Some(owner) => {
                let directory = self.contacts.list_contacts(Some(owner)).await;
                Some(ContactService::resolve_contact_with_href(
                    &directory,
                    Self::preferred_contact_type(payload.notification_type),
                    ContactType::TssSupport,
                ))
            }
            None => None,
        };

        // Eligibility flags feeding the suppress-vs-send decision
        let flags = EligibilityFlags {
            valid_recipient: self
                .recipient
                .is_valid_recipient(trainee_id, payload.recipient.message_kind)
                .await?,
            messaging_enabled: self.recipient.is_messaging_enabled(trainee_id).await?,
            has_dummy_role: user
                .as_ref()
                .is_some_and(|u| self.recipient.user_has_dummy_role(u)),
            whitelisted: self.recipient.is_whitelisted(trainee_id),
            contact_missing: (payload.recipient.message_kind == MessageKind::Email
                && contact.is_none())
                || Self::owner_contact_missing(owner_contact.as_ref()),
        };

        let just_log = !criteria_met || user.is_none() || RulesService::just_log(flags);

        // Standard template variables over the caller-supplied ones
        let variables =
            Self::populate_variables(payload, user.as_ref(), contact.as_deref(), owner_contact);

        // Version re-pinned from configuration at fire time
        let version = self.templates.pinned_version(notification_type)?;
        let template_path = TemplateService::template_path(
            payload.recipient.message_kind,
            notification_type.template_name(),
            &version,
        );

        match payload.recipient.message_kind {
            MessageKind::Email => {
                let body = self.templates.render(&template_path, "content", &variables)?;
                let subject = self
                    .templates
                    .render_subject(
                        MessageKind::Email,
                        notification_type.template_name(),
                        &version,
                        &variables,
                    )
                    .unwrap_or_else(|| "TIS Trainee Notifications".to_string());

                match &contact {
                    Some(address) => {
                        self.email
                            .send_notification(address, &subject, &body, just_log)
                            .await?;
                    }
                    None => {
                        info!(
                            "No address for {} to trainee {}; completing as just-logged",
                            notification_type.as_str(),
                            trainee_id
                        );
                    }
                }
            }
            MessageKind::InApp => {
                // In-app delivery is the history transition itself; the
                // render still runs so bad templates surface here
                self.templates.render(&template_path, "content", &variables)?;
            }
        }

        let detail = if !criteria_met {
            Some(CRITERIA_NOT_MET_DETAIL.to_string())
        } else if just_log {
            Some(JUST_LOGGED_DETAIL.to_string())
        } else {
            None
        };

        let resolved_status = match payload.recipient.message_kind {
            MessageKind::Email => NotificationStatus::Sent,
            MessageKind::InApp => NotificationStatus::Unread,
        };

        self.history
            .update_status(history_id, resolved_status, detail)
            .await?;

        debug!(
            "Dispatched {} for trainee {} (just_log: {})",
            notification_type.as_str(),
            trainee_id,
            just_log
        );

        Ok(())
    }

    /// Refresh the contact string per the fire-time rules: trainee-
    /// addressed email takes the identity store's current address,
    /// LO- and TPD-addressed email keeps the planned address, in-app
    /// always addresses the trainee id.
    fn refresh_contact(
        &self,
        payload: &TriggerPayload,
        user: Option<&UserDetails>,
    ) -> Option<String> {
        match payload.recipient.message_kind {
            MessageKind::InApp => Some(payload.recipient.trainee_id.clone()),
            MessageKind::Email => {
                if Self::addressed_to_trainee(payload.notification_type) {
                    user.and_then(|u| u.email.clone())
                } else {
                    payload.recipient.contact.clone()
                }
            }
        }
    }

    /// Whether an email notification is addressed to the trainee
    /// (rather than a local office or TPD contact)
    fn addressed_to_trainee(notification_type: NotificationType) -> bool {
        !matches!(
            notification_type,
            NotificationType::GmcUpdated
                | NotificationType::GmcRejectedLo
                | NotificationType::LtftApprovedTpd
                | NotificationType::LtftSubmittedTpd
        )
    }

    /// Just-in-time rules re-check against the messaging controller
    async fn recheck_criteria(&self, payload: &TriggerPayload) -> Result<bool, DispatchError> {
        let trainee_id = &payload.recipient.trainee_id;
        let Some(reference) = &payload.reference else {
            return Ok(true);
        };

        let (new_starter, in_pilot, in_rollout) = match reference.kind {
            ReferenceKind::ProgrammeMembership => {
                let new_starter = self
                    .recipient
                    .is_programme_membership_new_starter(trainee_id, &reference.id)
                    .await?;
                let in_rollout = self
                    .recipient
                    .is_programme_membership_in_rollout_2024(trainee_id, &reference.id)
                    .await?;
                (new_starter, false, in_rollout)
            }
            ReferenceKind::Placement => {
                let in_pilot = self
                    .recipient
                    .is_placement_in_pilot_2024(trainee_id, &reference.id)
                    .await?;
                let in_rollout = self
                    .recipient
                    .is_placement_in_rollout_2024(trainee_id, &reference.id)
                    .await?;
                (false, in_pilot, in_rollout)
            }
            ReferenceKind::LtftForm => return Ok(true),
        };

        Ok(RulesService::is_still_applicable(
            payload.notification_type,
            new_starter,
            in_pilot,
            in_rollout,
        ))
    }

    /// Whether an owner-linked notification failed to resolve a
    /// concrete local office contact (the directory fell back to the
    /// default wording)
    fn owner_contact_missing(owner_contact: Option<&(String, HrefType)>) -> bool {
        owner_contact.is_some_and(|(contact, _)| contact == DEFAULT_CONTACT)
    }

    /// Merge the standard variables over the caller-supplied map
    fn populate_variables(
        payload: &TriggerPayload,
        user: Option<&UserDetails>,
        contact: Option<&str>,
        owner_contact: Option<(String, HrefType)>,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut variables = payload.template.variables.clone();

        variables.insert(
            "personId".to_string(),
            json!(payload.recipient.trainee_id),
        );
        if let Some(reference) = &payload.reference {
            variables.insert("tisId".to_string(), json!(reference.id));
        }
        if let Some(contact) = contact {
            variables.insert("contact".to_string(), json!(contact));
        }

        if let Some(user) = user {
            variables.insert("familyName".to_string(), json!(user.family_name));
            variables.insert("givenName".to_string(), json!(user.given_name));
            variables.insert("title".to_string(), json!(user.title));
            variables.insert("isRegistered".to_string(), json!(user.registered));
            variables.insert("gmcNumber".to_string(), json!(user.gmc_number));
            let valid_gmc = user
                .gmc_number
                .as_deref()
                .map(GmcValidator::validate)
                .unwrap_or(false);
            variables.insert("isValidGmc".to_string(), json!(valid_gmc));
        }

        if let Some((resolved, href_type)) = owner_contact {
            variables.insert("ownerContact".to_string(), json!(resolved));
            variables.insert("contactHref".to_string(), json!(href_type.as_str()));
        }

        variables
    }

    /// Directory contact type a notification prefers when linking the
    /// reader to their local office
    fn preferred_contact_type(notification_type: NotificationType) -> ContactType {
        match notification_type {
            NotificationType::Ltft
            | NotificationType::LtftApproved
            | NotificationType::LtftSubmitted
            | NotificationType::LtftUnsubmitted
            | NotificationType::LtftWithdrawn
            | NotificationType::LtftUpdated => ContactType::Ltft,
            NotificationType::Deferral => ContactType::Deferral,
            NotificationType::Sponsorship => ContactType::Sponsorship,
            NotificationType::GmcUpdated
            | NotificationType::GmcRejectedLo
            | NotificationType::GmcRejectedTrainee => ContactType::GmcUpdate,
            _ => ContactType::Onboarding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trainee_addressing() {
        assert!(DispatchService::addressed_to_trainee(
            NotificationType::ProgrammeCreated
        ));
        assert!(DispatchService::addressed_to_trainee(
            NotificationType::GmcRejectedTrainee
        ));
        assert!(DispatchService::addressed_to_trainee(
            NotificationType::LtftApproved
        ));

        assert!(!DispatchService::addressed_to_trainee(
            NotificationType::GmcUpdated
        ));
        assert!(!DispatchService::addressed_to_trainee(
            NotificationType::GmcRejectedLo
        ));
        assert!(!DispatchService::addressed_to_trainee(
            NotificationType::LtftSubmittedTpd
        ));
    }

    #[test]
    fn test_empty_owner_directory_forces_just_log() {
        // An LTFT notification whose local office has no directory
        // entries resolves the default wording and must suppress
        let resolved = ContactService::resolve_contact_with_href(
            &[],
            DispatchService::preferred_contact_type(NotificationType::LtftApproved),
            ContactType::TssSupport,
        );
        assert_eq!(resolved.0, DEFAULT_CONTACT);
        assert!(DispatchService::owner_contact_missing(Some(&resolved)));

        let flags = EligibilityFlags {
            valid_recipient: true,
            messaging_enabled: true,
            contact_missing: DispatchService::owner_contact_missing(Some(&resolved)),
            ..Default::default()
        };
        assert!(RulesService::just_log(flags));
    }

    #[test]
    fn test_resolved_owner_directory_does_not_suppress() {
        let resolved = (
            "ltft@lo.nhs.uk".to_string(),
            HrefType::ProtocolEmail,
        );
        assert!(!DispatchService::owner_contact_missing(Some(&resolved)));
        // Notifications without an owner variable have nothing to resolve
        assert!(!DispatchService::owner_contact_missing(None));
    }

    #[test]
    fn test_owner_variables_carry_the_default_fallback() {
        let payload = TriggerPayload {
            notification_type: NotificationType::Ltft,
            recipient: crate::models::Recipient {
                trainee_id: "40".to_string(),
                message_kind: MessageKind::InApp,
                contact: Some("40".to_string()),
            },
            reference: None,
            template: crate::models::TemplateBinding::new("ltft", "v1.0.0")
                .with("owner", "North West"),
        };

        let variables = DispatchService::populate_variables(
            &payload,
            None,
            None,
            Some((DEFAULT_CONTACT.to_string(), HrefType::NonHref)),
        );
        assert_eq!(variables["ownerContact"], DEFAULT_CONTACT);
        assert_eq!(variables["contactHref"], HrefType::NonHref.as_str());
    }

    #[test]
    fn test_preferred_contact_types() {
        assert_eq!(
            DispatchService::preferred_contact_type(NotificationType::Ltft),
            ContactType::Ltft
        );
        assert_eq!(
            DispatchService::preferred_contact_type(NotificationType::Deferral),
            ContactType::Deferral
        );
        assert_eq!(
            DispatchService::preferred_contact_type(NotificationType::GmcUpdated),
            ContactType::GmcUpdate
        );
        assert_eq!(
            DispatchService::preferred_contact_type(NotificationType::ProgrammeDayOne),
            ContactType::Onboarding
        );
    }
}
