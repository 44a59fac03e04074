/*!
 * Recipient Resolver Service
 *
 * Merges the authoritative identity store's account record with the
 * trainee profile record, and answers the eligibility questions the
 * rules engine and dispatch worker ask about a recipient.
 */

use crate::clients::{IdentityClient, MessagingClient, ProfileClient};
use crate::config::RulesConfig;
use crate::models::{IdentityAccount, MessageKind, TraineeProfile, UserDetails};
use crate::utils::DispatchError;

/// Merge the identity and profile records for one trainee.
///
/// Returns None iff the profile store has no record: an identity
/// account alone is not enough to address a notification.
pub fn merge_user_details(
    identity: Option<IdentityAccount>,
    profile: Option<TraineeProfile>,
) -> Option<UserDetails> {
    let profile = profile?;
    let identity = identity.unwrap_or_default();

    let email = identity
        .email
        .or(profile.email)
        .filter(|e| !e.trim().is_empty());

    let gmc_number = profile
        .gmc_number
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty());

    Some(UserDetails {
        registered: identity.registered,
        email,
        title: profile.title,
        family_name: identity.family_name.or(profile.family_name),
        given_name: identity.given_name.or(profile.given_name),
        gmc_number,
        roles: profile.roles,
    })
}

/// Recipient resolver
#[derive(Clone)]
pub struct RecipientService {
    identity: IdentityClient,
    profile: ProfileClient,
    messaging: MessagingClient,
    dummy_roles: Vec<String>,
    whitelisted_trainees: Vec<String>,
}

impl RecipientService {
    pub fn new(
        identity: IdentityClient,
        profile: ProfileClient,
        messaging: MessagingClient,
        rules: &RulesConfig,
    ) -> Self {
        Self {
            identity,
            profile,
            messaging,
            dummy_roles: rules.dummy_roles.clone(),
            whitelisted_trainees: rules.whitelisted_trainees.clone(),
        }
    }

    /// Resolve the merged user details for a trainee
    pub async fn resolve(&self, trainee_id: &str) -> Result<Option<UserDetails>, DispatchError> {
        let identity = self.identity.get_account(trainee_id).await?;
        let profile = self.profile.get_account_details(trainee_id).await?;

        Ok(merge_user_details(identity, profile))
    }

    /// Whether the user carries any configured dummy role
    pub fn user_has_dummy_role(&self, user: &UserDetails) -> bool {
        user.roles
            .iter()
            .any(|role| self.dummy_roles.iter().any(|dummy| dummy == role))
    }

    /// Whether the trainee is in the configured whitelist
    pub fn is_whitelisted(&self, trainee_id: &str) -> bool {
        self.whitelisted_trainees.iter().any(|id| id == trainee_id)
    }

    /// Whether the trainee is a valid recipient for the given medium
    pub async fn is_valid_recipient(
        &self,
        trainee_id: &str,
        message_kind: MessageKind,
    ) -> Result<bool, DispatchError> {
        self.messaging
            .is_valid_recipient(trainee_id, message_kind)
            .await
    }

    /// Whether the programme membership makes the trainee a new starter
    pub async fn is_programme_membership_new_starter(
        &self,
        trainee_id: &str,
        tis_id: &str,
    ) -> Result<bool, DispatchError> {
        self.messaging
            .is_programme_membership_new_starter(trainee_id, tis_id)
            .await
    }

    /// Whether the programme membership is in the 2024 pilot cohort
    pub async fn is_programme_membership_in_pilot_2024(
        &self,
        trainee_id: &str,
        tis_id: &str,
    ) -> Result<bool, DispatchError> {
        self.messaging
            .is_programme_membership_in_pilot_2024(trainee_id, tis_id)
            .await
    }

    /// Whether the programme membership is in the 2024 rollout cohort
    pub async fn is_programme_membership_in_rollout_2024(
        &self,
        trainee_id: &str,
        tis_id: &str,
    ) -> Result<bool, DispatchError> {
        self.messaging
            .is_programme_membership_in_rollout_2024(trainee_id, tis_id)
            .await
    }

    /// Whether the placement is in the 2024 pilot cohort
    pub async fn is_placement_in_pilot_2024(
        &self,
        trainee_id: &str,
        tis_id: &str,
    ) -> Result<bool, DispatchError> {
        self.messaging
            .is_placement_in_pilot_2024(trainee_id, tis_id)
            .await
    }

    /// Whether the placement is in the 2024 rollout cohort
    pub async fn is_placement_in_rollout_2024(
        &self,
        trainee_id: &str,
        tis_id: &str,
    ) -> Result<bool, DispatchError> {
        self.messaging
            .is_placement_in_rollout_2024(trainee_id, tis_id)
            .await
    }

    /// Global messaging kill-switch
    pub async fn is_messaging_enabled(&self, trainee_id: &str) -> Result<bool, DispatchError> {
        self.messaging.is_messaging_enabled(trainee_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(registered: bool, email: Option<&str>) -> IdentityAccount {
        IdentityAccount {
            registered,
            email: email.map(str::to_string),
            family_name: Some("Identity".to_string()),
            given_name: Some("Ida".to_string()),
        }
    }

    fn profile(email: Option<&str>, gmc: Option<&str>) -> TraineeProfile {
        TraineeProfile {
            email: email.map(str::to_string),
            title: Some("Dr".to_string()),
            family_name: Some("Profile".to_string()),
            given_name: Some("Pat".to_string()),
            gmc_number: gmc.map(str::to_string),
            roles: vec!["DR in Training".to_string()],
        }
    }

    #[test]
    fn test_merge_returns_none_without_profile() {
        assert_eq!(merge_user_details(Some(identity(true, None)), None), None);
        assert_eq!(merge_user_details(None, None), None);
    }

    #[test]
    fn test_merge_without_identity_is_unregistered() {
        let merged = merge_user_details(None, Some(profile(Some("p@x.org"), None))).unwrap();
        assert!(!merged.registered);
        assert_eq!(merged.email.as_deref(), Some("p@x.org"));
        assert_eq!(merged.family_name.as_deref(), Some("Profile"));
    }

    #[test]
    fn test_merge_prefers_identity_email_and_names() {
        let merged = merge_user_details(
            Some(identity(true, Some("i@x.org"))),
            Some(profile(Some("p@x.org"), None)),
        )
        .unwrap();

        assert!(merged.registered);
        assert_eq!(merged.email.as_deref(), Some("i@x.org"));
        assert_eq!(merged.family_name.as_deref(), Some("Identity"));
        assert_eq!(merged.given_name.as_deref(), Some("Ida"));
        // Title only exists on the profile
        assert_eq!(merged.title.as_deref(), Some("Dr"));
    }

    #[test]
    fn test_merge_blank_email_becomes_none() {
        let merged = merge_user_details(
            Some(identity(true, Some("  "))),
            Some(profile(None, None)),
        )
        .unwrap();
        assert_eq!(merged.email, None);
    }

    #[test]
    fn test_merge_trims_gmc_and_blank_becomes_none() {
        let merged = merge_user_details(None, Some(profile(None, Some(" 1234567 ")))).unwrap();
        assert_eq!(merged.gmc_number.as_deref(), Some("1234567"));

        let blank = merge_user_details(None, Some(profile(None, Some("   ")))).unwrap();
        assert_eq!(blank.gmc_number, None);
    }
}
