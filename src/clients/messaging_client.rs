/*!
 * Messaging Controller Client
 *
 * Eligibility queries: recipient validity, new-starter status,
 * pilot/rollout cohort membership and the global messaging kill-switch.
 */

use serde::Deserialize;

use crate::models::MessageKind;
use crate::utils::DispatchError;

#[derive(Debug, Deserialize)]
struct EligibilityResponse {
    #[serde(default)]
    result: bool,
}

/// Client for the messaging controller SPI
#[derive(Clone)]
pub struct MessagingClient {
    client: reqwest::Client,
    base_url: String,
}

impl MessagingClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn query(&self, path: &str) -> Result<bool, DispatchError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(DispatchError::from_reqwest)?
            .error_for_status()
            .map_err(DispatchError::from_reqwest)?;

        let eligibility = response
            .json::<EligibilityResponse>()
            .await
            .map_err(DispatchError::from_reqwest)?;

        Ok(eligibility.result)
    }

    /// Whether the trainee is a valid recipient for the given medium
    pub async fn is_valid_recipient(
        &self,
        trainee_id: &str,
        message_kind: MessageKind,
    ) -> Result<bool, DispatchError> {
        self.query(&format!(
            "/api/recipient/{}/valid?messageKind={}",
            trainee_id,
            message_kind.as_str()
        ))
        .await
    }

    /// Whether this programme membership makes the trainee a new starter
    pub async fn is_programme_membership_new_starter(
        &self,
        trainee_id: &str,
        tis_id: &str,
    ) -> Result<bool, DispatchError> {
        self.query(&format!(
            "/api/programme-membership/{}/{}/new-starter",
            trainee_id, tis_id
        ))
        .await
    }

    /// Whether this programme membership is in the 2024 pilot cohort
    pub async fn is_programme_membership_in_pilot_2024(
        &self,
        trainee_id: &str,
        tis_id: &str,
    ) -> Result<bool, DispatchError> {
        self.query(&format!(
            "/api/programme-membership/{}/{}/pilot-2024",
            trainee_id, tis_id
        ))
        .await
    }

    /// Whether this programme membership is in the 2024 rollout cohort
    pub async fn is_programme_membership_in_rollout_2024(
        &self,
        trainee_id: &str,
        tis_id: &str,
    ) -> Result<bool, DispatchError> {
        self.query(&format!(
            "/api/programme-membership/{}/{}/rollout-2024",
            trainee_id, tis_id
        ))
        .await
    }

    /// Whether this placement is in the 2024 pilot cohort
    pub async fn is_placement_in_pilot_2024(
        &self,
        trainee_id: &str,
        tis_id: &str,
    ) -> Result<bool, DispatchError> {
        self.query(&format!("/api/placement/{}/{}/pilot-2024", trainee_id, tis_id))
            .await
    }

    /// Whether this placement is in the 2024 rollout cohort
    pub async fn is_placement_in_rollout_2024(
        &self,
        trainee_id: &str,
        tis_id: &str,
    ) -> Result<bool, DispatchError> {
        self.query(&format!(
            "/api/placement/{}/{}/rollout-2024",
            trainee_id, tis_id
        ))
        .await
    }

    /// Global messaging kill-switch
    pub async fn is_messaging_enabled(&self, trainee_id: &str) -> Result<bool, DispatchError> {
        self.query(&format!("/api/messaging/{}/enabled", trainee_id))
            .await
    }
}
