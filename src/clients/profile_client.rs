/*!
 * Trainee Profile Client
 *
 * Fetches trainee account details from the profile store.
 */

use reqwest::StatusCode;

use crate::models::TraineeProfile;
use crate::utils::DispatchError;

/// Client for the trainee profile store
#[derive(Clone)]
pub struct ProfileClient {
    client: reqwest::Client,
    base_url: String,
}

impl ProfileClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetch account details for a trainee; None when the profile store
    /// has no record for the id
    pub async fn get_account_details(
        &self,
        trainee_id: &str,
    ) -> Result<Option<TraineeProfile>, DispatchError> {
        let url = format!("{}/account-details/{}", self.base_url, trainee_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(DispatchError::from_reqwest)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .map_err(DispatchError::from_reqwest)?;

        let profile = response
            .json::<TraineeProfile>()
            .await
            .map_err(DispatchError::from_reqwest)?;

        Ok(Some(profile))
    }
}
