/*!
 * Identity Store Client
 *
 * Fetches the authoritative account record for a trainee: registration
 * state, verified email and names.
 */

use reqwest::StatusCode;

use crate::models::IdentityAccount;
use crate::utils::DispatchError;

/// Client for the authoritative identity store
#[derive(Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetch the identity account for a trainee; None when the trainee
    /// has never registered
    pub async fn get_account(
        &self,
        trainee_id: &str,
    ) -> Result<Option<IdentityAccount>, DispatchError> {
        let url = format!("{}/api/user-account/{}", self.base_url, trainee_id);

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

        let account = response
            .json::<IdentityAccount>()
            .await
            .map_err(DispatchError::from_reqwest)?;

        Ok(Some(account))
    }
}
