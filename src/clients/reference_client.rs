/*!
 * Reference Data Client
 *
 * Resolves local-office names to their typed contact directories, and
 * local-office contacts by trainee. Lookup failures degrade to an empty
 * directory; a missing contact must never fail a notification.
 */

use crate::models::LocalOfficeContact;

/// Client for the reference data SPI
#[derive(Clone)]
pub struct ReferenceClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReferenceClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Ordered contact directory for a local office; empty on any
    /// lookup failure or missing office name
    pub async fn list_contacts(&self, local_office: Option<&str>) -> Vec<LocalOfficeContact> {
        let Some(local_office) = local_office.filter(|name| !name.trim().is_empty()) else {
            return Vec::new();
        };

        let url = format!(
            "{}/api/local-office-contact-by-lo-name/{}",
            self.base_url, local_office
        );

        match self.fetch_contacts(&url).await {
            Ok(contacts) => contacts,
            Err(e) => {
                tracing::warn!(
                    "Local office contact lookup failed for {}: {}",
                    local_office,
                    e
                );
                Vec::new()
            }
        }
    }

    /// Contacts of one type across all of a trainee's local offices;
    /// empty on any lookup failure
    pub async fn list_trainee_contacts(
        &self,
        trainee_id: &str,
        contact_type: &str,
    ) -> Vec<LocalOfficeContact> {
        let url = format!(
            "{}/api/local-office-contact-by-trainee/{}?contactType={}",
            self.base_url, trainee_id, contact_type
        );

        match self.fetch_contacts(&url).await {
            Ok(contacts) => contacts,
            Err(e) => {
                tracing::warn!(
                    "Trainee contact lookup failed for {} ({}): {}",
                    trainee_id,
                    contact_type,
                    e
                );
                Vec::new()
            }
        }
    }

    async fn fetch_contacts(&self, url: &str) -> Result<Vec<LocalOfficeContact>, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<LocalOfficeContact>>()
            .await
    }
}
