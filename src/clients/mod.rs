/*!
 * SPI Clients Module
 *
 * Thin reqwest-backed clients for the request/response SPIs: trainee
 * profile store, authoritative identity store, messaging controller
 * (eligibility) and reference data (local office contacts).
 *
 * Every call runs under the configured SPI timeout; a timeout or
 * connection failure classifies as a transient transport error.
 */

pub mod identity_client;
pub mod messaging_client;
pub mod profile_client;
pub mod reference_client;

pub use identity_client::IdentityClient;
pub use messaging_client::MessagingClient;
pub use profile_client::ProfileClient;
pub use reference_client::ReferenceClient;

use crate::config::SpiConfig;

/// Build the shared HTTP client with the configured SPI timeout
pub fn build_http_client(config: &SpiConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .unwrap_or_default()
}
