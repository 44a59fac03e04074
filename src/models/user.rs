/*!
 * User Models
 *
 * The authoritative identity record, the trainee profile record, and
 * the merged view the engine works with.
 */

use serde::{Deserialize, Serialize};

/// Account record from the authoritative identity store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityAccount {
    #[serde(default)]
    pub registered: bool,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
}

/// Trainee record from the profile store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraineeProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub gmc_number: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Merged view of the identity and profile stores for one trainee
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub registered: bool,
    pub email: Option<String>,
    pub title: Option<String>,
    pub family_name: Option<String>,
    pub given_name: Option<String>,
    pub gmc_number: Option<String>,
    pub roles: Vec<String>,
}
