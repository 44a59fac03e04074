/*!
 * Domain Event Models
 *
 * Snapshot payloads consumed from the inbound event queues. Field names
 * mirror the upstream JSON (camelCase); deserialisation is lenient so a
 * partially populated snapshot still ingests.
 */

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Conditions of Joining sub-document on a programme membership
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionsOfJoining {
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

/// One curriculum attached to a programme membership
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Curriculum {
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub block_indemnity: bool,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub eligible_for_period_of_grace: bool,
}

/// Programme membership snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammeMembershipEvent {
    pub tis_id: String,
    pub person_id: String,
    #[serde(default)]
    pub programme_name: Option<String>,
    #[serde(default)]
    pub managing_deanery: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub conditions_of_joining: Option<ConditionsOfJoining>,
    #[serde(default)]
    pub curricula: Option<Vec<Curriculum>>,
    #[serde(default)]
    pub responsible_officer: Option<String>,
    #[serde(default)]
    pub designated_body: Option<String>,
}

impl ProgrammeMembershipEvent {
    /// CCT date: the latest curriculum end date among curricula eligible
    /// for a period of grace, if any
    pub fn cct_date(&self) -> Option<NaiveDate> {
        self.curricula
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|c| c.eligible_for_period_of_grace)
            .filter_map(|c| c.end_date)
            .max()
    }

    /// Whether any curriculum carries block indemnity
    pub fn has_block_indemnity(&self) -> bool {
        self.curricula
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|c| c.block_indemnity)
    }
}

/// Placement snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementEvent {
    pub tis_id: String,
    pub person_id: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default, rename = "placementType")]
    pub placement_type: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub managing_deanery: Option<String>,
}

/// GMC details update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmcUpdateEvent {
    pub trainee_id: String,
    #[serde(default)]
    pub gmc_number: Option<String>,
    #[serde(default)]
    pub gmc_status: Option<String>,
    #[serde(default)]
    pub trigger: Option<String>,
}

/// GMC details rejection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmcRejectedEvent {
    pub trainee_id: String,
    #[serde(default)]
    pub gmc_number: Option<String>,
    #[serde(default)]
    pub gmc_status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// LTFT form state as reported by the forms service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtftStatus {
    #[serde(default)]
    pub current: LtftStatusDetail,
}

/// Current state entry on an LTFT form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtftStatusDetail {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// TPD discussion details on an LTFT form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtftDiscussions {
    #[serde(default)]
    pub tpd_name: Option<String>,
    #[serde(default)]
    pub tpd_email: Option<String>,
}

/// Programme membership summary embedded in an LTFT form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtftProgrammeMembership {
    #[serde(default)]
    pub managing_deanery: Option<String>,
}

/// LTFT form transition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtftUpdateEvent {
    pub trainee_id: String,
    #[serde(default)]
    pub form_ref: Option<String>,
    #[serde(default)]
    pub form_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub programme_membership: Option<LtftProgrammeMembership>,
    #[serde(default)]
    pub personal_details: Option<serde_json::Value>,
    #[serde(default)]
    pub change: Option<serde_json::Value>,
    #[serde(default)]
    pub status: LtftStatus,
    #[serde(default)]
    pub discussions: Option<LtftDiscussions>,
}

impl LtftUpdateEvent {
    /// The lifecycle state driving notification selection
    pub fn current_state(&self) -> Option<&str> {
        self.status.current.state.as_deref()
    }
}

/// Conditions of Joining signed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CojSignedEvent {
    pub person_id: String,
    /// Programme membership the signature applies to
    pub tis_id: String,
    #[serde(default)]
    pub conditions_of_joining: Option<ConditionsOfJoining>,
}

/// Generic form deletion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDeletedEvent {
    pub trainee_id: String,
    /// Identifier of the deleted form
    pub form_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curriculum(
        end_date: Option<&str>,
        eligible: bool,
        block_indemnity: bool,
    ) -> Curriculum {
        Curriculum {
            sub_type: Some("MEDICAL_CURRICULUM".to_string()),
            specialty: Some("Cardiology".to_string()),
            block_indemnity,
            end_date: end_date.map(|d| d.parse().unwrap()),
            eligible_for_period_of_grace: eligible,
        }
    }

    #[test]
    fn test_cct_date_takes_max_eligible_end_date() {
        let event = ProgrammeMembershipEvent {
            curricula: Some(vec![
                curriculum(Some("2031-07-01"), true, false),
                curriculum(Some("2032-07-01"), true, false),
                curriculum(Some("2033-07-01"), false, false),
            ]),
            ..Default::default()
        };

        assert_eq!(event.cct_date(), Some("2032-07-01".parse().unwrap()));
    }

    #[test]
    fn test_cct_date_none_when_no_eligible_curricula() {
        let event = ProgrammeMembershipEvent {
            curricula: Some(vec![curriculum(Some("2032-07-01"), false, false)]),
            ..Default::default()
        };
        assert_eq!(event.cct_date(), None);

        let empty = ProgrammeMembershipEvent::default();
        assert_eq!(empty.cct_date(), None);
    }

    #[test]
    fn test_block_indemnity_any_curriculum() {
        let event = ProgrammeMembershipEvent {
            curricula: Some(vec![
                curriculum(None, false, false),
                curriculum(None, false, true),
            ]),
            ..Default::default()
        };
        assert!(event.has_block_indemnity());

        let without = ProgrammeMembershipEvent {
            curricula: Some(vec![curriculum(None, false, false)]),
            ..Default::default()
        };
        assert!(!without.has_block_indemnity());
    }

    #[test]
    fn test_programme_membership_deserialises_camel_case() {
        let json = r#"{
            "tisId": "pm-1",
            "personId": "40",
            "programmeName": "General Practice",
            "managingDeanery": "North West",
            "startDate": "2030-01-15",
            "conditionsOfJoining": {"syncedAt": "2026-05-01T10:00:00Z"},
            "curricula": [{
                "subType": "MEDICAL_CURRICULUM",
                "specialty": "Cardiology",
                "blockIndemnity": false,
                "endDate": "2032-07-01",
                "eligibleForPeriodOfGrace": true
            }]
        }"#;

        let event: ProgrammeMembershipEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.tis_id, "pm-1");
        assert_eq!(event.start_date, Some("2030-01-15".parse().unwrap()));
        assert!(event.conditions_of_joining.as_ref().unwrap().synced_at.is_some());
        assert_eq!(event.cct_date(), Some("2032-07-01".parse().unwrap()));
    }

    #[test]
    fn test_ltft_event_current_state() {
        let json = r#"{
            "traineeId": "40",
            "formRef": "ltft_40_001",
            "formName": "LTFT application",
            "programmeMembership": {"managingDeanery": "North West"},
            "status": {"current": {"state": "SUBMITTED", "detail": "Submitted by trainee"}},
            "discussions": {"tpdName": "Dr T", "tpdEmail": "tpd@example.com"}
        }"#;

        let event: LtftUpdateEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.current_state(), Some("SUBMITTED"));
        assert_eq!(
            event.discussions.unwrap().tpd_email.as_deref(),
            Some("tpd@example.com")
        );
    }

    #[test]
    fn test_minimal_payloads_still_deserialise() {
        let event: ProgrammeMembershipEvent =
            serde_json::from_str(r#"{"tisId": "pm-1", "personId": "40"}"#).unwrap();
        assert!(event.start_date.is_none());
        assert!(event.curricula.is_none());

        let ltft: LtftUpdateEvent =
            serde_json::from_str(r#"{"traineeId": "40"}"#).unwrap();
        assert_eq!(ltft.current_state(), None);
    }
}
