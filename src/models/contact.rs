/*!
 * Contact Models
 *
 * Local-office contact directory entries and their classification.
 */

use serde::{Deserialize, Serialize};

/// Typed local-office contact categories served by the reference data SPI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactType {
    Ltft,
    LtftSupport,
    SupportedReturnToTraining,
    TssSupport,
    GmcUpdate,
    Deferral,
    Sponsorship,
    Onboarding,
}

impl ContactType {
    /// Convert to the reference-service value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ltft => "LTFT",
            Self::LtftSupport => "LTFT_SUPPORT",
            Self::SupportedReturnToTraining => "SUPPORTED_RETURN_TO_TRAINING",
            Self::TssSupport => "TSS_SUPPORT",
            Self::GmcUpdate => "GMC_UPDATE",
            Self::Deferral => "DEFERRAL",
            Self::Sponsorship => "SPONSORSHIP",
            Self::Onboarding => "ONBOARDING",
        }
    }

    /// Parse from the reference-service value
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LTFT" => Some(Self::Ltft),
            "LTFT_SUPPORT" => Some(Self::LtftSupport),
            "SUPPORTED_RETURN_TO_TRAINING" => Some(Self::SupportedReturnToTraining),
            "TSS_SUPPORT" => Some(Self::TssSupport),
            "GMC_UPDATE" => Some(Self::GmcUpdate),
            "DEFERRAL" => Some(Self::Deferral),
            "SPONSORSHIP" => Some(Self::Sponsorship),
            "ONBOARDING" => Some(Self::Onboarding),
            _ => None,
        }
    }
}

/// How a contact string should be rendered in a template: as a link
/// target, a mailto target, or plain text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrefType {
    AbsoluteUrl,
    ProtocolEmail,
    NonHref,
}

impl HrefType {
    /// Template-facing value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AbsoluteUrl => "absolute_url",
            Self::ProtocolEmail => "protocol_email",
            Self::NonHref => "non_href",
        }
    }
}

/// One entry of a local office's contact directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalOfficeContact {
    /// Contact category, as served by the reference data SPI
    #[serde(rename = "contactTypeName")]
    pub contact_type: String,
    /// The contact string: an email address, a URL, or free text
    pub contact: String,
    /// Owning local office, populated on by-trainee lookups
    #[serde(rename = "localOfficeName", default)]
    pub local_office: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_type_round_trip() {
        for contact_type in [
            ContactType::Ltft,
            ContactType::LtftSupport,
            ContactType::SupportedReturnToTraining,
            ContactType::TssSupport,
            ContactType::GmcUpdate,
            ContactType::Deferral,
            ContactType::Sponsorship,
            ContactType::Onboarding,
        ] {
            assert_eq!(ContactType::from_str(contact_type.as_str()), Some(contact_type));
        }
    }

    #[test]
    fn test_href_type_template_values() {
        assert_eq!(HrefType::AbsoluteUrl.as_str(), "absolute_url");
        assert_eq!(HrefType::ProtocolEmail.as_str(), "protocol_email");
        assert_eq!(HrefType::NonHref.as_str(), "non_href");
    }
}
