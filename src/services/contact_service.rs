/*!
 * Contact Directory Service
 *
 * Resolves a local office's typed contacts and classifies contact
 * strings for template rendering. Contact resolution never fails a
 * notification: a missing directory degrades to the default wording.
 */

use crate::clients::ReferenceClient;
use crate::models::{ContactType, HrefType, LocalOfficeContact};
use crate::utils::validators::{is_absolute_url, is_single_email};

/// Wording used when no directory entry resolves
pub const DEFAULT_CONTACT: &str = "your local office";

/// Contact directory service
#[derive(Clone)]
pub struct ContactService {
    reference: ReferenceClient,
}

impl ContactService {
    pub fn new(reference: ReferenceClient) -> Self {
        Self { reference }
    }

    /// Ordered contact directory for a local office; empty on lookup
    /// failure or missing office name
    pub async fn list_contacts(&self, local_office: Option<&str>) -> Vec<LocalOfficeContact> {
        self.reference.list_contacts(local_office).await
    }

    /// Contacts of one type across a trainee's local offices,
    /// de-duplicated by (contact, local office)
    pub async fn list_trainee_contacts(
        &self,
        trainee_id: &str,
        contact_type: ContactType,
    ) -> Vec<LocalOfficeContact> {
        let contacts = self
            .reference
            .list_trainee_contacts(trainee_id, contact_type.as_str())
            .await;

        dedupe_contacts(contacts)
    }

    /// First entry of the preferred type, else the first of the
    /// fallback type, else the default wording
    pub fn resolve_contact(
        contacts: &[LocalOfficeContact],
        preferred: ContactType,
        fallback: ContactType,
    ) -> String {
        contacts
            .iter()
            .find(|c| c.contact_type == preferred.as_str())
            .or_else(|| contacts.iter().find(|c| c.contact_type == fallback.as_str()))
            .map(|c| c.contact.clone())
            .unwrap_or_else(|| DEFAULT_CONTACT.to_string())
    }

    /// Classify a contact string for template rendering.
    /// Absolute URLs win over email; multi-address strings are non-href.
    pub fn classify(contact: &str) -> HrefType {
        if is_absolute_url(contact) {
            HrefType::AbsoluteUrl
        } else if is_single_email(contact) {
            HrefType::ProtocolEmail
        } else {
            HrefType::NonHref
        }
    }

    /// Resolve a directory entry together with its render
    /// classification. The default-wording fallback classifies as
    /// non-href; callers treat it as a failed resolution when deciding
    /// whether to suppress delivery.
    pub fn resolve_contact_with_href(
        contacts: &[LocalOfficeContact],
        preferred: ContactType,
        fallback: ContactType,
    ) -> (String, HrefType) {
        let contact = Self::resolve_contact(contacts, preferred, fallback);
        let href_type = if contact == DEFAULT_CONTACT {
            HrefType::NonHref
        } else {
            Self::classify(&contact)
        };
        (contact, href_type)
    }
}

/// Order-preserving de-duplication by (contact, local office)
fn dedupe_contacts(contacts: Vec<LocalOfficeContact>) -> Vec<LocalOfficeContact> {
    let mut seen = std::collections::HashSet::new();
    contacts
        .into_iter()
        .filter(|c| seen.insert((c.contact.clone(), c.local_office.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(contact_type: &str, contact: &str) -> LocalOfficeContact {
        LocalOfficeContact {
            contact_type: contact_type.to_string(),
            contact: contact.to_string(),
            local_office: None,
        }
    }

    #[test]
    fn test_resolve_contact_prefers_preferred_type() {
        let contacts = vec![
            contact("TSS_SUPPORT", "support@lo.nhs.uk"),
            contact("LTFT", "ltft@lo.nhs.uk"),
        ];

        let resolved = ContactService::resolve_contact(
            &contacts,
            ContactType::Ltft,
            ContactType::TssSupport,
        );
        assert_eq!(resolved, "ltft@lo.nhs.uk");
    }

    #[test]
    fn test_resolve_contact_falls_back() {
        let contacts = vec![contact("TSS_SUPPORT", "support@lo.nhs.uk")];

        let resolved = ContactService::resolve_contact(
            &contacts,
            ContactType::Ltft,
            ContactType::TssSupport,
        );
        assert_eq!(resolved, "support@lo.nhs.uk");
    }

    #[test]
    fn test_resolve_contact_defaults_when_empty() {
        let resolved =
            ContactService::resolve_contact(&[], ContactType::Ltft, ContactType::TssSupport);
        assert_eq!(resolved, DEFAULT_CONTACT);
    }

    #[test]
    fn test_resolve_contact_takes_first_of_matching_type() {
        let contacts = vec![
            contact("LTFT", "first@lo.nhs.uk"),
            contact("LTFT", "second@lo.nhs.uk"),
        ];

        let resolved = ContactService::resolve_contact(
            &contacts,
            ContactType::Ltft,
            ContactType::TssSupport,
        );
        assert_eq!(resolved, "first@lo.nhs.uk");
    }

    #[test]
    fn test_classify_url() {
        assert_eq!(
            ContactService::classify("https://support.lo.nhs.uk/contact"),
            HrefType::AbsoluteUrl
        );
    }

    #[test]
    fn test_classify_single_email() {
        assert_eq!(
            ContactService::classify("england.gmc@nhs.net"),
            HrefType::ProtocolEmail
        );
    }

    #[test]
    fn test_classify_multi_address_as_non_href() {
        assert_eq!(
            ContactService::classify("a@lo.nhs.uk; b@lo.nhs.uk"),
            HrefType::NonHref
        );
    }

    #[test]
    fn test_classify_plain_text_as_non_href() {
        assert_eq!(
            ContactService::classify("your local office"),
            HrefType::NonHref
        );
    }

    #[test]
    fn test_resolve_with_href_classifies_resolved_contact() {
        let contacts = vec![contact("LTFT", "ltft@lo.nhs.uk")];
        let (resolved, href_type) = ContactService::resolve_contact_with_href(
            &contacts,
            ContactType::Ltft,
            ContactType::TssSupport,
        );
        assert_eq!(resolved, "ltft@lo.nhs.uk");
        assert_eq!(href_type, HrefType::ProtocolEmail);
    }

    #[test]
    fn test_resolve_with_href_empty_directory_is_non_href_default() {
        let (resolved, href_type) = ContactService::resolve_contact_with_href(
            &[],
            ContactType::Ltft,
            ContactType::TssSupport,
        );
        assert_eq!(resolved, DEFAULT_CONTACT);
        assert_eq!(href_type, HrefType::NonHref);
    }

    #[test]
    fn test_dedupe_by_contact_and_office() {
        let mut first = contact("GMC_UPDATE", "gmc@lo1.nhs.uk");
        first.local_office = Some("LO1".to_string());
        let mut duplicate = contact("GMC_UPDATE", "gmc@lo1.nhs.uk");
        duplicate.local_office = Some("LO1".to_string());
        let mut other_office = contact("GMC_UPDATE", "gmc@lo1.nhs.uk");
        other_office.local_office = Some("LO2".to_string());

        let deduped = dedupe_contacts(vec![first, duplicate, other_office]);
        assert_eq!(deduped.len(), 2);
    }
}
