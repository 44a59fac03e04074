// Validation utilities for recipient and contact data
// Includes GMC number validation and contact string classification

use regex::Regex;
use std::sync::OnceLock;

/// GMC (General Medical Council) reference number validator
/// Format: exactly 7 digits. Leading zeroes are accepted; the check is
/// purely syntactic and makes no claim about registration status.
pub struct GmcValidator;

impl GmcValidator {
    /// Validate GMC number format
    pub fn validate(number: &str) -> bool {
        static GMC_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = GMC_REGEX.get_or_init(|| Regex::new(r"^[0-9]{7}$").unwrap());

        regex.is_match(number)
    }
}

/// Whether a contact string is a single plausible email address.
/// Multi-address strings ("a@x.org; b@y.org") deliberately fail so they
/// fall through to the non-href rendering path.
pub fn is_single_email(contact: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap()
    });

    regex.is_match(contact.trim())
}

/// Whether a contact string parses as an absolute URL
pub fn is_absolute_url(contact: &str) -> bool {
    reqwest::Url::parse(contact.trim()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gmc_seven_digits_valid() {
        assert!(GmcValidator::validate("1234567"));
        assert!(GmcValidator::validate("7654321"));
    }

    #[test]
    fn test_gmc_leading_zeroes_valid() {
        assert!(GmcValidator::validate("0000000"));
        assert!(GmcValidator::validate("0123456"));
    }

    #[test]
    fn test_gmc_wrong_length_invalid() {
        assert!(!GmcValidator::validate("123456"));
        assert!(!GmcValidator::validate("12345678"));
        assert!(!GmcValidator::validate(""));
    }

    #[test]
    fn test_gmc_non_digits_invalid() {
        assert!(!GmcValidator::validate("12345a7"));
        assert!(!GmcValidator::validate("UNKNOWN"));
        assert!(!GmcValidator::validate("123 456"));
    }

    #[test]
    fn test_single_email_accepted() {
        assert!(is_single_email("england.gmc@nhs.net"));
        assert!(is_single_email("first.o'brien@example.co.uk"));
    }

    #[test]
    fn test_multi_address_rejected() {
        assert!(!is_single_email("a@x.org; b@y.org"));
        assert!(!is_single_email("a@x.org, b@y.org"));
        assert!(!is_single_email("a@x.org b@y.org"));
    }

    #[test]
    fn test_non_email_rejected() {
        assert!(!is_single_email("your local office"));
        assert!(!is_single_email("https://example.com"));
        assert!(!is_single_email(""));
    }

    #[test]
    fn test_absolute_url_accepted() {
        assert!(is_absolute_url("https://support.example.com/contact"));
        assert!(is_absolute_url("http://lo.nhs.uk"));
    }

    #[test]
    fn test_relative_or_plain_text_rejected() {
        assert!(!is_absolute_url("support.example.com/contact"));
        assert!(!is_absolute_url("your local office"));
    }
}
