//! Intake Form
//!
//! Contact fields collected by the conversation flow, plus the syntactic
//! validators applied before a field is accepted.

use serde::{Deserialize, Serialize};

/// Partially collected contact fields
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A fully collected form, produced only when every field passed validation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedForm {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl ContactForm {
    /// Convert into a completed form once all fields are present.
    pub fn into_completed(self) -> Option<CompletedForm> {
        Some(CompletedForm {
            name: self.name?,
            email: self.email?,
            phone: self.phone?,
        })
    }
}

/// Name validator: anything non-empty after trimming.
pub fn is_valid_name(input: &str) -> bool {
    !input.trim().is_empty()
}

/// Email validator: a single `@` with a non-empty local part and a dotted
/// domain whose labels are all non-empty, no whitespace. Syntax only;
/// deliverability is not our problem.
pub fn is_valid_email(input: &str) -> bool {
    let input = input.trim();
    if input.chars().any(char::is_whitespace) {
        return false;
    }
    if input.matches('@').count() != 1 {
        return false;
    }
    let Some((local, domain)) = input.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

/// Phone validator: 10 to 15 digits after stripping separators, with an
/// optional leading `+`.
pub fn is_valid_phone(input: &str) -> bool {
    let input = input.trim();
    let rest = input.strip_prefix('+').unwrap_or(input);
    if rest.contains('+') {
        return false;
    }
    let digits = rest.chars().filter(char::is_ascii_digit).count();
    (10..=15).contains(&digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rejects_blank() {
        assert!(is_valid_name("Maria"));
        assert!(is_valid_name("  J  "));
        assert!(!is_valid_name("   "));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_email_syntax() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+tag@mail.co"));
        assert!(is_valid_email("user@sub.example.com"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email("user@example."));
        assert!(!is_valid_email("user@ex..com"));
        assert!(!is_valid_email("user name@example.com"));
    }

    #[test]
    fn test_phone_digit_count() {
        assert!(is_valid_phone("+5511987654321"));
        assert!(is_valid_phone("(11) 98765-4321"));
        assert!(is_valid_phone("1234567890"));
        assert!(!is_valid_phone("123456789")); // 9 digits
        assert!(!is_valid_phone("1234567890123456")); // 16 digits
        assert!(!is_valid_phone("call me"));
    }

    #[test]
    fn test_into_completed_requires_all_fields() {
        let partial = ContactForm {
            name: Some("Maria".into()),
            email: None,
            phone: None,
        };
        assert!(partial.into_completed().is_none());

        let full = ContactForm {
            name: Some("Maria".into()),
            email: Some("maria@example.com".into()),
            phone: Some("+5511987654321".into()),
        };
        let completed = full.into_completed().unwrap();
        assert_eq!(completed.email, "maria@example.com");
    }
}
