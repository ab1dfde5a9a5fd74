//! # Validation Rules
//!
//! Business rule checks run before anything is queued or sent.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  User input ──► validation (THIS MODULE) ──► queue / remote call        │
//! │                      │                                                  │
//! │                      └── Err(ValidationError) ──► shown immediately,    │
//! │                                                   never queued          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{License, LicenseDuration, TicketDraft, TicketStatus};
use crate::{MAX_REPLY_LENGTH, MAX_SUBJECT_LENGTH};

/// Result type for validation checks.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Tickets
// =============================================================================

/// Validates a ticket subject.
pub fn validate_subject(subject: &str) -> ValidationResult<()> {
    required("subject", subject)?;
    max_len("subject", subject, MAX_SUBJECT_LENGTH)
}

/// Validates the content of a reply (also used for a ticket description).
pub fn validate_reply_content(content: &str) -> ValidationResult<()> {
    required("content", content)?;
    max_len("content", content, MAX_REPLY_LENGTH)
}

/// Validates a new-ticket form.
pub fn validate_draft(draft: &TicketDraft) -> ValidationResult<()> {
    validate_email(&draft.owner_email)?;
    validate_subject(&draft.subject)?;
    required("description", &draft.description)?;
    max_len("description", &draft.description, MAX_REPLY_LENGTH)?;
    required("category", &draft.category)?;
    required("priority", &draft.priority)
}

/// Checks that a ticket may move from `from` to `to`.
pub fn validate_transition(from: TicketStatus, to: TicketStatus) -> ValidationResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ValidationError::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

// =============================================================================
// Licenses
// =============================================================================

/// A hardware id must be present.
pub fn validate_hardware_id(hardware_id: &str) -> ValidationResult<()> {
    required("hardware_id", hardware_id)
}

/// Minimal email shape check: `local@domain.tld`, no whitespace.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    required("email", email)?;
    let email = email.trim();
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: reason.to_string(),
    };

    if email.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }
    let (local, domain) = email.split_once('@').ok_or_else(|| invalid("missing '@'"))?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid("expected exactly one '@' with a local part"));
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
        _ => Err(invalid("domain must contain a '.'")),
    }
}

/// Parses a requested duration and rejects plans that are not enabled.
pub fn validate_duration(raw: &str) -> ValidationResult<LicenseDuration> {
    required("duration", raw)?;
    let duration = LicenseDuration::parse(raw);
    if !duration.is_enabled() {
        return Err(ValidationError::UnsupportedDuration {
            duration: raw.trim().to_string(),
        });
    }
    Ok(duration)
}

/// Rejects issuance when the cached list already holds an active license
/// for `hardware_id`.
pub fn ensure_no_active_license(licenses: &[License], hardware_id: &str) -> ValidationResult<()> {
    let hardware_id = hardware_id.trim();
    if licenses
        .iter()
        .any(|l| l.is_active() && l.hardware_id == hardware_id)
    {
        return Err(ValidationError::DuplicateActiveLicense {
            hardware_id: hardware_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LicenseStatus;
    use chrono::Utc;

    fn license(hardware_id: &str, status: LicenseStatus) -> License {
        License {
            id: format!("LIC-{}", hardware_id),
            hardware_id: hardware_id.to_string(),
            customer_email: "a@b.com".to_string(),
            customer_name: String::new(),
            tier: "basic".to_string(),
            status,
            creation_date: Utc::now(),
            expiration_date: None,
            license_key: "KEY".to_string(),
            formatted_key: None,
            features: Vec::new(),
        }
    }

    #[test]
    fn test_reply_content() {
        assert!(validate_reply_content("hello").is_ok());
        assert_eq!(
            validate_reply_content("   "),
            Err(ValidationError::Required {
                field: "content".to_string()
            })
        );
        let long = "x".repeat(MAX_REPLY_LENGTH + 1);
        assert!(matches!(
            validate_reply_content(&long),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_email() {
        assert!(validate_email("a@b.com").is_ok());
        assert!(validate_email("bad").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a b@c.com").is_err());
        assert!(validate_email("@c.com").is_err());
    }

    #[test]
    fn test_duration() {
        assert_eq!(validate_duration("trial-default"), Ok(LicenseDuration::Trial));
        assert_eq!(validate_duration("15d"), Ok(LicenseDuration::Trial));
        assert_eq!(
            validate_duration("1y"),
            Err(ValidationError::UnsupportedDuration {
                duration: "1y".to_string()
            })
        );
        assert!(matches!(
            validate_duration(""),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_duplicate_active_license() {
        let cached = vec![
            license("HW1", LicenseStatus::Active),
            license("HW2", LicenseStatus::Revoked),
        ];
        assert!(matches!(
            ensure_no_active_license(&cached, "HW1"),
            Err(ValidationError::DuplicateActiveLicense { .. })
        ));
        // Revoked licenses do not block reissue.
        assert!(ensure_no_active_license(&cached, "HW2").is_ok());
        assert!(ensure_no_active_license(&cached, "HW3").is_ok());
    }

    #[test]
    fn test_transition() {
        assert!(validate_transition(TicketStatus::Open, TicketStatus::Waiting).is_ok());
        assert!(validate_transition(TicketStatus::Closed, TicketStatus::InProgress).is_err());
    }
}
