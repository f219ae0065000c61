//! Field validation shared by command payloads.

use crate::error::{DomainError, DomainResult};

/// Longest accepted resource name (DNS label length).
pub const MAX_NAME_LEN: usize = 63;

const MAX_DISPLAY_NAME_LEN: usize = 256;

/// Normalizes and checks an e-mail address.
///
/// Only the shape is checked (`local@domain` with a dot in the domain); the
/// upstream identity provider owns verification.
pub fn normalize_email(raw: &str) -> DomainResult<String> {
    let email = raw.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(DomainError::validation("email must contain '@'"));
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(DomainError::validation("malformed email"));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(DomainError::validation("email domain is malformed"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("email must not contain whitespace"));
    }
    Ok(email)
}

/// Checks a machine name for tenants and clusters: lowercase ASCII
/// alphanumerics and `-`, not starting or ending with `-`.
pub fn validate_name(field: &str, name: &str) -> DomainResult<()> {
    if name.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "{field} exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(DomainError::validation(format!(
            "{field} contains disallowed character {bad:?}"
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(DomainError::validation(format!(
            "{field} must start and end with an alphanumeric character"
        )));
    }
    Ok(())
}

/// Trims a human-readable name and checks it is present and bounded.
pub fn normalize_display_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(DomainError::validation("name is too long"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(
            normalize_email("  Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn email_shape_is_enforced() {
        for bad in ["", "alice", "@example.com", "alice@", "a@b@c.com", "a@localhost", "a b@x.io"] {
            assert!(normalize_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn names_reject_uppercase_and_edges() {
        assert!(validate_name("cluster name", "prod-eu-1").is_ok());
        assert!(validate_name("cluster name", "Prod").is_err());
        assert!(validate_name("cluster name", "-prod").is_err());
        assert!(validate_name("cluster name", "prod-").is_err());
        assert!(validate_name("cluster name", "prod_eu").is_err());
        assert!(validate_name("cluster name", &"a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn display_name_must_be_present() {
        assert!(normalize_display_name("   ").is_err());
        assert_eq!(normalize_display_name(" Ada ").unwrap(), "Ada");
    }

    proptest! {
        #[test]
        fn generated_dns_labels_are_accepted(name in "[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?") {
            prop_assert!(validate_name("name", &name).is_ok());
        }
    }
}
