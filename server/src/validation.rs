//! Migrate-endpoint field validators, in the spirit of the teacher's
//! `validation::slug::validate_slug` — small, boundary-only, no regex
//! dependency pulled in for a handful of character-class checks.

use crate::errors::ApiError;

pub const MAX_HANDLE_LEN: usize = 39;
pub const MAX_BRANCH_LEN: usize = 64;
pub const DEFAULT_BRANCH: &str = "main";

pub fn validate_handle(handle: &str) -> Result<(), ApiError> {
    if handle.is_empty() || handle.len() > MAX_HANDLE_LEN {
        return Err(ApiError::invalid_input(format!(
            "handle must be 1-{MAX_HANDLE_LEN} characters, got {}",
            handle.len()
        )));
    }
    if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ApiError::invalid_input(
            "handle must contain only alphanumerics and '-'",
        ));
    }
    Ok(())
}

pub fn validate_branch(branch: &str) -> Result<(), ApiError> {
    if branch.is_empty() || branch.len() > MAX_BRANCH_LEN {
        return Err(ApiError::invalid_input(format!(
            "branch must be 1-{MAX_BRANCH_LEN} characters, got {}",
            branch.len()
        )));
    }
    if !branch
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '/' | '\\' | '.'))
    {
        return Err(ApiError::invalid_input(
            "branch may only contain [0-9A-Za-z-/\\.]",
        ));
    }
    Ok(())
}

/// Minimal syntactic check: one `@`, non-empty local and domain parts, a
/// `.` somewhere in the domain. Not RFC 5322 — this is boundary input
/// validation, not a mail-address parser.
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ApiError::invalid_input("email is missing '@'"));
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ApiError::invalid_input("email is not syntactically valid"));
    }
    if !domain.contains('.') {
        return Err(ApiError::invalid_input("email domain is missing a '.'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_handle() {
        assert!(validate_handle("octocat-42").is_ok());
    }

    #[test]
    fn rejects_handle_with_slash() {
        assert!(validate_handle("o/ctocat").is_err());
    }

    #[test]
    fn rejects_overlong_handle() {
        let handle = "a".repeat(MAX_HANDLE_LEN + 1);
        assert!(validate_handle(&handle).is_err());
    }

    #[test]
    fn accepts_typical_branch() {
        assert!(validate_branch("release/1.0").is_ok());
    }

    #[test]
    fn accepts_typical_email() {
        assert!(validate_email("a@example.com").is_ok());
    }

    #[test]
    fn rejects_email_without_at() {
        assert!(validate_email("not-an-email").is_err());
    }

    #[test]
    fn rejects_email_without_domain_dot() {
        assert!(validate_email("a@example").is_err());
    }
}
