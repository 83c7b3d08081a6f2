//! CLI input validation functions.
//!
//! These validators are used by clap's `value_parser` attribute so bad input
//! is rejected at parse time. They delegate to the domain rules so the CLI
//! and the store never disagree.

use crate::domain::{self, MAX_TEXT_LENGTH};

/// Validate a project key (2-10 uppercase letters or digits).
pub fn validate_project_key(s: &str) -> Result<String, String> {
    let key = s.trim();
    domain::validate_project_key(key).map_err(|e| e.to_string())?;
    Ok(key.to_string())
}

/// Validate an issue title (non-empty, at most 200 characters).
pub fn validate_title(s: &str) -> Result<String, String> {
    let title = s.trim();
    if title.is_empty() {
        return Err("Title cannot be empty".to_string());
    }
    let len = title.chars().count();
    if len > domain::MAX_TITLE_LENGTH {
        return Err(format!(
            "Title cannot exceed {} characters (got {len})",
            domain::MAX_TITLE_LENGTH
        ));
    }
    Ok(title.to_string())
}

/// Validate a description (at most 10 000 characters).
pub fn validate_description(s: &str) -> Result<String, String> {
    let len = s.chars().count();
    if len > MAX_TEXT_LENGTH {
        return Err(format!(
            "Description cannot exceed {MAX_TEXT_LENGTH} characters (got {len})"
        ));
    }
    Ok(s.to_string())
}

/// Validate comment text (non-empty, at most 10 000 characters).
pub fn validate_comment(s: &str) -> Result<String, String> {
    domain::validate_comment_text(s).map_err(|e| e.to_string())
}

/// Validate an issue reference: a human code like `DMO-101` or an id.
pub fn validate_issue_ref(s: &str) -> Result<String, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Issue reference cannot be empty".to_string());
    }
    if !s.contains('-') {
        return Err(format!(
            "Invalid issue reference: '{s}'. Expected a code like DMO-101 or an id like iss-a3f8"
        ));
    }
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("DMO")]
    #[case(" AB1 ")]
    #[case("ABCDEFGHIJ")]
    fn valid_project_keys(#[case] key: &str) {
        assert!(validate_project_key(key).is_ok());
    }

    #[rstest]
    #[case("D")]
    #[case("dmo")]
    #[case("1AB")]
    #[case("ABCDEFGHIJK")]
    #[case("AB-C")]
    fn invalid_project_keys(#[case] key: &str) {
        assert!(validate_project_key(key).is_err());
    }

    #[test]
    fn title_is_trimmed_and_bounded() {
        assert_eq!(validate_title("  Fix login ").unwrap(), "Fix login");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
        assert!(validate_title(&"x".repeat(200)).is_ok());
    }

    #[test]
    fn description_is_bounded() {
        assert!(validate_description("").is_ok());
        assert!(validate_description(&"x".repeat(MAX_TEXT_LENGTH + 1)).is_err());
    }

    #[test]
    fn comment_must_have_text() {
        assert!(validate_comment(" \n ").is_err());
        assert_eq!(validate_comment(" hi ").unwrap(), "hi");
    }

    #[rstest]
    #[case("DMO-101", true)]
    #[case("iss-a3f8", true)]
    #[case("tmp-x1", true)]
    #[case("", false)]
    #[case("nohyphen", false)]
    fn issue_refs(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(validate_issue_ref(input).is_ok(), ok);
    }
}
