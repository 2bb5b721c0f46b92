use regex::Regex;
use std::sync::OnceLock;

pub const MAX_NAME_LEN: usize = 100;

#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)+$").expect("Invalid regex")
    });

    email.len() <= 254 && re.is_match(email)
}

/// Trimmed, non-empty, length-limited display name.
pub fn normalize_name(name: &str) -> Result<String, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name cannot be empty".to_string());
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(format!("Name must be {MAX_NAME_LEN} characters or less"));
    }
    Ok(trimmed.to_string())
}

/// Lower-cased, trimmed and syntactically valid email.
pub fn normalize_email(email: &str) -> Result<String, String> {
    let normalized = email.trim().to_ascii_lowercase();
    if !is_valid_email(&normalized) {
        return Err(format!("Invalid email address: '{}'", email.trim()));
    }
    Ok(normalized)
}

pub fn validate_smtp_server(server: &str) -> Result<String, String> {
    let trimmed = server.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(format!("Invalid SMTP server: '{trimmed}'"));
    }
    Ok(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("bot@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.co.uk"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_email("  Bot@Example.COM ").unwrap(), "bot@example.com");
        assert!(normalize_name("   ").is_err());
        assert_eq!(normalize_name(" Ada ").unwrap(), "Ada");
        assert!(normalize_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert_eq!(validate_smtp_server(" SMTP.gmail.com").unwrap(), "smtp.gmail.com");
        assert!(validate_smtp_server("smtp gmail").is_err());
    }
}
