// Validation utilities module
// Domain-specific validators shared across request DTOs and handlers.

use regex::Regex;
use std::sync::OnceLock;

fn member_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^MO\d{4}$").expect("valid regex"))
}

fn last_five_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{5}$").expect("valid regex"))
}

/// Member codes are "MO" followed by four digits.
pub fn is_member_code(code: &str) -> bool {
    member_code_re().is_match(code)
}

/// Bank-transfer reports carry the remitting account's last five digits.
pub fn is_last_five_digits(digits: &str) -> bool {
    last_five_re().is_match(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_code() {
        assert!(is_member_code("MO0001"));
        assert!(is_member_code("MO9999"));
        assert!(!is_member_code("MO001"));
        assert!(!is_member_code("mo0001"));
        assert!(!is_member_code("MX0001"));
        assert!(!is_member_code("MO00011"));
    }

    #[test]
    fn test_last_five_digits() {
        assert!(is_last_five_digits("00000"));
        assert!(is_last_five_digits("98765"));
        assert!(!is_last_five_digits("9876"));
        assert!(!is_last_five_digits("987654"));
        assert!(!is_last_five_digits("98a65"));
    }
}
