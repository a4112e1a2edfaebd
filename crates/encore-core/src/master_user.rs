//! Master-user display names.
//!
//! Friend-code consoles log in first as the console itself, named
//! `Display (<16-digit friend code>)`. This is the only place that grammar is
//! parsed or produced.

use std::sync::LazyLock;

use regex::Regex;

// Pattern is a literal checked by the tests below.
#[allow(clippy::expect_used)]
static MASTER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*) \((\d{16})\)$").expect("master name pattern is valid"));

/// Parsed master-user name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterName {
    /// Display part before the parenthesis
    pub display: String,
    /// 16-digit friend code
    pub friend_code: String,
}

/// Parse `Display (1234567890123456)`.
pub fn parse(name: &str) -> Option<MasterName> {
    let captures = MASTER_NAME.captures(name)?;
    Some(MasterName { display: captures[1].to_string(), friend_code: captures[2].to_string() })
}

/// Produce the master-user name for a console.
pub fn format(display: &str, friend_code: &str) -> String {
    format!("{display} ({friend_code})")
}

/// True if `name` has the master-user shape.
pub fn is_master_name(name: &str) -> bool {
    MASTER_NAME.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_display_and_code() {
        let parsed = parse("Wii Console (1234567890123456)").unwrap();
        assert_eq!(parsed.display, "Wii Console");
        assert_eq!(parsed.friend_code, "1234567890123456");
        assert_eq!(format(&parsed.display, &parsed.friend_code), "Wii Console (1234567890123456)");
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(parse("alice").is_none());
        assert!(parse("Bob (123)").is_none());
        assert!(parse("Bob (12345678901234567)").is_none());
        assert!(!is_master_name("Bob(1234567890123456)"));
    }

    #[test]
    fn empty_display_allowed() {
        assert_eq!(parse(" (0000000000000001)").unwrap().display, "");
    }
}
