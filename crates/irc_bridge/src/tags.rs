//! IRCv3 message-tag value escaping.
//!
//! The escaping rules from the message-tags specification:
//!
//!   ; (semicolon)      \:
//!   SPACE              \s
//!   \                  \\
//!   CR                 \r
//!   LF                 \n

/// Escapes a raw value for use in a tag. The backslash must be escaped
/// before anything else or the substitutions feed into each other.
pub fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\:")
        .replace(' ', "\\s")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

/// Reverses [`escape`]. A lone trailing backslash and unknown escape
/// sequences drop the backslash, as the specification requires.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a b"), "a\\sb");
        assert_eq!(escape("a;b"), "a\\:b");
        assert_eq!(escape("a\\b"), "a\\\\b");
        assert_eq!(escape("a\r\nb"), "a\\r\\nb");
    }

    #[test]
    fn test_backslash_escaped_first() {
        // "\s" in the input must come back out as "\s", not as a space
        assert_eq!(escape("\\s"), "\\\\s");
        assert_eq!(unescape(&escape("\\s")), "\\s");
    }

    #[test]
    fn test_round_trip() {
        for raw in ["", "plain", "; \\ mix;ed ", "line\r\nbreak", "\\\\"] {
            assert_eq!(unescape(&escape(raw)), raw);
        }
    }

    #[test]
    fn test_unescape_lenient() {
        assert_eq!(unescape("a\\qb"), "aqb");
        assert_eq!(unescape("trailing\\"), "trailing");
    }
}
