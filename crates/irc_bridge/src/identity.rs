//! Mapping platform display names onto the IRC nickname grammar.

/// Characters the nickname grammar rejects, folded to underscores.
fn is_forbidden(c: char) -> bool {
    c.is_whitespace() || ":$%,.;!?".contains(c)
}

// nickname =  ( letter / special ) *8( letter / digit / special / "-" )
// special  =  %x5B-60 / %x7B-7D  ; "[", "]", "\", "`", "_", "^", "{", "|", "}"
fn is_valid_leading(c: char) -> bool {
    c.is_ascii_alphanumeric() || "`|^_{}[]\\".contains(c)
}

/// Rewrites a display name into a legal IRC nick: forbidden characters
/// become underscores and names with an illegal first character get an
/// underscore prefix.
pub fn irc_safe_name(display: &str) -> String {
    let safe: String = display
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    match safe.chars().next() {
        Some(c) if is_valid_leading(c) => safe,
        _ => format!("_{safe}"),
    }
}

/// Nick with the discriminator folded in, used when two members map to
/// the same safe name.
pub fn disambiguate(safe: &str, discriminator: &str) -> String {
    format!("{safe}|{discriminator}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_unchanged() {
        assert_eq!(irc_safe_name("alice"), "alice");
        assert_eq!(irc_safe_name("[bot]helper"), "[bot]helper");
        assert_eq!(irc_safe_name("x^y"), "x^y");
    }

    #[test]
    fn test_forbidden_chars_folded() {
        assert_eq!(irc_safe_name("mr. smith"), "mr__smith");
        assert_eq!(irc_safe_name("a:b$c%d"), "a_b_c_d");
        assert_eq!(irc_safe_name("hey!?"), "hey__");
    }

    #[test]
    fn test_leading_char_fixed() {
        assert_eq!(irc_safe_name("-dash"), "_-dash");
        assert_eq!(irc_safe_name("#tag"), "_#tag");
        assert_eq!(irc_safe_name(""), "_");
        // a folded first character is already an underscore
        assert_eq!(irc_safe_name(" pad"), "_pad");
    }

    #[test]
    fn test_disambiguation() {
        assert_eq!(disambiguate("alice", "0420"), "alice|0420");
    }
}
