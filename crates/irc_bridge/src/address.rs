use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::UserId;

// e.  prefix  =  servername / ( nickname [ [ "!" user ] "@" host ] )
//
// Bridge-side prefixes always carry all three parts, with the user
// field holding the platform id: `nick!1234567890@discord.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcAddress {
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl IrcAddress {
    pub fn parse(raw: &str) -> Self {
        let (nick_user, host) = match raw.split_once('@') {
            Some((nu, h)) => (nu, Some(h.to_owned())),
            None => (raw, None),
        };
        let (nick, user) = match nick_user.split_once('!') {
            Some((n, u)) => (n.to_owned(), Some(u.to_owned())),
            None => (nick_user.to_owned(), None),
        };
        IrcAddress { nick, user, host }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_deref().and_then(|u| u.parse().ok())
    }
}

impl fmt::Display for IrcAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nick)?;
        if let Some(user) = &self.user {
            write!(f, "!{user}")?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}

/// Matches an IRC hostmask pattern (`*` and `?` wildcards) against a
/// candidate address, case-insensitively.
pub fn mask_matches(mask: &str, candidate: &str) -> bool {
    let pattern = format!(
        "(?i)^{}$",
        regex::escape(mask).replace("\\*", ".*").replace("\\?", ".")
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(candidate),
        Err(_) => false,
    }
}

/// Extracts the platform user id from a ban mask of the shape
/// `*!<id>@*`. Masks without a numeric user part yield `None`.
pub fn user_id_from_mask(mask: &str) -> Option<UserId> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"^.*!(\d+)?@.*$").ok())
        .as_ref()?;
    re.captures(mask)?
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
}

/// Builds the canonical ban mask for a platform user.
pub fn ban_mask(id: UserId) -> String {
    format!("*!{id}@*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_address() {
        let addr = IrcAddress::parse("alice!123@discord.com");
        assert_eq!(addr.nick, "alice");
        assert_eq!(addr.user.as_deref(), Some("123"));
        assert_eq!(addr.host.as_deref(), Some("discord.com"));
        assert_eq!(addr.user_id(), Some(123));
        assert_eq!(addr.to_string(), "alice!123@discord.com");
    }

    #[test]
    fn test_parse_bare_nick() {
        let addr = IrcAddress::parse("alice");
        assert_eq!(addr.nick, "alice");
        assert!(addr.user.is_none());
        assert!(addr.host.is_none());
        assert_eq!(addr.user_id(), None);
    }

    #[test]
    fn test_mask_matching() {
        assert!(mask_matches("*!123@*", "alice!123@discord.com"));
        assert!(mask_matches("a?ice!*@*", "alice!123@discord.com"));
        assert!(mask_matches("ALICE!*@*", "alice!123@discord.com"));
        assert!(!mask_matches("*!456@*", "alice!123@discord.com"));
        // regex metacharacters in the mask are literal
        assert!(!mask_matches("a.ice!*@*", "alice!123@discord.com"));
    }

    #[test]
    fn test_user_id_from_mask() {
        assert_eq!(user_id_from_mask("*!123@*"), Some(123));
        assert_eq!(user_id_from_mask("alice!123@discord.com"), Some(123));
        assert_eq!(user_id_from_mask("*!@*"), None);
        assert_eq!(user_id_from_mask("no-separator"), None);
        assert_eq!(ban_mask(55), "*!55@*");
    }
}
