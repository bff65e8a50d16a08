use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::errors::BridgeError;
use crate::types::RoleId;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Server name used as the prefix of every bridge-originated line.
    pub hostname: String,
    pub bind_address: String,
    pub port: u16,

    /// When set, "ban" means assigning this role instead of a platform ban.
    pub banned_role: Option<RoleId>,
    /// Mirror the ban cache to `bans_file` and reload it on session start.
    pub preserve_bans: bool,
    pub bans_file: String,

    /// KICK only emits KICK+JOIN lines instead of removing the member.
    pub fake_kick: bool,
    /// Rewrite `@nick` mentions; when off, bare nicks are scanned instead.
    pub at_mentions: bool,
    pub convert_mentions_from_discord: bool,
    /// Whether this instance relays private messages.
    pub handle_dms: bool,

    /// Normal-lane lines written per loop iteration.
    pub outgoing_message_limit: usize,
    /// Nicks packed into one RPL_NAMREPLY line.
    pub names_per_entry: usize,
    pub poll_interval_ms: u64,
    /// Idle period before the watchdog pings, and again before it gives up.
    pub timeout_ms: u64,

    // TOML table keys are strings, so role ids are parsed on access.
    pub role_tags: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hostname: "irc.discord.com".to_owned(),
            bind_address: "0.0.0.0".to_owned(),
            port: 6667,
            banned_role: None,
            preserve_bans: false,
            bans_file: "./bans.json".to_owned(),
            fake_kick: false,
            at_mentions: true,
            convert_mentions_from_discord: true,
            handle_dms: true,
            outgoing_message_limit: 10,
            names_per_entry: 10,
            poll_interval_ms: 25,
            timeout_ms: 12000,
            role_tags: HashMap::new(),
        }
    }
}

impl Config {
    /// Loads and parses the TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BridgeError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Role→tag pairs with parseable role ids; malformed keys are skipped.
    pub fn role_tag_pairs(&self) -> Vec<(RoleId, &str)> {
        self.role_tags
            .iter()
            .filter_map(|(k, v)| k.parse::<RoleId>().ok().map(|id| (id, v.as_str())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 6667);
        assert_eq!(config.hostname, "irc.discord.com");
        assert!(config.at_mentions);
        assert!(!config.fake_kick);
        assert_eq!(config.timeout_ms, 12000);
    }

    #[test]
    fn test_parse_toml() {
        let input = r#"
            hostname = "irc.example.org"
            port = 6697
            banned_role = 111222333
            preserve_bans = true

            [role_tags]
            "42" = "moderator"
            "43" = ""
        "#;
        let config: Config = toml::from_str(input).unwrap();
        assert_eq!(config.hostname, "irc.example.org");
        assert_eq!(config.port, 6697);
        assert_eq!(config.banned_role, Some(111222333));
        assert!(config.preserve_bans);

        let mut pairs = config.role_tag_pairs();
        pairs.sort();
        assert_eq!(pairs, vec![(42, "moderator"), (43, "")]);
        // unspecified fields keep their defaults
        assert_eq!(config.outgoing_message_limit, 10);
    }
}
