use std::sync::Arc;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::bans::BanCache;
use crate::config::Config;
use crate::constants::*;
use crate::dispatch::AuthStage;
use crate::gateway::{Author, Gateway, Member};
use crate::identity;
use crate::server::ServerHandle;
use crate::state::{BridgeState, IrcChannel};
use crate::tags;
use crate::types::{ChannelId, UserId};

/// Mode letters in precedence order, highest first, with the nick
/// sigil each one grants. Mirrors `PREFIX=(qaohv)~&@%+`.
const PREFIX_ORDER: [(char, char); 5] =
    [('q', '~'), ('a', '&'), ('o', '@'), ('h', '%'), ('v', '+')];

pub fn sigil_for(mode: char) -> Option<char> {
    PREFIX_ORDER.iter().find(|(m, _)| *m == mode).map(|(_, s)| *s)
}

/// Ties the gateway, the IRC session and the shared state together.
/// Command handlers and the event translator are all methods on this.
pub struct Bridge {
    gateway: Arc<dyn Gateway>,
    server: Arc<ServerHandle>,
    config: Config,
    state: BridgeState,
}

impl Bridge {
    pub fn new(gateway: Arc<dyn Gateway>, server: Arc<ServerHandle>, config: Config) -> Self {
        let bans = if config.preserve_bans {
            BanCache::persistent(config.bans_file.clone().into())
        } else {
            BanCache::in_memory()
        };
        Bridge {
            gateway,
            server,
            config,
            state: BridgeState::new(bans),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn server(&self) -> Arc<ServerHandle> {
        self.server.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    /// Registered nick, or `*` before registration for numerics.
    pub fn nick(&self) -> String {
        let nick = self.state.nick();
        if nick.is_empty() { "*".to_owned() } else { nick }
    }

    /// Whether the session may receive relayed platform traffic.
    pub fn ready(&self) -> bool {
        self.server.stage() == AuthStage::CapsNegotiated
    }

    pub fn reset_session(&self) {
        self.server.reset_session();
        self.state.update_handshake(|h| *h = Default::default());
        self.state.update_caps(|c| *c = Default::default());
        self.state.set_cap_locked(false);
        self.state.set_nick("");
        self.state.joined.clear();
        self.state.nicks.clear();
        self.state.embeds.clear();
        if let Ok(mut modes) = self.state.user_modes.lock() {
            modes.clear();
        }
    }

    // ---- line construction -------------------------------------------------

    pub fn numeric(&self, code: u16, tail: &str) -> String {
        format!(
            ":{} {:03} {} {}",
            self.server.hostname(),
            code,
            self.nick(),
            tail
        )
    }

    pub fn send_numeric(&self, code: u16, tail: &str) {
        let line = self.numeric(code, tail);
        self.server.enqueue(line);
    }

    pub fn server_line(&self, rest: &str) -> String {
        format!(":{} {}", self.server.hostname(), rest)
    }

    /// `@key=value;flag ` prefix, or empty when the client never asked
    /// for message-tags. Values are escaped here.
    pub fn tag_prefix(&self, pairs: &[(String, Option<String>)]) -> String {
        if pairs.is_empty() || !self.state.caps().message_tags {
            return String::new();
        }
        let rendered: Vec<String> = pairs
            .iter()
            .map(|(k, v)| match v {
                Some(v) => format!("{k}={}", tags::escape(v)),
                None => k.clone(),
            })
            .collect();
        format!("@{} ", rendered.join(";"))
    }

    // ---- identity ----------------------------------------------------------

    /// IRC nick for a platform user. Known mappings are reused; new
    /// ones are derived from the display name, disambiguated with the
    /// discriminator on collision, and remembered.
    pub async fn nick_by_id(&self, id: UserId) -> String {
        if id == self.gateway.current_user_id() {
            return self.nick();
        }
        if let Some(existing) = self
            .state
            .nicks
            .iter()
            .find(|entry| *entry.value() == id)
            .map(|entry| entry.key().clone())
        {
            return existing;
        }

        let member = match self.gateway.member(id).await {
            Some(m) => Some(m),
            None => self.gateway.fetch_user(id).await,
        };
        let Some(member) = member else {
            return format!("user_{id}");
        };

        let nick = self.derive_nick(&member);
        self.state.nicks.insert(nick.clone(), id);
        nick
    }

    fn derive_nick(&self, member: &Member) -> String {
        let safe = identity::irc_safe_name(member.display_name());
        let own = self.state.nick();
        let collides_with_client = safe.eq_ignore_ascii_case(&own);
        let collides_with_mapped = self
            .state
            .nicks
            .get(&safe)
            .map(|existing| *existing.value() != member.id)
            .unwrap_or(false);
        if collides_with_client || collides_with_mapped {
            identity::disambiguate(&safe, &member.discriminator)
        } else {
            safe
        }
    }

    /// Reverse lookup: the nick a client typed back to a platform id.
    pub async fn user_id_by_nick(&self, nick: &str) -> Option<UserId> {
        if nick.eq_ignore_ascii_case(&self.state.nick()) {
            return Some(self.gateway.current_user_id());
        }
        if let Some(id) = self.state.user_id_by_nick(nick) {
            return Some(id);
        }
        // populate the map until the nick shows up
        for member in self.gateway.members().await {
            let derived = self.nick_by_id(member.id).await;
            if derived.eq_ignore_ascii_case(nick) {
                return Some(member.id);
            }
        }
        None
    }

    /// Full `nick!id@host` prefix for a platform user.
    pub async fn user_prefix(&self, id: UserId) -> String {
        let nick = self.nick_by_id(id).await;
        format!("{nick}!{id}@{USER_HOST}")
    }

    /// Prefix for a message author; webhooks are not members and get a
    /// fixed user field instead of an id.
    pub async fn author_prefix(&self, author: &Author) -> String {
        if author.is_webhook {
            let safe = identity::irc_safe_name(&author.username);
            format!("{safe}!webhook@{USER_HOST}")
        } else {
            self.user_prefix(author.id).await
        }
    }

    // ---- permissions to modes ----------------------------------------------

    /// Channel mode letters this member holds, highest first.
    pub async fn member_mode_letters(&self, member: &Member, channel: ChannelId) -> Vec<char> {
        let mut letters = Vec::new();
        let guild = self.gateway.guild_permissions(member.id).await;
        let chan = self.gateway.channel_permissions(member.id, channel).await;
        if self.gateway.owner_id().await == Some(member.id) {
            letters.push('q');
        }
        if guild.administrator {
            letters.push('a');
        }
        if guild.manage_channels {
            letters.push('o');
        }
        if guild.kick_members {
            letters.push('h');
        }
        if chan.send_messages || chan.speak {
            letters.push('v');
        }
        letters
    }

    /// Sigils for a NAMES/WHO entry. All of them with multi-prefix,
    /// only the highest otherwise.
    pub fn sigils(&self, letters: &[char]) -> String {
        let mut out = String::new();
        for (mode, sigil) in PREFIX_ORDER {
            if letters.contains(&mode) {
                out.push(sigil);
                if !self.state.caps().multi_prefix {
                    break;
                }
            }
        }
        out
    }

    // ---- role tags ---------------------------------------------------------

    /// Client tags advertising the member's configured roles. `None`
    /// means one of the roles is configured with an empty tag, which
    /// suppresses the event entirely.
    pub fn role_tags_for(&self, member: &Member) -> Option<Vec<(String, Option<String>)>> {
        let mut out = Vec::new();
        for (role_id, tag) in self.config.role_tag_pairs() {
            if member.role_ids.contains(&role_id) {
                if tag.is_empty() {
                    return None;
                }
                out.push((format!("+{tag}"), None));
            }
        }
        Some(out)
    }

    // ---- handshake ---------------------------------------------------------

    /// Re-evaluated after every registration command and CAP END.
    pub async fn check_handshake(&self) {
        let flags = self.state.handshake();
        if !flags.complete() {
            return;
        }
        if self.state.cap_locked() {
            self.server.set_stage(AuthStage::Authenticated);
            return;
        }
        if self.server.stage() == AuthStage::CapsNegotiated {
            return;
        }
        self.server.set_stage(AuthStage::CapsNegotiated);
        self.send_welcome_burst().await;
    }

    async fn send_welcome_burst(&self) {
        // the client is renamed to the account the bridge signs in as
        let bridge_nick = identity::irc_safe_name(&self.gateway.current_username());
        let client_nick = self.nick();
        if client_nick != bridge_nick {
            self.server
                .enqueue_priority(format!(":{client_nick} NICK {bridge_nick}"));
            self.state.set_nick(&bridge_nick);
        }
        let nick = self.nick();
        let host = self.server.hostname().to_owned();
        for (code, tail) in [
            (RPL_WELCOME, format!(":Welcome to the Discord Network, {nick}")),
            (
                RPL_YOURHOST,
                format!(":Your host is {host}, running version 1.0"),
            ),
            (RPL_CREATED, ":This server was created last Thursday".to_owned()),
            (RPL_MYINFO, "discord-irc-bridge 1.0 * X Zb".to_owned()),
            (
                RPL_ISUPPORT,
                "PREFIX=(qaohv)~&@%+ STATUSMSG=~&@%+ MODES=1 CHANMODES=b,,ZBl,X \
                 LINELEN=4096 :are supported by this server"
                    .to_owned(),
            ),
        ] {
            let line = self.numeric(code, &tail);
            self.server.enqueue_priority(line);
        }
        self.send_lusers().await;
        self.send_motd();
    }

    pub async fn send_lusers(&self) {
        let users = self.gateway.members().await.len();
        let line = self.numeric(
            RPL_LUSERCLIENT,
            &format!(":There are {users} users and 0 invisible on 1 servers"),
        );
        self.server.enqueue_priority(line);
    }

    pub fn send_motd(&self) {
        let host = self.server.hostname().to_owned();
        for (code, tail) in [
            (RPL_MOTDSTART, format!(":- {host} Message of the day - ")),
            (RPL_MOTD, ":- Enjoy the stay".to_owned()),
            (RPL_ENDOFMOTD, ":End of MOTD command".to_owned()),
        ] {
            let line = self.numeric(code, &tail);
            self.server.enqueue_priority(line);
        }
    }

    // ---- channel bursts ----------------------------------------------------

    /// Members of a channel: those allowed to see it.
    pub async fn channel_members(&self, channel: ChannelId) -> Vec<Member> {
        let mut out = Vec::new();
        for member in self.gateway.members().await {
            if self
                .gateway
                .channel_permissions(member.id, channel)
                .await
                .view_channel
            {
                out.push(member);
            }
        }
        out
    }

    /// RPL_NAMREPLY burst, `names_per_entry` addresses per line.
    pub async fn send_names(&self, channel: &IrcChannel) {
        let irc_name = channel.irc_name();
        let members = self.channel_members(channel.id).await;
        let mut entries = Vec::with_capacity(members.len());
        for member in &members {
            let letters = self.member_mode_letters(member, channel.id).await;
            let sigils = self.sigils(&letters);
            let nick = self.nick_by_id(member.id).await;
            entries.push(format!("{sigils}{nick}!{}@{USER_HOST}", member.id));
        }
        for chunk in entries.chunks(self.config.names_per_entry.max(1)) {
            self.send_numeric(
                RPL_NAMREPLY,
                &format!("= {irc_name} :{}", chunk.join(" ")),
            );
        }
        self.send_numeric(RPL_ENDOFNAMES, &format!("{irc_name} :End of NAMES list"));
    }

    /// Topic, names and the client's own mode grants, sent on JOIN.
    pub async fn send_channel_intro(&self, channel: &IrcChannel) {
        let irc_name = channel.irc_name();
        if let Some(platform) = self.gateway.channel(channel.id).await {
            if let Some(topic) = platform.topic() {
                self.send_numeric(RPL_TOPIC, &format!("{irc_name} :{topic}"));
                self.send_numeric(
                    RPL_TOPICWHOTIME,
                    &format!("{irc_name} {} 0", self.server.hostname()),
                );
            }
        }
        self.send_names(channel).await;

        let me = self.gateway.member(self.gateway.current_user_id()).await;
        if let Some(me) = me {
            let letters = self.member_mode_letters(&me, channel.id).await;
            let nick = self.nick();
            for letter in letters {
                let line = self.server_line(&format!("MODE {irc_name} +{letter} {nick}"));
                self.server.enqueue(line);
            }
        }
    }

    // ---- mention rewriting -------------------------------------------------

    /// IRC-side `@nick` and `#channel` references become platform
    /// mention syntax before a message is sent.
    pub async fn rewrite_outgoing_mentions(&self, content: &str) -> String {
        let mut out = content.to_owned();
        if self.config.at_mentions {
            out = self.rewrite_at_mentions(&out).await;
        }
        out = self.rewrite_channel_refs(&out).await;
        out
    }

    async fn rewrite_at_mentions(&self, content: &str) -> String {
        static RE: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(re) = RE
            .get_or_init(|| Regex::new(r"(^|[^\w@])@([^\s:$%,.;!?@][^\s:$%,.;!?]*)").ok())
            .as_ref()
        else {
            return content.to_owned();
        };

        // resolve nicks first; the Captures closure cannot await
        let mut resolved: Vec<(String, UserId)> = Vec::new();
        for caps in re.captures_iter(content) {
            if let Some(nick) = caps.get(2) {
                if let Some(id) = self.user_id_by_nick(nick.as_str()).await {
                    resolved.push((nick.as_str().to_owned(), id));
                }
            }
        }
        re.replace_all(content, |caps: &Captures| {
            let lead = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let nick = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            match resolved.iter().find(|(n, _)| n == nick) {
                Some((_, id)) => format!("{lead}<@{id}>"),
                None => caps
                    .get(0)
                    .map(|m| m.as_str().to_owned())
                    .unwrap_or_default(),
            }
        })
        .into_owned()
    }

    async fn rewrite_channel_refs(&self, content: &str) -> String {
        if !content.contains('#') {
            return content.to_owned();
        }
        let mut out = content.to_owned();
        for channel in self.gateway.channels().await {
            if !channel.is_text() {
                continue;
            }
            let Ok(re) = Regex::new(&format!(
                r"(^|[^\w])#{}\b",
                regex::escape(&channel.name)
            )) else {
                continue;
            };
            let id = channel.id;
            out = re
                .replace_all(&out, |caps: &Captures| {
                    let lead = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                    format!("{lead}<#{id}>")
                })
                .into_owned();
        }
        out
    }

    /// Platform `<@id>` and `<#id>` mentions become readable IRC text.
    pub async fn rewrite_incoming_mentions(&self, content: &str) -> String {
        if !self.config.convert_mentions_from_discord {
            return content.to_owned();
        }
        let mut out = self.rewrite_incoming_users(content).await;
        out = self.rewrite_incoming_channels(&out).await;
        out
    }

    async fn rewrite_incoming_users(&self, content: &str) -> String {
        static RE: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(re) = RE
            .get_or_init(|| Regex::new(r"<@!?(\d+)>").ok())
            .as_ref()
        else {
            return content.to_owned();
        };
        let mut resolved: Vec<(String, String)> = Vec::new();
        for caps in re.captures_iter(content) {
            if let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) {
                if let Ok(id) = id.as_str().parse::<UserId>() {
                    let nick = self.nick_by_id(id).await;
                    resolved.push((whole.as_str().to_owned(), format!("@{nick}")));
                }
            }
        }
        let mut out = content.to_owned();
        for (from, to) in resolved {
            out = out.replace(&from, &to);
        }
        out
    }

    async fn rewrite_incoming_channels(&self, content: &str) -> String {
        static RE: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(re) = RE
            .get_or_init(|| Regex::new(r"<#!?(\d+)>").ok())
            .as_ref()
        else {
            return content.to_owned();
        };
        let mut resolved: Vec<(String, String)> = Vec::new();
        for caps in re.captures_iter(content) {
            if let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) {
                if let Ok(id) = id.as_str().parse::<ChannelId>() {
                    if let Some(channel) = self.gateway.channel(id).await {
                        resolved.push((whole.as_str().to_owned(), channel.irc_name()));
                    }
                }
            }
        }
        let mut out = content.to_owned();
        for (from, to) in resolved {
            out = out.replace(&from, &to);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::gateway::memory::{Action, MemoryGateway};
    use crate::gateway::{Author, GatewayEvent, GuildPermissions, Member, MessageEvent, Presence, Role};
    use crate::message::IrcMessage;

    fn member(id: UserId, name: &str) -> Member {
        Member {
            id,
            username: name.to_owned(),
            discriminator: format!("{:04}", id),
            nickname: None,
            is_bot: false,
            role_ids: Vec::new(),
            presence: Presence::Online,
            created_at: 0,
        }
    }

    fn test_bridge(config: Config) -> (Arc<Bridge>, Arc<MemoryGateway>) {
        let gateway = Arc::new(MemoryGateway::new(1, 100, "bridge"));
        gateway.set_owner(100);
        gateway.add_member(member(101, "alice"));
        gateway.add_member(member(102, "bob"));
        gateway.add_text_channel(10, "general", Some("the topic"));
        gateway.add_voice_channel(20, "Lounge");
        let handle = Arc::new(ServerHandle::new("irc.test", Duration::from_secs(60)));
        handle.reset_session();
        let bridge = Arc::new(Bridge::new(gateway.clone(), handle, config));
        (bridge, gateway)
    }

    fn msg(line: &str) -> IrcMessage {
        IrcMessage::parse(line).unwrap()
    }

    async fn register(bridge: &Arc<Bridge>) {
        bridge.cmd_cap(msg("CAP LS 302")).await;
        bridge.cmd_nick(msg("NICK tester")).await;
        bridge.cmd_user(msg("USER tester 0 * :tester")).await;
        bridge.cmd_pass(msg("PASS 1")).await;
        bridge.cmd_cap(msg("CAP REQ :message-tags multi-prefix")).await;
        bridge.cmd_cap(msg("CAP END")).await;
        bridge.server().drain_all();
    }

    #[tokio::test]
    async fn test_registration_needs_nick_user_and_pass() {
        let (bridge, _) = test_bridge(Config::default());
        bridge.cmd_nick(msg("NICK tester")).await;
        bridge.cmd_user(msg("USER tester 0 * :tester")).await;
        assert!(!bridge.ready());

        bridge.cmd_pass(msg("PASS 1")).await;
        assert!(bridge.ready());

        // the client is renamed to the bridge account before the burst
        let lines = bridge.server().drain_all();
        assert_eq!(lines[0], ":tester NICK bridge");
        assert_eq!(
            lines[1],
            ":irc.test 001 bridge :Welcome to the Discord Network, bridge"
        );
        assert!(lines.iter().any(|l| l.contains("005 bridge PREFIX=(qaohv)~&@%+")));
        assert!(lines.iter().any(|l| l.contains("376 bridge :End of MOTD command")));
    }

    #[tokio::test]
    async fn test_pass_with_unknown_guild_is_fatal() {
        let (bridge, _) = test_bridge(Config::default());
        bridge.cmd_nick(msg("NICK tester")).await;
        bridge.cmd_user(msg("USER tester 0 * :tester")).await;
        bridge.cmd_pass(msg("PASS 999")).await;
        assert!(!bridge.ready());
        assert!(!bridge.server().is_running());
        let lines = bridge.server().drain_all();
        assert!(lines.contains(&"ERROR :Unknown community".to_owned()));
    }

    #[tokio::test]
    async fn test_cap_negotiation_defers_welcome() {
        let (bridge, _) = test_bridge(Config::default());
        bridge.cmd_cap(msg("CAP LS 302")).await;
        bridge.cmd_nick(msg("NICK tester")).await;
        bridge.cmd_user(msg("USER tester 0 * :tester")).await;
        bridge.cmd_pass(msg("PASS 1")).await;
        // handshake complete but CAP negotiation still open
        assert!(!bridge.ready());

        let lines = bridge.server().drain_all();
        assert!(
            lines
                .iter()
                .any(|l| l == ":irc.test CAP * LS :message-tags away-notify multi-prefix")
        );
        assert!(!lines.iter().any(|l| l.contains(" 001 ")));

        bridge
            .cmd_cap(msg("CAP REQ :message-tags bogus-cap"))
            .await;
        let lines = bridge.server().drain_all();
        assert!(lines.contains(&":irc.test CAP * ACK :message-tags ".to_owned()));
        assert!(lines.contains(&":irc.test CAP * NAK :bogus-cap ".to_owned()));

        bridge.cmd_cap(msg("CAP END")).await;
        assert!(bridge.ready());
        assert!(bridge.state().caps().message_tags);
        let lines = bridge.server().drain_all();
        assert!(lines.iter().any(|l| l.contains(" 001 bridge ")));
    }

    #[tokio::test]
    async fn test_nick_collision_gets_discriminator() {
        let (bridge, gateway) = test_bridge(Config::default());
        register(&bridge).await;
        gateway.add_member(Member {
            nickname: Some("alice".to_owned()),
            ..member(103, "impostor")
        });

        assert_eq!(bridge.nick_by_id(101).await, "alice");
        // second member rendering to the same name is disambiguated
        assert_eq!(bridge.nick_by_id(103).await, "alice|0103");
        // the mapping is sticky
        assert_eq!(bridge.nick_by_id(103).await, "alice|0103");
    }

    #[tokio::test]
    async fn test_unknown_user_fallback_nick() {
        let (bridge, _) = test_bridge(Config::default());
        register(&bridge).await;
        assert_eq!(bridge.nick_by_id(999).await, "user_999");
    }

    #[tokio::test]
    async fn test_mention_rewriting_both_ways() {
        let (bridge, _) = test_bridge(Config::default());
        register(&bridge).await;

        let out = bridge.rewrite_outgoing_mentions("hey @alice look at #general").await;
        assert_eq!(out, "hey <@101> look at <#10>");
        // a mention glued to a word is left alone
        let out = bridge.rewrite_outgoing_mentions("mail@alice.example").await;
        assert_eq!(out, "mail@alice.example");

        let back = bridge.rewrite_incoming_mentions("hey <@101> look at <#10>").await;
        assert_eq!(back, "hey @alice look at #general");
    }

    #[tokio::test]
    async fn test_join_and_message_relay_fragments() {
        let (bridge, gateway) = test_bridge(Config::default());
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN #general")).await;
        assert!(bridge.state().joined.contains_key(&10));
        let lines = bridge.server().drain_all();
        assert!(lines.contains(&":bridge!100@discord.com JOIN #general".to_owned()));
        assert!(lines.iter().any(|l| l.contains("332 bridge #general :the topic")));
        assert!(lines.iter().any(|l| l.contains("353 bridge = #general :")));

        bridge
            .handle_event(GatewayEvent::MessageCreated(MessageEvent {
                id: 555,
                channel_id: 10,
                author: Author {
                    id: 101,
                    username: "alice".to_owned(),
                    is_bot: false,
                    is_webhook: false,
                },
                content: "first\nsecond".to_owned(),
                is_direct: false,
                is_system: false,
            }))
            .await;
        let _ = gateway;
        let lines = bridge.server().drain_all();
        assert_eq!(
            lines,
            vec![
                "@msgid=555-1;discord.com/user=101 :alice!101@discord.com PRIVMSG #general :first"
                    .to_owned(),
                "@msgid=555-2;discord.com/user=101 :alice!101@discord.com PRIVMSG #general :second"
                    .to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn test_privmsg_sends_and_truncates() {
        let (bridge, gateway) = test_bridge(Config::default());
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN #general")).await;
        bridge.server().drain_all();

        bridge
            .cmd_privmsg(msg("PRIVMSG #general :\u{1}ACTION waves\u{1}"))
            .await;
        let long = "x".repeat(3000);
        bridge
            .cmd_privmsg(msg(&format!("PRIVMSG #general :{long}")))
            .await;

        let actions = gateway.take_actions();
        match &actions[0] {
            Action::SendMessage { channel, content, .. } => {
                assert_eq!(*channel, 10);
                assert_eq!(content.as_deref(), Some("_waves_"));
            }
            other => panic!("unexpected action {other:?}"),
        }
        match &actions[1] {
            Action::SendMessage { content, .. } => {
                assert_eq!(content.as_ref().map(|c| c.chars().count()), Some(2000));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_privmsg_rejects_voice_and_unjoined() {
        let (bridge, _) = test_bridge(Config::default());
        register(&bridge).await;
        bridge.cmd_privmsg(msg("PRIVMSG &20 :hi")).await;
        bridge.cmd_privmsg(msg("PRIVMSG #general :hi")).await;
        let lines = bridge.server().drain_all();
        assert!(lines.iter().any(|l| l.contains("404 bridge &20 :Cannot send to channel")));
        assert!(
            lines
                .iter()
                .any(|l| l.contains("442 bridge #general :You're not on that channel"))
        );
    }

    #[tokio::test]
    async fn test_mode_ban_applies_platform_ban() {
        let (bridge, gateway) = test_bridge(Config::default());
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN #general")).await;
        bridge.server().drain_all();

        bridge.cmd_mode(msg("MODE #general +b *!102@*")).await;
        assert_eq!(gateway.take_actions(), vec![Action::Ban(102)]);
        assert!(bridge.state().bans.contains(102));
        let lines = bridge.server().drain_all();
        assert!(lines.contains(&":bridge MODE #general +b *!102@*".to_owned()));
    }

    #[tokio::test]
    async fn test_mode_ban_with_banned_role_assigns_role() {
        let config = Config {
            banned_role: Some(50),
            ..Config::default()
        };
        let (bridge, gateway) = test_bridge(config);
        gateway.define_role(Role {
            id: 50,
            name: "jail".to_owned(),
            permissions: GuildPermissions::default(),
            send_messages: false,
        });
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN #general")).await;
        bridge.server().drain_all();

        bridge.cmd_mode(msg("MODE #general +b *!102@*")).await;
        assert_eq!(gateway.take_actions(), vec![Action::AddRole(102, 50)]);
        bridge.cmd_mode(msg("MODE #general -b *!102@*")).await;
        assert_eq!(gateway.take_actions(), vec![Action::RemoveRole(102, 50)]);
    }

    #[tokio::test]
    async fn test_fake_kick_emits_lines_only() {
        let config = Config {
            fake_kick: true,
            ..Config::default()
        };
        let (bridge, gateway) = test_bridge(config);
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN #general")).await;
        bridge.server().drain_all();

        bridge.cmd_kick(msg("KICK #general bob :later")).await;
        assert!(gateway.take_actions().is_empty());
        let lines = bridge.server().drain_all();
        assert!(lines.contains(&":bridge KICK #general bob :later".to_owned()));
        assert!(lines.contains(&":bob!102@discord.com JOIN #general".to_owned()));
    }

    #[tokio::test]
    async fn test_voice_join_by_id_and_slowmode() {
        let (bridge, gateway) = test_bridge(Config::default());
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN &20")).await;
        assert!(bridge.state().joined.contains_key(&20));
        bridge.cmd_join(msg("JOIN #general")).await;
        bridge.server().drain_all();

        bridge.cmd_mode(msg("MODE #general +Z 30")).await;
        match gateway.take_actions().as_slice() {
            [Action::ModifyChannel(10, edit)] => {
                assert_eq!(edit.slowmode_secs, Some(30));
            }
            other => panic!("unexpected actions {other:?}"),
        }
        let lines = bridge.server().drain_all();
        assert!(lines.contains(&":bridge MODE #general +Z 30".to_owned()));
    }

    #[tokio::test]
    async fn test_bitrate_clamped() {
        let (bridge, gateway) = test_bridge(Config::default());
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN &20")).await;
        bridge.server().drain_all();

        bridge.cmd_mode(msg("MODE &20 +B 500000")).await;
        match gateway.take_actions().as_slice() {
            [Action::ModifyChannel(20, edit)] => {
                assert_eq!(edit.bitrate, Some(96000));
            }
            other => panic!("unexpected actions {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_events_ignored_before_registration() {
        let (bridge, _) = test_bridge(Config::default());
        bridge
            .handle_event(GatewayEvent::MessageCreated(MessageEvent {
                id: 1,
                channel_id: 10,
                author: Author {
                    id: 101,
                    username: "alice".to_owned(),
                    is_bot: false,
                    is_webhook: false,
                },
                content: "early".to_owned(),
                is_direct: false,
                is_system: false,
            }))
            .await;
        assert!(bridge.server().drain_all().is_empty());
    }

    #[tokio::test]
    async fn test_role_tag_suppression() {
        let config = Config {
            role_tags: [("50".to_owned(), String::new())].into_iter().collect(),
            ..Config::default()
        };
        let (bridge, gateway) = test_bridge(config);
        gateway.define_role(Role {
            id: 50,
            name: "muted".to_owned(),
            permissions: GuildPermissions::default(),
            send_messages: false,
        });
        gateway.add_member(Member {
            role_ids: vec![50],
            ..member(103, "quiet")
        });
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN #general")).await;
        bridge.server().drain_all();

        bridge
            .handle_event(GatewayEvent::MessageCreated(MessageEvent {
                id: 2,
                channel_id: 10,
                author: Author {
                    id: 103,
                    username: "quiet".to_owned(),
                    is_bot: false,
                    is_webhook: false,
                },
                content: "should not appear".to_owned(),
                is_direct: false,
                is_system: false,
            }))
            .await;
        assert!(bridge.server().drain_all().is_empty());
    }

    #[tokio::test]
    async fn test_cap_req_away_notify_is_refused() {
        let (bridge, _) = test_bridge(Config::default());
        bridge.cmd_cap(msg("CAP LS 302")).await;
        bridge.server().drain_all();

        bridge.cmd_cap(msg("CAP REQ :away-notify")).await;
        let lines = bridge.server().drain_all();
        assert!(lines.contains(&":irc.test CAP * NAK :away-notify ".to_owned()));
        assert!(!lines.iter().any(|l| l.contains("ACK")));
    }

    #[tokio::test]
    async fn test_reaction_relay_carries_user_id_tag() {
        let (bridge, _) = test_bridge(Config::default());
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN #general")).await;
        bridge.server().drain_all();

        bridge
            .handle_event(GatewayEvent::ReactionAdded {
                message_id: 555,
                channel_id: 10,
                user_id: 101,
                emote: "👍".to_owned(),
            })
            .await;
        let lines = bridge.server().drain_all();
        assert_eq!(
            lines,
            vec![
                "@discord.com/user=101;+reply=555;+discord.com/react-add=👍 \
                 :alice!101@discord.com TAGMSG #general"
                    .to_owned()
            ]
        );
    }

    #[tokio::test]
    async fn test_reaction_removal_names_user_by_id() {
        let (bridge, gateway) = test_bridge(Config::default());
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN #general")).await;
        bridge.server().drain_all();

        bridge
            .cmd_tagmsg(msg(
                "@+reply=555;+discord.com/react-remove=👍;discord.com/user=102 TAGMSG #general",
            ))
            .await;
        assert_eq!(
            gateway.take_actions(),
            vec![Action::RemoveReaction {
                channel: 10,
                message: 555,
                user: 102,
                emote: "👍".to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn test_rename_releases_old_nick() {
        let (bridge, _) = test_bridge(Config::default());
        register(&bridge).await;
        assert_eq!(bridge.nick_by_id(101).await, "alice");

        bridge
            .handle_event(GatewayEvent::MemberUpdated {
                old: member(101, "alice"),
                new: Member {
                    nickname: Some("alicia".to_owned()),
                    ..member(101, "alice")
                },
            })
            .await;
        assert!(!bridge.state().nicks.contains_key("alice"));
        assert_eq!(bridge.state().nicks.get("alicia").map(|e| *e.value()), Some(101));
        let lines = bridge.server().drain_all();
        assert!(lines.contains(&":alice!101@discord.com NICK alicia".to_owned()));
    }

    #[tokio::test]
    async fn test_join_twice_is_idempotent() {
        let (bridge, _) = test_bridge(Config::default());
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN #general")).await;
        bridge.server().drain_all();

        bridge.cmd_join(msg("JOIN #general")).await;
        assert_eq!(bridge.state().joined.len(), 1);
        assert!(bridge.server().drain_all().is_empty());
    }

    #[tokio::test]
    async fn test_part_unjoined_channel_is_silent() {
        let (bridge, gateway) = test_bridge(Config::default());
        register(&bridge).await;

        bridge.cmd_part(msg("PART #general")).await;
        assert!(bridge.server().drain_all().is_empty());
        assert!(gateway.take_actions().is_empty());
    }

    #[tokio::test]
    async fn test_bot_join_and_quit_lines_tagged() {
        let (bridge, gateway) = test_bridge(Config::default());
        register(&bridge).await;
        bridge.cmd_join(msg("JOIN #general")).await;
        bridge.server().drain_all();

        let bot = Member {
            is_bot: true,
            ..member(104, "helper")
        };
        gateway.add_member(bot.clone());
        bridge.handle_event(GatewayEvent::MemberJoined(bot)).await;
        let lines = bridge.server().drain_all();
        assert!(lines.contains(&"@discord.com/bot :helper!104@discord.com JOIN #general".to_owned()));

        bridge
            .handle_event(GatewayEvent::MemberLeft { user_id: 104 })
            .await;
        let lines = bridge.server().drain_all();
        assert!(
            lines.contains(
                &"@discord.com/bot :helper!104@discord.com QUIT :Left the server".to_owned()
            )
        );
    }
}
