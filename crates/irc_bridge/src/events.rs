//! Platform event to IRC line translation. Nothing here runs until the
//! client has finished registration.

use crate::bridge::Bridge;
use crate::constants::USER_HOST;
use crate::gateway::{
    Channel, ChannelKind, Gateway, GatewayEvent, GuildPermissions, Member, MessageEvent, Role,
    VoiceState,
};
use crate::state::IrcChannel;
use crate::types::{ChannelId, MessageId, RoleId, UserId};

type Tags = Vec<(String, Option<String>)>;

impl Bridge {
    pub async fn handle_event(&self, event: GatewayEvent) {
        if !self.ready() {
            return;
        }
        match event {
            GatewayEvent::MessageCreated(msg) => self.on_message(msg).await,
            GatewayEvent::MessageUpdated { old_content, message } => {
                self.on_message_edit(old_content, message).await
            }
            GatewayEvent::MessageDeleted { id, channel_id } => {
                self.on_message_delete(id, channel_id).await
            }
            GatewayEvent::ReactionAdded {
                message_id,
                channel_id,
                user_id,
                emote,
            } => {
                self.on_reaction(message_id, channel_id, user_id, &emote, true)
                    .await
            }
            GatewayEvent::ReactionRemoved {
                message_id,
                channel_id,
                user_id,
                emote,
            } => {
                self.on_reaction(message_id, channel_id, user_id, &emote, false)
                    .await
            }
            GatewayEvent::MemberJoined(member) => self.on_member_joined(member).await,
            GatewayEvent::MemberLeft { user_id } => self.on_member_left(user_id).await,
            GatewayEvent::MemberUpdated { old, new } => self.on_member_updated(old, new).await,
            GatewayEvent::MemberBanned { user_id } => self.on_member_banned(user_id, true).await,
            GatewayEvent::MemberUnbanned { user_id } => {
                self.on_member_banned(user_id, false).await
            }
            GatewayEvent::RoleUpdated { old, new } => self.on_role_updated(old, new).await,
            GatewayEvent::ChannelUpdated {
                old,
                new,
                old_viewers,
                new_viewers,
            } => self.on_channel_updated(old, new, old_viewers, new_viewers).await,
            GatewayEvent::VoiceStateUpdated { user_id, old, new } => {
                self.on_voice_state(user_id, old, new).await
            }
            GatewayEvent::TypingStarted { channel_id, user_id } => {
                self.on_typing(channel_id, user_id).await
            }
        }
    }

    fn joined(&self, channel: ChannelId) -> Option<IrcChannel> {
        self.state().joined.get(&channel).map(|c| c.value().clone())
    }

    // ---- messages ----------------------------------------------------------

    async fn on_message(&self, msg: MessageEvent) {
        if msg.is_system || msg.author.id == self.gateway().current_user_id() {
            return;
        }
        if msg.is_direct {
            if !self.config().handle_dms {
                return;
            }
            let target = self.nick();
            self.relay_content("PRIVMSG", &msg, &target, Vec::new()).await;
            return;
        }
        let Some(channel) = self.joined(msg.channel_id) else {
            return;
        };
        let Some(tags) = self.message_tags(&msg).await else {
            return;
        };
        let target = channel.irc_name();
        self.relay_content("PRIVMSG", &msg, &target, tags).await;
    }

    async fn on_message_edit(&self, old_content: Option<String>, msg: MessageEvent) {
        if msg.author.id == self.gateway().current_user_id() {
            return;
        }
        // embed resolution fires an update with identical text
        if old_content.as_deref() == Some(msg.content.as_str()) {
            return;
        }
        let Some(channel) = self.joined(msg.channel_id) else {
            return;
        };
        let Some(mut tags) = self.message_tags(&msg).await else {
            return;
        };
        tags.push(("+reply".to_owned(), Some(msg.id.to_string())));
        let target = channel.irc_name();
        self.relay_content("EDITMSG", &msg, &target, tags).await;
    }

    async fn on_message_delete(&self, id: MessageId, channel_id: ChannelId) {
        let Some(channel) = self.joined(channel_id) else {
            return;
        };
        let tags = vec![("+discord.com/delete".to_owned(), Some(id.to_string()))];
        let prefix = self.tag_prefix(&tags);
        if prefix.is_empty() {
            return;
        }
        let line = format!(
            "{prefix}:{} TAGMSG {}",
            self.server().hostname().to_owned(),
            channel.irc_name()
        );
        self.server().enqueue(line);
    }

    async fn on_reaction(
        &self,
        message_id: MessageId,
        channel_id: ChannelId,
        user_id: UserId,
        emote: &str,
        added: bool,
    ) {
        if user_id == self.gateway().current_user_id() {
            return;
        }
        let Some(channel) = self.joined(channel_id) else {
            return;
        };
        let nick = self.nick_by_id(user_id).await;
        let key = if added {
            "+discord.com/react-add"
        } else {
            "+discord.com/react-remove"
        };
        let tags = vec![
            ("discord.com/user".to_owned(), Some(user_id.to_string())),
            ("+reply".to_owned(), Some(message_id.to_string())),
            (key.to_owned(), Some(emote.to_owned())),
        ];
        let prefix = self.tag_prefix(&tags);
        if prefix.is_empty() {
            return;
        }
        let line = format!(
            "{prefix}:{nick}!{user_id}@{USER_HOST} TAGMSG {}",
            channel.irc_name()
        );
        self.server().enqueue(line);
    }

    /// Tags common to PRIVMSG/EDITMSG relays, or `None` if a configured
    /// role suppresses the author entirely.
    async fn message_tags(&self, msg: &MessageEvent) -> Option<Tags> {
        let mut tags: Tags = Vec::new();
        if msg.author.is_bot {
            tags.push(("discord.com/bot".to_owned(), None));
        }
        if !msg.author.is_webhook {
            if let Some(member) = self.gateway().member(msg.author.id).await {
                tags.extend(self.role_tags_for(&member)?);
            }
        }
        Some(tags)
    }

    /// One PRIVMSG/EDITMSG per newline in the body. Single fragments
    /// carry `msgid=<id>`, split ones `msgid=<id>-<n>` so an edit or a
    /// reaction can still address them.
    async fn relay_content(&self, command: &str, msg: &MessageEvent, target: &str, tags: Tags) {
        let prefix = self.author_prefix(&msg.author).await;
        let content = self.rewrite_incoming_mentions(&msg.content).await;
        let content = emote_to_action(&content);
        let fragments: Vec<&str> = content.split('\n').collect();
        let multi = fragments.len() > 1;
        for (i, fragment) in fragments.iter().enumerate() {
            let msgid = if multi {
                format!("{}-{}", msg.id, i + 1)
            } else {
                msg.id.to_string()
            };
            let mut all = vec![
                ("msgid".to_owned(), Some(msgid)),
                (
                    "discord.com/user".to_owned(),
                    Some(msg.author.id.to_string()),
                ),
            ];
            all.extend(tags.iter().cloned());
            let tag_prefix = self.tag_prefix(&all);
            self.server()
                .enqueue(format!("{tag_prefix}:{prefix} {command} {target} :{fragment}"));
        }
    }

    // ---- membership --------------------------------------------------------

    async fn on_member_joined(&self, member: Member) {
        // a banned member rejoining gets the role put back
        if let Some(role) = self.config().banned_role {
            if self.state().bans.contains(member.id) && !member.role_ids.contains(&role) {
                if let Err(e) = self.gateway().add_role(member.id, role).await {
                    log::warn!("could not reapply banned role to {}: {e}", member.id);
                }
            }
        }
        let nick = self.nick_by_id(member.id).await;
        let prefix = format!("{nick}!{}@{USER_HOST}", member.id);
        let bot_tag = if member.is_bot {
            self.tag_prefix(&[("discord.com/bot".to_owned(), None)])
        } else {
            String::new()
        };
        for entry in self.state().joined.iter() {
            let channel = entry.value().clone();
            if !self
                .gateway()
                .channel_permissions(member.id, channel.id)
                .await
                .view_channel
            {
                continue;
            }
            let irc_name = channel.irc_name();
            self.server()
                .enqueue(format!("{bot_tag}:{prefix} JOIN {irc_name}"));
            for letter in self.member_mode_letters(&member, channel.id).await {
                let line = self.server_line(&format!("MODE {irc_name} +{letter} {nick}"));
                self.server().enqueue(line);
            }
        }
    }

    async fn on_member_left(&self, user_id: UserId) {
        let nick = self.nick_by_id(user_id).await;
        let is_bot = self
            .gateway()
            .fetch_user(user_id)
            .await
            .map(|m| m.is_bot)
            .unwrap_or(false);
        let bot_tag = if is_bot {
            self.tag_prefix(&[("discord.com/bot".to_owned(), None)])
        } else {
            String::new()
        };
        self.state().nicks.remove(&nick);
        let line = format!("{bot_tag}:{nick}!{user_id}@{USER_HOST} QUIT :Left the server");
        self.server().enqueue(line);
    }

    async fn on_member_updated(&self, old: Member, new: Member) {
        if let Some(role) = self.config().banned_role {
            let had = old.role_ids.contains(&role);
            let has = new.role_ids.contains(&role);
            if has && !had {
                self.state().bans.insert(new.id);
            } else if had && !has {
                self.state().bans.remove(new.id);
            }
        }
        if old.display_name() != new.display_name() {
            let old_nick = self.nick_by_id(old.id).await;
            let new_nick = crate::identity::irc_safe_name(new.display_name());
            if old_nick != new_nick {
                self.state().nicks.remove(&old_nick);
                self.state().nicks.insert(new_nick.clone(), new.id);
                self.server()
                    .enqueue(format!(":{old_nick}!{}@{USER_HOST} NICK {new_nick}", new.id));
            }
        }
        if old.role_ids != new.role_ids {
            let roles = self.gateway().roles().await;
            let before = mode_letters_from(&perms_from_roles(&roles, &old.role_ids));
            let after = mode_letters_from(&perms_from_roles(&roles, &new.role_ids));
            let nick = self.nick_by_id(new.id).await;
            for entry in self.state().joined.iter() {
                let irc_name = entry.value().irc_name();
                for letter in after.iter().filter(|l| !before.contains(l)) {
                    let line = self.server_line(&format!("MODE {irc_name} +{letter} {nick}"));
                    self.server().enqueue(line);
                }
                for letter in before.iter().filter(|l| !after.contains(l)) {
                    let line = self.server_line(&format!("MODE {irc_name} -{letter} {nick}"));
                    self.server().enqueue(line);
                }
            }
        }
    }

    async fn on_member_banned(&self, user_id: UserId, banned: bool) {
        // with a banned role configured, the role update carries the
        // news instead of a platform ban event
        if self.config().banned_role.is_some() {
            return;
        }
        if banned {
            self.state().bans.insert(user_id);
        } else {
            self.state().bans.remove(user_id);
        }
        let sign = if banned { '+' } else { '-' };
        let mask = crate::address::ban_mask(user_id);
        for entry in self.state().joined.iter() {
            let line =
                self.server_line(&format!("MODE {} {sign}b {mask}", entry.value().irc_name()));
            self.server().enqueue(line);
        }
    }

    async fn on_role_updated(&self, old: Role, new: Role) {
        let before = mode_letters_from(&old.permissions);
        let after = mode_letters_from(&new.permissions);
        if before == after {
            return;
        }
        for member in self.gateway().members().await {
            if !member.role_ids.contains(&new.id) {
                continue;
            }
            let nick = self.nick_by_id(member.id).await;
            for entry in self.state().joined.iter() {
                let irc_name = entry.value().irc_name();
                for letter in after.iter().filter(|l| !before.contains(l)) {
                    let line = self.server_line(&format!("MODE {irc_name} +{letter} {nick}"));
                    self.server().enqueue(line);
                }
                for letter in before.iter().filter(|l| !after.contains(l)) {
                    let line = self.server_line(&format!("MODE {irc_name} -{letter} {nick}"));
                    self.server().enqueue(line);
                }
            }
        }
    }

    // ---- channels ----------------------------------------------------------

    async fn on_channel_updated(
        &self,
        old: Channel,
        new: Channel,
        old_viewers: Vec<UserId>,
        new_viewers: Vec<UserId>,
    ) {
        let Some(joined) = self.joined(new.id) else {
            return;
        };
        let irc_name = joined.irc_name();

        // text channels are addressed by name, so a rename forces the
        // client out and back in under the new name
        if new.is_text() && old.name != new.name {
            let nick = self.nick();
            self.server().enqueue(
                self.server_line(&format!("KICK {irc_name} {nick} :Channel renamed")),
            );
            let renamed = IrcChannel {
                id: new.id,
                name: new.name.clone(),
                is_voice: false,
            };
            self.state().joined.insert(new.id, renamed.clone());
            let new_name = renamed.irc_name();
            self.server()
                .enqueue(format!(":{nick}!{}@{USER_HOST} JOIN {new_name}", self.gateway().current_user_id()));
            self.send_channel_intro(&renamed).await;
            return;
        }

        match (&old.kind, &new.kind) {
            (
                ChannelKind::Text {
                    topic: old_topic,
                    slowmode_secs: old_slow,
                    nsfw: old_nsfw,
                },
                ChannelKind::Text {
                    topic: new_topic,
                    slowmode_secs: new_slow,
                    nsfw: new_nsfw,
                },
            ) => {
                if old_slow != new_slow {
                    let line = if *new_slow > 0 {
                        self.server_line(&format!("MODE {irc_name} +Z {new_slow}"))
                    } else {
                        self.server_line(&format!("MODE {irc_name} -Z"))
                    };
                    self.server().enqueue(line);
                }
                if old_nsfw != new_nsfw {
                    let sign = if *new_nsfw { '+' } else { '-' };
                    let line = self.server_line(&format!("MODE {irc_name} {sign}X"));
                    self.server().enqueue(line);
                }
                if old_topic != new_topic {
                    let topic = new_topic.as_deref().unwrap_or("");
                    let line = self.server_line(&format!("TOPIC {irc_name} :{topic}"));
                    self.server().enqueue(line);
                }
            }
            (
                ChannelKind::Voice {
                    bitrate: old_rate,
                    user_limit: old_limit,
                },
                ChannelKind::Voice {
                    bitrate: new_rate,
                    user_limit: new_limit,
                },
            ) => {
                if old_rate != new_rate {
                    let line = self.server_line(&format!("MODE {irc_name} +B {new_rate}"));
                    self.server().enqueue(line);
                }
                if old_limit != new_limit {
                    let line = if *new_limit > 0 {
                        self.server_line(&format!("MODE {irc_name} +l {new_limit}"))
                    } else {
                        self.server_line(&format!("MODE {irc_name} -l"))
                    };
                    self.server().enqueue(line);
                }
            }
            _ => {}
        }

        // permission overwrite changes surface as joins and parts
        for id in new_viewers.iter().filter(|id| !old_viewers.contains(id)) {
            let prefix = self.user_prefix(*id).await;
            self.server().enqueue(format!(":{prefix} JOIN {irc_name}"));
        }
        for id in old_viewers.iter().filter(|id| !new_viewers.contains(id)) {
            let prefix = self.user_prefix(*id).await;
            self.server()
                .enqueue(format!(":{prefix} PART {irc_name} :No longer visible"));
        }
    }

    // ---- voice -------------------------------------------------------------

    async fn on_voice_state(&self, user_id: UserId, old: VoiceState, new: VoiceState) {
        let prefix = self.user_prefix(user_id).await;
        let nick = self.nick_by_id(user_id).await;

        if old.channel_id != new.channel_id {
            if let Some(channel) = old.channel_id.and_then(|id| self.joined(id)) {
                self.server()
                    .enqueue(format!(":{prefix} PART {} :Left voice", channel.irc_name()));
            }
            if let Some(channel) = new.channel_id.and_then(|id| self.joined(id)) {
                let irc_name = channel.irc_name();
                self.server().enqueue(format!(":{prefix} JOIN {irc_name}"));
                if !new.muted {
                    let line = self.server_line(&format!("MODE {irc_name} +v {nick}"));
                    self.server().enqueue(line);
                }
            }
            return;
        }

        if old.muted != new.muted {
            if let Some(channel) = new.channel_id.and_then(|id| self.joined(id)) {
                let sign = if new.muted { '-' } else { '+' };
                let line =
                    self.server_line(&format!("MODE {} {sign}v {nick}", channel.irc_name()));
                self.server().enqueue(line);
            }
        }
    }

    async fn on_typing(&self, channel_id: ChannelId, user_id: UserId) {
        if user_id == self.gateway().current_user_id() {
            return;
        }
        let Some(channel) = self.joined(channel_id) else {
            return;
        };
        let tags = vec![("+typing".to_owned(), Some("active".to_owned()))];
        let prefix = self.tag_prefix(&tags);
        if prefix.is_empty() {
            return;
        }
        let user = self.user_prefix(user_id).await;
        let line = format!("{prefix}:{user} TAGMSG {}", channel.irc_name());
        self.server().enqueue(line);
    }
}

/// `_text_` on a single line is the platform's italics idiom for an
/// emote; surface it as a CTCP ACTION.
fn emote_to_action(content: &str) -> String {
    if content.len() > 2
        && content.starts_with('_')
        && content.ends_with('_')
        && !content.contains('\n')
    {
        format!("\u{1}ACTION {}\u{1}", &content[1..content.len() - 1])
    } else {
        content.to_owned()
    }
}

fn perms_from_roles(roles: &[Role], ids: &[RoleId]) -> GuildPermissions {
    let mut perms = GuildPermissions::default();
    for role in roles.iter().filter(|r| ids.contains(&r.id)) {
        let p = role.permissions;
        perms.administrator |= p.administrator;
        perms.manage_channels |= p.manage_channels;
        perms.manage_roles |= p.manage_roles;
        perms.manage_messages |= p.manage_messages;
        perms.manage_nicknames |= p.manage_nicknames;
        perms.kick_members |= p.kick_members;
        perms.ban_members |= p.ban_members;
        perms.move_members |= p.move_members;
    }
    perms
}

/// Guild-level mode letters; voice is per-channel and owner is fixed,
/// so neither shows up here.
fn mode_letters_from(perms: &GuildPermissions) -> Vec<char> {
    let mut letters = Vec::new();
    if perms.administrator {
        letters.push('a');
    }
    if perms.manage_channels {
        letters.push('o');
    }
    if perms.kick_members {
        letters.push('h');
    }
    letters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::sigil_for;

    #[test]
    fn test_emote_to_action() {
        assert_eq!(emote_to_action("_waves_"), "\u{1}ACTION waves\u{1}");
        assert_eq!(emote_to_action("plain"), "plain");
        assert_eq!(emote_to_action("_"), "_");
        assert_eq!(emote_to_action("_two\nlines_"), "_two\nlines_");
    }

    #[test]
    fn test_mode_letters_from_perms() {
        let mut perms = GuildPermissions::default();
        assert!(mode_letters_from(&perms).is_empty());
        perms.administrator = true;
        perms.kick_members = true;
        assert_eq!(mode_letters_from(&perms), vec!['a', 'h']);
    }

    #[test]
    fn test_sigil_mapping() {
        assert_eq!(sigil_for('q'), Some('~'));
        assert_eq!(sigil_for('v'), Some('+'));
        assert_eq!(sigil_for('x'), None);
    }
}
