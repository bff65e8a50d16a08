//! In-process [`Gateway`] backed by plain maps. Used by the binary's
//! demo mode and by the test suite, which asserts against the recorded
//! action log instead of a network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{
    Channel, ChannelEdit, ChannelKind, ChannelPermissions, Gateway, GatewayError, GatewayEvent,
    GuildPermissions, Member, Presence, Role,
};
use crate::embeds::Embed;
use crate::types::{ChannelId, GuildId, MessageId, RoleId, UserId};

/// Every mutating call, in order, for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendMessage {
        channel: ChannelId,
        content: Option<String>,
        embed: Option<Embed>,
    },
    SendDirectMessage {
        user: UserId,
        content: String,
    },
    EditMessage {
        channel: ChannelId,
        message: MessageId,
        content: String,
    },
    DeleteMessage {
        channel: ChannelId,
        message: MessageId,
    },
    AddReaction {
        channel: ChannelId,
        message: MessageId,
        emote: String,
    },
    RemoveReaction {
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emote: String,
    },
    Ban(UserId),
    Unban(UserId),
    Kick(UserId),
    AddRole(UserId, RoleId),
    RemoveRole(UserId, RoleId),
    ModifyChannel(ChannelId, ChannelEdit),
    SetNickname(UserId, Option<String>),
    DisconnectVoice(UserId),
}

#[derive(Default)]
struct GuildData {
    id: GuildId,
    owner: Option<UserId>,
    members: HashMap<UserId, Member>,
    remote_users: HashMap<UserId, Member>,
    channels: HashMap<ChannelId, Channel>,
    roles: HashMap<RoleId, Role>,
    bans: HashSet<UserId>,
    message_authors: HashMap<(ChannelId, MessageId), UserId>,
    emotes: HashMap<String, String>,
    channel_overrides: HashMap<(ChannelId, UserId), ChannelPermissions>,
}

pub struct MemoryGateway {
    user_id: UserId,
    username: String,
    guild: RwLock<GuildData>,
    actions: Mutex<Vec<Action>>,
    events: Mutex<Option<UnboundedSender<GatewayEvent>>>,
    next_message_id: AtomicU64,
}

impl MemoryGateway {
    pub fn new(guild_id: GuildId, user_id: UserId, username: &str) -> Self {
        let gateway = MemoryGateway {
            user_id,
            username: username.to_owned(),
            guild: RwLock::new(GuildData {
                id: guild_id,
                ..GuildData::default()
            }),
            actions: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            next_message_id: AtomicU64::new(1000),
        };
        // the connected account is always a member of its own guild
        gateway.add_member(Member {
            id: user_id,
            username: username.to_owned(),
            discriminator: "0000".to_owned(),
            nickname: None,
            is_bot: false,
            role_ids: Vec::new(),
            presence: Presence::Online,
            created_at: 0,
        });
        gateway
    }

    pub fn add_member(&self, member: Member) {
        if let Ok(mut g) = self.guild.write() {
            g.members.insert(member.id, member);
        }
    }

    pub fn remove_member(&self, id: UserId) {
        if let Ok(mut g) = self.guild.write() {
            g.members.remove(&id);
        }
    }

    pub fn add_remote_user(&self, member: Member) {
        if let Ok(mut g) = self.guild.write() {
            g.remote_users.insert(member.id, member);
        }
    }

    pub fn add_text_channel(&self, id: ChannelId, name: &str, topic: Option<&str>) {
        self.add_channel(Channel {
            id,
            name: name.to_owned(),
            kind: ChannelKind::Text {
                topic: topic.map(str::to_owned),
                slowmode_secs: 0,
                nsfw: false,
            },
        });
    }

    pub fn add_voice_channel(&self, id: ChannelId, name: &str) {
        self.add_channel(Channel {
            id,
            name: name.to_owned(),
            kind: ChannelKind::Voice {
                bitrate: 64000,
                user_limit: 0,
            },
        });
    }

    pub fn add_channel(&self, channel: Channel) {
        if let Ok(mut g) = self.guild.write() {
            g.channels.insert(channel.id, channel);
        }
    }

    pub fn define_role(&self, role: Role) {
        if let Ok(mut g) = self.guild.write() {
            g.roles.insert(role.id, role);
        }
    }

    pub fn set_owner(&self, id: UserId) {
        if let Ok(mut g) = self.guild.write() {
            g.owner = Some(id);
        }
    }

    pub fn set_channel_permissions(
        &self,
        channel: ChannelId,
        user: UserId,
        perms: ChannelPermissions,
    ) {
        if let Ok(mut g) = self.guild.write() {
            g.channel_overrides.insert((channel, user), perms);
        }
    }

    pub fn set_message_author(&self, channel: ChannelId, message: MessageId, author: UserId) {
        if let Ok(mut g) = self.guild.write() {
            g.message_authors.insert((channel, message), author);
        }
    }

    pub fn add_emote(&self, name: &str, resolved: &str) {
        if let Ok(mut g) = self.guild.write() {
            g.emotes.insert(name.to_owned(), resolved.to_owned());
        }
    }

    pub fn insert_ban(&self, id: UserId) {
        if let Ok(mut g) = self.guild.write() {
            g.bans.insert(id);
        }
    }

    /// Event feed. Anything passed to [`emit`](Self::emit) after this
    /// call shows up on the receiver.
    pub fn subscribe(&self) -> UnboundedReceiver<GatewayEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut events) = self.events.lock() {
            *events = Some(tx);
        }
        rx
    }

    pub fn emit(&self, event: GatewayEvent) {
        if let Ok(events) = self.events.lock() {
            if let Some(tx) = events.as_ref() {
                let _ = tx.send(event);
            }
        }
    }

    /// Drains the recorded action log.
    pub fn take_actions(&self) -> Vec<Action> {
        self.actions
            .lock()
            .map(|mut a| a.drain(..).collect())
            .unwrap_or_default()
    }

    fn record(&self, action: Action) {
        if let Ok(mut a) = self.actions.lock() {
            a.push(action);
        }
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    fn current_user_id(&self) -> UserId {
        self.user_id
    }

    fn current_username(&self) -> String {
        self.username.clone()
    }

    async fn select_guild(&self, guild: GuildId) -> bool {
        self.guild.read().map(|g| g.id == guild).unwrap_or(false)
    }

    async fn owner_id(&self) -> Option<UserId> {
        self.guild.read().ok().and_then(|g| g.owner)
    }

    async fn member(&self, id: UserId) -> Option<Member> {
        self.guild.read().ok().and_then(|g| g.members.get(&id).cloned())
    }

    async fn fetch_user(&self, id: UserId) -> Option<Member> {
        if let Some(member) = self.member(id).await {
            return Some(member);
        }
        self.guild
            .read()
            .ok()
            .and_then(|g| g.remote_users.get(&id).cloned())
    }

    async fn members(&self) -> Vec<Member> {
        self.guild
            .read()
            .map(|g| g.members.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn channel(&self, id: ChannelId) -> Option<Channel> {
        self.guild.read().ok().and_then(|g| g.channels.get(&id).cloned())
    }

    async fn channels(&self) -> Vec<Channel> {
        self.guild
            .read()
            .map(|g| g.channels.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn roles(&self) -> Vec<Role> {
        self.guild
            .read()
            .map(|g| g.roles.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn role(&self, id: RoleId) -> Option<Role> {
        self.guild.read().ok().and_then(|g| g.roles.get(&id).cloned())
    }

    async fn guild_permissions(&self, user: UserId) -> GuildPermissions {
        let Ok(g) = self.guild.read() else {
            return GuildPermissions::default();
        };
        if g.owner == Some(user) {
            return GuildPermissions {
                administrator: true,
                manage_channels: true,
                manage_roles: true,
                manage_messages: true,
                manage_nicknames: true,
                kick_members: true,
                ban_members: true,
                move_members: true,
            };
        }
        let mut perms = GuildPermissions::default();
        if let Some(member) = g.members.get(&user) {
            for role_id in &member.role_ids {
                if let Some(role) = g.roles.get(role_id) {
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
            }
        }
        perms
    }

    async fn channel_permissions(&self, user: UserId, channel: ChannelId) -> ChannelPermissions {
        let Ok(g) = self.guild.read() else {
            return ChannelPermissions::default();
        };
        if let Some(perms) = g.channel_overrides.get(&(channel, user)) {
            return *perms;
        }
        if g.members.contains_key(&user) && g.channels.contains_key(&channel) {
            ChannelPermissions {
                view_channel: true,
                send_messages: true,
                speak: true,
            }
        } else {
            ChannelPermissions::default()
        }
    }

    async fn ban_list(&self) -> Result<Vec<UserId>, GatewayError> {
        self.guild
            .read()
            .map(|g| g.bans.iter().copied().collect())
            .map_err(|_| GatewayError::RequestFailed("guild lock poisoned".to_owned()))
    }

    async fn message_author(&self, channel: ChannelId, message: MessageId) -> Option<UserId> {
        self.guild
            .read()
            .ok()
            .and_then(|g| g.message_authors.get(&(channel, message)).copied())
    }

    async fn resolve_emote(&self, name: &str) -> Option<String> {
        let Ok(g) = self.guild.read() else {
            return None;
        };
        if let Some(resolved) = g.emotes.get(name) {
            return Some(resolved.clone());
        }
        // unicode emoji need no resolution
        if name.chars().any(|c| !c.is_ascii()) {
            return Some(name.to_owned());
        }
        None
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        content: Option<&str>,
        embed: Option<Embed>,
    ) -> Result<MessageId, GatewayError> {
        if self.channel(channel).await.is_none() {
            return Err(GatewayError::UnknownChannel(channel));
        }
        self.record(Action::SendMessage {
            channel,
            content: content.map(str::to_owned),
            embed,
        });
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn send_direct_message(
        &self,
        user: UserId,
        content: &str,
    ) -> Result<MessageId, GatewayError> {
        self.record(Action::SendDirectMessage {
            user,
            content: content.to_owned(),
        });
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: &str,
    ) -> Result<(), GatewayError> {
        self.record(Action::EditMessage {
            channel,
            message,
            content: content.to_owned(),
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), GatewayError> {
        self.record(Action::DeleteMessage { channel, message });
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emote: &str,
    ) -> Result<(), GatewayError> {
        self.record(Action::AddReaction {
            channel,
            message,
            emote: emote.to_owned(),
        });
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emote: &str,
    ) -> Result<(), GatewayError> {
        self.record(Action::RemoveReaction {
            channel,
            message,
            user,
            emote: emote.to_owned(),
        });
        Ok(())
    }

    async fn ban_member(&self, user: UserId) -> Result<(), GatewayError> {
        if let Ok(mut g) = self.guild.write() {
            g.bans.insert(user);
            g.members.remove(&user);
        }
        self.record(Action::Ban(user));
        Ok(())
    }

    async fn unban_member(&self, user: UserId) -> Result<(), GatewayError> {
        if let Ok(mut g) = self.guild.write() {
            g.bans.remove(&user);
        }
        self.record(Action::Unban(user));
        Ok(())
    }

    async fn kick_member(&self, user: UserId) -> Result<(), GatewayError> {
        if let Ok(mut g) = self.guild.write() {
            g.members.remove(&user);
        }
        self.record(Action::Kick(user));
        Ok(())
    }

    async fn add_role(&self, user: UserId, role: RoleId) -> Result<(), GatewayError> {
        let mut found = false;
        if let Ok(mut g) = self.guild.write() {
            if let Some(member) = g.members.get_mut(&user) {
                if !member.role_ids.contains(&role) {
                    member.role_ids.push(role);
                }
                found = true;
            }
        }
        if !found {
            return Err(GatewayError::UnknownUser(user));
        }
        self.record(Action::AddRole(user, role));
        Ok(())
    }

    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<(), GatewayError> {
        let mut found = false;
        if let Ok(mut g) = self.guild.write() {
            if let Some(member) = g.members.get_mut(&user) {
                member.role_ids.retain(|r| *r != role);
                found = true;
            }
        }
        if !found {
            return Err(GatewayError::UnknownUser(user));
        }
        self.record(Action::RemoveRole(user, role));
        Ok(())
    }

    async fn modify_channel(
        &self,
        channel: ChannelId,
        edit: ChannelEdit,
    ) -> Result<(), GatewayError> {
        let mut found = false;
        if let Ok(mut g) = self.guild.write() {
            if let Some(ch) = g.channels.get_mut(&channel) {
                match &mut ch.kind {
                    ChannelKind::Text { topic, slowmode_secs, nsfw } => {
                        if let Some(t) = &edit.topic {
                            *topic = Some(t.clone());
                        }
                        if let Some(s) = edit.slowmode_secs {
                            *slowmode_secs = s;
                        }
                        if let Some(n) = edit.nsfw {
                            *nsfw = n;
                        }
                    }
                    ChannelKind::Voice { bitrate, user_limit } => {
                        if let Some(b) = edit.bitrate {
                            *bitrate = b;
                        }
                        if let Some(l) = edit.user_limit {
                            *user_limit = l;
                        }
                    }
                    ChannelKind::Category => {}
                }
                found = true;
            }
        }
        if !found {
            return Err(GatewayError::UnknownChannel(channel));
        }
        self.record(Action::ModifyChannel(channel, edit));
        Ok(())
    }

    async fn set_nickname(&self, user: UserId, nick: Option<&str>) -> Result<(), GatewayError> {
        let mut found = false;
        if let Ok(mut g) = self.guild.write() {
            if let Some(member) = g.members.get_mut(&user) {
                member.nickname = nick.map(str::to_owned);
                found = true;
            }
        }
        if !found {
            return Err(GatewayError::UnknownUser(user));
        }
        self.record(Action::SetNickname(user, nick.map(str::to_owned)));
        Ok(())
    }

    async fn disconnect_voice(&self, user: UserId) -> Result<(), GatewayError> {
        self.record(Action::DisconnectVoice(user));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: UserId, name: &str, roles: Vec<RoleId>) -> Member {
        Member {
            id,
            username: name.to_owned(),
            discriminator: "0001".to_owned(),
            nickname: None,
            is_bot: false,
            role_ids: roles,
            presence: Presence::Online,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_permissions_union_roles() {
        let gw = MemoryGateway::new(1, 10, "bridge");
        gw.define_role(Role {
            id: 5,
            name: "mods".to_owned(),
            permissions: GuildPermissions {
                kick_members: true,
                ..GuildPermissions::default()
            },
            send_messages: true,
        });
        gw.add_member(member(20, "alice", vec![5]));

        let perms = gw.guild_permissions(20).await;
        assert!(perms.kick_members);
        assert!(!perms.ban_members);

        gw.set_owner(20);
        assert!(gw.guild_permissions(20).await.administrator);
    }

    #[tokio::test]
    async fn test_action_log_records_mutations() {
        let gw = MemoryGateway::new(1, 10, "bridge");
        gw.add_text_channel(100, "general", None);
        let id = gw.send_message(100, Some("hi"), None).await.unwrap();
        assert!(id >= 1000);
        gw.ban_member(55).await.unwrap();

        let actions = gw.take_actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1], Action::Ban(55));
        assert!(gw.take_actions().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_user_falls_through() {
        let gw = MemoryGateway::new(1, 10, "bridge");
        gw.add_remote_user(member(77, "ghost", vec![]));
        assert!(gw.member(77).await.is_none());
        assert_eq!(gw.fetch_user(77).await.unwrap().username, "ghost");
    }
}
