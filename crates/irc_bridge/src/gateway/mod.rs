//! Abstraction over the chat platform. The bridge only ever talks to
//! the [`Gateway`] trait; `memory` provides the in-process test double.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::embeds::Embed;
use crate::types::{ChannelId, GuildId, MessageId, RoleId, UserId};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("unknown guild {0}")]
    UnknownGuild(GuildId),
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),
    #[error("unknown user {0}")]
    UnknownUser(UserId),
    #[error("unknown role {0}")]
    UnknownRole(RoleId),
    #[error("unknown message {0}")]
    UnknownMessage(MessageId),
    #[error("missing permission: {0}")]
    MissingPermission(&'static str),
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Guild-wide permission bits the bridge cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuildPermissions {
    pub administrator: bool,
    pub manage_channels: bool,
    pub manage_roles: bool,
    pub manage_messages: bool,
    pub manage_nicknames: bool,
    pub kick_members: bool,
    pub ban_members: bool,
    pub move_members: bool,
}

/// Per-channel permission bits, already resolved against overwrites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelPermissions {
    pub view_channel: bool,
    pub send_messages: bool,
    pub speak: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Presence {
    Online,
    Idle,
    DoNotDisturb,
    #[default]
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: UserId,
    pub username: String,
    pub discriminator: String,
    pub nickname: Option<String>,
    pub is_bot: bool,
    pub role_ids: Vec<RoleId>,
    pub presence: Presence,
    /// Account creation, seconds since the Unix epoch.
    pub created_at: u64,
}

impl Member {
    /// Server nickname when set, account username otherwise.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelKind {
    Text {
        topic: Option<String>,
        slowmode_secs: u32,
        nsfw: bool,
    },
    Voice {
        bitrate: u32,
        user_limit: u32,
    },
    Category,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
}

impl Channel {
    pub fn is_text(&self) -> bool {
        matches!(self.kind, ChannelKind::Text { .. })
    }

    pub fn is_voice(&self) -> bool {
        matches!(self.kind, ChannelKind::Voice { .. })
    }

    /// IRC-side name: text channels go by name, voice channels by id
    /// so renames cannot break the mapping mid-session.
    pub fn irc_name(&self) -> String {
        if self.is_voice() {
            format!("&{}", self.id)
        } else {
            format!("#{}", self.name)
        }
    }

    pub fn topic(&self) -> Option<&str> {
        match &self.kind {
            ChannelKind::Text { topic, .. } => topic.as_deref(),
            _ => None,
        }
    }
}

/// Partial channel update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelEdit {
    pub topic: Option<String>,
    pub slowmode_secs: Option<u32>,
    pub nsfw: Option<bool>,
    pub bitrate: Option<u32>,
    pub user_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub permissions: GuildPermissions,
    pub send_messages: bool,
}

/// Message author as it appears on an event. Webhooks are not members,
/// so this is deliberately thinner than [`Member`].
#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: UserId,
    pub username: String,
    pub is_bot: bool,
    pub is_webhook: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: Author,
    pub content: String,
    pub is_direct: bool,
    pub is_system: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceState {
    pub channel_id: Option<ChannelId>,
    pub muted: bool,
    pub deafened: bool,
}

/// Everything the platform pushes at the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    MessageCreated(MessageEvent),
    MessageUpdated {
        old_content: Option<String>,
        message: MessageEvent,
    },
    MessageDeleted {
        id: MessageId,
        channel_id: ChannelId,
    },
    ReactionAdded {
        message_id: MessageId,
        channel_id: ChannelId,
        user_id: UserId,
        emote: String,
    },
    ReactionRemoved {
        message_id: MessageId,
        channel_id: ChannelId,
        user_id: UserId,
        emote: String,
    },
    MemberJoined(Member),
    MemberLeft {
        user_id: UserId,
    },
    MemberUpdated {
        old: Member,
        new: Member,
    },
    MemberBanned {
        user_id: UserId,
    },
    MemberUnbanned {
        user_id: UserId,
    },
    RoleUpdated {
        old: Role,
        new: Role,
    },
    ChannelUpdated {
        old: Channel,
        new: Channel,
        /// Members who could see the channel before and after the edit.
        old_viewers: Vec<UserId>,
        new_viewers: Vec<UserId>,
    },
    VoiceStateUpdated {
        user_id: UserId,
        old: VoiceState,
        new: VoiceState,
    },
    TypingStarted {
        channel_id: ChannelId,
        user_id: UserId,
    },
}

/// The platform surface the bridge consumes. All lookups are scoped to
/// the guild chosen with [`Gateway::select_guild`].
#[async_trait]
pub trait Gateway: Send + Sync {
    fn current_user_id(&self) -> UserId;
    fn current_username(&self) -> String;

    /// Binds the session to one guild; returns false if unknown.
    async fn select_guild(&self, guild: GuildId) -> bool;
    async fn owner_id(&self) -> Option<UserId>;

    async fn member(&self, id: UserId) -> Option<Member>;
    /// Member lookup that falls through to a remote user fetch, for ids
    /// that left the guild but still appear in history.
    async fn fetch_user(&self, id: UserId) -> Option<Member>;
    async fn members(&self) -> Vec<Member>;

    async fn channel(&self, id: ChannelId) -> Option<Channel>;
    async fn channels(&self) -> Vec<Channel>;

    async fn roles(&self) -> Vec<Role>;
    async fn role(&self, id: RoleId) -> Option<Role>;

    async fn guild_permissions(&self, user: UserId) -> GuildPermissions;
    async fn channel_permissions(&self, user: UserId, channel: ChannelId) -> ChannelPermissions;

    async fn ban_list(&self) -> Result<Vec<UserId>, GatewayError>;
    async fn message_author(&self, channel: ChannelId, message: MessageId) -> Option<UserId>;
    /// Resolves `:shortcode:` style emote names to the form reactions
    /// need; unicode emoji pass through unchanged.
    async fn resolve_emote(&self, name: &str) -> Option<String>;

    async fn send_message(
        &self,
        channel: ChannelId,
        content: Option<&str>,
        embed: Option<Embed>,
    ) -> Result<MessageId, GatewayError>;
    async fn send_direct_message(&self, user: UserId, content: &str)
        -> Result<MessageId, GatewayError>;
    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: &str,
    ) -> Result<(), GatewayError>;
    async fn delete_message(&self, channel: ChannelId, message: MessageId)
        -> Result<(), GatewayError>;

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emote: &str,
    ) -> Result<(), GatewayError>;
    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emote: &str,
    ) -> Result<(), GatewayError>;

    async fn ban_member(&self, user: UserId) -> Result<(), GatewayError>;
    async fn unban_member(&self, user: UserId) -> Result<(), GatewayError>;
    async fn kick_member(&self, user: UserId) -> Result<(), GatewayError>;

    async fn add_role(&self, user: UserId, role: RoleId) -> Result<(), GatewayError>;
    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<(), GatewayError>;

    async fn modify_channel(&self, channel: ChannelId, edit: ChannelEdit)
        -> Result<(), GatewayError>;
    async fn set_nickname(&self, user: UserId, nick: Option<&str>) -> Result<(), GatewayError>;
    async fn disconnect_voice(&self, user: UserId) -> Result<(), GatewayError>;
}
