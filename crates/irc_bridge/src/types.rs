//! Snowflake-style identifiers used across the gateway boundary.

pub type GuildId = u64;
pub type ChannelId = u64;
pub type UserId = u64;
pub type RoleId = u64;
pub type MessageId = u64;
