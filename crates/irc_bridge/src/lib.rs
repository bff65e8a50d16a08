//! An IRC server facade over a federated chat platform: one local
//! client connects with a plain IRC client and sees the platform's
//! channels, members and messages translated into RFC 2812 plus a few
//! IRCv3 extensions.

pub mod address;
pub mod bans;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod embeds;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod identity;
pub mod message;
pub mod queue;
pub mod server;
pub mod state;
pub mod tags;
pub mod types;
