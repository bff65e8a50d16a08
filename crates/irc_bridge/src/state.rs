use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use dashmap::DashMap;

use crate::bans::BanCache;
use crate::embeds::EmbedBuilder;
use crate::types::{ChannelId, UserId};

/// Which registration commands have been seen so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandshakeFlags {
    pub user: bool,
    pub nick: bool,
    pub pass: bool,
    pub caps: bool,
}

impl HandshakeFlags {
    pub fn complete(&self) -> bool {
        self.user && self.nick && self.pass
    }
}

/// Capabilities the client actually requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub message_tags: bool,
    pub multi_prefix: bool,
}

/// A channel the client has joined, as the IRC side sees it.
#[derive(Debug, Clone)]
pub struct IrcChannel {
    pub id: ChannelId,
    pub name: String,
    pub is_voice: bool,
}

impl IrcChannel {
    pub fn irc_name(&self) -> String {
        if self.is_voice {
            format!("&{}", self.id)
        } else {
            format!("#{}", self.name)
        }
    }
}

/// Mutable session state shared between the socket loop, the command
/// handlers and the event translator.
pub struct BridgeState {
    pub handshake: RwLock<HandshakeFlags>,
    /// Set by CAP LS/REQ, cleared by CAP END; while held, registration
    /// cannot complete.
    pub cap_locked: AtomicBool,
    pub caps: RwLock<Capabilities>,

    /// The nick the client registered with.
    pub nick: RwLock<String>,
    pub user_modes: Mutex<String>,

    /// Channels the client is currently in, keyed by platform id.
    pub joined: DashMap<ChannelId, IrcChannel>,
    /// IRC nick -> platform id, filled lazily as users are seen.
    pub nicks: DashMap<String, UserId>,
    /// In-progress EMBED builders, one per channel.
    pub embeds: DashMap<ChannelId, EmbedBuilder>,

    pub bans: BanCache,
}

impl BridgeState {
    pub fn new(bans: BanCache) -> Self {
        BridgeState {
            handshake: RwLock::new(HandshakeFlags::default()),
            cap_locked: AtomicBool::new(false),
            caps: RwLock::new(Capabilities::default()),
            nick: RwLock::new(String::new()),
            user_modes: Mutex::new(String::new()),
            joined: DashMap::new(),
            nicks: DashMap::new(),
            embeds: DashMap::new(),
            bans,
        }
    }

    pub fn nick(&self) -> String {
        self.nick.read().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn set_nick(&self, nick: &str) {
        if let Ok(mut n) = self.nick.write() {
            *n = nick.to_owned();
        }
    }

    pub fn cap_locked(&self) -> bool {
        self.cap_locked.load(Ordering::SeqCst)
    }

    pub fn set_cap_locked(&self, locked: bool) {
        self.cap_locked.store(locked, Ordering::SeqCst);
    }

    pub fn handshake(&self) -> HandshakeFlags {
        self.handshake.read().map(|h| *h).unwrap_or_default()
    }

    pub fn update_handshake(&self, f: impl FnOnce(&mut HandshakeFlags)) {
        if let Ok(mut h) = self.handshake.write() {
            f(&mut h);
        }
    }

    pub fn caps(&self) -> Capabilities {
        self.caps.read().map(|c| *c).unwrap_or_default()
    }

    pub fn update_caps(&self, f: impl FnOnce(&mut Capabilities)) {
        if let Ok(mut c) = self.caps.write() {
            f(&mut c);
        }
    }

    /// Joined-channel lookup by the name the client used (`#name` or
    /// `&id`).
    pub fn channel_by_irc_name(&self, name: &str) -> Option<IrcChannel> {
        self.joined
            .iter()
            .find(|entry| entry.value().irc_name().eq_ignore_ascii_case(name))
            .map(|entry| entry.value().clone())
    }

    /// Reverse nick lookup against the lazily filled map.
    pub fn user_id_by_nick(&self, nick: &str) -> Option<UserId> {
        self.nicks.get(nick).map(|entry| *entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_flags() {
        let state = BridgeState::new(BanCache::in_memory());
        assert!(!state.handshake().complete());
        state.update_handshake(|h| {
            h.user = true;
            h.nick = true;
        });
        assert!(!state.handshake().complete());
        state.update_handshake(|h| h.pass = true);
        assert!(state.handshake().complete());
    }

    #[test]
    fn test_channel_lookup_by_irc_name() {
        let state = BridgeState::new(BanCache::in_memory());
        state.joined.insert(
            7,
            IrcChannel {
                id: 7,
                name: "general".to_owned(),
                is_voice: false,
            },
        );
        state.joined.insert(
            8,
            IrcChannel {
                id: 8,
                name: "Lounge".to_owned(),
                is_voice: true,
            },
        );

        assert_eq!(state.channel_by_irc_name("#general").map(|c| c.id), Some(7));
        assert_eq!(state.channel_by_irc_name("#GENERAL").map(|c| c.id), Some(7));
        // voice channels are addressed by id, not name
        assert_eq!(state.channel_by_irc_name("&8").map(|c| c.id), Some(8));
        assert!(state.channel_by_irc_name("#lounge").is_none());
        assert!(state.channel_by_irc_name("#missing").is_none());
    }
}
