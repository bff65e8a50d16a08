//! Client command handlers and their dispatch table.

mod channels;
mod messages;
mod queries;
mod registration;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::bridge::Bridge;
use crate::constants::ERR_NEEDMOREPARAMS;
use crate::dispatch::{CommandRegistry, Handler, Visibility};
use crate::message::IrcMessage;

fn wrap<F, Fut>(bridge: &Arc<Bridge>, f: F) -> Handler
where
    F: Fn(Arc<Bridge>, IrcMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let bridge = bridge.clone();
    Arc::new(move |msg| -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(f(bridge.clone(), msg))
    })
}

impl Bridge {
    /// 461 unless the message carries at least `n` parameters.
    pub(crate) fn need_params(&self, msg: &IrcMessage, n: usize) -> bool {
        if msg.params.len() >= n {
            return true;
        }
        self.send_numeric(
            ERR_NEEDMOREPARAMS,
            &format!("{} :Not enough parameters", msg.command),
        );
        false
    }
}

/// Builds the full command table. Registration commands are reachable
/// before authentication, everything else only once registered.
pub fn register(bridge: &Arc<Bridge>) -> CommandRegistry {
    let mut registry = CommandRegistry::new();

    let pre_auth_only = Visibility {
        pre_auth: true,
        post_auth: false,
        post_caps: false,
    };
    let until_caps = Visibility {
        pre_auth: true,
        post_auth: true,
        post_caps: false,
    };

    registry.register("CAP", until_caps, wrap(bridge, |b, m| async move { b.cmd_cap(m).await }));
    registry.register("PASS", pre_auth_only, wrap(bridge, |b, m| async move { b.cmd_pass(m).await }));
    registry.register("USER", pre_auth_only, wrap(bridge, |b, m| async move { b.cmd_user(m).await }));
    registry.register("NICK", Visibility::ALL, wrap(bridge, |b, m| async move { b.cmd_nick(m).await }));
    registry.register("MOTD", Visibility::ALL, wrap(bridge, |b, m| async move { b.cmd_motd(m).await }));
    registry.register("LUSERS", Visibility::ALL, wrap(bridge, |b, m| async move { b.cmd_lusers(m).await }));
    registry.register("PING", Visibility::ALL, wrap(bridge, |b, m| async move { b.cmd_ping(m).await }));
    registry.register("PONG", Visibility::ALL, wrap(bridge, |b, m| async move { b.cmd_pong(m).await }));
    registry.register("QUIT", Visibility::ALL, wrap(bridge, |b, m| async move { b.cmd_quit(m).await }));

    let full = Visibility::POST_CAPS_ONLY;
    registry.register("JOIN", full, wrap(bridge, |b, m| async move { b.cmd_join(m).await }));
    registry.register("PART", full, wrap(bridge, |b, m| async move { b.cmd_part(m).await }));
    registry.register("MODE", full, wrap(bridge, |b, m| async move { b.cmd_mode(m).await }));
    registry.register("TOPIC", full, wrap(bridge, |b, m| async move { b.cmd_topic(m).await }));
    registry.register("KICK", full, wrap(bridge, |b, m| async move { b.cmd_kick(m).await }));
    registry.register("WHO", full, wrap(bridge, |b, m| async move { b.cmd_who(m).await }));
    registry.register("WHOIS", full, wrap(bridge, |b, m| async move { b.cmd_whois(m).await }));
    registry.register("USERHOST", full, wrap(bridge, |b, m| async move { b.cmd_userhost(m).await }));
    registry.register("NAMES", full, wrap(bridge, |b, m| async move { b.cmd_names(m).await }));
    registry.register("LIST", full, wrap(bridge, |b, m| async move { b.cmd_list(m).await }));
    registry.register("PRIVMSG", full, wrap(bridge, |b, m| async move { b.cmd_privmsg(m).await }));
    registry.register("EDITMSG", full, wrap(bridge, |b, m| async move { b.cmd_editmsg(m).await }));
    registry.register("TAGMSG", full, wrap(bridge, |b, m| async move { b.cmd_tagmsg(m).await }));
    registry.register("ROLE", full, wrap(bridge, |b, m| async move { b.cmd_role(m).await }));
    registry.register("SETNICK", full, wrap(bridge, |b, m| async move { b.cmd_setnick(m).await }));
    registry.register("EMBED", full, wrap(bridge, |b, m| async move { b.cmd_embed(m).await }));

    registry
}
