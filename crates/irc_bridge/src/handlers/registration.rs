//! CAP negotiation and the NICK/USER/PASS handshake.

use crate::bridge::Bridge;
use crate::constants::USER_HOST;
use crate::gateway::Gateway;
use crate::message::IrcMessage;
use crate::types::UserId;

/// Advertised in CAP LS. away-notify is advertised but never granted.
const ADVERTISED_CAPS: [&str; 3] = ["message-tags", "away-notify", "multi-prefix"];

/// Capabilities a REQ can actually obtain.
const ACCEPTED_CAPS: [&str; 2] = ["message-tags", "multi-prefix"];

impl Bridge {
    pub(crate) async fn cmd_cap(&self, msg: IrcMessage) {
        let Some(sub) = msg.params.first() else {
            return;
        };
        match sub.to_uppercase().as_str() {
            "LS" => {
                // negotiation holds the welcome burst back until END
                self.state().set_cap_locked(true);
                let line = self.server_line(&format!("CAP * LS :{}", ADVERTISED_CAPS.join(" ")));
                self.server().enqueue_priority(line);
            }
            "REQ" => {
                self.state().set_cap_locked(true);
                let requested = msg.params.get(1).cloned().unwrap_or_default();
                let mut ack = String::new();
                let mut nak = String::new();
                for cap in requested.split_whitespace() {
                    if ACCEPTED_CAPS.contains(&cap) {
                        self.enable_cap(cap);
                        ack.push_str(cap);
                        ack.push(' ');
                    } else {
                        nak.push_str(cap);
                        nak.push(' ');
                    }
                }
                if !ack.is_empty() {
                    let line = self.server_line(&format!("CAP * ACK :{ack}"));
                    self.server().enqueue_priority(line);
                }
                if !nak.is_empty() {
                    let line = self.server_line(&format!("CAP * NAK :{nak}"));
                    self.server().enqueue_priority(line);
                }
            }
            "END" => {
                self.state().set_cap_locked(false);
                self.state().update_handshake(|h| h.caps = true);
                self.check_handshake().await;
            }
            "LIST" => {
                let caps = self.state().caps();
                let mut enabled = Vec::new();
                if caps.message_tags {
                    enabled.push("message-tags");
                }
                if caps.multi_prefix {
                    enabled.push("multi-prefix");
                }
                let line = self.server_line(&format!("CAP * LIST :{}", enabled.join(" ")));
                self.server().enqueue_priority(line);
            }
            other => log::debug!("ignoring CAP {other}"),
        }
    }

    fn enable_cap(&self, cap: &str) {
        self.state().update_caps(|c| match cap {
            "message-tags" => c.message_tags = true,
            "multi-prefix" => c.multi_prefix = true,
            _ => {}
        });
    }

    /// PASS carries the guild id the session should attach to; an
    /// unknown guild is fatal to the connection.
    pub(crate) async fn cmd_pass(&self, msg: IrcMessage) {
        let guild = msg.params.first().and_then(|p| p.parse().ok());
        let selected = match guild {
            Some(guild) => self.gateway().select_guild(guild).await,
            None => false,
        };
        if !selected {
            log::error!("PASS named an unknown guild, closing connection");
            self.server()
                .enqueue_priority("ERROR :Unknown community".to_owned());
            self.server().stop();
            return;
        }
        self.bootstrap_bans().await;
        self.state().update_handshake(|h| h.pass = true);
        self.check_handshake().await;
    }

    /// Seeds the ban cache from members currently carrying the banned
    /// role and drops cached ids that no longer do.
    async fn bootstrap_bans(&self) {
        let Some(role) = self.config().banned_role else {
            return;
        };
        let held: Vec<UserId> = self
            .gateway()
            .members()
            .await
            .into_iter()
            .filter(|m| m.role_ids.contains(&role))
            .map(|m| m.id)
            .collect();
        for id in self.state().bans.snapshot() {
            if !held.contains(&id) {
                self.state().bans.remove(id);
            }
        }
        for id in held {
            self.state().bans.insert(id);
        }
    }

    pub(crate) async fn cmd_user(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        self.state().update_handshake(|h| h.user = true);
        self.check_handshake().await;
    }

    pub(crate) async fn cmd_nick(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        let new_nick = msg.params[0].clone();
        let old_nick = self.state().nick();
        self.state().set_nick(&new_nick);

        if self.ready() && !old_nick.is_empty() && old_nick != new_nick {
            let id = self.gateway().current_user_id();
            if let Err(e) = self.gateway().set_nickname(id, Some(&new_nick)).await {
                log::warn!("could not set own nickname: {e}");
            }
            self.server()
                .enqueue(format!(":{old_nick}!{id}@{USER_HOST} NICK {new_nick}"));
            return;
        }
        self.state().update_handshake(|h| h.nick = true);
        self.check_handshake().await;
    }

    pub(crate) async fn cmd_motd(&self, _msg: IrcMessage) {
        self.send_motd();
    }

    pub(crate) async fn cmd_lusers(&self, _msg: IrcMessage) {
        self.send_lusers().await;
    }

    pub(crate) async fn cmd_ping(&self, msg: IrcMessage) {
        let host = self.server().hostname().to_owned();
        let token = msg.params.first().cloned().unwrap_or_else(|| host.clone());
        self.server()
            .enqueue_priority(format!(":{host} PONG {host} :{token}"));
    }

    pub(crate) async fn cmd_pong(&self, _msg: IrcMessage) {
        self.server().touch();
    }

    pub(crate) async fn cmd_quit(&self, _msg: IrcMessage) {
        log::info!("client quit");
        self.server().stop();
    }
}
