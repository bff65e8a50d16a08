//! JOIN, PART, TOPIC, MODE and KICK.

use crate::address;
use crate::bridge::Bridge;
use crate::constants::*;
use crate::gateway::{ChannelEdit, ChannelKind, Gateway};
use crate::message::IrcMessage;
use crate::state::IrcChannel;
use crate::types::ChannelId;

const BITRATE_MIN: u32 = 8000;
const BITRATE_MAX: u32 = 96000;

impl Bridge {
    pub(crate) async fn cmd_join(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        for target in msg.params[0].split(',') {
            self.join_one(target).await;
        }
    }

    async fn join_one(&self, target: &str) {
        let channel = if let Some(name) = target.strip_prefix('#') {
            self.gateway()
                .channels()
                .await
                .into_iter()
                .find(|c| c.is_text() && c.name.eq_ignore_ascii_case(name))
        } else if let Some(id) = target.strip_prefix('&') {
            match id.parse::<ChannelId>() {
                Ok(id) => self
                    .gateway()
                    .channel(id)
                    .await
                    .filter(|c| c.is_voice()),
                Err(_) => None,
            }
        } else {
            self.send_numeric(ERR_BADCHANNAME, &format!("{target} :Illegal channel name"));
            return;
        };
        let Some(channel) = channel else {
            self.send_numeric(ERR_NOSUCHCHANNEL, &format!("{target} :No such channel"));
            return;
        };

        let joined = IrcChannel {
            id: channel.id,
            name: channel.name.clone(),
            is_voice: channel.is_voice(),
        };
        let irc_name = joined.irc_name();
        if self.state().joined.contains_key(&channel.id) {
            return;
        }
        self.state().joined.insert(channel.id, joined.clone());

        let nick = self.nick();
        let id = self.gateway().current_user_id();
        self.server()
            .enqueue(format!(":{nick}!{id}@{USER_HOST} JOIN {irc_name}"));
        self.send_channel_intro(&joined).await;
    }

    pub(crate) async fn cmd_part(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        for target in msg.params[0].split(',') {
            // parting a channel we never joined is silently fine
            let Some(channel) = self.state().channel_by_irc_name(target) else {
                continue;
            };
            self.state().joined.remove(&channel.id);
            let nick = self.nick();
            let id = self.gateway().current_user_id();
            self.server().enqueue(format!(
                ":{nick}!{id}@{USER_HOST} PART {}",
                channel.irc_name()
            ));
        }
    }

    pub(crate) async fn cmd_topic(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        let target = msg.params[0].clone();
        let Some(channel) = self.state().channel_by_irc_name(&target) else {
            self.send_numeric(ERR_NOTONCHANNEL, &format!("{target} :You're not on that channel"));
            return;
        };
        if msg.params.len() == 1 {
            let topic = self
                .gateway()
                .channel(channel.id)
                .await
                .and_then(|c| c.topic().map(str::to_owned));
            match topic {
                Some(topic) => self.send_numeric(RPL_TOPIC, &format!("{target} :{topic}")),
                None => self.send_numeric(RPL_NOTOPIC, &format!("{target} :No topic is set")),
            }
            return;
        }
        if !self.require_manage_channels(&target).await {
            return;
        }
        let topic = msg.params[1].clone();
        let edit = ChannelEdit {
            topic: Some(topic.clone()),
            ..ChannelEdit::default()
        };
        if let Err(e) = self.gateway().modify_channel(channel.id, edit).await {
            log::warn!("TOPIC failed: {e}");
            return;
        }
        let nick = self.nick();
        self.server()
            .enqueue(format!(":{nick} TOPIC {target} :{topic}"));
    }

    pub(crate) async fn cmd_kick(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 2) {
            return;
        }
        let target = msg.params[0].clone();
        let victim = msg.params[1].clone();
        let reason = msg.params.get(2).cloned().unwrap_or_else(|| victim.clone());

        let Some(channel) = self.state().channel_by_irc_name(&target) else {
            self.send_numeric(ERR_NOSUCHCHANNEL, &format!("{target} :No such channel"));
            return;
        };
        let Some(user_id) = self.user_id_by_nick(&victim).await else {
            self.send_numeric(ERR_NOSUCHNICK, &format!("{victim} :No such nick/channel"));
            return;
        };

        if self.config().fake_kick {
            let nick = self.nick();
            let prefix = self.user_prefix(user_id).await;
            self.server()
                .enqueue(format!(":{nick} KICK {target} {victim} :{reason}"));
            self.server().enqueue(format!(":{prefix} JOIN {target}"));
            return;
        }

        let perms = self
            .gateway()
            .guild_permissions(self.gateway().current_user_id())
            .await;
        let result = if channel.is_voice {
            if !perms.move_members {
                self.send_numeric(
                    ERR_CHANOPRIVSNEEDED,
                    &format!("{target} :You're not channel operator"),
                );
                return;
            }
            self.gateway().disconnect_voice(user_id).await
        } else {
            if !perms.kick_members {
                self.send_numeric(
                    ERR_CHANOPRIVSNEEDED,
                    &format!("{target} :You're not channel operator"),
                );
                return;
            }
            self.gateway().kick_member(user_id).await
        };
        match result {
            Ok(()) => {
                let nick = self.nick();
                self.server()
                    .enqueue(format!(":{nick} KICK {target} {victim} :{reason}"));
            }
            Err(e) => log::warn!("KICK failed: {e}"),
        }
    }

    // ---- MODE --------------------------------------------------------------

    pub(crate) async fn cmd_mode(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        let target = msg.params[0].clone();

        if !target.starts_with('#') && !target.starts_with('&') {
            if msg.params.len() == 1 {
                let modes = self
                    .state()
                    .user_modes
                    .lock()
                    .map(|m| m.clone())
                    .unwrap_or_default();
                self.send_numeric(RPL_UMODEIS, &format!("+{modes}"));
            } else {
                self.send_numeric(ERR_UMODEUNKNOWNFLAG, ":Unknown MODE flag");
            }
            return;
        }

        let Some(channel) = self.state().channel_by_irc_name(&target) else {
            self.send_numeric(ERR_NOSUCHCHANNEL, &format!("{target} :No such channel"));
            return;
        };

        if msg.params.len() == 1 {
            self.send_channel_modes(&channel, &target).await;
            return;
        }

        let modestring = msg.params[1].clone();
        if modestring == "+b" && msg.params.len() == 2 {
            self.send_ban_list(&target).await;
            return;
        }

        self.apply_channel_modes(&channel, &target, &modestring, &msg.params[2..])
            .await;
    }

    async fn send_channel_modes(&self, channel: &IrcChannel, target: &str) {
        let mut letters = String::new();
        let mut args: Vec<String> = Vec::new();
        if let Some(platform) = self.gateway().channel(channel.id).await {
            match platform.kind {
                ChannelKind::Text { slowmode_secs, nsfw, .. } => {
                    if slowmode_secs > 0 {
                        letters.push('Z');
                        args.push(slowmode_secs.to_string());
                    }
                    if nsfw {
                        letters.push('X');
                    }
                }
                ChannelKind::Voice { bitrate, user_limit } => {
                    letters.push('B');
                    args.push(bitrate.to_string());
                    if user_limit > 0 {
                        letters.push('l');
                        args.push(user_limit.to_string());
                    }
                }
                ChannelKind::Category => {}
            }
        }
        let mut tail = format!("{target} +{letters}");
        if !args.is_empty() {
            tail.push(' ');
            tail.push_str(&args.join(" "));
        }
        self.send_numeric(RPL_CHANNELMODEIS, &tail);
    }

    async fn send_ban_list(&self, target: &str) {
        let mut ids = self.state().bans.snapshot();
        if self.config().banned_role.is_none() {
            match self.gateway().ban_list().await {
                Ok(platform) => {
                    for id in platform {
                        if !ids.contains(&id) {
                            // backfill so later -b works offline
                            self.state().bans.insert(id);
                            ids.push(id);
                        }
                    }
                }
                Err(e) => log::warn!("ban list fetch failed: {e}"),
            }
        }
        for id in ids {
            self.send_numeric(
                RPL_BANLIST,
                &format!("{target} {}", address::ban_mask(id)),
            );
        }
        self.send_numeric(RPL_ENDOFBANLIST, &format!("{target} :End of channel ban list"));
    }

    async fn apply_channel_modes(
        &self,
        channel: &IrcChannel,
        target: &str,
        modestring: &str,
        args: &[String],
    ) {
        let mut adding = true;
        let mut next_arg = 0;
        let mut applied = String::new();
        let mut applied_args: Vec<String> = Vec::new();
        let mut applied_sign = ' ';

        for mode in modestring.chars() {
            match mode {
                '+' => adding = true,
                '-' => adding = false,
                'b' => {
                    let Some(mask) = args.get(next_arg) else {
                        continue;
                    };
                    next_arg += 1;
                    if self.apply_ban(mask, adding).await {
                        push_mode(&mut applied, &mut applied_sign, adding, 'b');
                        applied_args.push(mask.clone());
                    }
                }
                'Z' if !channel.is_voice => {
                    let secs = if adding {
                        let Some(arg) = args.get(next_arg) else {
                            continue;
                        };
                        next_arg += 1;
                        match arg.parse::<u32>() {
                            Ok(s) => s,
                            Err(_) => continue,
                        }
                    } else {
                        0
                    };
                    if !self.require_manage_channels(target).await {
                        return;
                    }
                    let edit = ChannelEdit {
                        slowmode_secs: Some(secs),
                        ..ChannelEdit::default()
                    };
                    if self.gateway().modify_channel(channel.id, edit).await.is_ok() {
                        push_mode(&mut applied, &mut applied_sign, adding, 'Z');
                        if adding {
                            applied_args.push(secs.to_string());
                        }
                    }
                }
                'X' if !channel.is_voice => {
                    if !self.require_manage_channels(target).await {
                        return;
                    }
                    let edit = ChannelEdit {
                        nsfw: Some(adding),
                        ..ChannelEdit::default()
                    };
                    if self.gateway().modify_channel(channel.id, edit).await.is_ok() {
                        push_mode(&mut applied, &mut applied_sign, adding, 'X');
                    }
                }
                'B' if channel.is_voice && adding => {
                    let Some(arg) = args.get(next_arg) else {
                        continue;
                    };
                    next_arg += 1;
                    let Ok(rate) = arg.parse::<u32>() else {
                        continue;
                    };
                    let rate = rate.clamp(BITRATE_MIN, BITRATE_MAX);
                    if !self.require_manage_channels(target).await {
                        return;
                    }
                    let edit = ChannelEdit {
                        bitrate: Some(rate),
                        ..ChannelEdit::default()
                    };
                    if self.gateway().modify_channel(channel.id, edit).await.is_ok() {
                        push_mode(&mut applied, &mut applied_sign, adding, 'B');
                        applied_args.push(rate.to_string());
                    }
                }
                'l' if channel.is_voice => {
                    let limit = if adding {
                        let Some(arg) = args.get(next_arg) else {
                            continue;
                        };
                        next_arg += 1;
                        match arg.parse::<u32>() {
                            Ok(l) if l > 0 => l,
                            _ => continue,
                        }
                    } else {
                        0
                    };
                    if !self.require_manage_channels(target).await {
                        return;
                    }
                    let edit = ChannelEdit {
                        user_limit: Some(limit),
                        ..ChannelEdit::default()
                    };
                    if self.gateway().modify_channel(channel.id, edit).await.is_ok() {
                        push_mode(&mut applied, &mut applied_sign, adding, 'l');
                        if adding {
                            applied_args.push(limit.to_string());
                        }
                    }
                }
                other => log::debug!("ignoring mode {other} on {target}"),
            }
        }

        if applied.is_empty() {
            return;
        }
        let nick = self.nick();
        let mut line = format!(":{nick} MODE {target} {applied}");
        if !applied_args.is_empty() {
            line.push(' ');
            line.push_str(&applied_args.join(" "));
        }
        self.server().enqueue(line);
    }

    /// Applies a ban mask. With a banned role configured this assigns
    /// or removes that role; otherwise it is a platform ban.
    async fn apply_ban(&self, mask: &str, adding: bool) -> bool {
        let Some(user_id) = address::user_id_from_mask(mask) else {
            self.send_numeric(ERR_NOSUCHNICK, &format!("{mask} :No such nick/channel"));
            return false;
        };
        let me = self.gateway().current_user_id();
        let perms = self.gateway().guild_permissions(me).await;

        if let Some(role_id) = self.config().banned_role {
            if !perms.manage_roles {
                self.send_numeric(
                    ERR_CHANOPRIVSNEEDED,
                    &format!("{mask} :You're not channel operator"),
                );
                return false;
            }
            if self.gateway().role(role_id).await.is_none() {
                self.send_numeric(
                    ERR_UNKNOWNERROR,
                    &format!("MODE :Banned role {role_id} does not exist"),
                );
                return false;
            }
            let result = if adding {
                self.gateway().add_role(user_id, role_id).await
            } else {
                self.gateway().remove_role(user_id, role_id).await
            };
            if let Err(e) = result {
                log::warn!("ban role change failed: {e}");
                return false;
            }
        } else {
            if !perms.ban_members {
                self.send_numeric(
                    ERR_CHANOPRIVSNEEDED,
                    &format!("{mask} :You're not channel operator"),
                );
                return false;
            }
            let result = if adding {
                self.gateway().ban_member(user_id).await
            } else {
                self.gateway().unban_member(user_id).await
            };
            if let Err(e) = result {
                log::warn!("ban change failed: {e}");
                return false;
            }
        }

        if adding {
            self.state().bans.insert(user_id);
        } else {
            self.state().bans.remove(user_id);
        }
        true
    }

    async fn require_manage_channels(&self, target: &str) -> bool {
        let me = self.gateway().current_user_id();
        if self.gateway().guild_permissions(me).await.manage_channels {
            return true;
        }
        self.send_numeric(
            ERR_CHANOPRIVSNEEDED,
            &format!("{target} :You're not channel operator"),
        );
        false
    }
}

fn push_mode(applied: &mut String, current_sign: &mut char, adding: bool, mode: char) {
    let sign = if adding { '+' } else { '-' };
    if *current_sign != sign {
        applied.push(sign);
        *current_sign = sign;
    }
    applied.push(mode);
}
