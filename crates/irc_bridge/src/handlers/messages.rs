//! PRIVMSG, EDITMSG, TAGMSG and the bridge-specific ROLE, SETNICK and
//! EMBED commands.

use crate::bridge::Bridge;
use crate::constants::*;
use crate::gateway::{Gateway, Role};
use crate::message::IrcMessage;
use crate::state::IrcChannel;
use crate::types::{MessageId, RoleId, UserId};

const ROLES_PER_LINE: usize = 15;

impl Bridge {
    pub(crate) async fn cmd_privmsg(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 2) {
            return;
        }
        let target = msg.params[0].clone();
        let text = msg.params[1].clone();

        if target.starts_with('&') {
            self.send_numeric(
                ERR_CANNOTSENDTOCHAN,
                &format!("{target} :Cannot send to channel"),
            );
            return;
        }

        if target.starts_with('#') {
            let Some(channel) = self.state().channel_by_irc_name(&target) else {
                self.send_numeric(
                    ERR_NOTONCHANNEL,
                    &format!("{target} :You're not on that channel"),
                );
                return;
            };
            let me = self.gateway().current_user_id();
            if !self
                .gateway()
                .channel_permissions(me, channel.id)
                .await
                .send_messages
            {
                self.send_numeric(
                    ERR_CANNOTSENDTOCHAN,
                    &format!("{target} :Cannot send to channel"),
                );
                return;
            }
            let content = self.outgoing_body(&text).await;
            if let Err(e) = self
                .gateway()
                .send_message(channel.id, Some(&content), None)
                .await
            {
                log::warn!("PRIVMSG to {target} failed: {e}");
            }
            return;
        }

        // anything else is a direct message to a nick
        let Some(user_id) = self.user_id_by_nick(&target).await else {
            self.send_numeric(ERR_NOSUCHNICK, &format!("{target} :No such nick/channel"));
            return;
        };
        let content = self.outgoing_body(&text).await;
        if let Err(e) = self.gateway().send_direct_message(user_id, &content).await {
            log::warn!("direct message to {target} failed: {e}");
        }
    }

    /// ACTION unwrapping, mention rewriting and the platform length
    /// cap, shared by PRIVMSG and EDITMSG.
    async fn outgoing_body(&self, text: &str) -> String {
        let text = action_to_emote(text);
        let text = self.rewrite_outgoing_mentions(&text).await;
        if text.chars().count() > MAX_MESSAGE_CHARS {
            text.chars().take(MAX_MESSAGE_CHARS).collect()
        } else {
            text
        }
    }

    pub(crate) async fn cmd_editmsg(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 2) {
            return;
        }
        let target = msg.params[0].clone();
        let Some(message_id) = msg.tag("+reply").and_then(|v| v.parse::<MessageId>().ok())
        else {
            let line = self.server_line(&format!(
                "FAIL EDITMSG EDIT_FAIL {target} :Missing or invalid +reply tag"
            ));
            self.server().enqueue(line);
            return;
        };
        let Some(channel) = self.state().channel_by_irc_name(&target) else {
            self.send_numeric(
                ERR_NOTONCHANNEL,
                &format!("{target} :You're not on that channel"),
            );
            return;
        };

        let me = self.gateway().current_user_id();
        if let Some(author) = self.gateway().message_author(channel.id, message_id).await {
            if author != me {
                self.send_numeric(
                    ERR_UNKNOWNERROR,
                    "EDITMSG :Cannot edit another user's message",
                );
                return;
            }
        }
        let content = self.outgoing_body(&msg.params[1]).await;
        if let Err(e) = self
            .gateway()
            .edit_message(channel.id, message_id, &content)
            .await
        {
            log::warn!("EDITMSG in {target} failed: {e}");
        }
    }

    pub(crate) async fn cmd_tagmsg(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        let target = msg.params[0].clone();
        let Some(channel) = self.state().channel_by_irc_name(&target) else {
            self.send_numeric(
                ERR_NOTONCHANNEL,
                &format!("{target} :You're not on that channel"),
            );
            return;
        };

        if let Some(id) = msg
            .tag("+discord.com/delete")
            .and_then(|v| v.parse::<MessageId>().ok())
        {
            self.delete_message(&channel, &target, id).await;
            return;
        }

        let Some(message_id) = msg.tag("+reply").and_then(|v| v.parse::<MessageId>().ok())
        else {
            return;
        };
        if let Some(emote) = msg.tag("+discord.com/react-add") {
            self.react(&channel, message_id, emote, None, &target).await;
        } else if let Some(emote) = msg.tag("+discord.com/react-remove") {
            let victim = msg.tag("discord.com/user").map(str::to_owned);
            self.react(&channel, message_id, emote, Some(victim), &target)
                .await;
        }
    }

    async fn delete_message(&self, channel: &IrcChannel, target: &str, id: MessageId) {
        let me = self.gateway().current_user_id();
        let author = self.gateway().message_author(channel.id, id).await;
        if author != Some(me) {
            let perms = self.gateway().guild_permissions(me).await;
            if !perms.manage_messages {
                self.send_numeric(
                    ERR_CHANOPRIVSNEEDED,
                    &format!("{target} :You're not channel operator"),
                );
                return;
            }
        }
        if let Err(e) = self.gateway().delete_message(channel.id, id).await {
            log::warn!("delete in {target} failed: {e}");
        }
    }

    /// Reaction add (`victim` is `None`) or remove. The `discord.com/user`
    /// tag names the reacting user by platform id; removing another
    /// user's reaction needs the message-management permission.
    async fn react(
        &self,
        channel: &IrcChannel,
        message_id: MessageId,
        emote: &str,
        victim: Option<Option<String>>,
        target: &str,
    ) {
        let Some(resolved) = self.gateway().resolve_emote(emote).await else {
            self.send_numeric(ERR_UNKNOWNERROR, &format!("TAGMSG :Unknown emote {emote}"));
            return;
        };
        let me = self.gateway().current_user_id();

        let Some(victim) = victim else {
            if let Err(e) = self
                .gateway()
                .add_reaction(channel.id, message_id, &resolved)
                .await
            {
                log::warn!("reaction in {target} failed: {e}");
            }
            return;
        };

        let victim_id = match victim {
            Some(raw) => match raw.parse::<UserId>() {
                Ok(id) => id,
                Err(_) => {
                    self.send_numeric(ERR_NOSUCHNICK, &format!("{raw} :No such nick/channel"));
                    return;
                }
            },
            None => me,
        };
        if victim_id != me {
            let perms = self.gateway().guild_permissions(me).await;
            if !perms.manage_messages {
                self.send_numeric(
                    ERR_CHANOPRIVSNEEDED,
                    &format!("{target} :You're not channel operator"),
                );
                return;
            }
        }
        if let Err(e) = self
            .gateway()
            .remove_reaction(channel.id, message_id, victim_id, &resolved)
            .await
        {
            log::warn!("reaction removal in {target} failed: {e}");
        }
    }

    // ---- ROLE --------------------------------------------------------------

    pub(crate) async fn cmd_role(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        match msg.params[0].to_uppercase().as_str() {
            "LS" => match msg.params.get(1) {
                Some(nick) => self.role_ls_user(nick.clone()).await,
                None => self.role_ls_all().await,
            },
            "ADD" => self.role_change(&msg, true).await,
            "REMOVE" => self.role_change(&msg, false).await,
            other => {
                let line = self.server_line(&format!(
                    "FAIL ROLE ROLE_FAIL * {other} :Unknown subcommand"
                ));
                self.server().enqueue(line);
            }
        }
    }

    async fn role_ls_all(&self) {
        for role in self.gateway().roles().await {
            let line = self.server_line(&format!(
                "NOTE ROLE ROLE_LS_ENTRY * LS :{}={}",
                role.name, role.id
            ));
            self.server().enqueue(line);
        }
        let line = self.server_line("NOTE ROLE ROLE_LS_END * LS :End of role list");
        self.server().enqueue(line);
    }

    async fn role_ls_user(&self, nick: String) {
        let Some(user_id) = self.user_id_by_nick(&nick).await else {
            let line =
                self.server_line(&format!("FAIL ROLE ROLE_FAIL {nick} LS :No such user"));
            self.server().enqueue(line);
            return;
        };
        let Some(member) = self.gateway().member(user_id).await else {
            let line =
                self.server_line(&format!("FAIL ROLE ROLE_FAIL {nick} LS :No such user"));
            self.server().enqueue(line);
            return;
        };
        let roles = self.gateway().roles().await;
        let entries: Vec<String> = member
            .role_ids
            .iter()
            .filter_map(|id| roles.iter().find(|r| r.id == *id))
            .map(|r| format!("{}={}", r.name, r.id))
            .collect();
        for chunk in entries.chunks(ROLES_PER_LINE) {
            let line = self.server_line(&format!(
                "NOTE ROLE ROLE_LS {nick} LS :{}",
                chunk.join(" ")
            ));
            self.server().enqueue(line);
        }
        let line = self.server_line(&format!("NOTE ROLE ROLE_LS_END {nick} LS :End of role list"));
        self.server().enqueue(line);
    }

    async fn role_change(&self, msg: &IrcMessage, adding: bool) {
        let sub = if adding { "ADD" } else { "REMOVE" };
        if !self.need_params(msg, 3) {
            return;
        }
        let nick = msg.params[1].clone();
        let role_arg = msg.params[2].clone();

        let me = self.gateway().current_user_id();
        if !self.gateway().guild_permissions(me).await.manage_roles {
            let line = self.server_line(&format!(
                "FAIL ROLE ROLE_FAIL {nick} {sub} :Missing role-management permission"
            ));
            self.server().enqueue(line);
            return;
        }
        let Some(user_id) = self.user_id_by_nick(&nick).await else {
            let line =
                self.server_line(&format!("FAIL ROLE ROLE_FAIL {nick} {sub} :No such user"));
            self.server().enqueue(line);
            return;
        };
        let Some(role) = self.resolve_role(&role_arg).await else {
            let line = self.server_line(&format!(
                "FAIL ROLE ROLE_FAIL {nick} {sub} :No such role {role_arg}"
            ));
            self.server().enqueue(line);
            return;
        };

        let result = if adding {
            self.gateway().add_role(user_id, role.id).await
        } else {
            self.gateway().remove_role(user_id, role.id).await
        };
        match result {
            Ok(()) => {
                let code = if adding { "ROLE_ADD" } else { "ROLE_REMOVE" };
                let line = self.server_line(&format!(
                    "NOTE ROLE {code} {nick} {sub} :{}={}",
                    role.name, role.id
                ));
                self.server().enqueue(line);
            }
            Err(e) => {
                let line =
                    self.server_line(&format!("FAIL ROLE ROLE_FAIL {nick} {sub} :{e}"));
                self.server().enqueue(line);
            }
        }
    }

    /// Roles are addressed by id or by case-insensitive name.
    async fn resolve_role(&self, arg: &str) -> Option<Role> {
        if let Ok(id) = arg.parse::<RoleId>() {
            if let Some(role) = self.gateway().role(id).await {
                return Some(role);
            }
        }
        self.gateway()
            .roles()
            .await
            .into_iter()
            .find(|r| r.name.eq_ignore_ascii_case(arg))
    }

    // ---- SETNICK -----------------------------------------------------------

    pub(crate) async fn cmd_setnick(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        let target = msg.params[0].clone();
        // no second parameter clears the server nickname
        let new_nick = msg.params.get(1).cloned();

        let Some(user_id) = self.user_id_by_nick(&target).await else {
            let line =
                self.server_line(&format!("FAIL SETNICK SETNICK_FAIL {target} :No such user"));
            self.server().enqueue(line);
            return;
        };
        let me = self.gateway().current_user_id();
        if user_id != me && !self.gateway().guild_permissions(me).await.manage_nicknames {
            let line = self.server_line(&format!(
                "FAIL SETNICK SETNICK_FAIL {target} :Missing nickname-management permission"
            ));
            self.server().enqueue(line);
            return;
        }
        match self
            .gateway()
            .set_nickname(user_id, new_nick.as_deref())
            .await
        {
            Ok(()) => {
                let line = self
                    .server_line(&format!("NOTE SETNICK SETNICK_OK {target} :Nickname updated"));
                self.server().enqueue(line);
            }
            Err(e) => {
                let line =
                    self.server_line(&format!("FAIL SETNICK SETNICK_FAIL {target} :{e}"));
                self.server().enqueue(line);
            }
        }
    }

    // ---- EMBED -------------------------------------------------------------

    pub(crate) async fn cmd_embed(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 2) {
            return;
        }
        let target = msg.params[0].clone();
        let sub = msg.params[1].to_uppercase();
        let Some(channel) = self.state().channel_by_irc_name(&target) else {
            self.send_numeric(
                ERR_NOTONCHANNEL,
                &format!("{target} :You're not on that channel"),
            );
            return;
        };
        if channel.is_voice {
            self.send_numeric(
                ERR_CANNOTSENDTOCHAN,
                &format!("{target} :Cannot send to channel"),
            );
            return;
        }

        match sub.as_str() {
            "END" => self.embed_end(&channel, &target).await,
            "COLOR" => {
                if !self.need_params(&msg, 5) {
                    return;
                }
                let parsed = (
                    msg.params[2].parse::<u8>(),
                    msg.params[3].parse::<u8>(),
                    msg.params[4].parse::<u8>(),
                );
                let (Ok(r), Ok(g), Ok(b)) = parsed else {
                    self.embed_fail(&target, "COLOR", "Components must be 0-255");
                    return;
                };
                self.state()
                    .embeds
                    .entry(channel.id)
                    .or_default()
                    .color(r, g, b);
            }
            "FIELD" => {
                if !self.need_params(&msg, 4) {
                    return;
                }
                let name = msg.params[2].clone();
                let inline = msg.params.len() >= 5 && msg.params[3] == "inline";
                let value = msg.params[msg.params.len() - 1].clone();
                self.state()
                    .embeds
                    .entry(channel.id)
                    .or_default()
                    .field(name, value, inline);
            }
            "AUTHOR" | "DESCRIPTION" | "FOOTER" | "IMAGE" | "THUMBNAIL" | "TIMESTAMP"
            | "TITLE" | "URL" => {
                if !self.need_params(&msg, 3) {
                    return;
                }
                let value = msg.params[2].clone();
                let mut entry = self.state().embeds.entry(channel.id).or_default();
                match sub.as_str() {
                    "AUTHOR" => entry.author(value),
                    "DESCRIPTION" => entry.description(value),
                    "FOOTER" => entry.footer(value),
                    "IMAGE" => entry.image(value),
                    "THUMBNAIL" => entry.thumbnail(value),
                    "TIMESTAMP" => entry.timestamp(value),
                    "TITLE" => entry.title(value),
                    "URL" => entry.url(value),
                    _ => {}
                }
            }
            other => self.embed_fail(&target, other, "Unknown subcommand"),
        }
    }

    async fn embed_end(&self, channel: &IrcChannel, target: &str) {
        let Some((_, builder)) = self.state().embeds.remove(&channel.id) else {
            self.embed_fail(target, "END", "No embed in progress");
            return;
        };
        if let Err(e) = self
            .gateway()
            .send_message(channel.id, None, Some(builder.build()))
            .await
        {
            self.embed_fail(target, "END", &e.to_string());
        }
    }

    fn embed_fail(&self, target: &str, sub: &str, message: &str) {
        let line =
            self.server_line(&format!("FAIL EMBED EMBED_FAIL {target} {sub} :{message}"));
        self.server().enqueue(line);
    }
}

/// CTCP ACTION becomes the platform's `_text_` italics idiom.
fn action_to_emote(text: &str) -> String {
    text.strip_prefix("\u{1}ACTION ")
        .and_then(|rest| rest.strip_suffix('\u{1}'))
        .map(|inner| format!("_{inner}_"))
        .unwrap_or_else(|| text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_to_emote() {
        assert_eq!(action_to_emote("\u{1}ACTION waves\u{1}"), "_waves_");
        assert_eq!(action_to_emote("plain text"), "plain text");
        assert_eq!(action_to_emote("\u{1}VERSION\u{1}"), "\u{1}VERSION\u{1}");
    }
}
