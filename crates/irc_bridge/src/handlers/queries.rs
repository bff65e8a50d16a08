//! WHO, WHOIS, USERHOST, NAMES and LIST.

use std::sync::OnceLock;

use regex::Regex;

use crate::address;
use crate::bridge::Bridge;
use crate::constants::*;
use crate::gateway::{Gateway, Member, Presence};
use crate::message::IrcMessage;

impl Bridge {
    pub(crate) async fn cmd_who(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        let mask = msg.params[0].clone();

        if let Some(channel) = self.state().channel_by_irc_name(&mask) {
            let irc_name = channel.irc_name();
            for member in self.channel_members(channel.id).await {
                self.send_who_reply(&irc_name, &member, channel.id).await;
            }
            self.send_numeric(RPL_ENDOFWHO, &format!("{mask} :End of WHO list"));
            return;
        }

        // WHO <mask> matches `nick` or `nick!user@host` patterns
        static RE: OnceLock<Option<Regex>> = OnceLock::new();
        let parts = RE
            .get_or_init(|| Regex::new(r"^([^!]+)(?:!([^@]+)@.*)?$").ok())
            .as_ref()
            .and_then(|re| re.captures(&mask));
        if let Some(parts) = parts {
            let nick_mask = parts.get(1).map(|m| m.as_str().to_owned()).unwrap_or_default();
            for member in self.gateway().members().await {
                let nick = self.nick_by_id(member.id).await;
                if address::mask_matches(&nick_mask, &nick) {
                    self.send_who_reply("*", &member, 0).await;
                }
            }
        }
        self.send_numeric(RPL_ENDOFWHO, &format!("{mask} :End of WHO list"));
    }

    async fn send_who_reply(&self, channel_name: &str, member: &Member, channel: u64) {
        let nick = self.nick_by_id(member.id).await;
        let here = if member.presence == Presence::Online { 'H' } else { 'G' };
        let sigils = if channel != 0 {
            let letters = self.member_mode_letters(member, channel).await;
            self.sigils(&letters)
        } else {
            String::new()
        };
        self.send_numeric(
            RPL_WHOREPLY,
            &format!(
                "{channel_name} {} {USER_HOST} {USER_HOST} {nick} {here}{sigils} :0 {}#{}",
                member.id, member.username, member.discriminator
            ),
        );
    }

    pub(crate) async fn cmd_whois(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        let target = msg.params[0].clone();
        let Some(user_id) = self.user_id_by_nick(&target).await else {
            self.send_numeric(ERR_NOSUCHNICK, &format!("{target} :No such nick/channel"));
            return;
        };
        let member = match self.gateway().member(user_id).await {
            Some(m) => Some(m),
            None => self.gateway().fetch_user(user_id).await,
        };
        let Some(member) = member else {
            self.send_numeric(ERR_NOSUCHNICK, &format!("{target} :No such nick/channel"));
            return;
        };

        let nick = self.nick_by_id(user_id).await;
        self.send_numeric(
            RPL_WHOISUSER,
            &format!(
                "{nick} {} {USER_HOST} * :{}#{}",
                member.id, member.username, member.discriminator
            ),
        );
        self.send_numeric(
            RPL_WHOISSERVER,
            &format!("{nick} {} :The Truman Show", self.server().hostname()),
        );
        self.send_numeric(
            RPL_WHOISIDLE,
            &format!("{nick} 0 {} :seconds idle, signon time", member.created_at),
        );
        self.send_numeric(RPL_ENDOFWHOIS, &format!("{nick} :End of WHOIS list"));
    }

    pub(crate) async fn cmd_userhost(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        let mut replies = Vec::new();
        for nick in msg.params.iter().take(5) {
            if let Some(id) = self.user_id_by_nick(nick).await {
                let resolved = self.nick_by_id(id).await;
                replies.push(format!("{resolved}=+{id}@{USER_HOST}"));
            }
        }
        self.send_numeric(RPL_USERHOST, &format!(":{}", replies.join(" ")));
    }

    pub(crate) async fn cmd_names(&self, msg: IrcMessage) {
        if !self.need_params(&msg, 1) {
            return;
        }
        for target in msg.params[0].split(',') {
            match self.state().channel_by_irc_name(target) {
                Some(channel) => self.send_names(&channel).await,
                None => {
                    self.send_numeric(RPL_ENDOFNAMES, &format!("{target} :End of NAMES list"))
                }
            }
        }
    }

    pub(crate) async fn cmd_list(&self, msg: IrcMessage) {
        // an argument restricts the listing, RFC 2812 section 3.2.6
        let filter: Vec<String> = msg
            .params
            .first()
            .map(|p| p.split(',').map(|s| s.to_owned()).collect())
            .unwrap_or_default();

        let members = self.gateway().members().await.len();
        for channel in self.gateway().channels().await {
            // text channels list by name, voice by id; categories are
            // not joinable and stay out
            if !channel.is_text() && !channel.is_voice() {
                continue;
            }
            let irc_name = channel.irc_name();
            if !filter.is_empty()
                && !filter.iter().any(|f| f.eq_ignore_ascii_case(&irc_name))
            {
                continue;
            }
            let topic = channel.topic().unwrap_or("");
            self.send_numeric(RPL_LIST, &format!("{irc_name} {members} :{topic}"));
        }
        self.send_numeric(RPL_LISTEND, ":End of LIST");
    }
}
