use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::opt,
    multi::separated_list1,
    sequence::{preceded, terminated},
};

use crate::errors::BridgeError;
use crate::tags;

// 2.3.1 Message format in Augmented BNF (RFC 2812), extended with the
// IRCv3 message-tags prefix:

//  a.   message    =  [ "@" tags SPACE ] [ ":" prefix SPACE ] command
//                     [ params ] crlf
//  b.   tags       =  tag *( ";" tag )
//  c.   tag        =  key [ "=" escaped-value ]
//  d.   key        =  [ "+" ] [ vendor "/" ] 1*( ALPHA / DIGIT / "-" / "." )
//  e.   prefix     =  servername / ( nickname [ [ "!" user ] "@" host ] )
//  f.   command    =  1*letter / 3digit
//  g.   params     =  *14( SPACE middle ) [ SPACE ":" trailing ]

#[derive(Debug, Clone, PartialEq)]
pub struct IrcMessage {
    pub tags: Vec<(String, Option<String>)>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parses one CRLF-stripped line. Anything that does not fit the
    /// grammar is an error the socket loop silently discards.
    pub fn parse(line: &str) -> Result<Self, BridgeError> {
        match irc_message_parser(line) {
            Ok(("", message)) => Ok(message),
            Ok((rem, _)) => Err(BridgeError::ParsingError(format!(
                "trailing garbage: '{rem}'"
            ))),
            Err(e) => Err(BridgeError::ParsingError(e.to_string())),
        }
    }

    /// Tag value by key; a valueless tag yields an empty string.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    pub fn has_tag(&self, key: &str) -> bool {
        self.tag(key).is_some()
    }
}

fn irc_message_parser(input: &str) -> IResult<&str, IrcMessage> {
    let (rem, tags) = opt(terminated(
        preceded(char('@'), tags_parser),
        char(' '),
    ))
    .parse(input)?;
    let (rem, prefix) = opt(terminated(
        preceded(char(':'), take_while1(|c| c != ' ')),
        char(' '),
    ))
    .parse(rem)?;
    let (rem, command) = take_while1(|c: char| c.is_ascii_alphanumeric()).parse(rem)?;
    let (rem, params) = params_parser(rem)?;

    Ok((
        rem,
        IrcMessage {
            tags: tags.unwrap_or_default(),
            prefix: prefix.map(str::to_owned),
            command: command.to_owned(),
            params,
        },
    ))
}

//  b.   tags       =  tag *( ";" tag )
//  c.   tag        =  key [ "=" escaped-value ]
fn tags_parser(input: &str) -> IResult<&str, Vec<(String, Option<String>)>> {
    separated_list1(char(';'), tag_parser).parse(input)
}

fn tag_parser(input: &str) -> IResult<&str, (String, Option<String>)> {
    let (rem, key) = take_while1(|c| c != ';' && c != '=' && c != ' ').parse(input)?;
    let (rem, value) = opt(preceded(
        char('='),
        nom::bytes::complete::take_while(|c| c != ';' && c != ' '),
    ))
    .parse(rem)?;
    Ok((
        rem,
        (key.to_owned(), value.map(|v: &str| tags::unescape(v))),
    ))
}

//  g.   params     =  *14( SPACE middle ) [ SPACE ":" trailing ]
//       middle     =  nospcrlfcl *( ":" / nospcrlfcl )
//       trailing   =  *( ":" / " " / nospcrlfcl )
fn params_parser(input: &str) -> IResult<&str, Vec<String>> {
    let mut params = Vec::new();
    let mut rem = input;
    loop {
        let Some(after_space) = rem.strip_prefix(' ') else {
            break;
        };
        if let Some(trailing) = after_space.strip_prefix(':') {
            params.push(trailing.to_owned());
            rem = "";
            break;
        }
        let (next, middle) =
            take_while1::<_, _, nom::error::Error<&str>>(|c| c != ' ').parse(after_space)?;
        params.push(middle.to_owned());
        rem = next;
    }
    Ok((rem, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_command() {
        let msg = IrcMessage::parse("QUIT").unwrap();
        assert_eq!(msg.command, "QUIT");
        assert!(msg.params.is_empty());
        assert!(msg.prefix.is_none());
        assert!(msg.tags.is_empty());
    }

    #[test]
    fn test_params_and_trailing() {
        let msg = IrcMessage::parse("USER guest 0 * :Ronnie Reagan").unwrap();
        assert_eq!(msg.command, "USER");
        assert_eq!(
            msg.params,
            vec!["guest", "0", "*", "Ronnie Reagan"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_prefix() {
        let msg = IrcMessage::parse(":Wiz!jto@tolsun.oulu.fi NICK Kilroy").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("Wiz!jto@tolsun.oulu.fi"));
        assert_eq!(msg.command, "NICK");
        assert_eq!(msg.params, vec!["Kilroy".to_owned()]);
    }

    #[test]
    fn test_tags() {
        let msg = IrcMessage::parse(
            "@+reply=1234;+discord.com/react-add=👍 TAGMSG #general",
        )
        .unwrap();
        assert_eq!(msg.tag("+reply"), Some("1234"));
        assert_eq!(msg.tag("+discord.com/react-add"), Some("👍"));
        assert_eq!(msg.params, vec!["#general".to_owned()]);
    }

    #[test]
    fn test_valueless_and_escaped_tags() {
        let msg =
            IrcMessage::parse("@discord.com/bot;msgid=a\\sb PRIVMSG #c :x").unwrap();
        assert_eq!(msg.tag("discord.com/bot"), Some(""));
        assert!(msg.has_tag("discord.com/bot"));
        // tag values are unescaped on parse
        assert_eq!(msg.tag("msgid"), Some("a b"));
        assert_eq!(msg.tag("absent"), None);
    }

    #[test]
    fn test_malformed_lines() {
        assert!(IrcMessage::parse("").is_err());
        assert!(IrcMessage::parse("   ").is_err());
        assert!(IrcMessage::parse(":prefix-only").is_err());
    }
}
