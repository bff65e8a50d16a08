//! Numeric reply codes used by the bridge, RFC 2812 section 5 plus the
//! modern IRCv3 `FAIL`/`NOTE` standard replies for the bridge extensions.

/// Host part of every user prefix (`nick!id@discord.com`).
pub const USER_HOST: &str = "discord.com";

/// Upper bound the platform enforces on message bodies.
pub const MAX_MESSAGE_CHARS: usize = 2000;

// 001 RPL_WELCOME "Welcome to the Internet Relay Network <nick>!<user>@<host>"
pub const RPL_WELCOME: u16 = 1;
pub const RPL_YOURHOST: u16 = 2;
pub const RPL_CREATED: u16 = 3;
pub const RPL_MYINFO: u16 = 4;
pub const RPL_ISUPPORT: u16 = 5;

// 221 RPL_UMODEIS "<user mode string>"
pub const RPL_UMODEIS: u16 = 221;

// 251 RPL_LUSERCLIENT ":There are <integer> users and <integer> invisible
//     on <integer> servers"
pub const RPL_LUSERCLIENT: u16 = 251;

// 302 RPL_USERHOST ":*1<reply> *( " " <reply> )"
pub const RPL_USERHOST: u16 = 302;

// 311 RPL_WHOISUSER "<nick> <user> <host> * :<real name>"
pub const RPL_WHOISUSER: u16 = 311;
pub const RPL_WHOISSERVER: u16 = 312;
pub const RPL_WHOISIDLE: u16 = 317;
pub const RPL_ENDOFWHOIS: u16 = 318;

// 315 RPL_ENDOFWHO "<name> :End of WHO list"
pub const RPL_ENDOFWHO: u16 = 315;

// 322 RPL_LIST "<channel> <# visible> :<topic>"
pub const RPL_LIST: u16 = 322;
pub const RPL_LISTEND: u16 = 323;

// 324 RPL_CHANNELMODEIS "<channel> <mode> <mode params>"
pub const RPL_CHANNELMODEIS: u16 = 324;

// 331 RPL_NOTOPIC "<channel> :No topic is set"
pub const RPL_NOTOPIC: u16 = 331;

// 332 RPL_TOPIC "<channel> :<topic>"
pub const RPL_TOPIC: u16 = 332;
pub const RPL_TOPICWHOTIME: u16 = 333;

// 352 RPL_WHOREPLY "<channel> <user> <host> <server> <nick>
//     ( "H" / "G" > ["*"] [ ( "@" / "+" ) ] :<hopcount> <real name>"
pub const RPL_WHOREPLY: u16 = 352;

// 353 RPL_NAMREPLY / 366 RPL_ENDOFNAMES
pub const RPL_NAMREPLY: u16 = 353;
pub const RPL_ENDOFNAMES: u16 = 366;

// 367 RPL_BANLIST "<channel> <banmask>"
pub const RPL_BANLIST: u16 = 367;
pub const RPL_ENDOFBANLIST: u16 = 368;

pub const RPL_MOTDSTART: u16 = 375;
pub const RPL_MOTD: u16 = 372;
pub const RPL_ENDOFMOTD: u16 = 376;

// 400 ERR_UNKNOWNERROR, used when the banned role cannot be resolved
pub const ERR_UNKNOWNERROR: u16 = 400;

// 401 ERR_NOSUCHNICK "<nickname> :No such nick/channel"
pub const ERR_NOSUCHNICK: u16 = 401;

// 403 ERR_NOSUCHCHANNEL "<channel name> :No such channel"
pub const ERR_NOSUCHCHANNEL: u16 = 403;

// 404 ERR_CANNOTSENDTOCHAN "<channel name> :Cannot send to channel"
pub const ERR_CANNOTSENDTOCHAN: u16 = 404;

// 421 ERR_UNKNOWNCOMMAND "<command> :Unknown command"
pub const ERR_UNKNOWNCOMMAND: u16 = 421;

// 442 ERR_NOTONCHANNEL "<channel> :You're not on that channel"
pub const ERR_NOTONCHANNEL: u16 = 442;

// 461 ERR_NEEDMOREPARAMS "<command> :Not enough parameters"
pub const ERR_NEEDMOREPARAMS: u16 = 461;

// 479 ERR_BADCHANNAME, sent for targets that are neither '#' nor '&'
pub const ERR_BADCHANNAME: u16 = 479;

// 482 ERR_CHANOPRIVSNEEDED "<channel> :You're not channel operator"
pub const ERR_CHANOPRIVSNEEDED: u16 = 482;

// 501 ERR_UMODEUNKNOWNFLAG ":Unknown MODE flag"
pub const ERR_UMODEUNKNOWNFLAG: u16 = 501;
