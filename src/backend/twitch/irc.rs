use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

// Every pattern is anchored at the start of the line; the tag block never
// contains a space, so the first prefix is always the one examined.
// The login shows up as nick, user and host. The regex crate has no
// back-references, so all three are captured and compared in `login_of`.
static PRIVMSG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<tags>@\S* )?:(?P<nick>\w+)!(?P<user>\w+)@(?P<host>\w+)\.tmi\.twitch\.tv PRIVMSG #(?P<channel>\w+) :(?P<content>.+)",
    )
    .expect("PRIVMSG pattern")
});

// :nickname!nickname@nickname.tmi.twitch.tv WHISPER bob :hello world!
static WHISPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<tags>@\S* )?:(?P<nick>\w+)!(?P<user>\w+)@(?P<host>\w+)\.tmi\.twitch\.tv WHISPER (?P<receiver>\w+) :(?P<content>.+)",
    )
    .expect("WHISPER pattern")
});

// :nickname!nickname@nickname.tmi.twitch.tv JOIN #bob
static USER_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<tags>@\S* )?:(?P<nick>\w+)!(?P<user>\w+)@(?P<host>\w+)\.tmi\.twitch\.tv JOIN #(?P<channel>\w+)",
    )
    .expect("JOIN pattern")
});

// :nickname!nickname@nickname.tmi.twitch.tv PART #bob
static USER_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<tags>@\S* )?:(?P<nick>\w+)!(?P<user>\w+)@(?P<host>\w+)\.tmi\.twitch\.tv PART #(?P<channel>\w+)",
    )
    .expect("PART pattern")
});

static USER_NOTICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<tags>@\S* )?:tmi\.twitch\.tv USERNOTICE #(?P<channel>\w+)(?: :(?P<content>.+))?")
        .expect("USERNOTICE pattern")
});

// @msg-id=msg_banned :tmi.twitch.tv NOTICE #X :You are permanently banned from talking in X.
static NOTICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<tags>@\S* )?:tmi\.twitch\.tv NOTICE #(?P<channel>\w+)(?: :(?P<content>.+))?")
        .expect("NOTICE pattern")
});

static USER_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<tags>@\S* )?:tmi\.twitch\.tv USERSTATE #(?P<channel>\w+)")
        .expect("USERSTATE pattern")
});

static ROOM_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<tags>@\S* )?:tmi\.twitch\.tv ROOMSTATE #(?P<channel>\w+)")
        .expect("ROOMSTATE pattern")
});

// @msg-id=msg_timedout :tmi.twitch.tv NOTICE #X :You are timed out for 99906 more seconds.
static TIMEOUT_DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"timed out for (?P<seconds>\d+)").expect("timeout pattern"));

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("mention pattern"));

/// The tag block of a line, kept exactly as received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTags(String);

impl RawTags {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Split the block into `key -> value` pairs with IRCv3 escapes resolved.
    ///
    /// Keys without a value map to an empty string.
    pub fn parse(&self) -> HashMap<String, String> {
        let block = self.0.trim();
        let block = block.strip_prefix('@').unwrap_or(block);

        block
            .split(';')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), unescape_tag_value(value)),
                None => (pair.to_string(), String::new()),
            })
            .collect()
    }

    /// Look up a single tag value
    pub fn get(&self, key: &str) -> Option<String> {
        self.parse().remove(key)
    }
}

fn unescape_tag_value(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut escape = false;
    for c in value.chars() {
        match c {
            '\\' if escape => {
                out.push('\\');
                escape = false;
            }
            '\\' => escape = true,
            ':' if escape => {
                out.push(';');
                escape = false;
            }
            's' if escape => {
                out.push(' ');
                escape = false;
            }
            'r' if escape => {
                out.push('\r');
                escape = false;
            }
            'n' if escape => {
                out.push('\n');
                escape = false;
            }
            c => {
                escape = false;
                out.push(c);
            }
        }
    }

    out
}

/// One classified chat transport line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    PrivateMessage {
        tags: RawTags,
        sender: String,
        channel: String,
        content: String,
    },
    Whisper {
        tags: RawTags,
        sender: String,
        receiver: String,
        content: String,
    },
    UserJoin {
        tags: RawTags,
        sender: String,
        channel: String,
    },
    UserPart {
        tags: RawTags,
        sender: String,
        channel: String,
    },
    /// Subscriptions, raids and other user events announced by the server
    UserNotice {
        tags: RawTags,
        channel: String,
        content: Option<String>,
    },
    Notice {
        tags: RawTags,
        channel: String,
        content: Option<String>,
    },
    UserState {
        tags: RawTags,
        channel: String,
    },
    RoomState {
        tags: RawTags,
        channel: String,
    },
}

impl ProtocolEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolEvent::PrivateMessage { .. } => "PRIVMSG",
            ProtocolEvent::Whisper { .. } => "WHISPER",
            ProtocolEvent::UserJoin { .. } => "JOIN",
            ProtocolEvent::UserPart { .. } => "PART",
            ProtocolEvent::UserNotice { .. } => "USERNOTICE",
            ProtocolEvent::Notice { .. } => "NOTICE",
            ProtocolEvent::UserState { .. } => "USERSTATE",
            ProtocolEvent::RoomState { .. } => "ROOMSTATE",
        }
    }

    /// Channel without the leading `#`; whispers have none
    pub fn channel(&self) -> Option<&str> {
        match self {
            ProtocolEvent::Whisper { .. } => None,
            ProtocolEvent::PrivateMessage { channel, .. }
            | ProtocolEvent::UserJoin { channel, .. }
            | ProtocolEvent::UserPart { channel, .. }
            | ProtocolEvent::UserNotice { channel, .. }
            | ProtocolEvent::Notice { channel, .. }
            | ProtocolEvent::UserState { channel, .. }
            | ProtocolEvent::RoomState { channel, .. } => Some(channel),
        }
    }

    /// Login of the user the line originates from; server lines have none
    pub fn sender(&self) -> Option<&str> {
        match self {
            ProtocolEvent::PrivateMessage { sender, .. }
            | ProtocolEvent::Whisper { sender, .. }
            | ProtocolEvent::UserJoin { sender, .. }
            | ProtocolEvent::UserPart { sender, .. } => Some(sender),
            _ => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            ProtocolEvent::PrivateMessage { content, .. }
            | ProtocolEvent::Whisper { content, .. } => Some(content),
            ProtocolEvent::UserNotice { content, .. } | ProtocolEvent::Notice { content, .. } => {
                content.as_deref()
            }
            _ => None,
        }
    }

    /// Raw tag block; empty when the line carried none
    pub fn tags(&self) -> &RawTags {
        match self {
            ProtocolEvent::PrivateMessage { tags, .. }
            | ProtocolEvent::Whisper { tags, .. }
            | ProtocolEvent::UserJoin { tags, .. }
            | ProtocolEvent::UserPart { tags, .. }
            | ProtocolEvent::UserNotice { tags, .. }
            | ProtocolEvent::Notice { tags, .. }
            | ProtocolEvent::UserState { tags, .. }
            | ProtocolEvent::RoomState { tags, .. } => tags,
        }
    }

    /// `@login` mentions in the content, see [`extract_mentions`]
    pub fn mentions(&self) -> Vec<String> {
        self.content().map(extract_mentions).unwrap_or_default()
    }
}

/// Classify one raw line (no trailing CRLF).
///
/// Patterns are tried in a fixed order and the first match wins. `None`
/// means the line is irrelevant here (PING, server banners, ...).
pub fn classify(line: &str) -> Option<ProtocolEvent> {
    if let Some(caps) = PRIVMSG.captures(line) {
        if let Some(sender) = login_of(&caps) {
            return Some(ProtocolEvent::PrivateMessage {
                tags: tags_of(&caps),
                sender,
                channel: group(&caps, "channel"),
                content: group(&caps, "content"),
            });
        }
    }

    if let Some(caps) = WHISPER.captures(line) {
        if let Some(sender) = login_of(&caps) {
            return Some(ProtocolEvent::Whisper {
                tags: tags_of(&caps),
                sender,
                receiver: group(&caps, "receiver"),
                content: group(&caps, "content"),
            });
        }
    }

    if let Some(caps) = USER_JOIN.captures(line) {
        if let Some(sender) = login_of(&caps) {
            return Some(ProtocolEvent::UserJoin {
                tags: tags_of(&caps),
                sender,
                channel: group(&caps, "channel"),
            });
        }
    }

    if let Some(caps) = USER_PART.captures(line) {
        if let Some(sender) = login_of(&caps) {
            return Some(ProtocolEvent::UserPart {
                tags: tags_of(&caps),
                sender,
                channel: group(&caps, "channel"),
            });
        }
    }

    if let Some(caps) = USER_NOTICE.captures(line) {
        return Some(ProtocolEvent::UserNotice {
            tags: tags_of(&caps),
            channel: group(&caps, "channel"),
            content: caps.name("content").map(|m| m.as_str().to_string()),
        });
    }

    if let Some(caps) = NOTICE.captures(line) {
        return Some(ProtocolEvent::Notice {
            tags: tags_of(&caps),
            channel: group(&caps, "channel"),
            content: caps.name("content").map(|m| m.as_str().to_string()),
        });
    }

    if let Some(caps) = USER_STATE.captures(line) {
        return Some(ProtocolEvent::UserState {
            tags: tags_of(&caps),
            channel: group(&caps, "channel"),
        });
    }

    if let Some(caps) = ROOM_STATE.captures(line) {
        return Some(ProtocolEvent::RoomState {
            tags: tags_of(&caps),
            channel: group(&caps, "channel"),
        });
    }

    None
}

/// Seconds from a "timed out for N seconds" notice, `None` for any other text
pub fn timeout_duration(content: &str) -> Option<u64> {
    TIMEOUT_DURATION
        .captures(content)
        .and_then(|caps| caps.name("seconds")?.as_str().parse().ok())
}

/// Every `@login` in `content`, left to right, duplicates kept
pub fn extract_mentions(content: &str) -> Vec<String> {
    MENTION
        .captures_iter(content)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn login_of(caps: &Captures) -> Option<String> {
    let nick = caps.name("nick")?.as_str();
    let user = caps.name("user")?.as_str();
    let host = caps.name("host")?.as_str();

    (nick == user && user == host).then(|| nick.to_string())
}

fn tags_of(caps: &Captures) -> RawTags {
    RawTags::new(caps.name("tags").map(|m| m.as_str()).unwrap_or_default())
}

fn group(caps: &Captures, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
