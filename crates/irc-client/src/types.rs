//! IRC wire types.

use serde::Serialize;
use std::collections::HashMap;

/// One parsed protocol line.
///
/// Format: `[@tags] [:prefix] COMMAND [params...] [:trailing]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcLine {
    /// Parse a single line (without the trailing CRLF).
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let mut tags = HashMap::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, tail) = stripped.split_once(' ')?;
            for tag in raw_tags.split(';') {
                match tag.split_once('=') {
                    Some((k, v)) => tags.insert(k.to_string(), unescape_tag(v)),
                    None => tags.insert(tag.to_string(), String::new()),
                };
            }
            rest = tail.trim_start();
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, tail) = stripped.split_once(' ')?;
            prefix = Some(p.to_string());
            rest = tail.trim_start();
        }

        let (head, trailing) = match rest.split_once(" :") {
            Some((h, t)) => (h, Some(t)),
            None => (rest, None),
        };

        let mut words = head.split_whitespace();
        let command = words.next()?.to_string();
        let mut params: Vec<String> = words.map(String::from).collect();
        if let Some(t) = trailing {
            params.push(t.to_string());
        }

        Some(Self {
            tags,
            prefix,
            command,
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }
}

fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Chat user that sent a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatUser {
    /// Platform user id (`user-id` tag), 0 when unknown.
    pub user_id: i64,
    /// Login name.
    pub username: String,
    /// Display name (`display-name` tag), falls back to the login name.
    pub display_name: String,
}

impl ChatUser {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            user_id: 0,
            display_name: username.clone(),
            username,
        }
    }
}

/// Chat message received on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Channel name without the leading `#`.
    pub channel: String,
    pub user: ChatUser,
    pub text: String,
    /// Raw message tags.
    pub tags: HashMap<String, String>,
}

impl ChatMessage {
    /// Build a chat message from a `PRIVMSG` line.
    pub fn from_line(line: &IrcLine) -> Option<Self> {
        if line.command != "PRIVMSG" || line.params.len() < 2 {
            return None;
        }

        let username = line.nick()?.to_string();
        let display_name = line
            .tags
            .get("display-name")
            .filter(|d| !d.is_empty())
            .cloned()
            .unwrap_or_else(|| username.clone());
        let user_id = line
            .tags
            .get("user-id")
            .and_then(|id| id.parse().ok())
            .unwrap_or(0);

        Some(Self {
            channel: line.params[0].trim_start_matches('#').to_string(),
            user: ChatUser {
                user_id,
                username,
                display_name,
            },
            text: line.params[1].clone(),
            tags: line.tags.clone(),
        })
    }
}
