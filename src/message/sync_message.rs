//! Sync beacons (controller -> synths) and sync replies (synths -> controller)
//!
//! beacon: `s<controller time>i<index>`
//!
//! reply:  `_s<client time>i<index>c<client id>r<ipv4>y<battery>`
//!
//! A reply with a negative index is an unsolicited ping, not an answer to a beacon.
use std::{error::Error, fmt};

/// first byte of every reply
pub const REPLY_MARKER: u8 = b'_';
/// tags in a reply, in the order they must appear
pub const REPLY_TAGS: [char; 5] = ['s', 'i', 'c', 'r', 'y'];
/// marker token plus one token per tag
pub const REPLY_TOKENS: usize = 6;

/// Why a reply could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    NotText,
    MissingMarker,
    TokenCount(usize),
    TagOrder(String),
    BadNumber { tag: char, value: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::NotText => write!(f, "reply is not ascii text"),
            DecodeError::MissingMarker => write!(f, "reply does not start with '_'"),
            DecodeError::TokenCount(n) => {
                write!(f, "reply split into {} tokens, expected {}", n, REPLY_TOKENS)
            }
            DecodeError::TagOrder(tags) => {
                write!(f, "reply tags '{}' are not in s,i,c,r,y order", tags)
            }
            DecodeError::BadNumber { tag, value } => {
                write!(f, "reply field '{}' has bad value '{}'", tag, value)
            }
        }
    }
}

impl Error for DecodeError {}

/// A probe sent during a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncBeacon {
    pub index: i64,
    pub sent_at: i64,
}

impl SyncBeacon {
    pub fn encode(&self) -> String {
        format!("s{}i{}", self.sent_at, self.index)
    }
    /// parse a beacon back (what a synth does with it)
    pub fn decode(data: &[u8]) -> Option<SyncBeacon> {
        let text = std::str::from_utf8(data).ok()?;
        let rest = text.strip_prefix('s')?;
        let (sent_at, index) = rest.split_once('i')?;
        Some(SyncBeacon {
            index: index.parse().ok()?,
            sent_at: sent_at.parse().ok()?,
        })
    }
}

/// A decoded reply from a synth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncResponse {
    /// the synth's own clock when it answered
    pub client_time: i64,
    /// beacon being answered, negative for a ping
    pub sync_index: i64,
    pub client_id: i64,
    pub ipv4: u32,
    pub battery: u8,
}

impl SyncResponse {
    pub fn is_ping(&self) -> bool {
        self.sync_index < 0
    }

    pub fn encode(&self) -> String {
        format!(
            "_s{}i{}c{}r{}y{}",
            self.client_time, self.sync_index, self.client_id, self.ipv4, self.battery
        )
    }

    /// Decode a reply.  Anything malformed comes back as a [`DecodeError`],
    /// callers drop the packet and keep going.
    pub fn decode(data: &[u8]) -> Result<SyncResponse, DecodeError> {
        if !data.is_ascii() {
            return Err(DecodeError::NotText);
        }
        let text = std::str::from_utf8(data)
            .map_err(|_| DecodeError::NotText)?
            .trim_end_matches(|c: char| c == '\0' || c.is_ascii_whitespace());
        if text.as_bytes().first() != Some(&REPLY_MARKER) {
            return Err(DecodeError::MissingMarker);
        }
        let (tags, tokens) = tokenize(text);
        if tokens.len() != REPLY_TOKENS {
            return Err(DecodeError::TokenCount(tokens.len()));
        }
        if tags != REPLY_TAGS || tokens[0] != "_" {
            return Err(DecodeError::TagOrder(tags.iter().collect()));
        }
        Ok(SyncResponse {
            client_time: parse_field('s', tokens[1])?,
            sync_index: parse_field('i', tokens[2])?,
            client_id: parse_field('c', tokens[3])?,
            ipv4: parse_field('r', tokens[4])?,
            battery: parse_field('y', tokens[5])?,
        })
    }
}

// split on any reply tag letter, remembering which tag started each token
fn tokenize(text: &str) -> (Vec<char>, Vec<&str>) {
    let mut tags = Vec::new();
    let mut tokens = Vec::new();
    let mut start = 0;
    for (pos, c) in text.char_indices() {
        if REPLY_TAGS.contains(&c) {
            tokens.push(&text[start..pos]);
            tags.push(c);
            start = pos + c.len_utf8();
        }
    }
    tokens.push(&text[start..]);
    (tags, tokens)
}

fn parse_field<T: std::str::FromStr>(tag: char, value: &str) -> Result<T, DecodeError> {
    value.parse().map_err(|_| DecodeError::BadNumber {
        tag,
        value: value.to_string(),
    })
}
