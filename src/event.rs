//! Nostr event model for game messages.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Event kind carried by every game start and move.
pub const GAME_KIND: u32 = 30;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and the
/// following elements hold data. Games only look at `e` tags:
///
/// - a start carries `["e", <genesis reference>]`
/// - a move carries `["e", <start id>]` followed by `["e", <parent id>]`
///
/// Every other tag is stored verbatim and ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build an `e` tag pointing at `id`.
    pub fn event(id: impl Into<String>) -> Self {
        Tag(vec!["e".into(), id.into()])
    }

    /// Referenced id if this is an `e` tag with a value.
    pub fn event_ref(&self) -> Option<&str> {
        match self.0.as_slice() {
            [t, r, ..] if t == "e" => Some(r.as_str()),
            _ => None,
        }
    }
}

/// Signed, content-addressed game message as it travels between relays.
///
/// ```json
/// {
///   "id": "5c3b…",
///   "pubkey": "79be…",
///   "kind": 30,
///   "created_at": 1700000000,
///   "tags": [["e", "<start id>"], ["e", "<parent id>"]],
///   "content": "{\"fen\":\"…\",\"move\":\"e4\",\"history\":[\"e4\"]}",
///   "sig": "a1b2…"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author x-only public key (hex).
    pub pubkey: String,
    /// Kind number, [`GAME_KIND`] for game traffic.
    pub kind: u32,
    /// Unix timestamp of creation, supplied by the author.
    pub created_at: u64,
    /// Event references and any other tags.
    pub tags: Vec<Tag>,
    /// JSON payload describing a start or a move.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

impl Event {
    /// All `e` tag references in tag order.
    pub fn event_refs(&self) -> Vec<&str> {
        self.tags.iter().filter_map(Tag::event_ref).collect()
    }

    /// Id of the game this event claims to belong to.
    ///
    /// A start is its own game; a move names its game in the first `e` tag.
    pub fn game_ref(&self) -> Option<String> {
        match self.event_refs().as_slice() {
            [_genesis] => Some(self.id.clone()),
            [start, _parent] => Some((*start).to_string()),
            _ => None,
        }
    }
}

/// Raw 32-byte event id.
///
/// Ordering is lexicographic over the bytes, which is the tie-break used when
/// two successors share a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub [u8; 32]);

impl EventId {
    /// Parse a 64-character hex id.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out).ok()?;
        Some(Self(out))
    }

    /// Lowercase hex form used on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for EventId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| anyhow::anyhow!("invalid event id: {s}"))
    }
}
