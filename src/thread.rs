//! Thread identity: where a message lives.
//!
//! Every per-thread structure (unread counters, off-thread caches, recent
//! edits) is keyed by [`ThreadKey`], never by string-built keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::lenient_opt_string;

/// The unit of message-list isolation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreadKey {
    #[default]
    Main,
    Dm(String),
    Gc(String),
}

impl ThreadKey {
    /// Parse the CLI form: `main`, `dm:<peer>` or `gc:<id>`.
    pub fn parse(s: &str) -> Option<ThreadKey> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("main") {
            return Some(ThreadKey::Main);
        }
        let (tag, rest) = s.split_once(':')?;
        if rest.is_empty() {
            return None;
        }
        match tag.to_ascii_lowercase().as_str() {
            "dm" => Some(ThreadKey::Dm(rest.to_string())),
            "gc" => Some(ThreadKey::Gc(rest.to_string())),
            _ => None,
        }
    }

    pub fn is_main(&self) -> bool {
        matches!(self, ThreadKey::Main)
    }

    pub fn dm_peer(&self) -> Option<&str> {
        match self {
            ThreadKey::Dm(p) => Some(p),
            _ => None,
        }
    }

    pub fn gc_id(&self) -> Option<&str> {
        match self {
            ThreadKey::Gc(g) => Some(g),
            _ => None,
        }
    }

    /// Thread-scoping fields for an outbound command.
    ///
    /// Some commands address Main by omitting the fields altogether, others
    /// by an explicit `thread: "main"`; `explicit_main` picks between them.
    pub fn wire_fields(&self, explicit_main: bool) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        match self {
            ThreadKey::Main => {
                if explicit_main {
                    map.insert("thread".into(), "main".into());
                }
            }
            ThreadKey::Dm(peer) => {
                map.insert("thread".into(), "dm".into());
                map.insert("peer".into(), peer.clone().into());
            }
            ThreadKey::Gc(gcid) => {
                map.insert("thread".into(), "gc".into());
                map.insert("gcid".into(), gcid.clone().into());
            }
        }
        map
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadKey::Main => write!(f, "main"),
            ThreadKey::Dm(p) => write!(f, "dm:{p}"),
            ThreadKey::Gc(g) => write!(f, "gc:{g}"),
        }
    }
}

/// The thread-tagging fields an inbound frame may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub gcid: Option<String>,
}

impl ThreadFields {
    pub fn for_key(key: &ThreadKey) -> Self {
        match key {
            ThreadKey::Main => ThreadFields { thread: Some("main".into()), ..Default::default() },
            ThreadKey::Dm(p) => ThreadFields {
                thread: Some("dm".into()),
                peer: Some(p.clone()),
                gcid: None,
            },
            ThreadKey::Gc(g) => ThreadFields {
                thread: Some("gc".into()),
                peer: None,
                gcid: Some(g.clone()),
            },
        }
    }

    /// Resolve the fields to a key.
    ///
    /// A missing `thread` (or `"main"`) is Main. A `dm`/`gc` tag without its
    /// peer/group id, or an unknown tag, resolves to `None`: such a frame is
    /// not for any thread the user can be viewing.
    pub fn key(&self) -> Option<ThreadKey> {
        match self.thread.as_deref() {
            None | Some("") | Some("main") => Some(ThreadKey::Main),
            Some("dm") => self.peer.clone().map(ThreadKey::Dm),
            Some("gc") => self.gcid.clone().map(ThreadKey::Gc),
            Some(_) => None,
        }
    }

    /// Whether an event carrying these fields concerns `active`.
    pub fn is_for(&self, active: &ThreadKey) -> bool {
        self.key().as_ref() == Some(active)
    }
}
