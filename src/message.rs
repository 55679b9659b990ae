//! Message records as rendered in a thread's timeline.
//!
//! Server payloads carry more fields than the core cares about (poll options
//! and counts, media URLs, mime types...). Those ride along untouched in
//! [`Message::extra`] so that re-serialising a record loses nothing.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::thread::{ThreadFields, ThreadKey};

/// emoji → set of usernames who reacted with it. Sets are never empty.
pub type Reactions = BTreeMap<String, BTreeSet<String>>;

/// Maximum length of the reply preview snapshot.
pub const REPLY_PREVIEW_MAX_CHARS: usize = 120;

/// Discriminator of a timeline record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Message,
    Media,
    Poll,
    System,
    #[serde(other)]
    Other,
}

/// Non-owning back-reference to the message being replied to, with a text
/// snapshot for display once the original has left the loaded window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub text: String,
}

impl ReplyRef {
    /// Snapshot `msg` for a reply preview.
    pub fn preview(msg: &Message) -> ReplyRef {
        let text = match msg.kind {
            MessageKind::Message => msg.text.clone().unwrap_or_default(),
            MessageKind::Media => "[media]".to_string(),
            MessageKind::Poll => "[poll]".to_string(),
            _ => String::new(),
        };
        ReplyRef {
            id: msg.id.clone(),
            sender: msg.sender.clone(),
            text: text.chars().take(REPLY_PREVIEW_MAX_CHARS).collect(),
        }
    }
}

/// One record in a thread's timeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id; empty when the server sent none.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "is_false")]
    pub edited: bool,
    #[serde(default, deserialize_with = "lenient_reactions", skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: Reactions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub gcid: Option<String>,
    /// Every other field of the payload, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Message {
    /// A locally synthesised SYSTEM line (presence notices and the like).
    pub fn system(prefix: &str, text: impl Into<String>, now_ms: u64) -> Message {
        Message {
            id: format!("{prefix}-{now_ms}-{}", uuid::Uuid::new_v4()),
            kind: MessageKind::System,
            sender: "SYSTEM".to_string(),
            text: Some(text.into()),
            timestamp: Some(iso_timestamp(now_ms)),
            ..Default::default()
        }
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn text_str(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn is_chat(&self) -> bool {
        matches!(self.kind, MessageKind::Message | MessageKind::Media)
    }

    pub fn thread_fields(&self) -> ThreadFields {
        ThreadFields {
            thread: self.thread.clone(),
            peer: self.peer.clone(),
            gcid: self.gcid.clone(),
        }
    }

    pub fn thread_key(&self) -> Option<ThreadKey> {
        self.thread_fields().key()
    }

    /// Notification body: the text, else the mime type, else `"media"`.
    pub fn notify_body(&self) -> String {
        match self.text.as_deref() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => self
                .extra
                .get("mime")
                .and_then(Value::as_str)
                .unwrap_or("media")
                .to_string(),
        }
    }

    /// Overlay `incoming` onto `self`: every field the incoming payload
    /// carries wins, everything else is kept. `edited` is sticky.
    pub fn overlay(&mut self, incoming: &Message) {
        if incoming.has_id() {
            self.id = incoming.id.clone();
        }
        self.kind = incoming.kind;
        if !incoming.sender.is_empty() {
            self.sender = incoming.sender.clone();
        }
        if incoming.text.is_some() {
            self.text = incoming.text.clone();
        }
        if incoming.timestamp.is_some() {
            self.timestamp = incoming.timestamp.clone();
        }
        self.edited |= incoming.edited;
        if !incoming.reactions.is_empty() {
            self.reactions = incoming.reactions.clone();
        }
        if incoming.reply_to.is_some() {
            self.reply_to = incoming.reply_to.clone();
        }
        if incoming.thread.is_some() {
            self.thread = incoming.thread.clone();
        }
        if incoming.peer.is_some() {
            self.peer = incoming.peer.clone();
        }
        if incoming.gcid.is_some() {
            self.gcid = incoming.gcid.clone();
        }
        for (k, v) in &incoming.extra {
            self.extra.insert(k.clone(), v.clone());
        }
    }

    pub fn reaction_keys(&self) -> usize {
        self.reactions.len()
    }
}

/// Union `from` into `into`, per emoji.
pub fn merge_reactions(into: &mut Reactions, from: &Reactions) {
    for (emoji, users) in from {
        into.entry(emoji.clone()).or_default().extend(users.iter().cloned());
    }
    prune_reactions(into);
}

/// Drop emoji keys whose reactor set is empty.
pub fn prune_reactions(reactions: &mut Reactions) {
    reactions.retain(|_, users| !users.is_empty());
}

/// Toggle `user`'s reaction with `emoji`.
pub fn toggle_reaction(reactions: &mut Reactions, emoji: &str, user: &str) {
    let users = reactions.entry(emoji.to_string()).or_default();
    if !users.remove(user) {
        users.insert(user.to_string());
    }
    prune_reactions(reactions);
}

/// RFC 3339 timestamp for a Unix-epoch millisecond instant.
pub fn iso_timestamp(now_ms: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(now_ms as i64)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

fn is_false(b: &bool) -> bool {
    !*b
}

fn value_to_string(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Strings that the server sometimes sends as numbers; `null` becomes empty.
pub(crate) fn lenient_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(d)?).unwrap_or_default())
}

pub(crate) fn lenient_opt_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(d)?))
}

fn lenient_bool<'de, D>(d: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(d)?, Value::Bool(true)))
}

/// Reaction maps arrive as `{emoji: [user, ...]}`; anything malformed
/// inside is skipped rather than failing the whole record.
pub(crate) fn lenient_reactions<'de, D>(d: D) -> Result<Reactions, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(reactions_from_value(Value::deserialize(d)?))
}

pub(crate) fn reactions_from_value(v: Value) -> Reactions {
    let mut out = Reactions::new();
    if let Value::Object(map) = v {
        for (emoji, users) in map {
            if let Value::Array(list) = users {
                let set: BTreeSet<String> = list.into_iter().filter_map(value_to_string).collect();
                if !set.is_empty() {
                    out.insert(emoji, set);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(v: Value) -> Message {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_numeric_id_becomes_string() {
        let m = msg(json!({"id": 42, "type": "message", "sender": "a", "text": "hi"}));
        assert_eq!(m.id, "42");
    }

    #[test]
    fn test_unknown_type_is_other() {
        let m = msg(json!({"id": "1", "type": "sticker"}));
        assert_eq!(m.kind, MessageKind::Other);
    }

    #[test]
    fn test_missing_type_defaults_to_message() {
        let m = msg(json!({"id": "1", "text": "x"}));
        assert_eq!(m.kind, MessageKind::Message);
    }

    #[test]
    fn test_extra_fields_preserved() {
        let m = msg(json!({"id": "p", "type": "poll", "question": "tea?", "counts": [1, 2]}));
        assert_eq!(m.extra.get("question"), Some(&json!("tea?")));
        let back = serde_json::to_value(&m).unwrap();
        assert_eq!(back["counts"], json!([1, 2]));
        assert_eq!(back["type"], json!("poll"));
    }

    #[test]
    fn test_reactions_drop_empty_and_malformed() {
        let m = msg(json!({"id": "1", "reactions": {"👍": ["b", "a"], "🔥": [], "x": "nope"}}));
        assert_eq!(m.reactions.len(), 1);
        let users: Vec<_> = m.reactions["👍"].iter().cloned().collect();
        assert_eq!(users, vec!["a", "b"]);
    }

    #[test]
    fn test_null_reactions_is_empty() {
        let m = msg(json!({"id": "1", "reactions": null}));
        assert!(m.reactions.is_empty());
    }

    #[test]
    fn test_overlay_keeps_absent_fields() {
        let mut old = msg(json!({"id": "1", "sender": "a", "text": "old", "timestamp": "t0", "reactions": {"👍": ["z"]}}));
        let new = msg(json!({"id": "9", "sender": "a", "text": "new"}));
        old.overlay(&new);
        assert_eq!(old.id, "9");
        assert_eq!(old.text.as_deref(), Some("new"));
        assert_eq!(old.timestamp.as_deref(), Some("t0"));
        assert!(old.reactions.contains_key("👍"));
    }

    #[test]
    fn test_overlay_edited_is_sticky() {
        let mut old = msg(json!({"id": "1", "edited": true}));
        old.overlay(&msg(json!({"id": "1", "text": "x"})));
        assert!(old.edited);
    }

    #[test]
    fn test_merge_reactions_unions_sets() {
        let mut a = msg(json!({"reactions": {"👍": ["a"], "😂": ["c"]}})).reactions;
        let b = msg(json!({"reactions": {"👍": ["a", "b"], "🔥": ["d"]}})).reactions;
        merge_reactions(&mut a, &b);
        assert_eq!(a["👍"].len(), 2);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_toggle_reaction_adds_then_removes_and_prunes() {
        let mut r = Reactions::new();
        toggle_reaction(&mut r, "👍", "me");
        assert!(r["👍"].contains("me"));
        toggle_reaction(&mut r, "👍", "me");
        assert!(r.is_empty());
    }

    #[test]
    fn test_reply_preview_variants() {
        let text = msg(json!({"id": "1", "type": "message", "sender": "a", "text": "x".repeat(300)}));
        assert_eq!(ReplyRef::preview(&text).text.chars().count(), REPLY_PREVIEW_MAX_CHARS);
        let media = msg(json!({"id": "2", "type": "media", "sender": "a"}));
        assert_eq!(ReplyRef::preview(&media).text, "[media]");
        let poll = msg(json!({"id": "3", "type": "poll", "sender": "a"}));
        assert_eq!(ReplyRef::preview(&poll).text, "[poll]");
    }

    #[test]
    fn test_notify_body_falls_back_to_mime() {
        let m = msg(json!({"id": "1", "type": "media", "mime": "image/png"}));
        assert_eq!(m.notify_body(), "image/png");
        let bare = msg(json!({"id": "1", "type": "media"}));
        assert_eq!(bare.notify_body(), "media");
    }

    #[test]
    fn test_system_message_shape() {
        let m = Message::system("presence", "bob has joined chat", 1_700_000_000_000);
        assert_eq!(m.kind, MessageKind::System);
        assert_eq!(m.sender, "SYSTEM");
        assert!(m.id.starts_with("presence-1700000000000-"));
        assert_eq!(m.timestamp.as_deref(), Some("2023-11-14T22:13:20.000Z"));
    }

    #[test]
    fn test_thread_key_from_message_fields() {
        let m = msg(json!({"id": "1", "thread": "dm", "peer": "bob"}));
        assert_eq!(m.thread_key(), Some(ThreadKey::Dm("bob".into())));
    }
}
