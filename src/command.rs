//! Outbound commands.
//!
//! Every command serialises to one JSON object sent on the socket. Commands
//! scoped to a thread carry `thread` plus `peer`/`gcid`; whether Main is
//! spelled out (`thread: "main"`) or left implicit depends on the command,
//! matching what the server accepts for each.

use serde_json::{json, Map, Value};

use crate::thread::ThreadKey;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A text post, optionally replying to another message.
    Post { text: String, thread: ThreadKey, reply_to_id: Option<String> },
    /// A media post referencing an uploaded file.
    Media { url: String, mime: String, thread: ThreadKey },
    Edit { id: String, text: String, thread: ThreadKey },
    Delete { id: String, thread: ThreadKey },
    React { id: String, emoji: String, thread: ThreadKey },
    VotePoll { poll_id: String, choice: usize, thread: ThreadKey },
    CreateGc { name: String, members: Vec<String> },
    /// Request the history page of a thread.
    History(ThreadKey),
    Typing { thread: ThreadKey },
    /// Window visibility (`active: false` while hidden).
    Activity { active: bool },
    Ping { timestamp: u64 },
}

fn with_fields(mut base: Value, fields: Map<String, Value>) -> Value {
    if let Value::Object(obj) = &mut base {
        obj.extend(fields);
    }
    base
}

impl Command {
    pub fn to_json(&self) -> Value {
        match self {
            Command::Post { text, thread, reply_to_id } => {
                let mut v = with_fields(json!({ "text": text }), thread.wire_fields(false));
                if let (Some(id), Value::Object(obj)) = (reply_to_id, &mut v) {
                    obj.insert("reply_to_id".into(), json!(id));
                }
                v
            }
            Command::Media { url, mime, thread } => {
                with_fields(json!({ "url": url, "mime": mime }), thread.wire_fields(false))
            }
            Command::Edit { id, text, thread } => with_fields(
                json!({ "type": "edit_message", "id": id, "text": text }),
                thread.wire_fields(false),
            ),
            Command::Delete { id, thread } => with_fields(
                json!({ "type": "delete_message", "id": id }),
                thread.wire_fields(true),
            ),
            Command::React { id, emoji, thread } => with_fields(
                json!({ "type": "react_message", "id": id, "emoji": emoji }),
                thread.wire_fields(true),
            ),
            Command::VotePoll { poll_id, choice, thread } => with_fields(
                json!({ "type": "vote_poll", "poll_id": poll_id, "choice": choice }),
                thread.wire_fields(false),
            ),
            Command::CreateGc { name, members } => {
                json!({ "type": "create_gc", "name": name, "members": members })
            }
            Command::History(ThreadKey::Main) => json!({ "type": "history_request" }),
            Command::History(ThreadKey::Dm(peer)) => json!({ "type": "dm_history", "peer": peer }),
            Command::History(ThreadKey::Gc(gcid)) => json!({ "type": "gc_history", "gcid": gcid }),
            Command::Typing { thread } => with_fields(json!({ "typing": true }), thread.wire_fields(true)),
            Command::Activity { active } => json!({ "type": "activity", "active": active }),
            Command::Ping { timestamp } => json!({ "type": "ping", "timestamp": timestamp }),
        }
    }

    /// The wire text of this command.
    pub fn encode(&self) -> String {
        self.to_json().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dm() -> ThreadKey {
        ThreadKey::Dm("bob".into())
    }

    #[test]
    fn test_post_on_main_omits_thread() {
        let v = Command::Post { text: "hi".into(), thread: ThreadKey::Main, reply_to_id: None }.to_json();
        assert_eq!(v, json!({"text": "hi"}));
    }

    #[test]
    fn test_post_with_reply_in_dm() {
        let v = Command::Post { text: "hi".into(), thread: dm(), reply_to_id: Some("7".into()) }.to_json();
        assert_eq!(v, json!({"text": "hi", "thread": "dm", "peer": "bob", "reply_to_id": "7"}));
    }

    #[test]
    fn test_delete_names_main_explicitly() {
        let v = Command::Delete { id: "1".into(), thread: ThreadKey::Main }.to_json();
        assert_eq!(v, json!({"type": "delete_message", "id": "1", "thread": "main"}));
    }

    #[test]
    fn test_edit_on_main_omits_thread() {
        let v = Command::Edit { id: "1".into(), text: "x".into(), thread: ThreadKey::Main }.to_json();
        assert!(v.get("thread").is_none());
    }

    #[test]
    fn test_react_in_gc() {
        let v = Command::React { id: "1".into(), emoji: "👍".into(), thread: ThreadKey::Gc("g".into()) }.to_json();
        assert_eq!(v, json!({"type": "react_message", "id": "1", "emoji": "👍", "thread": "gc", "gcid": "g"}));
    }

    #[test]
    fn test_history_requests_per_thread() {
        assert_eq!(Command::History(ThreadKey::Main).to_json(), json!({"type": "history_request"}));
        assert_eq!(Command::History(dm()).to_json(), json!({"type": "dm_history", "peer": "bob"}));
        assert_eq!(
            Command::History(ThreadKey::Gc("g".into())).to_json(),
            json!({"type": "gc_history", "gcid": "g"})
        );
    }

    #[test]
    fn test_typing_and_ping() {
        assert_eq!(
            Command::Typing { thread: ThreadKey::Main }.to_json(),
            json!({"typing": true, "thread": "main"})
        );
        let wire: Value = serde_json::from_str(&Command::Ping { timestamp: 5 }.encode()).unwrap();
        assert_eq!(wire, json!({"type": "ping", "timestamp": 5}));
    }
}
