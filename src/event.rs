//! Inbound frame parsing.
//!
//! Frames are JSON objects with a `type` discriminator. Parsing is total:
//! anything that is not valid JSON, has no `type`, or does not have the shape
//! its type requires comes back as `None` and is dropped by the router.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::message::{lenient_opt_string, lenient_string, reactions_from_value, Message, Reactions};
use crate::thread::ThreadFields;
use crate::unread::GroupChat;

/// Codes of `alert` frames that end the session after the alert is shown.
pub const LOGOUT_CODES: &[&str] = &[
    "KICKED",
    "BANNED",
    "BANNED_CONNECT",
    "DUPLICATE",
    "ACCOUNT_DELETED",
    "REMOVED",
    "RESET",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Alert {
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(default)]
    pub seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserList {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub admins: Option<Vec<String>>,
    #[serde(default)]
    pub user_activity: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct History {
    pub items: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub peer: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub gcid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextUpdate {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(flatten)]
    pub scope: ThreadFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionUpdate {
    pub id: String,
    /// `None` when the frame carried no reaction object.
    pub reactions: Option<Reactions>,
    pub scope: ThreadFields,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Typing {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user: String,
    #[serde(default)]
    pub typing: bool,
    #[serde(flatten)]
    pub scope: ThreadFields,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scoped {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(flatten)]
    pub scope: ThreadFields,
}

/// Server-initiated prompts that open a local modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Unban { banned: Vec<String> },
    Unmute { muted: Vec<String> },
    Users { users: Vec<String> },
    Poll,
    Reset,
    CreateGc,
}

/// One parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Alert(Alert),
    UserList(UserList),
    GcList(Vec<GroupChat>),
    GcSettings { gcid: String, name: Option<String> },
    GcCreated { gcid: String },
    GcDeleted { gcid: String },
    GcMemberJoined { gcid: String, user: String },
    GcMemberLeft { gcid: String, user: String },
    Presence { user: String, action: String },
    History(Vec<Message>),
    DmHistory { peer: Option<String>, items: Vec<Message> },
    GcHistory { gcid: Option<String>, items: Vec<Message> },
    /// `message`, `media` or `poll`.
    Live(Message),
    System(Message),
    MessageUpdate(TextUpdate),
    ReactionUpdate(ReactionUpdate),
    PollUpdate { id: String, fields: serde_json::Map<String, Value> },
    StreamUpdate(TextUpdate),
    Typing(Typing),
    Flash { id: String },
    Delete(Scoped),
    Clear(ThreadFields),
    Prompt(Prompt),
    Pong,
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(v: &Value, key: &str) -> Option<Vec<String>> {
    let list = v.get(key)?.as_array()?;
    Some(list.iter().filter_map(|x| x.as_str().map(String::from)).collect())
}

/// History items that fail to decode individually are skipped; the page
/// itself still loads.
fn decode_items(items: Vec<Value>) -> Vec<Message> {
    items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<Message>(v).ok())
        .collect()
}

fn decode<T: for<'de> Deserialize<'de>>(v: Value) -> Option<T> {
    serde_json::from_value(v).ok()
}

impl ServerEvent {
    /// Parse one raw text frame.
    pub fn parse(raw: &str) -> Option<ServerEvent> {
        let v: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(v)
    }

    /// Classify an already-decoded frame.
    pub fn from_value(v: Value) -> Option<ServerEvent> {
        if !v.is_object() {
            return None;
        }
        let kind = v.get("type").and_then(Value::as_str)?.to_string();
        let event = match kind.as_str() {
            "alert" => ServerEvent::Alert(decode(v)?),
            "user_list" => ServerEvent::UserList(decode(v)?),
            "gc_list" => {
                let gcs = v.get("gcs")?.as_array()?.clone();
                ServerEvent::GcList(gcs.into_iter().filter_map(decode).collect())
            }
            "gc_settings" => ServerEvent::GcSettings {
                gcid: str_field(&v, "gcid")?,
                name: str_field(&v, "name"),
            },
            "gc_created" => ServerEvent::GcCreated { gcid: str_field(&v, "gcid")? },
            "gc_deleted" => ServerEvent::GcDeleted { gcid: str_field(&v, "gcid")? },
            "gc_member_joined" => ServerEvent::GcMemberJoined {
                gcid: str_field(&v, "gcid")?,
                user: str_field(&v, "user")?,
            },
            "gc_member_left" => ServerEvent::GcMemberLeft {
                gcid: str_field(&v, "gcid")?,
                user: str_field(&v, "user")?,
            },
            "presence" => ServerEvent::Presence {
                user: str_field(&v, "user")?,
                action: str_field(&v, "action")?,
            },
            "history" => {
                let h: History = decode(v)?;
                ServerEvent::History(decode_items(h.items))
            }
            "dm_history" => {
                let h: History = decode(v)?;
                ServerEvent::DmHistory { peer: h.peer, items: decode_items(h.items) }
            }
            "gc_history" => {
                let h: History = decode(v)?;
                ServerEvent::GcHistory { gcid: h.gcid, items: decode_items(h.items) }
            }
            "message" | "media" | "poll" => ServerEvent::Live(decode(v)?),
            "system" => ServerEvent::System(decode(v)?),
            "message_update" => {
                let u: TextUpdate = decode(v)?;
                if u.id.is_empty() {
                    return None;
                }
                ServerEvent::MessageUpdate(u)
            }
            "reaction_update" => {
                let id = str_field(&v, "id")?;
                let reactions = match v.get("reactions") {
                    Some(r @ Value::Object(_)) => Some(reactions_from_value(r.clone())),
                    _ => None,
                };
                let scope: ThreadFields = decode(v)?;
                ServerEvent::ReactionUpdate(ReactionUpdate { id, reactions, scope })
            }
            "poll_update" => {
                let id = str_field(&v, "id")?;
                let mut fields = serde_json::Map::new();
                for key in ["counts", "total_voters", "votes"] {
                    if let Some(x) = v.get(key).filter(|x| !x.is_null()) {
                        fields.insert(key.to_string(), x.clone());
                    }
                }
                ServerEvent::PollUpdate { id, fields }
            }
            "update" => {
                let u: TextUpdate = decode(v)?;
                if u.id.is_empty() {
                    return None;
                }
                ServerEvent::StreamUpdate(u)
            }
            "typing" => ServerEvent::Typing(decode(v)?),
            "flash" => ServerEvent::Flash { id: str_field(&v, "id")? },
            "delete" => {
                let d: Scoped = decode(v)?;
                if d.id.is_empty() {
                    return None;
                }
                ServerEvent::Delete(d)
            }
            "clear" => ServerEvent::Clear(decode(v)?),
            "unban_prompt" => ServerEvent::Prompt(Prompt::Unban { banned: string_list(&v, "banned")? }),
            "unmute_prompt" => ServerEvent::Prompt(Prompt::Unmute { muted: string_list(&v, "muted")? }),
            "users_prompt" => ServerEvent::Prompt(Prompt::Users { users: string_list(&v, "users")? }),
            "poll_prompt" => ServerEvent::Prompt(Prompt::Poll),
            "reset_prompt" => ServerEvent::Prompt(Prompt::Reset),
            "gc_prompt" => ServerEvent::Prompt(Prompt::CreateGc),
            "pong" => ServerEvent::Pong,
            _ => return None,
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadKey;
    use serde_json::json;

    fn parse(v: Value) -> Option<ServerEvent> {
        ServerEvent::parse(&v.to_string())
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(ServerEvent::parse("not json").is_none());
        assert!(ServerEvent::parse("[1,2]").is_none());
        assert!(ServerEvent::parse("{}").is_none());
        assert!(parse(json!({"type": "mystery"})).is_none());
    }

    #[test]
    fn test_live_message() {
        match parse(json!({"type": "message", "id": 3, "sender": "a", "text": "hi", "thread": "dm", "peer": "b"})) {
            Some(ServerEvent::Live(m)) => {
                assert_eq!(m.id, "3");
                assert_eq!(m.thread_key(), Some(ThreadKey::Dm("b".into())));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_history_skips_bad_items() {
        match parse(json!({"type": "gc_history", "gcid": "g", "items": [{"id": "1"}, 5, {"id": "2"}]})) {
            Some(ServerEvent::GcHistory { gcid, items }) => {
                assert_eq!(gcid.as_deref(), Some("g"));
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_history_requires_items_array() {
        assert!(parse(json!({"type": "history", "items": "nope"})).is_none());
    }

    #[test]
    fn test_reaction_update_with_and_without_map() {
        match parse(json!({"type": "reaction_update", "id": "1", "reactions": {"👍": ["a"]}, "thread": "gc", "gcid": "g"})) {
            Some(ServerEvent::ReactionUpdate(u)) => {
                assert_eq!(u.reactions.unwrap()["👍"].len(), 1);
                assert_eq!(u.scope.key(), Some(ThreadKey::Gc("g".into())));
            }
            other => panic!("unexpected {other:?}"),
        }
        match parse(json!({"type": "reaction_update", "id": "1"})) {
            Some(ServerEvent::ReactionUpdate(u)) => assert!(u.reactions.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_update_without_id_dropped() {
        assert!(parse(json!({"type": "message_update", "text": "x"})).is_none());
        assert!(parse(json!({"type": "update", "text": "x"})).is_none());
        assert!(parse(json!({"type": "delete"})).is_none());
    }

    #[test]
    fn test_poll_update_collects_known_fields() {
        match parse(json!({"type": "poll_update", "id": "p", "counts": [1], "total_voters": 1, "junk": true})) {
            Some(ServerEvent::PollUpdate { id, fields }) => {
                assert_eq!(id, "p");
                assert_eq!(fields.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_prompts() {
        assert_eq!(
            parse(json!({"type": "unban_prompt", "banned": ["x"]})),
            Some(ServerEvent::Prompt(Prompt::Unban { banned: vec!["x".into()] }))
        );
        assert!(parse(json!({"type": "unmute_prompt"})).is_none());
        assert_eq!(parse(json!({"type": "gc_prompt"})), Some(ServerEvent::Prompt(Prompt::CreateGc)));
    }

    #[test]
    fn test_alert_fields() {
        match parse(json!({"type": "alert", "code": "MUTED", "seconds": 90, "text": "muted."})) {
            Some(ServerEvent::Alert(a)) => {
                assert_eq!(a.code, "MUTED");
                assert_eq!(a.seconds, Some(90.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_gc_list_requires_array() {
        assert!(parse(json!({"type": "gc_list"})).is_none());
        match parse(json!({"type": "gc_list", "gcs": [{"id": "1", "name": "a"}, {"bad": 1}]})) {
            Some(ServerEvent::GcList(g)) => assert_eq!(g.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
