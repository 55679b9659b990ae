//! # Stage: Message Store
//!
//! ## Responsibility
//! Hold the ordered message list of the active thread and the set of ids that
//! have already been rendered for it.
//!
//! ## Guarantees
//! - Ids are unique within the list after every mutation (last occurrence wins)
//! - `dedupe_keep_last` is idempotent and preserves survivor order
//! - Operations naming an unknown id are no-ops, never errors
//!
//! ## NOT Responsible For
//! - Deciding whether an event belongs to the active thread (the router does)
//! - Edit reconciliation (see `reconcile`)

use std::collections::HashSet;

use crate::message::Message;

/// Keep only the last occurrence of every id, preserving the relative order
/// of the survivors. Records without an id are always kept.
pub fn dedupe_keep_last(list: Vec<Message>) -> Vec<Message> {
    let mut seen: HashSet<String> = HashSet::with_capacity(list.len());
    let mut out: Vec<Message> = Vec::with_capacity(list.len());
    for m in list.into_iter().rev() {
        if m.has_id() && !seen.insert(m.id.clone()) {
            continue;
        }
        out.push(m);
    }
    out.reverse();
    out
}

/// The active thread's rendered timeline.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
    /// Ids already rendered for this thread (history or earlier appends).
    seen: HashSet<String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.position(id).map(|i| &self.messages[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        if id.is_empty() {
            return None;
        }
        self.messages.iter().position(|m| m.id == id)
    }

    /// Overlay `msg` onto the existing record with the same id. Returns
    /// `false` (and changes nothing) when the id is not present; the caller
    /// decides whether to append instead.
    pub fn upsert_by_id(&mut self, msg: &Message) -> bool {
        match self.position(&msg.id) {
            Some(idx) => {
                self.messages[idx].overlay(msg);
                self.normalize();
                true
            }
            None => false,
        }
    }

    /// Append `msg` unless its id was already rendered for this thread.
    pub fn append(&mut self, msg: Message) -> bool {
        if msg.has_id() {
            if self.seen.contains(&msg.id) {
                return false;
            }
            self.seen.insert(msg.id.clone());
        }
        self.messages.push(msg);
        self.normalize();
        true
    }

    /// Drop `id` from the seen set so a later `append` with it goes through.
    pub fn forget_seen(&mut self, id: &str) -> bool {
        self.seen.remove(id)
    }

    /// Append a locally synthesised line without touching the seen set.
    pub fn push_local(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// Remove every record with `id`.
    pub fn delete_by_id(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        before != self.messages.len()
    }

    /// Bulk replace on history load; the seen set is rebuilt from the new ids.
    pub fn replace_all(&mut self, list: Vec<Message>) {
        self.messages = dedupe_keep_last(list);
        self.seen = self
            .messages
            .iter()
            .filter(|m| m.has_id())
            .map(|m| m.id.clone())
            .collect();
    }

    /// Wipe the list (a `clear` event or a thread switch).
    pub fn clear(&mut self) {
        self.messages.clear();
        self.seen.clear();
    }

    /// Apply `f` to the record with `id`. No-op for unknown ids.
    pub fn patch<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Message),
    {
        match self.position(id) {
            Some(idx) => {
                f(&mut self.messages[idx]);
                self.normalize();
                true
            }
            None => false,
        }
    }

    /// Direct access for the reconciler; callers must leave the list
    /// normalised, which `normalize` does.
    pub(crate) fn messages_mut(&mut self) -> &mut Vec<Message> {
        &mut self.messages
    }

    pub(crate) fn normalize(&mut self) {
        let list = std::mem::take(&mut self.messages);
        self.messages = dedupe_keep_last(list);
    }
}
