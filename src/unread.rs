//! Unread counters per thread plus the roster/presence bookkeeping the
//! router needs to label notifications.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::message::{lenient_opt_string, lenient_string};
use crate::thread::ThreadKey;

// ---------------------------------------------------------------------------
// Unread counters
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct UnreadTracker {
    counts: HashMap<ThreadKey, u32>,
}

impl UnreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&mut self, thread: ThreadKey) -> u32 {
        let c = self.counts.entry(thread).or_insert(0);
        *c = c.saturating_add(1);
        *c
    }

    pub fn reset(&mut self, thread: &ThreadKey) {
        self.counts.remove(thread);
    }

    pub fn get(&self, thread: &ThreadKey) -> u32 {
        self.counts.get(thread).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().copied().fold(0u32, u32::saturating_add)
    }

    /// Non-zero counters, ordered by thread key.
    pub fn snapshot(&self) -> BTreeMap<ThreadKey, u32> {
        self.counts
            .iter()
            .filter(|(_, c)| **c > 0)
            .map(|(k, c)| (k.clone(), *c))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Roster / presence
// ---------------------------------------------------------------------------

/// A group chat as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChat {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl GroupChat {
    pub fn label(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("Group")
    }
}

/// Online users, admins, activity flags, known groups and per-peer DM blocks.
#[derive(Debug, Default, Clone)]
pub struct Presence {
    users: Vec<String>,
    admins: HashSet<String>,
    activity: BTreeMap<String, bool>,
    groups: Vec<GroupChat>,
    blocked_dm: HashMap<String, bool>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the online roster. `admins` and `activity` are only replaced
    /// when the frame carried them.
    pub fn set_user_list(
        &mut self,
        users: Vec<String>,
        admins: Option<Vec<String>>,
        activity: Option<BTreeMap<String, bool>>,
    ) {
        self.users = users;
        if let Some(a) = admins {
            self.admins = a.into_iter().collect();
        }
        if let Some(a) = activity {
            self.activity = a;
        }
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn is_online(&self, user: &str) -> bool {
        self.users.iter().any(|u| u == user)
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.admins.contains(user)
    }

    /// Last reported activity flag (`true` = active).
    pub fn is_active(&self, user: &str) -> Option<bool> {
        self.activity.get(user).copied()
    }

    pub fn groups(&self) -> &[GroupChat] {
        &self.groups
    }

    pub fn has_group(&self, id: &str) -> bool {
        self.groups.iter().any(|g| g.id == id)
    }

    pub fn group_label(&self, id: &str) -> String {
        self.groups
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.label().to_string())
            .unwrap_or_else(|| "Group".to_string())
    }

    /// Replace the group list; returns the newest group not previously known.
    pub fn replace_groups(&mut self, incoming: Vec<GroupChat>) -> Option<GroupChat> {
        let known: HashSet<&str> = self.groups.iter().map(|g| g.id.as_str()).collect();
        let newest = incoming.iter().rev().find(|g| !known.contains(g.id.as_str())).cloned();
        self.groups = incoming;
        newest
    }

    pub fn rename_group(&mut self, id: &str, name: Option<String>) {
        if let Some(g) = self.groups.iter_mut().find(|g| g.id == id) {
            if let Some(n) = name {
                g.name = Some(n);
            }
        }
    }

    pub fn remove_group(&mut self, id: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.id != id);
        before != self.groups.len()
    }

    pub fn set_blocked(&mut self, peer: &str, blocked: bool) {
        self.blocked_dm.insert(peer.to_string(), blocked);
    }

    pub fn is_blocked(&self, peer: &str) -> bool {
        self.blocked_dm.get(peer).copied().unwrap_or(false)
    }
}
