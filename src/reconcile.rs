//! # Stage: Edit/Reaction Reconciler
//!
//! ## Responsibility
//! Map a server's "re-emit the edited message under a new id" behaviour back
//! onto the original message identity, using a short-lived buffer of the
//! local user's recent edits and a fuzzy text comparison.
//!
//! ## Guarantees
//! - A matched recent edit collapses old + new into one record carrying the
//!   original id, marked `edited`
//! - A live match consumes its recent edit; it cannot be reused
//! - Deterministic: all time comparisons use the caller-supplied `now_ms`
//! - Bounded: at most `edit_buffer_cap` recent edits are retained
//!
//! ## NOT Responsible For
//! - Eliminating false merges or missed merges. Matching is heuristic: a
//!   recent edit that ages out before the server's re-emission arrives
//!   leaves a visible duplicate, and that is accepted.
//! - Proper `message_update` events, which the router patches directly

use std::collections::VecDeque;

use tracing::debug;

use crate::config::ReconcileConfig;
use crate::message::{merge_reactions, Message};
use crate::pending::OffThreadCache;
use crate::store::{dedupe_keep_last, MessageStore};
use crate::thread::ThreadKey;

/// Default shorter:longer length ratio accepted by [`texts_match`].
pub const DEFAULT_MATCH_RATIO: f64 = 0.8;

// ---------------------------------------------------------------------------
// Text matching
// ---------------------------------------------------------------------------

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
}

/// Strip zero-width characters, collapse whitespace runs to one space, trim.
pub fn normalize_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.chars().filter(|c| !is_zero_width(*c)) {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Fuzzy equality with the default ratio.
pub fn texts_match(a: &str, b: &str) -> bool {
    texts_match_with(a, b, DEFAULT_MATCH_RATIO)
}

/// Both normalised strings must be non-empty, and either equal, or the longer
/// contains the shorter and shorter:longer length ratio is at least `ratio`.
pub fn texts_match_with(a: &str, b: &str, ratio: f64) -> bool {
    let na = normalize_text(a);
    let nb = normalize_text(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    if na == nb {
        return true;
    }
    let (la, lb) = (na.chars().count(), nb.chars().count());
    let (shorter, longer, ls, ll) = if la < lb { (&na, &nb, la, lb) } else { (&nb, &na, lb, la) };
    let r = ls as f64 / ll.max(1) as f64;
    r >= ratio && longer.contains(shorter.as_str())
}

// ---------------------------------------------------------------------------
// Recent edit buffer
// ---------------------------------------------------------------------------

/// A local edit awaiting the server's possible re-emission.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentEdit {
    pub old_id: String,
    pub sender: String,
    pub text: String,
    pub thread: ThreadKey,
    pub time_ms: u64,
}

/// Bounded, time-windowed buffer of [`RecentEdit`]s, oldest first.
#[derive(Debug, Clone)]
pub struct RecentEdits {
    config: ReconcileConfig,
    entries: VecDeque<RecentEdit>,
}

impl Default for RecentEdits {
    fn default() -> Self {
        RecentEdits::new(ReconcileConfig::default())
    }
}

impl RecentEdits {
    pub fn new(config: ReconcileConfig) -> Self {
        RecentEdits { config, entries: VecDeque::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecentEdit> {
        self.entries.iter()
    }

    /// Record an edit, then prune entries older than the retain window and
    /// keep only the newest `edit_buffer_cap`.
    pub fn record(&mut self, edit: RecentEdit) {
        let now = edit.time_ms;
        self.entries.push_back(edit);
        let retain = self.config.edit_retain_ms;
        self.entries.retain(|e| now.saturating_sub(e.time_ms) < retain);
        while self.entries.len() > self.config.edit_buffer_cap {
            self.entries.pop_front();
        }
    }

    /// Drop entries that can no longer match anything.
    pub fn expire(&mut self, now_ms: u64) {
        let window = self.config.edit_match_window_ms;
        self.entries.retain(|e| now_ms.saturating_sub(e.time_ms) < window);
    }

    fn in_window(&self, e: &RecentEdit, thread: &ThreadKey, now_ms: u64) -> bool {
        &e.thread == thread && now_ms.saturating_sub(e.time_ms) < self.config.edit_match_window_ms
    }

    /// Index of the best live candidate for `text`: same thread, inside the
    /// match window, fuzzy text match, preferring one from `sender`.
    pub fn find_candidate(&self, thread: &ThreadKey, text: &str, sender: &str, now_ms: u64) -> Option<usize> {
        let ratio = self.config.match_ratio;
        let candidates: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| self.in_window(e, thread, now_ms) && texts_match_with(&e.text, text, ratio))
            .map(|(i, _)| i)
            .collect();
        candidates
            .iter()
            .copied()
            .find(|&i| self.entries[i].sender == sender)
            .or_else(|| candidates.first().copied())
    }

    /// Remove and return the entry at `idx`.
    pub fn take(&mut self, idx: usize) -> Option<RecentEdit> {
        self.entries.remove(idx)
    }

    /// Snapshot of the entries for `thread` still inside the match window.
    pub fn active_for(&self, thread: &ThreadKey, now_ms: u64) -> Vec<RecentEdit> {
        self.entries
            .iter()
            .filter(|e| self.in_window(e, thread, now_ms))
            .cloned()
            .collect()
    }

    pub fn match_ratio(&self) -> f64 {
        self.config.match_ratio
    }
}

// ---------------------------------------------------------------------------
// Live reconciliation
// ---------------------------------------------------------------------------

/// What happened to an inbound live message.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveOutcome {
    /// Merged onto the locally held original; nothing new to render.
    Merged { id: String },
    /// The original is not loaded; the message now carries the original id
    /// and still needs the ordinary upsert/append path.
    Rewritten(Message),
    /// Not a re-emitted edit.
    NoMatch(Message),
}

/// Try to fold `incoming` onto a recently edited message of `thread`.
pub fn reconcile_live(
    store: &mut MessageStore,
    edits: &mut RecentEdits,
    mut incoming: Message,
    thread: &ThreadKey,
    now_ms: u64,
) -> LiveOutcome {
    if !incoming.is_chat() || incoming.text_str().is_empty() {
        return LiveOutcome::NoMatch(incoming);
    }
    let Some(idx) = edits.find_candidate(thread, incoming.text_str(), &incoming.sender, now_ms) else {
        return LiveOutcome::NoMatch(incoming);
    };
    let Some(hit) = edits.take(idx) else {
        return LiveOutcome::NoMatch(incoming);
    };

    let old_id = hit.old_id;
    let merged = store.patch(&old_id, |original| {
        original.overlay(&incoming);
        original.id = old_id.clone();
        original.edited = true;
    });
    if merged {
        debug!(old_id = %old_id, dropped_id = %incoming.id, "re-emitted edit merged onto original");
        return LiveOutcome::Merged { id: old_id };
    }

    debug!(old_id = %old_id, new_id = %incoming.id, "re-emitted edit rewritten to original id");
    incoming.id = old_id;
    incoming.edited = true;
    LiveOutcome::Rewritten(incoming)
}

// ---------------------------------------------------------------------------
// History-load reconciliation
// ---------------------------------------------------------------------------

/// Collapse repeated ids keeping the first occurrence, in arrival order.
fn collapse_first(items: Vec<Message>) -> Vec<Message> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|m| !m.has_id() || seen.insert(m.id.clone()))
        .collect()
}

/// Reconcile a freshly loaded history page for `thread`:
/// replay the thread's off-thread cache, fold recent edits onto their
/// original ids (merging reaction sets), then dedupe by id.
///
/// Recent edits are not consumed here, so reloading the same thread inside
/// the window collapses the same pairs again.
pub fn reconcile_on_load(
    items: Vec<Message>,
    thread: &ThreadKey,
    edits: &RecentEdits,
    pending: &mut OffThreadCache,
    now_ms: u64,
) -> Vec<Message> {
    let mut base = collapse_first(items);
    pending.replay(thread, &mut base);

    let ratio = edits.match_ratio();
    for e in edits.active_for(thread, now_ms) {
        let matches = |m: &Message| m.text.as_deref().is_some_and(|t| texts_match_with(t, &e.text, ratio));
        let Some(idx) = base
            .iter()
            .position(|m| matches(m) && m.sender == e.sender)
            .or_else(|| base.iter().position(|m| matches(m)))
        else {
            continue;
        };

        match base.iter().position(|m| m.id == e.old_id) {
            Some(old_idx) if old_idx == idx => {
                base[idx].edited = true;
            }
            Some(old_idx) => {
                let cand = base[idx].clone();
                let mut merged = base[old_idx].clone();
                let mut reactions = merged.reactions.clone();
                merge_reactions(&mut reactions, &cand.reactions);
                merged.overlay(&cand);
                merged.id = e.old_id.clone();
                merged.edited = true;
                merged.reactions = reactions;
                base[old_idx] = merged;
                base.remove(idx);
            }
            None => {
                base[idx].id = e.old_id.clone();
                base[idx].edited = true;
            }
        }
    }

    dedupe_keep_last(base)
}
