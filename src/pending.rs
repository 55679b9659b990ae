//! Off-thread update cache.
//!
//! `message_update` and `reaction_update` events for a thread the user is not
//! viewing are parked here, keyed by `(ThreadKey, message id)`, and replayed
//! onto that thread's next history load. The whole per-thread entry is
//! discarded on replay whether or not every id matched: unmatched patches
//! refer to messages outside the loaded window.

use std::collections::HashMap;

use tracing::debug;

use crate::message::{merge_reactions, Message, Reactions};
use crate::thread::ThreadKey;

/// A buffered text edit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextPatch {
    pub text: Option<String>,
    pub edited: Option<bool>,
}

#[derive(Debug, Default, Clone)]
struct ThreadPatches {
    text: HashMap<String, TextPatch>,
    reactions: HashMap<String, Reactions>,
}

/// Per-thread buffered patches. The latest patch per message id wins.
#[derive(Debug, Default, Clone)]
pub struct OffThreadCache {
    threads: HashMap<ThreadKey, ThreadPatches>,
}

impl OffThreadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_text(&mut self, thread: ThreadKey, id: String, patch: TextPatch) {
        debug!(%thread, %id, "buffering off-thread text update");
        self.threads.entry(thread).or_default().text.insert(id, patch);
    }

    pub fn put_reactions(&mut self, thread: ThreadKey, id: String, reactions: Reactions) {
        debug!(%thread, %id, "buffering off-thread reaction update");
        self.threads.entry(thread).or_default().reactions.insert(id, reactions);
    }

    pub fn has_pending(&self, thread: &ThreadKey) -> bool {
        self.threads.contains_key(thread)
    }

    /// Total buffered patches across all threads.
    pub fn len(&self) -> usize {
        self.threads.values().map(|p| p.text.len() + p.reactions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Apply and discard everything buffered for `thread`.
    ///
    /// Text patches overwrite `text` (and `edited` when given); reaction
    /// patches are unioned with whatever the loaded record already carries.
    pub fn replay(&mut self, thread: &ThreadKey, loaded: &mut [Message]) {
        let Some(patches) = self.threads.remove(thread) else {
            return;
        };
        let mut applied = 0usize;
        for msg in loaded.iter_mut().filter(|m| m.has_id()) {
            if let Some(p) = patches.text.get(&msg.id) {
                if let Some(text) = &p.text {
                    msg.text = Some(text.clone());
                }
                if let Some(edited) = p.edited {
                    msg.edited = edited;
                }
                applied += 1;
            }
            if let Some(r) = patches.reactions.get(&msg.id) {
                merge_reactions(&mut msg.reactions, r);
                applied += 1;
            }
        }
        let buffered = patches.text.len() + patches.reactions.len();
        debug!(%thread, applied, dropped = buffered.saturating_sub(applied), "replayed off-thread updates");
    }
}
