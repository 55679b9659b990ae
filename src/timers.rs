//! Deadline state machines for the UI timers.
//!
//! Each timer is `Idle -> Active(expires_at) -> Idle`, re-armed (never
//! stacked) by a superseding event and polled by the router's `tick(now)`.
//! Nothing here sleeps or spawns; dropping the owner cancels everything.

use std::collections::{HashMap, HashSet};

use crate::config::TimerConfig;

// ---------------------------------------------------------------------------
// Single and keyed deadlines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Idle,
    Active { expires_at: u64 },
}

impl TimerState {
    /// Arm (or re-arm) to fire `after_ms` from `now_ms`.
    pub fn arm(&mut self, now_ms: u64, after_ms: u64) {
        *self = TimerState::Active { expires_at: now_ms.saturating_add(after_ms) };
    }

    pub fn cancel(&mut self) {
        *self = TimerState::Idle;
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TimerState::Active { .. })
    }

    /// Returns `true` exactly once when the deadline has passed.
    pub fn fire(&mut self, now_ms: u64) -> bool {
        match *self {
            TimerState::Active { expires_at } if now_ms >= expires_at => {
                *self = TimerState::Idle;
                true
            }
            _ => false,
        }
    }
}

/// One independent deadline per key.
#[derive(Debug, Clone)]
pub struct KeyedTimers<K> {
    deadlines: HashMap<K, u64>,
}

impl<K> Default for KeyedTimers<K> {
    fn default() -> Self {
        KeyedTimers { deadlines: HashMap::new() }
    }
}

impl<K> KeyedTimers<K>
where
    K: std::hash::Hash + Eq + Clone + Ord,
{
    pub fn arm(&mut self, key: K, now_ms: u64, after_ms: u64) {
        self.deadlines.insert(key, now_ms.saturating_add(after_ms));
    }

    /// Bring a deadline forward; never pushes it later.
    pub fn arm_earlier(&mut self, key: K, now_ms: u64, after_ms: u64) {
        let at = now_ms.saturating_add(after_ms);
        let slot = self.deadlines.entry(key).or_insert(at);
        *slot = (*slot).min(at);
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Sorted keys currently armed.
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.deadlines.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Remove and return (sorted) every key whose deadline has passed.
    pub fn drain_expired(&mut self, now_ms: u64) -> Vec<K> {
        let mut fired: Vec<K> = self
            .deadlines
            .iter()
            .filter(|(_, at)| now_ms >= **at)
            .map(|(k, _)| k.clone())
            .collect();
        for k in &fired {
            self.deadlines.remove(k);
        }
        fired.sort();
        fired
    }
}

// ---------------------------------------------------------------------------
// Typing indicator
// ---------------------------------------------------------------------------

/// Who is typing in the active thread. Each sender expires independently.
#[derive(Debug, Clone)]
pub struct TypingTracker {
    expiry_ms: u64,
    senders: KeyedTimers<String>,
}

impl TypingTracker {
    pub fn new(expiry_ms: u64) -> Self {
        TypingTracker { expiry_ms, senders: KeyedTimers::default() }
    }

    /// `typing: true` refreshes the sender's expiry, `false` clears it.
    pub fn observe(&mut self, sender: &str, typing: bool, now_ms: u64) {
        if typing {
            self.senders.arm(sender.to_string(), now_ms, self.expiry_ms);
        } else {
            self.senders.cancel(&sender.to_string());
        }
    }

    /// A message from `sender` ends their typing indicator.
    pub fn message_from(&mut self, sender: &str) {
        self.senders.cancel(&sender.to_string());
    }

    pub fn clear(&mut self) {
        self.senders.clear();
    }

    pub fn typing(&self) -> Vec<String> {
        self.senders.keys()
    }

    pub fn tick(&mut self, now_ms: u64) -> Vec<String> {
        self.senders.drain_expired(now_ms)
    }
}

// ---------------------------------------------------------------------------
// Flash highlight
// ---------------------------------------------------------------------------

/// Temporary highlight of message ids.
///
/// A flash clears `linger_ms` after it is first seen on screen, or after
/// `fallback_ms` regardless. Mention flashes run at most once per id.
#[derive(Debug, Clone)]
pub struct FlashTracker {
    fallback_ms: u64,
    linger_ms: u64,
    active: KeyedTimers<String>,
    observed: HashSet<String>,
    done: HashSet<String>,
}

impl FlashTracker {
    pub fn new(fallback_ms: u64, linger_ms: u64) -> Self {
        FlashTracker {
            fallback_ms,
            linger_ms,
            active: KeyedTimers::default(),
            observed: HashSet::new(),
            done: HashSet::new(),
        }
    }

    /// An explicit `flash` ping from the server: (re)start the highlight.
    pub fn ping(&mut self, id: &str, now_ms: u64) {
        self.observed.remove(id);
        self.active.arm(id.to_string(), now_ms, self.fallback_ms);
    }

    /// A mention flash: starts only if this id never flashed before.
    pub fn start_once(&mut self, id: &str, now_ms: u64) -> bool {
        let key = id.to_string();
        if self.done.contains(id) || self.active.contains(&key) {
            return false;
        }
        self.active.arm(key, now_ms, self.fallback_ms);
        true
    }

    /// The highlighted message came into view.
    pub fn observe(&mut self, id: &str, now_ms: u64) {
        let key = id.to_string();
        if self.active.contains(&key) && self.observed.insert(key.clone()) {
            self.active.arm_earlier(key, now_ms, self.linger_ms);
        }
    }

    /// Stop immediately (hover/click); the id never flashes for a mention again.
    pub fn stop(&mut self, id: &str) -> bool {
        self.observed.remove(id);
        self.done.insert(id.to_string());
        self.active.cancel(&id.to_string())
    }

    pub fn is_flashing(&self, id: &str) -> bool {
        self.active.contains(&id.to_string())
    }

    pub fn flashing(&self) -> Vec<String> {
        self.active.keys()
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.observed.clear();
    }

    pub fn tick(&mut self, now_ms: u64) -> Vec<String> {
        let fired = self.active.drain_expired(now_ms);
        for id in &fired {
            self.observed.remove(id);
            self.done.insert(id.clone());
        }
        fired
    }
}

// ---------------------------------------------------------------------------
// Mute countdown
// ---------------------------------------------------------------------------

/// One step of the mute countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuteStep {
    Update(String),
    Expired,
}

/// `"You are muted. Time left: MM:SS"`.
pub fn mute_text(remaining_secs: u64) -> String {
    format!("You are muted. Time left: {:02}:{:02}", remaining_secs / 60, remaining_secs % 60)
}

#[derive(Debug, Clone)]
pub struct MuteCountdown {
    tick_ms: u64,
    remaining_secs: u64,
    timer: TimerState,
}

impl MuteCountdown {
    pub fn new(tick_ms: u64) -> Self {
        MuteCountdown { tick_ms, remaining_secs: 0, timer: TimerState::Idle }
    }

    /// Start (replacing any running countdown); returns the first text.
    pub fn start(&mut self, seconds: u64, now_ms: u64) -> String {
        self.remaining_secs = seconds;
        self.timer.arm(now_ms, self.tick_ms);
        mute_text(seconds)
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
        self.remaining_secs = 0;
    }

    pub fn is_active(&self) -> bool {
        self.timer.is_active()
    }

    pub fn remaining(&self) -> u64 {
        self.remaining_secs
    }

    /// Advance by however many whole ticks have elapsed.
    pub fn tick(&mut self, now_ms: u64) -> Vec<MuteStep> {
        let mut steps = Vec::new();
        while let TimerState::Active { expires_at } = self.timer {
            if now_ms < expires_at {
                break;
            }
            self.remaining_secs = self.remaining_secs.saturating_sub(1);
            if self.remaining_secs == 0 {
                self.timer.cancel();
                steps.push(MuteStep::Expired);
            } else {
                self.timer.arm(expires_at, self.tick_ms);
                steps.push(MuteStep::Update(mute_text(self.remaining_secs)));
            }
        }
        steps
    }
}

// ---------------------------------------------------------------------------
// Streaming text coalescer
// ---------------------------------------------------------------------------

/// Batches AI streaming `update` frames: every update inside one window is
/// applied in a single state change, in order of first arrival, with the
/// latest text per id.
#[derive(Debug, Clone)]
pub struct StreamCoalescer {
    window_ms: u64,
    pending: Vec<(String, String)>,
    timer: TimerState,
}

impl StreamCoalescer {
    pub fn new(window_ms: u64) -> Self {
        StreamCoalescer { window_ms, pending: Vec::new(), timer: TimerState::Idle }
    }

    pub fn push(&mut self, id: String, text: String, now_ms: u64) {
        match self.pending.iter_mut().find(|(pid, _)| *pid == id) {
            Some(slot) => slot.1 = text,
            None => self.pending.push((id, text)),
        }
        if !self.timer.is_active() {
            self.timer.arm(now_ms, self.window_ms);
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.timer.cancel();
    }

    /// The batch, once the window has elapsed.
    pub fn tick(&mut self, now_ms: u64) -> Vec<(String, String)> {
        if self.timer.fire(now_ms) {
            std::mem::take(&mut self.pending)
        } else {
            Vec::new()
        }
    }
}

/// Every timer the router owns, built from one [`TimerConfig`].
#[derive(Debug, Clone)]
pub struct Timers {
    pub typing: TypingTracker,
    pub flash: FlashTracker,
    pub mute: MuteCountdown,
    pub stream: StreamCoalescer,
}

impl Timers {
    pub fn new(config: &TimerConfig) -> Self {
        Timers {
            typing: TypingTracker::new(config.typing_expiry_ms),
            flash: FlashTracker::new(config.flash_fallback_ms, config.flash_linger_ms),
            mute: MuteCountdown::new(config.mute_tick_ms),
            stream: StreamCoalescer::new(config.stream_coalesce_ms),
        }
    }

    /// Cancel everything (teardown).
    pub fn cancel_all(&mut self) {
        self.typing.clear();
        self.flash.clear();
        self.mute.cancel();
        self.stream.clear();
    }
}
