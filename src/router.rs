//! # Stage: Router
//!
//! ## Responsibility
//! Single entry point for every inbound frame and every local user action.
//! Owns the active thread, the message store, the recent-edit buffer, the
//! off-thread cache, unread counters, roster caches and all timers, and turns
//! each input into a list of [`Effect`]s for the shell to carry out.
//!
//! ## Guarantees
//! - Frames are applied one at a time, in the order they are handed in.
//! - The active thread is plain router state, read fresh on every frame; a
//!   thread switch is visible to the very next frame.
//! - Never panics and never fails on inbound input: malformed frames and
//!   stale references are dropped.
//! - A frame tagged for one thread never mutates the list of another.
//!
//! ## NOT Responsible For
//! - Sockets, HTTP, wall-clock time (see `client`)
//! - Rendering (see `render`)

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::command::Command;
use crate::config::ClientConfig;
use crate::error::{ChatError, Result};
use crate::event::{Alert, Prompt, ServerEvent, TextUpdate, LOGOUT_CODES};
use crate::mention::mentions_me;
use crate::message::{toggle_reaction, Message, MessageKind, ReplyRef};
use crate::pending::{OffThreadCache, TextPatch};
use crate::preflight::{self, Draft, Sender};
use crate::reconcile::{reconcile_live, reconcile_on_load, LiveOutcome, RecentEdit, RecentEdits};
use crate::store::MessageStore;
use crate::thread::ThreadKey;
use crate::timers::{MuteStep, Timers};
use crate::unread::{Presence, UnreadTracker};

/// Sender name the server uses for AI replies.
pub const AI_SENDER: &str = "AI";

const DUPLICATE_LOGIN_ERROR: &str = "Username already online. Pick a different name.";

/// Transient sidebar toasts. Only raised while the sidebar is collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toast {
    Dm { user: String },
    Mention { thread: ThreadKey, label: String },
    GcInvite { gcid: String, label: String },
}

/// What acknowledging the open alert does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    Dismiss,
    CancelMute,
    Logout,
}

/// Side effects the shell must carry out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(Command),
    Notify { title: String, body: String },
    Toast(Toast),
    /// Open (or retitle) the blocking alert.
    Alert { text: String, on_ack: AlertAction },
    CloseAlert,
    Prompt(Prompt),
    ScrollToBottom,
    /// Drop the remembered username, optionally leaving a login error.
    ForgetUsername { login_error: Option<String> },
    Logout,
}

/// Point-in-time view of the router, detached from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub me: String,
    pub active: ThreadKey,
    pub active_label: String,
    pub messages: Vec<Message>,
    pub unread: BTreeMap<ThreadKey, u32>,
    pub typing: Vec<String>,
    pub flashing: Vec<String>,
    pub reply_to: Option<ReplyRef>,
}

fn notify(title: impl Into<String>, body: impl Into<String>) -> Effect {
    Effect::Notify { title: title.into(), body: body.into() }
}

/// Trim, drop trailing periods, upper-case the first letter.
pub fn normalize_alert_text(text: &str) -> String {
    let t = text.trim().trim_end_matches('.');
    let mut chars = t.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The client-side chat state machine.
#[derive(Debug)]
pub struct Router {
    me: String,
    role: String,
    active: ThreadKey,
    store: MessageStore,
    history_ids: HashSet<String>,
    edits: RecentEdits,
    pending: OffThreadCache,
    unread: UnreadTracker,
    presence: Presence,
    timers: Timers,
    reaction_cap: usize,
    hidden: bool,
    sidebar_open: bool,
    reply_to: Option<ReplyRef>,
    alert: Option<AlertAction>,
}

impl Router {
    pub fn new(me: impl Into<String>, role: impl Into<String>, config: &ClientConfig) -> Self {
        Router {
            me: me.into(),
            role: role.into(),
            active: ThreadKey::Main,
            store: MessageStore::new(),
            history_ids: HashSet::new(),
            edits: RecentEdits::new(config.reconcile.clone()),
            pending: OffThreadCache::new(),
            unread: UnreadTracker::new(),
            presence: Presence::new(),
            timers: Timers::new(&config.timers),
            reaction_cap: config.reconcile.reaction_cap,
            hidden: false,
            sidebar_open: true,
            reply_to: None,
            alert: None,
        }
    }

    // -- accessors ------------------------------------------------------------

    pub fn me(&self) -> &str {
        &self.me
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn active(&self) -> &ThreadKey {
        &self.active
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn unread(&self) -> &UnreadTracker {
        &self.unread
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn pending(&self) -> &OffThreadCache {
        &self.pending
    }

    pub fn recent_edits(&self) -> &RecentEdits {
        &self.edits
    }

    pub fn typing(&self) -> Vec<String> {
        self.timers.typing.typing()
    }

    pub fn flashing(&self) -> Vec<String> {
        self.timers.flash.flashing()
    }

    pub fn is_flashing(&self, id: &str) -> bool {
        self.timers.flash.is_flashing(id)
    }

    pub fn reply_to(&self) -> Option<&ReplyRef> {
        self.reply_to.as_ref()
    }

    pub fn alert_open(&self) -> Option<AlertAction> {
        self.alert
    }

    pub fn is_muted(&self) -> bool {
        self.timers.mute.is_active()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// A copy of everything a view needs to draw the active thread.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            me: self.me.clone(),
            active: self.active.clone(),
            active_label: self.thread_label(&self.active),
            messages: self.store.messages().to_vec(),
            unread: self.unread.snapshot(),
            typing: self.typing(),
            flashing: self.flashing(),
            reply_to: self.reply_to.clone(),
        }
    }

    // -- inbound ---------------------------------------------------------------

    /// The socket just opened: fetch the active thread.
    pub fn on_open(&self) -> Vec<Effect> {
        vec![Effect::Send(Command::History(self.active.clone()))]
    }

    /// Apply one raw text frame.
    pub fn handle_frame(&mut self, raw: &str, now_ms: u64) -> Vec<Effect> {
        match ServerEvent::parse(raw) {
            Some(event) => self.handle_event(event, now_ms),
            None => {
                debug!(len = raw.len(), "dropping malformed or unknown frame");
                Vec::new()
            }
        }
    }

    /// Apply one parsed event.
    pub fn handle_event(&mut self, event: ServerEvent, now_ms: u64) -> Vec<Effect> {
        let mut fx = Vec::new();
        match event {
            ServerEvent::Alert(a) => self.on_alert(a, now_ms, &mut fx),
            ServerEvent::UserList(u) => self.presence.set_user_list(u.users, u.admins, u.user_activity),
            ServerEvent::GcList(groups) => {
                if let Some(newest) = self.presence.replace_groups(groups) {
                    let label = newest.label().to_string();
                    self.toast(Toast::GcInvite { gcid: newest.id, label }, &mut fx);
                }
                if let Some(gcid) = self.active.gc_id() {
                    if !self.presence.has_group(gcid) {
                        info!(gcid, "active group no longer listed, returning to main");
                        fx.extend(self.enter_thread(ThreadKey::Main));
                    }
                }
            }
            ServerEvent::GcSettings { gcid, name } => self.presence.rename_group(&gcid, name),
            ServerEvent::GcCreated { gcid } => fx.extend(self.enter_thread(ThreadKey::Gc(gcid))),
            ServerEvent::GcDeleted { gcid } => {
                self.presence.remove_group(&gcid);
                if self.active.gc_id() == Some(gcid.as_str()) {
                    fx.extend(self.enter_thread(ThreadKey::Main));
                }
            }
            ServerEvent::GcMemberJoined { gcid, user } => self.on_member(&gcid, &user, true, now_ms, &mut fx),
            ServerEvent::GcMemberLeft { gcid, user } => self.on_member(&gcid, &user, false, now_ms, &mut fx),
            ServerEvent::Presence { user, action } => {
                if self.active.is_main() {
                    let action = match action.to_lowercase().as_str() {
                        "join" => "has joined chat".to_string(),
                        "leave" => "has left chat".to_string(),
                        _ => action,
                    };
                    fx.push(notify(user.clone(), action.clone()));
                    self.store.push_local(Message::system("presence", format!("{user} {action}"), now_ms));
                }
            }
            ServerEvent::History(items) => self.on_history(ThreadKey::Main, items, now_ms, &mut fx),
            ServerEvent::DmHistory { peer, items } => match peer {
                Some(peer) => self.on_history(ThreadKey::Dm(peer), items, now_ms, &mut fx),
                None => debug!("dm history without peer dropped"),
            },
            ServerEvent::GcHistory { gcid, items } => match gcid {
                Some(gcid) => self.on_history(ThreadKey::Gc(gcid), items, now_ms, &mut fx),
                None => debug!("gc history without gcid dropped"),
            },
            ServerEvent::Live(msg) => self.on_live(msg, now_ms, &mut fx),
            ServerEvent::System(msg) => self.on_system(msg, &mut fx),
            ServerEvent::MessageUpdate(u) => self.on_text_update(u),
            ServerEvent::ReactionUpdate(u) => {
                let Some(key) = u.scope.key() else {
                    debug!(id = %u.id, "reaction update for unresolvable thread dropped");
                    return fx;
                };
                if key != self.active {
                    if let Some(r) = u.reactions {
                        self.pending.put_reactions(key, u.id, r);
                    }
                } else {
                    let reactions = u.reactions.unwrap_or_default();
                    self.store.patch(&u.id, |m| m.reactions = reactions);
                }
            }
            ServerEvent::PollUpdate { id, fields } => {
                self.store.patch(&id, |m| m.extra.extend(fields));
            }
            ServerEvent::StreamUpdate(u) => {
                if u.scope.is_for(&self.active) {
                    self.timers.stream.push(u.id, u.text.unwrap_or_default(), now_ms);
                }
            }
            ServerEvent::Typing(t) => {
                if t.user != self.me && t.scope.is_for(&self.active) {
                    self.timers.typing.observe(&t.user, t.typing, now_ms);
                }
            }
            ServerEvent::Flash { id } => self.timers.flash.ping(&id, now_ms),
            ServerEvent::Delete(d) => {
                if d.scope.is_for(&self.active) {
                    self.store.delete_by_id(&d.id);
                }
            }
            ServerEvent::Clear(scope) => {
                if scope.is_for(&self.active) {
                    self.store.clear();
                }
            }
            ServerEvent::Prompt(p) => fx.push(Effect::Prompt(p)),
            ServerEvent::Pong => debug!("pong"),
        }
        fx
    }

    fn toast(&self, toast: Toast, fx: &mut Vec<Effect>) {
        if !self.sidebar_open {
            fx.push(Effect::Toast(toast));
        }
    }

    fn on_alert(&mut self, a: Alert, now_ms: u64, fx: &mut Vec<Effect>) {
        match a.code.as_str() {
            "MUTED" => {
                let secs = a.seconds.filter(|s| s.is_finite() && *s > 0.0).unwrap_or(0.0) as u64;
                let text = self.timers.mute.start(secs, now_ms);
                self.alert = Some(AlertAction::CancelMute);
                fx.push(Effect::Alert { text, on_ack: AlertAction::CancelMute });
            }
            "DM_BLOCKED" | "DM_UNBLOCKED" => {
                if let Some(peer) = self.active.dm_peer() {
                    let peer = peer.to_string();
                    self.presence.set_blocked(&peer, a.code == "DM_BLOCKED");
                }
            }
            code => {
                self.timers.mute.cancel();
                let logout = LOGOUT_CODES.contains(&code);
                match code {
                    "DUPLICATE" => fx.push(Effect::ForgetUsername {
                        login_error: Some(DUPLICATE_LOGIN_ERROR.to_string()),
                    }),
                    "ACCOUNT_DELETED" | "REMOVED" | "RESET" => {
                        fx.push(Effect::ForgetUsername { login_error: None })
                    }
                    _ => {}
                }
                let on_ack = if logout { AlertAction::Logout } else { AlertAction::Dismiss };
                self.alert = Some(on_ack);
                fx.push(Effect::Alert { text: normalize_alert_text(&a.text), on_ack });
            }
        }
    }

    fn on_member(&mut self, gcid: &str, user: &str, joined: bool, now_ms: u64, fx: &mut Vec<Effect>) {
        if !self.presence.has_group(gcid) {
            return;
        }
        let label = self.presence.group_label(gcid);
        let text = if joined {
            format!("{user} has joined the group")
        } else {
            format!("{user} has left the group")
        };
        if self.active.gc_id() == Some(gcid) {
            let prefix = if joined { "gc-presence-join" } else { "gc-presence-leave" };
            self.store.push_local(Message::system(prefix, text.clone(), now_ms));
        }
        if user != self.me {
            let title = if joined { format!("New member in {label}") } else { format!("Member left {label}") };
            fx.push(notify(title, text));
        }
    }

    fn on_history(&mut self, thread: ThreadKey, items: Vec<Message>, now_ms: u64, fx: &mut Vec<Effect>) {
        if thread != self.active {
            debug!(%thread, active = %self.active, "history for inactive thread dropped");
            return;
        }
        let loaded = reconcile_on_load(items, &thread, &self.edits, &mut self.pending, now_ms);
        self.history_ids = loaded.iter().filter(|m| m.has_id()).map(|m| m.id.clone()).collect();
        self.store.replace_all(loaded);
        debug!(%thread, count = self.store.len(), "history loaded");
        fx.push(Effect::ScrollToBottom);
    }

    fn on_text_update(&mut self, u: TextUpdate) {
        let Some(key) = u.scope.key() else {
            debug!(id = %u.id, "text update for unresolvable thread dropped");
            return;
        };
        if key != self.active {
            self.pending.put_text(key, u.id, TextPatch { text: u.text, edited: Some(true) });
            return;
        }
        self.store.patch(&u.id, |m| {
            if u.text.is_some() {
                m.text = u.text;
            }
            m.edited = true;
        });
    }

    fn on_system(&mut self, msg: Message, fx: &mut Vec<Effect>) {
        if msg.thread_key().as_ref() != Some(&self.active) {
            return;
        }
        let text = msg.text_str().to_string();
        fx.push(notify("SYSTEM", text.clone()));
        if text.to_lowercase().contains("cleared the chat") {
            let mut line = msg;
            line.sender = "SYSTEM".to_string();
            self.store.replace_all(vec![line]);
        } else {
            self.store.append(msg);
        }
    }

    fn thread_label(&self, key: &ThreadKey) -> String {
        match key {
            ThreadKey::Main => "Main Chat".to_string(),
            ThreadKey::Dm(peer) => peer.clone(),
            ThreadKey::Gc(gcid) => self.presence.group_label(gcid),
        }
    }

    /// AI replies stream as repeated `message` frames with one id.
    fn on_ai_chunk(&mut self, msg: Message, key: ThreadKey, fx: &mut Vec<Effect>) {
        let on_thread = key == self.active;
        if !msg.text_str().trim().is_empty() && (!on_thread || self.hidden) {
            let title = match &key {
                ThreadKey::Main => "AI replied in Main Chat".to_string(),
                ThreadKey::Dm(peer) => format!("AI replied in DM with {peer}"),
                ThreadKey::Gc(_) => format!("AI replied in GC: {}", self.thread_label(&key)),
            };
            fx.push(notify(title, msg.text_str()));
        }
        if !on_thread {
            return;
        }
        let chunk = msg.text_str().to_string();
        let grown = self.store.patch(&msg.id, |m| {
            let mut text = m.text.take().unwrap_or_default();
            text.push_str(&chunk);
            m.text = Some(text);
        });
        if !grown {
            self.store.append(msg);
        }
    }

    /// Notifications and unread counters for a chat message. Returns `false`
    /// when the message belongs to another thread and must not be rendered.
    fn route_chat(&mut self, msg: &Message, key: &ThreadKey, fx: &mut Vec<Effect>) -> bool {
        let from_me = msg.sender == self.me;
        let on_thread = *key == self.active;
        match key {
            ThreadKey::Dm(peer) => {
                let title = format!("{} sent you a message (DM)", msg.sender);
                if !on_thread {
                    self.unread.bump(key.clone());
                    if !from_me {
                        fx.push(notify(title, msg.notify_body()));
                    }
                    let user = if from_me { peer.clone() } else { msg.sender.clone() };
                    self.toast(Toast::Dm { user }, fx);
                    return false;
                }
                if self.hidden && !from_me {
                    fx.push(notify(title, msg.notify_body()));
                }
                true
            }
            ThreadKey::Gc(gcid) => {
                let label = self.presence.group_label(gcid);
                let title = format!("{} in {label}", msg.sender);
                if !on_thread {
                    fx.push(notify(title, msg.notify_body()));
                    self.unread.bump(key.clone());
                    if !from_me && mentions_me(msg.text_str(), &self.me) {
                        self.toast(Toast::Mention { thread: key.clone(), label }, fx);
                    }
                    return false;
                }
                if self.hidden {
                    fx.push(notify(title, msg.notify_body()));
                }
                true
            }
            ThreadKey::Main => {
                if msg.sender.is_empty() {
                    return on_thread;
                }
                let mention = !from_me && mentions_me(msg.text_str(), &self.me);
                if (!on_thread || self.hidden) && mention {
                    self.unread.bump(ThreadKey::Main);
                }
                if !on_thread && mention {
                    self.toast(Toast::Mention { thread: ThreadKey::Main, label: "Main Chat".into() }, fx);
                }
                if (!on_thread && !from_me) || (self.hidden && (mention || !from_me)) {
                    fx.push(notify(format!("{} (Main)", msg.sender), msg.notify_body()));
                }
                on_thread
            }
        }
    }

    fn on_live(&mut self, msg: Message, now_ms: u64, fx: &mut Vec<Effect>) {
        let Some(key) = msg.thread_key() else {
            debug!(id = %msg.id, "live message for unresolvable thread dropped");
            return;
        };

        if msg.kind == MessageKind::Message && msg.sender == AI_SENDER && msg.has_id() {
            self.on_ai_chunk(msg, key, fx);
            return;
        }

        if msg.is_chat() {
            self.timers.typing.message_from(&msg.sender);
            if !self.route_chat(&msg, &key, fx) {
                return;
            }
        }
        if key != self.active {
            return;
        }

        let msg = match reconcile_live(&mut self.store, &mut self.edits, msg, &key, now_ms) {
            LiveOutcome::Merged { id } => {
                self.maybe_flash(&id, now_ms);
                return;
            }
            LiveOutcome::Rewritten(m) => {
                // The original left the list (deleted or cleared); the echo
                // takes its place under the original id.
                self.store.forget_seen(&m.id);
                m
            }
            LiveOutcome::NoMatch(m) => m,
        };

        if msg.has_id() {
            let id = msg.id.clone();
            if self.store.upsert_by_id(&msg) {
                self.maybe_flash(&id, now_ms);
                return;
            }
            if self.store.has_seen(&id) {
                debug!(%id, "already rendered, not appending");
                return;
            }
        }
        let id = msg.id.clone();
        if self.store.append(msg) && !id.is_empty() {
            self.maybe_flash(&id, now_ms);
        }
    }

    /// Live mentions of me by others flash once; history never flashes.
    fn maybe_flash(&mut self, id: &str, now_ms: u64) {
        if self.history_ids.contains(id) {
            return;
        }
        let Some(m) = self.store.get(id) else { return };
        if m.sender != self.me && mentions_me(m.text_str(), &self.me) {
            self.timers.flash.start_once(id, now_ms);
        }
    }

    // -- timers ----------------------------------------------------------------

    /// Advance every timer to `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Effect> {
        let mut fx = Vec::new();
        for user in self.timers.typing.tick(now_ms) {
            debug!(%user, "typing expired");
        }
        for id in self.timers.flash.tick(now_ms) {
            debug!(%id, "flash cleared");
        }
        for step in self.timers.mute.tick(now_ms) {
            match step {
                MuteStep::Update(text) => fx.push(Effect::Alert { text, on_ack: AlertAction::CancelMute }),
                MuteStep::Expired => {
                    if self.alert == Some(AlertAction::CancelMute) {
                        self.alert = None;
                    }
                    fx.push(Effect::CloseAlert);
                }
            }
        }
        for (id, text) in self.timers.stream.tick(now_ms) {
            self.store.patch(&id, |m| m.text = Some(text));
        }
        self.edits.expire(now_ms);
        fx
    }

    /// Cancel every timer (teardown).
    pub fn shutdown(&mut self) {
        self.timers.cancel_all();
    }

    // -- local actions -----------------------------------------------------------

    fn enter_thread(&mut self, key: ThreadKey) -> Vec<Effect> {
        info!(from = %self.active, to = %key, "switching thread");
        self.active = key.clone();
        self.store.clear();
        self.history_ids.clear();
        self.timers.typing.clear();
        self.timers.stream.clear();
        self.reply_to = None;
        self.unread.reset(&key);
        vec![Effect::Send(Command::History(key))]
    }

    /// Switch the active thread: reset its unread count and request exactly
    /// one history page. Selecting the current thread does nothing.
    pub fn select_thread(&mut self, key: ThreadKey) -> Vec<Effect> {
        if key == self.active {
            return Vec::new();
        }
        self.enter_thread(key)
    }

    /// Commit an inline edit: send it, patch locally, remember it.
    pub fn commit_edit(&mut self, id: &str, text: &str, now_ms: u64) -> Result<Vec<Effect>> {
        if !self.store.contains(id) {
            return Err(ChatError::UnknownMessage(id.to_string()));
        }
        let text = text.to_string();
        self.store.patch(id, |m| {
            m.text = Some(text.clone());
            m.edited = true;
        });
        self.edits.record(RecentEdit {
            old_id: id.to_string(),
            sender: self.me.clone(),
            text: text.clone(),
            thread: self.active.clone(),
            time_ms: now_ms,
        });
        Ok(vec![Effect::Send(Command::Edit { id: id.to_string(), text, thread: self.active.clone() })])
    }

    /// Toggle my `emoji` reaction on `id`.
    pub fn react(&mut self, id: &str, emoji: &str) -> Result<Vec<Effect>> {
        if emoji.is_empty() {
            return Err(ChatError::Validation("Pick an emoji".to_string()));
        }
        let msg = self.store.get(id).ok_or_else(|| ChatError::UnknownMessage(id.to_string()))?;
        if !msg.reactions.contains_key(emoji) && msg.reaction_keys() >= self.reaction_cap {
            return Err(ChatError::TooManyReactions { limit: self.reaction_cap });
        }
        let me = self.me.clone();
        self.store.patch(id, |m| toggle_reaction(&mut m.reactions, emoji, &me));
        Ok(vec![Effect::Send(Command::React {
            id: id.to_string(),
            emoji: emoji.to_string(),
            thread: self.active.clone(),
        })])
    }

    /// Optimistically remove `id`, then ask the server to delete it.
    pub fn delete_message(&mut self, id: &str) -> Vec<Effect> {
        self.store.delete_by_id(id);
        vec![Effect::Send(Command::Delete { id: id.to_string(), thread: self.active.clone() })]
    }

    /// Start replying to `id`.
    pub fn start_reply(&mut self, id: &str) -> Result<ReplyRef> {
        let msg = self.store.get(id).ok_or_else(|| ChatError::UnknownMessage(id.to_string()))?;
        let reply = ReplyRef::preview(msg);
        self.reply_to = Some(reply.clone());
        Ok(reply)
    }

    pub fn cancel_reply(&mut self) {
        self.reply_to = None;
    }

    /// Send a draft after pre-flight checks.
    pub fn post(&mut self, draft: &str) -> Result<Vec<Effect>> {
        let who = Sender { is_admin: self.is_admin(), in_dm: self.active.dm_peer().is_some() };
        let thread = self.active.clone();
        let fx = match preflight::check(draft, who)? {
            Draft::Empty => Vec::new(),
            Draft::OpenPrompt(p) => vec![Effect::Prompt(p)],
            Draft::Command(text) | Draft::Ai { text, .. } => {
                self.reply_to = None;
                vec![Effect::Send(Command::Post { text, thread, reply_to_id: None })]
            }
            Draft::Post(text) => {
                let reply_to_id = self.reply_to.take().map(|r| r.id);
                vec![Effect::Send(Command::Post { text, thread, reply_to_id }), Effect::ScrollToBottom]
            }
        };
        Ok(fx)
    }

    /// Post an already uploaded file to the thread it was uploaded from.
    pub fn send_media(&mut self, url: &str, mime: &str, thread: ThreadKey) -> Vec<Effect> {
        let mut fx = vec![Effect::Send(Command::Media { url: url.to_string(), mime: mime.to_string(), thread: thread.clone() })];
        if thread == self.active {
            fx.push(Effect::ScrollToBottom);
        }
        fx
    }

    pub fn vote_poll(&mut self, poll_id: &str, choice: usize) -> Result<Vec<Effect>> {
        let poll = self.store.get(poll_id).ok_or_else(|| ChatError::UnknownMessage(poll_id.to_string()))?;
        if poll.kind != MessageKind::Poll {
            return Err(ChatError::Validation("That message is not a poll".to_string()));
        }
        Ok(vec![Effect::Send(Command::VotePoll {
            poll_id: poll_id.to_string(),
            choice,
            thread: self.active.clone(),
        })])
    }

    pub fn create_gc(&mut self, name: &str, members: Vec<String>) -> Result<Vec<Effect>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::Validation("Group name required".to_string()));
        }
        Ok(vec![Effect::Send(Command::CreateGc { name: name.to_string(), members })])
    }

    /// Typing ping for the current draft; blank drafts send nothing.
    pub fn typing_ping(&self, draft: &str) -> Vec<Effect> {
        if draft.trim().is_empty() {
            return Vec::new();
        }
        vec![Effect::Send(Command::Typing { thread: self.active.clone() })]
    }

    /// Acknowledge the open alert.
    pub fn acknowledge_alert(&mut self) -> Vec<Effect> {
        let mut fx = vec![Effect::CloseAlert];
        match self.alert.take() {
            Some(AlertAction::CancelMute) => self.timers.mute.cancel(),
            Some(AlertAction::Logout) => fx.push(Effect::Logout),
            Some(AlertAction::Dismiss) | None => {}
        }
        fx
    }

    /// Surface a local error as a blocking alert.
    pub fn reject(&mut self, err: &ChatError) -> Vec<Effect> {
        self.alert = Some(AlertAction::Dismiss);
        vec![Effect::Alert { text: err.to_string(), on_ack: AlertAction::Dismiss }]
    }

    pub fn stop_flashing(&mut self, id: &str) {
        self.timers.flash.stop(id);
    }

    /// A flashing message scrolled into view.
    pub fn observe_flash(&mut self, id: &str, now_ms: u64) {
        self.timers.flash.observe(id, now_ms);
    }

    /// Window visibility changed; the server is told about activity.
    pub fn set_hidden(&mut self, hidden: bool) -> Vec<Effect> {
        if self.hidden == hidden {
            return Vec::new();
        }
        self.hidden = hidden;
        vec![Effect::Send(Command::Activity { active: !hidden })]
    }

    pub fn set_sidebar_open(&mut self, open: bool) {
        self.sidebar_open = open;
    }
}
