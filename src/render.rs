//! Terminal rendering of a [`Snapshot`].
//!
//! Plain-text lines are built first and colour is applied on top, so the
//! layout can be tested without a terminal.

use chrono::{DateTime, Local};
use colored::*;

use crate::message::{Message, MessageKind};
use crate::router::{Effect, Snapshot, Toast};

/// `HH:MM` in local time for an RFC 3339 timestamp; empty when absent or
/// unparseable.
pub fn clock(timestamp: Option<&str>) -> String {
    timestamp
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Reactions as `🎉1 👍2`, in emoji order.
pub fn reaction_line(msg: &Message) -> String {
    msg.reactions
        .iter()
        .map(|(emoji, users)| format!("{emoji}{}", users.len()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The uncoloured body of one timeline row.
pub fn body(msg: &Message) -> String {
    match msg.kind {
        MessageKind::Media => {
            let url = msg.extra.get("url").and_then(|v| v.as_str()).unwrap_or("");
            format!("[media] {url}").trim_end().to_string()
        }
        MessageKind::Poll => {
            let question = msg.extra.get("question").and_then(|v| v.as_str()).unwrap_or("");
            format!("[poll] {question}").trim_end().to_string()
        }
        _ => msg.text_str().to_string(),
    }
}

fn row(msg: &Message, me: &str, flashing: bool) -> String {
    let time = clock(msg.timestamp.as_deref());
    if msg.kind == MessageKind::System {
        return format!("{} {}", time.dimmed(), body(msg).italic().dimmed());
    }
    let sender = if msg.sender == me { msg.sender.green().bold() } else { msg.sender.bright_yellow().bold() };
    let mut text = body(msg).normal();
    if flashing {
        text = text.on_bright_black().bold();
    }
    let mut line = format!("{} {}: {}", time.dimmed(), sender, text);
    if msg.edited {
        line.push_str(&format!(" {}", "(edited)".dimmed()));
    }
    let reactions = reaction_line(msg);
    if !reactions.is_empty() {
        line.push_str(&format!("  {reactions}"));
    }
    if let Some(reply) = &msg.reply_to {
        let quote = format!("  ↪ {}: {}", reply.sender, reply.text);
        line = format!("{}\n{}", quote.dimmed(), line);
    }
    line
}

/// Print the active thread's timeline plus the unread counters.
pub fn print_timeline(snap: &Snapshot) {
    println!("{}", format!("── {} ──", snap.active_label).bright_cyan().bold());
    for msg in &snap.messages {
        println!("{}", row(msg, &snap.me, snap.flashing.contains(&msg.id)));
    }
    if !snap.typing.is_empty() {
        println!("{}", format!("{} typing…", snap.typing.join(", ")).dimmed());
    }
    if let Some(reply) = &snap.reply_to {
        println!("{}", format!("replying to {}: {}", reply.sender, reply.text).bright_magenta());
    }
    let unread: Vec<String> = snap
        .unread
        .iter()
        .filter(|(k, n)| **n > 0 && **k != snap.active)
        .map(|(k, n)| format!("{k} ({n})"))
        .collect();
    if !unread.is_empty() {
        println!("{}: {}", "Unread".bright_yellow(), unread.join(", "));
    }
}

/// One-line description of a UI effect, or `None` for effects with nothing
/// to show.
pub fn describe(effect: &Effect) -> Option<String> {
    match effect {
        Effect::Notify { title, body } => Some(format!("{} {}", title.bright_white().bold(), body)),
        Effect::Toast(Toast::Dm { user }) => Some(format!("{} {user}", "New DM from".bright_magenta())),
        Effect::Toast(Toast::Mention { thread, label }) => {
            Some(format!("{} {label} ({thread})", "Mentioned in".bright_magenta()))
        }
        Effect::Toast(Toast::GcInvite { label, .. }) => {
            Some(format!("{} {label}", "Added to group".bright_magenta()))
        }
        Effect::Alert { text, .. } => Some(format!("{} {text}", "[!]".red().bold())),
        Effect::Prompt(p) => Some(format!("{} {p:?}", "Prompt:".bright_yellow())),
        Effect::ForgetUsername { login_error: Some(e) } => Some(e.red().to_string()),
        Effect::Logout => Some("Logged out".red().bold().to_string()),
        Effect::Send(_)
        | Effect::CloseAlert
        | Effect::ScrollToBottom
        | Effect::ForgetUsername { login_error: None } => None,
    }
}
