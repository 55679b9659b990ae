//! # Stage: Pre-flight
//!
//! ## Responsibility
//! Classify a draft before it leaves the client: a plain post, an `@ai`
//! request, a slash command, or a local prompt. Malformed input is rejected
//! here with the text shown to the user.
//!
//! ## Guarantees
//! - Rejections never produce a socket send.
//! - Command names match case-insensitively, as the server treats them.
//!
//! ## NOT Responsible For
//! - Server-side authorisation (the server re-checks every command)

use crate::error::{ChatError, Result};
use crate::event::Prompt;

/// Commands only admins may send.
const ADMIN_ONLY: &[&str] = &[
    "kick", "ban", "unban", "clear", "pass", "mute", "unmute", "kicka", "mkadmin", "rmadmin",
    "locktag", "unlocktag", "purgeadmin", "mutea", "unmutea", "psa",
];

/// Commands anyone may send.
const PUBLIC: &[&str] = &["tag", "rmtag", "rjtag", "actag", "acptag", "dm", "clear"];

/// What a draft turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
    /// Nothing to send.
    Empty,
    /// Ordinary text post.
    Post(String),
    /// `@ai <prompt>`; the full text is sent, the server extracts the prompt.
    Ai { text: String, prompt: String },
    /// A slash command, sent verbatim.
    Command(String),
    /// A command that opens a local prompt instead of sending.
    OpenPrompt(Prompt),
}

/// Who is sending, and where.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sender {
    pub is_admin: bool,
    pub in_dm: bool,
}

fn usage(text: &str) -> ChatError {
    ChatError::Validation(text.to_string())
}

/// Split `/name rest` into a lowercased name and the remainder.
fn split_command(text: &str) -> Option<(String, &str)> {
    let body = text.trim_start().strip_prefix('/')?;
    let end = body.find(char::is_whitespace).unwrap_or(body.len());
    Some((body[..end].to_lowercase(), &body[end..]))
}

/// A `"quoted"` argument with non-empty content; returns the rest.
fn quoted(s: &str) -> Option<&str> {
    let s = s.trim_start().strip_prefix('"')?;
    let close = s.find('"')?;
    if close == 0 {
        return None;
    }
    Some(&s[close + 1..])
}

/// A quoted argument or one whitespace-free token; returns the rest.
fn quoted_or_word(s: &str) -> Option<&str> {
    if s.trim_start().starts_with('"') {
        return quoted(s);
    }
    let s = s.trim_start();
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some(&s[end..])
}

/// Whitespace, then one or more digits, then nothing else.
fn minutes_only(s: &str) -> bool {
    let has_gap = s.starts_with(char::is_whitespace);
    let t = s.trim();
    has_gap && !t.is_empty() && t.chars().all(|c| c.is_ascii_digit())
}

fn needs_gap(s: &str) -> bool {
    s.starts_with(char::is_whitespace)
}

fn admin_usage(name: &str, rest: &str) -> Result<()> {
    let ok = match name {
        "mute" => needs_gap(rest) && quoted_or_word(rest).is_some_and(minutes_only),
        "mutea" => minutes_only(rest),
        "kick" | "ban" | "psa" | "unmute" => {
            needs_gap(rest) && quoted(rest).is_some_and(|r| r.trim().is_empty())
        }
        "locktag" | "unlocktag" => {
            needs_gap(rest) && quoted_or_word(rest).is_some_and(|r| r.trim().is_empty())
        }
        _ => true,
    };
    if ok {
        return Ok(());
    }
    Err(usage(match name {
        "mute" => "Usage: /mute \"username\" minutes",
        "mutea" => "Usage: /muteA minutes",
        "kick" => "Usage: /kick \"username\"",
        "ban" => "Usage: /ban \"username\"",
        "psa" => "Usage: /psa \"message\"",
        "unmute" => "Usage: /unmute \"username\"",
        "locktag" => "Usage: /locktag \"username\"",
        _ => "Usage: /unlocktag \"username\"",
    }))
}

/// The prompt of an `@ai` draft, if the draft starts with `@ai`.
pub fn ai_prompt(text: &str) -> Option<String> {
    let t = text.trim_start();
    let head = t.get(..3)?;
    if !head.eq_ignore_ascii_case("@ai") {
        return None;
    }
    let rest = &t[3..];
    if rest.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some(rest.trim().to_string())
}

/// Classify `text`.
pub fn check(text: &str, who: Sender) -> Result<Draft> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Draft::Empty);
    }

    if let Some((name, rest)) = split_command(text) {
        if name == "poll" && rest.trim().is_empty() {
            return Ok(Draft::OpenPrompt(Prompt::Poll));
        }
        if !who.is_admin {
            let dm_clear = name == "clear" && rest.trim().is_empty() && who.in_dm;
            if !dm_clear && ADMIN_ONLY.contains(&name.as_str()) {
                return Err(usage("Only admin can use that command"));
            }
            if !PUBLIC.contains(&name.as_str()) {
                return Err(usage("Invalid command"));
            }
        } else {
            admin_usage(&name, rest)?;
        }
        return Ok(Draft::Command(trimmed.to_string()));
    }

    if let Some(prompt) = ai_prompt(text) {
        if prompt.is_empty() {
            return Err(usage("Usage: @ai <prompt>"));
        }
        return Ok(Draft::Ai { text: trimmed.to_string(), prompt });
    }

    Ok(Draft::Post(trimmed.to_string()))
}
