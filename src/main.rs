use std::path::{Path, PathBuf};

use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use threadline::cli::{resolve_token, Args, Mode};
use threadline::client::{self, Action, ClientHandle};
use threadline::render::{describe, print_timeline};
use threadline::{ChatError, ClientConfig, Effect, Router, ThreadKey};

// ---------------------------------------------------------------------------
// Stdin line protocol
// ---------------------------------------------------------------------------

/// One parsed stdin line.
#[derive(Debug)]
enum Input {
    Act(Action),
    Show,
    Quit,
    Help,
    Bad(&'static str),
}

const HELP: &str = "\
:main | :dm <peer> | :gc <id>      switch thread
:reply <id> <text>                 reply to a message
:edit <id> <text>                  edit your message
:react <id> <emoji>                toggle a reaction
:delete <id>                       delete a message
:vote <poll-id> <choice>           vote in a poll
:newgc <name> [member...]          create a group chat
:upload <path>                     send a file
:ack                               dismiss the open alert
:show | :help | :quit
anything else is posted to the active thread";

/// `<id> <rest>` with a non-empty rest.
fn id_and_rest(args: &str) -> Option<(String, String)> {
    let (id, rest) = args.trim().split_once(char::is_whitespace)?;
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }
    Some((id.to_string(), rest.to_string()))
}

fn parse_input(line: &str) -> Input {
    let Some(cmd) = line.trim_start().strip_prefix(':') else {
        return Input::Act(Action::Post(line.to_string()));
    };
    let (name, args) = cmd.split_once(char::is_whitespace).unwrap_or((cmd, ""));
    let args = args.trim();
    match name {
        "main" => Input::Act(Action::Select(ThreadKey::Main)),
        "dm" if !args.is_empty() => Input::Act(Action::Select(ThreadKey::Dm(args.to_string()))),
        "gc" if !args.is_empty() => Input::Act(Action::Select(ThreadKey::Gc(args.to_string()))),
        "reply" => match id_and_rest(args) {
            Some((id, text)) => Input::Act(Action::Reply { id, text }),
            None => Input::Bad("usage: :reply <id> <text>"),
        },
        "edit" => match id_and_rest(args) {
            Some((id, text)) => Input::Act(Action::Edit { id, text }),
            None => Input::Bad("usage: :edit <id> <text>"),
        },
        "react" => match id_and_rest(args) {
            Some((id, emoji)) => Input::Act(Action::React { id, emoji }),
            None => Input::Bad("usage: :react <id> <emoji>"),
        },
        "delete" if !args.is_empty() => Input::Act(Action::Delete(args.to_string())),
        "vote" => match id_and_rest(args).and_then(|(id, n)| n.parse().ok().map(|c| (id, c))) {
            Some((poll_id, choice)) => Input::Act(Action::Vote { poll_id, choice }),
            None => Input::Bad("usage: :vote <poll-id> <choice>"),
        },
        "newgc" => {
            let mut parts = args.split_whitespace();
            match parts.next() {
                Some(name) => Input::Act(Action::CreateGc {
                    name: name.to_string(),
                    members: parts.map(str::to_string).collect(),
                }),
                None => Input::Bad("usage: :newgc <name> [member...]"),
            }
        }
        "upload" if !args.is_empty() => Input::Act(Action::Upload(PathBuf::from(args))),
        "ack" => Input::Act(Action::AcknowledgeAlert),
        "show" => Input::Show,
        "quit" | "q" => Input::Quit,
        "help" | "h" => Input::Help,
        _ => Input::Bad("unknown command; :help lists them"),
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

async fn show(handle: &ClientHandle) {
    match handle.snapshot().await {
        Ok(snap) => print_timeline(&snap),
        Err(e) => warn!(error = %e, "snapshot unavailable"),
    }
}

async fn run_connect(config: ClientConfig, token: String, thread: ThreadKey) -> threadline::Result<()> {
    let client::Client { handle, mut effects, task } = client::connect(&config, &token).await?;
    if thread != ThreadKey::Main {
        handle.send(Action::Select(thread)).await?;
    }

    let printer_handle = handle.clone();
    let printer = tokio::spawn(async move {
        while let Some(effect) = effects.recv().await {
            if let Some(line) = describe(&effect) {
                println!("{line}");
            }
            match effect {
                Effect::ScrollToBottom => show(&printer_handle).await,
                Effect::Logout => break,
                _ => {}
            }
        }
    });

    println!("{}", "Connected. :help for commands.".bright_cyan());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let sent = match parse_input(&line) {
            Input::Act(action) => handle.send(action).await,
            Input::Show => {
                show(&handle).await;
                Ok(())
            }
            Input::Help => {
                println!("{HELP}");
                Ok(())
            }
            Input::Bad(usage) => {
                println!("{}", usage.yellow());
                Ok(())
            }
            Input::Quit => break,
        };
        if let Err(ChatError::NotConnected) = sent {
            warn!("session is gone");
            break;
        }
    }

    let _ = handle.send(Action::Close).await;
    let outcome = match task.await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "session task failed");
            Ok(())
        }
    };
    printer.abort();
    outcome
}

fn run_replay(config: &ClientConfig, file: &Path, me: &str, thread: ThreadKey) -> threadline::Result<()> {
    let text = std::fs::read_to_string(file)?;
    let mut router = Router::new(me, "user", config);
    router.select_thread(thread);

    let start = client::now_ms();
    let mut frames = 0usize;
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        frames += 1;
        let now = start + n as u64 * config.timers.tick_ms.max(1);
        for effect in router.handle_frame(line, now) {
            if let Some(desc) = describe(&effect) {
                println!("{desc}");
            }
        }
        router.tick(now);
    }
    info!(frames, file = %file.display(), "replay finished");
    print_timeline(&router.snapshot());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::resolve(args.config.as_deref())?;

    match args.command {
        Mode::Connect { token, thread } => {
            let token = resolve_token(token, |k| std::env::var(k).ok())
                .ok_or("no token: pass --token or set THREADLINE_TOKEN")?;
            run_connect(config, token, thread).await?;
        }
        Mode::Replay { file, me, thread } => run_replay(&config, &file, &me, thread)?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_posts() {
        assert!(matches!(parse_input("hello there"), Input::Act(Action::Post(t)) if t == "hello there"));
    }

    #[test]
    fn test_thread_switches() {
        assert!(matches!(parse_input(":main"), Input::Act(Action::Select(ThreadKey::Main))));
        assert!(matches!(
            parse_input(":dm bob"),
            Input::Act(Action::Select(ThreadKey::Dm(p))) if p == "bob"
        ));
        assert!(matches!(parse_input(":dm"), Input::Bad(_)));
    }

    #[test]
    fn test_edit_keeps_spaces_in_text() {
        match parse_input(":edit 42 fixed  the typo") {
            Input::Act(Action::Edit { id, text }) => {
                assert_eq!(id, "42");
                assert_eq!(text, "fixed  the typo");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_vote_needs_numeric_choice() {
        assert!(matches!(
            parse_input(":vote p1 2"),
            Input::Act(Action::Vote { choice: 2, .. })
        ));
        assert!(matches!(parse_input(":vote p1 two"), Input::Bad(_)));
    }

    #[test]
    fn test_newgc_members() {
        match parse_input(":newgc team alice bob") {
            Input::Act(Action::CreateGc { name, members }) => {
                assert_eq!(name, "team");
                assert_eq!(members, vec!["alice".to_string(), "bob".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(parse_input(":dance"), Input::Bad(_)));
        assert!(matches!(parse_input(":q"), Input::Quit));
    }

    #[test]
    fn test_replay_renders_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        std::fs::write(
            &path,
            "{\"type\":\"history\",\"items\":[{\"id\":\"1\",\"sender\":\"bob\",\"text\":\"hi\"}]}\n\nnot json\n",
        )
        .unwrap();
        run_replay(&ClientConfig::default(), &path, "me", ThreadKey::Main).unwrap();
    }
}
