use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::thread::ThreadKey;

#[derive(Parser, Debug)]
#[command(name = "threadline")]
#[command(version)]
#[command(about = "Terminal chat client: one socket, many threads")]
pub struct Args {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (e.g. "info", "threadline=debug")
    #[arg(long, global = true, default_value = "threadline=info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Connect to the chat server and read actions from stdin
    Connect {
        /// Bearer token; falls back to THREADLINE_TOKEN
        #[arg(long)]
        token: Option<String>,

        /// Thread to open first: main, dm:<peer> or gc:<id>
        #[arg(long, default_value = "main", value_parser = parse_thread)]
        thread: ThreadKey,
    },
    /// Feed a JSONL capture of server frames through the router offline
    Replay {
        /// One server frame per line
        file: PathBuf,

        /// Username to replay as
        #[arg(long, default_value = "me")]
        me: String,

        /// Thread that is active during the replay
        #[arg(long, default_value = "main", value_parser = parse_thread)]
        thread: ThreadKey,
    },
}

/// clap value parser for `main` / `dm:<peer>` / `gc:<id>`.
pub fn parse_thread(s: &str) -> Result<ThreadKey, String> {
    ThreadKey::parse(s).ok_or_else(|| format!("invalid thread '{s}': expected main, dm:<peer> or gc:<id>"))
}

/// Token from the flag, else from `THREADLINE_TOKEN`.
pub fn resolve_token<F>(flag: Option<String>, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    flag.or_else(|| lookup("THREADLINE_TOKEN"))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_connect_minimal() {
        let args = Args::parse_from(["tl", "connect"]);
        assert_eq!(args.log_level, "threadline=info");
        match args.command {
            Mode::Connect { token, thread } => {
                assert!(token.is_none());
                assert_eq!(thread, ThreadKey::Main);
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn test_args_parse_connect_full() {
        let args = Args::parse_from([
            "tl",
            "--config",
            "chat.toml",
            "--log-level",
            "debug",
            "connect",
            "--token",
            "a.b.c",
            "--thread",
            "dm:bob",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("chat.toml")));
        assert_eq!(args.log_level, "debug");
        match args.command {
            Mode::Connect { token, thread } => {
                assert_eq!(token.as_deref(), Some("a.b.c"));
                assert_eq!(thread, ThreadKey::Dm("bob".into()));
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn test_args_parse_replay() {
        let args = Args::parse_from(["tl", "replay", "frames.jsonl", "--me", "alice", "--thread", "gc:g1"]);
        match args.command {
            Mode::Replay { file, me, thread } => {
                assert_eq!(file, PathBuf::from("frames.jsonl"));
                assert_eq!(me, "alice");
                assert_eq!(thread, ThreadKey::Gc("g1".into()));
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn test_bad_thread_rejected() {
        assert!(Args::try_parse_from(["tl", "connect", "--thread", "room:1"]).is_err());
    }

    #[test]
    fn test_resolve_token_prefers_flag() {
        let env = |_: &str| Some("from-env".to_string());
        assert_eq!(resolve_token(Some("flag".into()), env), Some("flag".into()));
        assert_eq!(resolve_token(None, env), Some("from-env".into()));
        assert_eq!(resolve_token(None, |_| Some("  ".into())), None);
    }
}
