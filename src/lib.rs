//! Threadline: the client core of a multi-thread chat application.
//!
//! One WebSocket carries events for the main room, direct messages and group
//! chats. [`router::Router`] routes them to the active thread, buffers
//! off-thread edits, reconciles the user's own edits and reactions against
//! server echoes, and drives typing, flash, stream and mute timers. The
//! [`client`] module wraps the router in a tokio task bound to a live socket.

pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod mention;
pub mod message;
pub mod pending;
pub mod preflight;
pub mod reconcile;
pub mod render;
pub mod router;
pub mod store;
pub mod thread;
pub mod timers;
pub mod token;
pub mod unread;
pub mod upload;

pub use client::{connect, Action, Client, ClientHandle};
pub use command::Command;
pub use config::ClientConfig;
pub use error::{ChatError, Result};
pub use event::ServerEvent;
pub use message::Message;
pub use router::{Effect, Router, Snapshot};
pub use thread::ThreadKey;
