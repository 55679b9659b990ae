//! Connection shell: a tokio task that owns the [`Router`].
//!
//! ## Design
//! - The router lives inside one task; callers talk to it through an
//!   [`Action`] channel, so the active thread is only ever read and written
//!   by the task applying frames.
//! - One `select!` loop multiplexes socket frames, user actions, the timer
//!   tick, the keepalive ping, the health check and finished uploads.
//! - `Effect::Send` is written to the socket here; every other effect is
//!   forwarded to the UI channel. That channel is unbounded: a UI that is
//!   itself waiting on [`ClientHandle::snapshot`] must never stall the loop.
//! - Uploads and health checks run in spawned tasks and never stall frames.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::{ClientConfig, TimerConfig};
use crate::error::{ChatError, Result};
use crate::router::{Effect, Router, Snapshot};
use crate::thread::ThreadKey;
use crate::token::decode_claims;
use crate::upload::{ApiClient, Uploaded};

/// Current Unix epoch in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A user action for the session task.
#[derive(Debug)]
pub enum Action {
    Select(ThreadKey),
    Post(String),
    /// Reply to `id` with `text`.
    Reply { id: String, text: String },
    CancelReply,
    Edit { id: String, text: String },
    React { id: String, emoji: String },
    Delete(String),
    Vote { poll_id: String, choice: usize },
    CreateGc { name: String, members: Vec<String> },
    /// Upload a file, then post it to the thread that was active when the
    /// upload started.
    Upload(PathBuf),
    /// The draft changed.
    Typing(String),
    AcknowledgeAlert,
    StopFlashing(String),
    ObserveFlash(String),
    SetHidden(bool),
    SetSidebarOpen(bool),
    Snapshot(oneshot::Sender<Snapshot>),
    Close,
}

/// Cheap, cloneable sender side of a session.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::Sender<Action>,
}

impl ClientHandle {
    pub async fn send(&self, action: Action) -> Result<()> {
        self.tx.send(action).await.map_err(|_| ChatError::NotConnected)
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Action::Snapshot(tx)).await?;
        rx.await.map_err(|_| ChatError::NotConnected)
    }
}

/// A running session.
#[derive(Debug)]
pub struct Client {
    pub handle: ClientHandle,
    /// Effects for the UI: everything except socket sends.
    pub effects: mpsc::UnboundedReceiver<Effect>,
    pub task: JoinHandle<Result<()>>,
}

/// Decode the token, open `{server_url}/ws/{token}` and start a session.
pub async fn connect(config: &ClientConfig, token: &str) -> Result<Client> {
    let claims = decode_claims(token)?;
    let url = config.socket_url(token);
    info!(server = %config.server_url, user = %claims.sub, "connecting");
    let (ws, _resp) = tokio_tungstenite::connect_async(url.as_str()).await?;
    info!(user = %claims.sub, "connected");
    let router = Router::new(claims.sub, claims.role, config);
    Ok(spawn_session(ws, router, ApiClient::new(config.api_base.clone()), config.timers.clone()))
}

/// Run a session over an already open socket.
pub fn spawn_session<S>(ws: S, router: Router, api: ApiClient, timers: TimerConfig) -> Client
where
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_session(ws, router, api, timers, rx, ui_tx));
    Client { handle: ClientHandle { tx }, effects: ui_rx, task }
}

fn every(ms: u64) -> tokio::time::Interval {
    let mut iv = tokio::time::interval(Duration::from_millis(ms.max(1)));
    iv.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    iv
}

struct Session<K> {
    router: Router,
    api: ApiClient,
    sink: K,
    ui: mpsc::UnboundedSender<Effect>,
    uploads: mpsc::Sender<(ThreadKey, Result<Uploaded>)>,
    closing: bool,
}

impl<K> Session<K>
where
    K: Sink<WsMessage, Error = WsError> + Unpin,
{
    async fn apply(&mut self, effects: Vec<Effect>) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::Send(cmd) => self.send(&cmd).await?,
                other => {
                    if matches!(other, Effect::Logout) {
                        self.closing = true;
                    }
                    if self.ui.send(other).is_err() {
                        debug!("ui receiver gone; effect dropped");
                    }
                }
            }
        }
        Ok(())
    }

    async fn send(&mut self, cmd: &Command) -> Result<()> {
        debug!(command = ?cmd, "send");
        self.sink.send(WsMessage::Text(cmd.encode())).await?;
        Ok(())
    }

    /// Fold a fallible local action into effects; errors become an alert.
    fn settle(&mut self, result: Result<Vec<Effect>>) -> Vec<Effect> {
        match result {
            Ok(fx) => fx,
            Err(e) => {
                debug!(error = %e, "local action rejected");
                self.router.reject(&e)
            }
        }
    }

    fn start_upload(&mut self, path: PathBuf) {
        let api = self.api.clone();
        let thread = self.router.active().clone();
        let user = self.router.me().to_string();
        let done = self.uploads.clone();
        tokio::spawn(async move {
            let result = api.upload_file(&path, &thread, &user).await;
            let _ = done.send((thread, result)).await;
        });
    }

    async fn on_action(&mut self, action: Action) -> Result<()> {
        let now = now_ms();
        let fx = match action {
            Action::Select(key) => self.router.select_thread(key),
            Action::Post(text) => {
                let r = self.router.post(&text);
                self.settle(r)
            }
            Action::Reply { id, text } => {
                let r = self.router.start_reply(&id).and_then(|_| self.router.post(&text));
                self.settle(r)
            }
            Action::CancelReply => {
                self.router.cancel_reply();
                Vec::new()
            }
            Action::Edit { id, text } => {
                let r = self.router.commit_edit(&id, &text, now);
                self.settle(r)
            }
            Action::React { id, emoji } => {
                let r = self.router.react(&id, &emoji);
                self.settle(r)
            }
            Action::Delete(id) => self.router.delete_message(&id),
            Action::Vote { poll_id, choice } => {
                let r = self.router.vote_poll(&poll_id, choice);
                self.settle(r)
            }
            Action::CreateGc { name, members } => {
                let r = self.router.create_gc(&name, members);
                self.settle(r)
            }
            Action::Upload(path) => {
                self.start_upload(path);
                Vec::new()
            }
            Action::Typing(draft) => self.router.typing_ping(&draft),
            Action::AcknowledgeAlert => self.router.acknowledge_alert(),
            Action::StopFlashing(id) => {
                self.router.stop_flashing(&id);
                Vec::new()
            }
            Action::ObserveFlash(id) => {
                self.router.observe_flash(&id, now);
                Vec::new()
            }
            Action::SetHidden(hidden) => self.router.set_hidden(hidden),
            Action::SetSidebarOpen(open) => {
                self.router.set_sidebar_open(open);
                Vec::new()
            }
            Action::Snapshot(reply) => {
                let _ = reply.send(self.router.snapshot());
                Vec::new()
            }
            Action::Close => {
                self.closing = true;
                Vec::new()
            }
        };
        self.apply(fx).await
    }

    async fn on_uploaded(&mut self, thread: ThreadKey, result: Result<Uploaded>) -> Result<()> {
        match result {
            Ok(up) => {
                let fx = self.router.send_media(&up.url, &up.mime, thread);
                self.apply(fx).await
            }
            Err(e) => {
                warn!(error = %e, "upload failed");
                let fx = self
                    .router
                    .reject(&ChatError::Validation("Failed to send message or upload file(s)".to_string()));
                self.apply(fx).await
            }
        }
    }
}

async fn run_session<S>(
    ws: S,
    router: Router,
    api: ApiClient,
    timers: TimerConfig,
    mut actions: mpsc::Receiver<Action>,
    ui: mpsc::UnboundedSender<Effect>,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Unpin,
{
    let (sink, mut stream) = ws.split();
    let (upload_tx, mut upload_rx) = mpsc::channel(8);
    let mut session = Session { router, api, sink, ui, uploads: upload_tx, closing: false };

    let opening = session.router.on_open();
    session.apply(opening).await?;

    let mut tick = every(timers.tick_ms);
    let mut keepalive = every(timers.keepalive_ms);
    let mut health = every(timers.health_check_ms);

    let outcome = loop {
        if session.closing {
            break Ok(());
        }
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        let fx = session.router.handle_frame(&text, now_ms());
                        if let Err(e) = session.apply(fx).await {
                            break Err(e);
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("socket closed by server");
                        break Ok(());
                    }
                    Some(Ok(_)) => {} // binary / ping / pong frames
                    Some(Err(e)) => break Err(e.into()),
                }
            }
            action = actions.recv() => {
                match action {
                    Some(action) => {
                        if let Err(e) = session.on_action(action).await {
                            break Err(e);
                        }
                    }
                    None => break Ok(()),
                }
            }
            Some((thread, result)) = upload_rx.recv() => {
                if let Err(e) = session.on_uploaded(thread, result).await {
                    break Err(e);
                }
            }
            _ = tick.tick() => {
                let fx = session.router.tick(now_ms());
                if let Err(e) = session.apply(fx).await {
                    break Err(e);
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = session.send(&Command::Ping { timestamp: now_ms() }).await {
                    break Err(e);
                }
            }
            _ = health.tick() => {
                if !session.router.is_hidden() {
                    let api = session.api.clone();
                    tokio::spawn(async move {
                        api.ping_health().await;
                    });
                }
            }
        }
    };

    session.router.shutdown();
    let _ = session.sink.close().await;
    info!("session ended");
    outcome
}
