//! Unix domain socket server for IPC
//!
//! Provides request-response access to the shortcut service and pushes
//! events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::events::ShortcutEvent;
use crate::hotkey::{Action, HotkeyError, ShortcutService};
use crate::session::SessionState;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// Frames queued for one client before it is considered stuck
const CLIENT_QUEUE: usize = 64;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    ctx: Arc<ClientContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared with every client handler
struct ClientContext {
    service: Arc<ShortcutService>,
    event_tx: broadcast::Sender<ShortcutEvent>,
    state: RwLock<ServerState>,
}

struct ServerState {
    start_time: Instant,
    session: SessionState,
}

impl Server {
    /// Bind the socket and create the server
    pub fn new(
        socket_path: &Path,
        service: Arc<ShortcutService>,
        event_tx: broadcast::Sender<ShortcutEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only access
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            ctx: Arc::new(ClientContext {
                service,
                event_tx,
                state: RwLock::new(ServerState {
                    start_time: Instant::now(),
                    session: SessionState::Idle,
                }),
            }),
            shutdown_tx,
        })
    }

    /// Record the current session state for status requests
    pub async fn set_session(&self, session: SessionState) {
        let mut state = self.ctx.state.write().await;
        if state.session != session {
            debug!(from = %state.session, to = %session, "IPC server: session updated");
        }
        state.session = session;
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let ctx = Arc::clone(&self.ctx);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, ctx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection
///
/// Responses and pushed events share one writer task so frames never
/// interleave. The writer and forwarder tasks are aborted when this returns
/// or is cancelled.
async fn handle_client(stream: UnixStream, ctx: Arc<ClientContext>) -> Result<()> {
    let (mut reader, writer) = stream.into_split();
    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(CLIENT_QUEUE);
    let mut tasks = JoinSet::new();
    tasks.spawn(write_frames(writer, out_rx));
    let mut subscribed = false;

    let result: Result<()> = async {
        while let Some(body) = read_frame(&mut reader).await? {
            let response = match serde_json::from_slice::<Request>(&body) {
                Ok(request) => {
                    debug!(?request, "received request");
                    let (response, subscribe) = process_request(request, &ctx).await;
                    if subscribe && !subscribed {
                        subscribed = true;
                        debug!("client subscribed to notifications");
                        tasks.spawn(forward_events(ctx.event_tx.subscribe(), out_tx.clone()));
                    }
                    response
                }
                Err(e) => Response::error("bad_request", e.to_string()),
            };

            if out_tx.send(encode_frame(&response)?).await.is_err() {
                break;
            }
        }
        Ok(())
    }
    .await;

    tasks.shutdown().await;
    result
}

/// Push events to one subscribed client until it goes away
async fn forward_events(mut event_rx: broadcast::Receiver<ShortcutEvent>, out_tx: mpsc::Sender<Vec<u8>>) {
    loop {
        let received = tokio::select! {
            received = event_rx.recv() => received,
            _ = out_tx.closed() => break,
        };

        match received {
            Ok(event) => {
                let frame = match encode_frame(&Notification::Event { event }) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(?e, "failed to encode notification");
                        continue;
                    }
                };
                if out_tx.send(frame).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn write_frames(mut writer: OwnedWriteHalf, mut out_rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = out_rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            debug!(?e, "client write failed");
            break;
        }
    }
}

/// Read one length-prefixed message; `None` on clean disconnect
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            debug!("client disconnected");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Encode a length-prefixed JSON message
fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Process a request and return a response
/// Returns (Response, should_subscribe)
async fn process_request(request: Request, ctx: &ClientContext) -> (Response, bool) {
    match request {
        Request::Ping => (Response::Pong, false),

        Request::GetStatus => {
            let state = ctx.state.read().await;
            let status = DaemonStatus {
                service: ctx.service.state(),
                session: state.session,
                bindings: ctx.service.bindings().iter().collect(),
                readers: ctx.service.reader_status(),
                uptime_secs: state.start_time.elapsed().as_secs(),
                ..Default::default()
            };
            (Response::Status(status), false)
        }

        Request::ListKeyboards => {
            let service = Arc::clone(&ctx.service);
            match tokio::task::spawn_blocking(move || service.list_available_keyboards()).await {
                Ok(devices) => (Response::Keyboards { devices }, false),
                Err(e) => (Response::error("internal", e.to_string()), false),
            }
        }

        Request::Rebind { action, chord } => (rebind(ctx, &action, &chord), false),

        Request::Subscribe => (Response::Subscribed, true),
    }
}

fn rebind(ctx: &ClientContext, action: &str, chord: &str) -> Response {
    let action: Action = match action.parse() {
        Ok(action) => action,
        Err(e) => return Response::error("unknown_action", e.to_string()),
    };

    match ctx.service.rebind(action, chord) {
        Ok(conflicts) => {
            let chord = ctx.service.bindings().resolve(action);
            info!(%action, "shortcut rebound via IPC");
            let _ = ctx.event_tx.send(ShortcutEvent::BindingChanged { action, chord });
            Response::Rebound {
                action,
                chord: chord.map(|c| c.to_string()).unwrap_or_default(),
                conflicts,
            }
        }
        Err(e @ HotkeyError::InvalidChord { .. }) => Response::error("invalid_chord", e.to_string()),
        Err(e) => Response::error("rebind_failed", e.to_string()),
    }
}
