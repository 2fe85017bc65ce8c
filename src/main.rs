//! chord-hotkeys daemon: hosts the shortcut service outside any window system
//!
//! This daemon provides:
//! - Global chord shortcuts read from Linux input devices
//! - A recording session state machine driven by fired actions
//! - An IPC server for status queries, rebinding and event notifications

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use chord_hotkeys::config::Config;
use chord_hotkeys::events::ShortcutEvent;
use chord_hotkeys::ipc::Server;
use chord_hotkeys::lifecycle::ShutdownSignal;
use chord_hotkeys::session::SessionMachine;
use chord_hotkeys::{Action, Callbacks, ShortcutService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "chord-hotkeys starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.config_file, "configuration loaded");

    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    // Reader threads -> session machine
    let (action_tx, action_rx) = mpsc::channel::<Action>(32);
    // Session machine and IPC -> subscribed clients
    let (event_tx, _event_rx) = broadcast::channel::<ShortcutEvent>(64);

    // Every action goes through one callback into the async side
    let callbacks = Callbacks::legacy(move |action| {
        if let Err(e) = action_tx.try_send(action) {
            warn!(%action, error = %e, "dropping shortcut, session machine is not keeping up");
        }
    });

    let service = Arc::new(
        ShortcutService::new(config.shortcuts.clone(), callbacks)
            .context("invalid shortcut configuration")?,
    );

    let report = service.start();
    for skipped in &report.skipped {
        debug!(error = %skipped, "input device skipped");
    }
    if report.active_readers == 0 {
        warn!("continuing without global shortcuts - check membership of the 'input' group");
    }

    let mut session = SessionMachine::new(event_tx.clone());

    let server = Server::new(&config.socket_path, Arc::clone(&service), event_tx.clone())?;

    // Mirror session transitions into the IPC server's status
    let mut ipc_event_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the session machine (processes fired actions)
        _ = session.run(action_rx, |state| debug!(%state, "session state updated")) => {
            info!("session machine exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = async {
            loop {
                match ipc_event_rx.recv().await {
                    Ok(ShortcutEvent::SessionChanged { to, .. }) => {
                        server_for_events.set_session(to).await;
                    }
                    Ok(event) => {
                        info!(%event, "shortcut event");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("event handler exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    service.stop();
    server.shutdown().await;

    info!("chord-hotkeys stopped");

    Ok(())
}
