//! Kiosk runtime wiring.
//!
//! Connects every event producer (GPIO inputs, console overrides, OS
//! signals and the stage supervisor) to one queue and runs the
//! [`Orchestrator`] on it until shutdown.

use crate::config::{ensure_directories, load_config};
use crate::hardware::console::forward_console;
use crate::hardware::HardwareEventSource;
use crate::orchestrator::Orchestrator;
use crate::session::SessionStore;
use crate::signals::wait_for_shutdown_signal;
use crate::supervisor::ProcessSupervisor;
use anyhow::Context;
use pb_protocol::ipc::Event;
use pb_protocol::{event_queue, EventSender};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::{debug, info, warn};

/// Options for [`run_kiosk`].
#[derive(Debug, Clone)]
pub struct KioskOptions {
    /// Project root holding `.photobooth/` and the stage programs.
    pub root: PathBuf,
    /// Read override commands from stdin.
    pub console: bool,
}

/// Run the kiosk until a shutdown signal or the `q` console command.
///
/// Startup order: load the configuration, create the data directories,
/// recover orphaned in-flight sessions, then start the event producers and
/// enter Idle.
///
/// # Errors
///
/// Fails only before the event loop starts: when the root does not exist,
/// the configuration is invalid or the data directories cannot be created.
/// Everything after that is logged and handled by the state machine.
pub async fn run_kiosk(options: KioskOptions) -> anyhow::Result<()> {
    let root = options
        .root
        .canonicalize()
        .with_context(|| format!("project root {} is not accessible", options.root.display()))?;

    let config = load_config(&root).await?;
    ensure_directories(&config)?;

    if config.session.recover_orphans {
        let recovered = SessionStore::from_config(&config).recover_orphans();
        if recovered > 0 {
            info!(recovered, "Recovered sessions from a previous run");
        }
    }

    let (tx, rx) = event_queue();

    let mut hardware = HardwareEventSource::start(&config.hardware, tx.clone());
    info!(mode = ?hardware.mode(), root = %root.display(), "Photobooth starting");

    let console = options.console.then(|| {
        let stdin = BufReader::new(tokio::io::stdin());
        tokio::spawn(forward_console(stdin, tx.clone()))
    });
    let signals = tokio::spawn(forward_shutdown_signal(tx.clone()));

    let supervisor = ProcessSupervisor::new(&root, config.supervisor.clone(), tx);
    let mut orchestrator = Orchestrator::new(config, &root, supervisor, hardware.indicator());
    orchestrator.run(rx).await;

    orchestrator.launcher_mut().terminate_all().await;
    hardware.stop();
    signals.abort();
    if let Some(console) = console {
        console.abort();
    }

    info!("Photobooth stopped");
    Ok(())
}

/// Post [`Event::Shutdown`] once a termination signal arrives.
async fn forward_shutdown_signal(tx: EventSender) {
    match wait_for_shutdown_signal().await {
        Ok(()) => {
            debug!("Shutdown signal received");
            let _ = tx.send(Event::Shutdown).await;
        }
        Err(err) => warn!(error = %err, "Signal handlers unavailable, use the console to quit"),
    }
}
