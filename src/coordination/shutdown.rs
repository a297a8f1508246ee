//! Cooperative shutdown for the ingestion loops.
//!
//! Loops check the flag between games and race their sleeps against the
//! watch channel, so an in-flight fetch/process cycle always finishes
//! before the loop exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Why the process is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM / SIGINT
    Graceful,
    /// Requested by the caller (end of a bounded run, tests)
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Shutdown handle shared by every loop; clones observe the same state
#[derive(Clone)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
    tx: Arc<watch::Sender<Option<ShutdownSignal>>>,
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn request(&self, signal: ShutdownSignal) {
        if self.requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }
        info!("Shutdown requested: {}", signal);
        let _ = self.tx.send(Some(signal));
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) -> ShutdownSignal {
        let mut rx = self.rx.clone();
        loop {
            if let Some(signal) = *rx.borrow_and_update() {
                return signal;
            }
            if rx.changed().await.is_err() {
                return ShutdownSignal::Requested;
            }
        }
    }

    /// Sleep for `duration` unless shutdown comes first.
    /// Returns `true` when shutdown was requested.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_requested(),
            _ = self.wait() => true,
        }
    }
}

/// Resolve on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Spawn a task that turns OS signals into a graceful shutdown request.
pub fn listen_for_signals(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.request(ShutdownSignal::Graceful);
    })
}
