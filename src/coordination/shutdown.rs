//! Cooperative shutdown signalling
//!
//! The guardian must never exit abruptly while a worker is running, so OS
//! signals are turned into a token the supervisor observes between sleeps.

use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Ctrl+C / SIGINT
    Interrupt,
    /// SIGTERM from a service manager
    Terminate,
    /// Requested programmatically
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "interrupt"),
            ShutdownSignal::Terminate => write!(f, "terminate"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Sending half, held by whoever decides to stop the guardian
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<Option<ShutdownSignal>>,
}

/// Receiving half, observed by the supervisor loop
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

/// Create a connected handle/token pair
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownToken) {
    let (tx, rx) = watch::channel(None);
    (ShutdownHandle { tx }, ShutdownToken { rx })
}

impl ShutdownHandle {
    /// Request shutdown; returns false if one was already requested
    pub fn request(&self, signal: ShutdownSignal) -> bool {
        let first = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(signal);
            true
        });

        if first {
            info!("Shutdown requested: {}", signal);
        } else {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
        }
        first
    }
}

impl ShutdownToken {
    pub fn is_requested(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested.
    ///
    /// Never resolves if the handle is dropped without requesting shutdown.
    pub async fn requested(&mut self) -> ShutdownSignal {
        let signal = self
            .rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|current| *current);

        match signal {
            Some(signal) => signal,
            None => std::future::pending().await,
        }
    }
}

/// Wait for Ctrl+C or SIGTERM and forward it to `handle`
pub async fn listen_for_signals(handle: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => ShutdownSignal::Interrupt,
        _ = terminate => ShutdownSignal::Terminate,
    };

    handle.request(signal);
}
