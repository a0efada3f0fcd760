//! Pipeline supervisor
//!
//! Owns the single cancellation token shared by every stage and remembers
//! what triggered shutdown. The first trigger wins.

use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", content = "detail", rename_all = "snake_case")]
pub enum ShutdownCause {
    /// OS termination request
    Signal(String),
    /// Unrecoverable startup or connectivity failure
    Fatal(String),
    /// Explicit shutdown from inside the process
    Requested,
}

impl ShutdownCause {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShutdownCause::Fatal(_))
    }
}

impl std::fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownCause::Signal(name) => write!(f, "received {}", name),
            ShutdownCause::Fatal(reason) => write!(f, "fatal error: {}", reason),
            ShutdownCause::Requested => write!(f, "shutdown requested"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    token: CancellationToken,
    cause: Arc<OnceLock<ShutdownCause>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Record `cause` (unless one is already recorded) and cancel everything.
    /// Returns whether this call was the first trigger.
    pub fn trigger(&self, cause: ShutdownCause) -> bool {
        let first = self.cause.set(cause.clone()).is_ok();
        if first {
            if cause.is_fatal() {
                error!(cause = %cause, "Pipeline shutting down");
            } else {
                info!(cause = %cause, "Pipeline shutting down");
            }
        }
        self.token.cancel();
        first
    }

    pub fn request_shutdown(&self) -> bool {
        self.trigger(ShutdownCause::Requested)
    }

    pub fn fatal(&self, reason: impl Into<String>) -> bool {
        self.trigger(ShutdownCause::Fatal(reason.into()))
    }

    pub fn cause(&self) -> Option<ShutdownCause> {
        self.cause.get().cloned()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Translate SIGINT / SIGTERM into a shutdown trigger.
    pub fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                name = wait_for_signal() => {
                    supervisor.trigger(ShutdownCause::Signal(name.to_string()));
                },
                _ = supervisor.cancelled() => {},
            }
        })
    }
}

async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
