//! Signal handling for cancellation.
//!
//! SIGINT and SIGTERM cancel a shared [`ShutdownToken`]; the discovery wait
//! observes the token and returns early instead of running to its timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A token that can be shared across tasks to observe cancellation.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation and wake every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Created before the flag check so a concurrent cancel() is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Listens for SIGINT and SIGTERM and cancels its token on the first one.
pub struct ShutdownGuard {
    task: tokio::task::JoinHandle<()>,
}

impl ShutdownGuard {
    /// Start listening. Must be called inside a tokio runtime.
    ///
    /// A handler that cannot be registered is logged and skipped; with
    /// neither registered the token is only cancelled programmatically.
    pub fn new(token: ShutdownToken) -> Self {
        let task = tokio::spawn(async move {
            match first_signal().await {
                Some(name) => {
                    info!("Received {}, stopping", name);
                    token.cancel();
                }
                None => warn!("No signal handlers registered, Ctrl-C will not stop discovery early"),
            }
        });

        Self { task }
    }
}

fn register(kind: SignalKind, name: &str) -> Option<Signal> {
    signal(kind)
        .map_err(|e| warn!("Failed to register {} handler: {}", name, e))
        .ok()
}

async fn recv(sig: &mut Option<Signal>) -> Option<()> {
    match sig {
        Some(s) => s.recv().await,
        None => None,
    }
}

/// Name of the first signal received, or `None` when nothing can be received.
async fn first_signal() -> Option<&'static str> {
    let mut int = register(SignalKind::interrupt(), "SIGINT");
    let mut term = register(SignalKind::terminate(), "SIGTERM");
    tokio::select! {
        Some(_) = recv(&mut int) => Some("SIGINT"),
        Some(_) = recv(&mut term) => Some("SIGTERM"),
        else => None,
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
