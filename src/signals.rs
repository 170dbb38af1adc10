/// Signal handling for graceful shutdown.
///
/// First SIGINT (Ctrl-C): keep delivering, exit 0 once the queue drains.
/// Second SIGINT: abandon undelivered lines and exit non-zero immediately.
/// End of input starts the same drain without counting as a signal.
use crate::session::{Exit, Session};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shutdown progress derived from the number of interrupts seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    ForceExit,
}

/// Interrupt counter and drain-watcher guard. Both only ever move forward.
#[derive(Debug, Default)]
pub struct ShutdownState {
    signals: AtomicU32,
    watcher_started: AtomicBool,
}

impl ShutdownState {
    #[allow(dead_code)]
    pub fn phase(&self) -> Phase {
        match self.signals.load(Ordering::SeqCst) {
            0 => Phase::Running,
            1 => Phase::Draining,
            _ => Phase::ForceExit,
        }
    }

    /// Whether a drain watcher has been launched.
    #[allow(dead_code)]
    pub fn draining(&self) -> bool {
        self.watcher_started.load(Ordering::SeqCst)
    }

    /// Count one interrupt and return the new total.
    fn record_signal(&self) -> u32 {
        self.signals.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    /// True exactly once: for the caller that gets to start the watcher.
    fn claim_watcher(&self) -> bool {
        !self.watcher_started.swap(true, Ordering::SeqCst)
    }
}

pub struct ShutdownCoordinator {
    session: Arc<Session>,
    poll_interval: Duration,
}

impl ShutdownCoordinator {
    pub fn new(session: Arc<Session>, poll_interval: Duration) -> Self {
        Self {
            session,
            poll_interval,
        }
    }

    /// Handle one interrupt and return the resulting phase.
    pub fn on_interrupt(&self) -> Phase {
        let count = self.session.shutdown().record_signal();
        if count >= 2 {
            self.session.exit(Exit::Aborted);
            return Phase::ForceExit;
        }
        info!("got signal: interrupt");
        info!("press ctrl+c again to exit immediately");
        self.request_drain();
        Phase::Draining
    }

    /// Start the drain watcher unless one is already running.
    pub fn request_drain(&self) {
        if self.session.shutdown().claim_watcher() {
            tokio::spawn(drain(Arc::clone(&self.session), self.poll_interval));
        } else {
            tracing::debug!("drain already in progress");
        }
    }

    /// Feed process interrupts into `on_interrupt` for the rest of the run.
    #[cfg(unix)]
    pub async fn listen(self: Arc<Self>) {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::interrupt()) {
            Ok(mut sigint) => {
                while sigint.recv().await.is_some() {
                    self.on_interrupt();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not register SIGINT handler, using ctrl_c fallback");
                self.listen_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    pub async fn listen(self: Arc<Self>) {
        self.listen_ctrl_c().await;
    }

    async fn listen_ctrl_c(&self) {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            self.on_interrupt();
        }
    }
}

/// Poll the queue until it is empty, then end the run cleanly.
async fn drain(session: Arc<Session>, poll_interval: Duration) {
    loop {
        if session.queue().is_empty() {
            session.exit(Exit::Drained);
            return;
        }
        info!(
            pending = session.queue().pending(),
            "flushing remaining messages to Slack..."
        );
        tokio::time::sleep(poll_interval).await;
    }
}
