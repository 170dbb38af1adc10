/// Per-run context shared by the producer, delivery loop and shutdown watcher.
///
/// Owns the line queue and shutdown counters for one process run and carries
/// the channel through which any component can end the run.
use crate::queue::LineQueue;
use crate::signals::ShutdownState;
use crate::transport::{Channel, TransportError};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Why the run ended.
#[derive(Debug)]
pub enum Exit {
    /// Everything accepted before shutdown was delivered.
    Drained,
    /// A one-shot file upload finished (or was skipped in dry-run).
    Uploaded,
    /// Second interrupt: undelivered lines were abandoned.
    Aborted,
    /// A transport call failed; delivery is not retried.
    Fatal(TransportError),
}

impl Exit {
    /// Process exit status for this outcome.
    pub fn code(&self) -> i32 {
        match self {
            Exit::Drained | Exit::Uploaded => 0,
            Exit::Aborted | Exit::Fatal(_) => 1,
        }
    }
}

impl std::fmt::Display for Exit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exit::Drained => write!(f, "all messages delivered"),
            Exit::Uploaded => write!(f, "upload complete"),
            Exit::Aborted => write!(f, "aborted"),
            Exit::Fatal(e) => write!(f, "{e}"),
        }
    }
}

pub type ExitReceiver = mpsc::UnboundedReceiver<Exit>;

pub struct Session {
    queue: LineQueue,
    shutdown: ShutdownState,
    channel: Channel,
    dry_run: bool,
    exit_tx: mpsc::UnboundedSender<Exit>,
}

impl Session {
    /// Create a session and the receiver that observes its exit requests.
    pub fn new(channel: Channel, dry_run: bool) -> (Arc<Self>, ExitReceiver) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            queue: LineQueue::new(),
            shutdown: ShutdownState::default(),
            channel,
            dry_run,
            exit_tx,
        });
        (session, exit_rx)
    }

    pub fn queue(&self) -> &LineQueue {
        &self.queue
    }

    pub fn shutdown(&self) -> &ShutdownState {
        &self.shutdown
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Request the end of the run. The first request received wins.
    pub fn exit(&self, reason: Exit) {
        tracing::debug!(?reason, "exit requested");
        // Receiver gone means the run is already over.
        let _ = self.exit_tx.send(reason);
    }
}

#[cfg(test)]
pub(crate) fn test_session(dry_run: bool) -> (Arc<Session>, ExitReceiver) {
    Session::new(
        Channel {
            id: "C123".to_string(),
            name: "general".to_string(),
        },
        dry_run,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Exit::Drained.code(), 0);
        assert_eq!(Exit::Uploaded.code(), 0);
        assert_eq!(Exit::Aborted.code(), 1);
        let fatal = Exit::Fatal(TransportError::ChannelNotFound {
            name: "x".to_string(),
        });
        assert_eq!(fatal.code(), 1);
    }

    #[test]
    fn test_exit_display() {
        assert_eq!(Exit::Aborted.to_string(), "aborted");
        assert_eq!(Exit::Drained.to_string(), "all messages delivered");
        assert_eq!(Exit::Uploaded.to_string(), "upload complete");
        let fatal = Exit::Fatal(TransportError::ChannelNotFound {
            name: "ops".to_string(),
        });
        assert_eq!(fatal.to_string(), "no such channel, group, or im: ops");
    }

    #[tokio::test]
    async fn test_first_exit_request_wins() {
        let (session, mut exits) = test_session(false);
        session.exit(Exit::Drained);
        session.exit(Exit::Aborted);
        assert!(matches!(exits.recv().await, Some(Exit::Drained)));
    }

    #[test]
    fn test_exit_after_receiver_dropped_is_ignored() {
        let (session, exits) = test_session(false);
        drop(exits);
        session.exit(Exit::Aborted);
    }
}
