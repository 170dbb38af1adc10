/// Periodic flush-and-post loop.
///
/// Each tick drains the queue into one batch, posts it as a single message and
/// acknowledges it. Any transport error ends the run; nothing is retried.
use crate::session::{Exit, Session};
use crate::transport::{Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue was empty.
    Idle,
    /// Posted a batch of this many lines.
    Posted(usize),
    /// Dry-run: batch of this many lines was acknowledged without posting.
    Skipped(usize),
}

/// Run one flush-and-post cycle.
pub async fn tick(
    session: &Session,
    transport: &dyn Transport,
) -> Result<TickOutcome, TransportError> {
    let queue = session.queue();
    if queue.is_empty() {
        return Ok(TickOutcome::Idle);
    }

    let batch = queue.flush();
    let count = batch.len();
    let channel = session.channel();

    if session.dry_run() {
        queue.ack();
        info!("skipped posting of {count} message lines to {}", channel.name);
        return Ok(TickOutcome::Skipped(count));
    }

    transport.post_message(&channel.id, &batch.encode()).await?;
    queue.ack();
    info!("posted {count} message lines to {}", channel.name);
    Ok(TickOutcome::Posted(count))
}

/// Tick every `period` until a transport error ends the run.
pub async fn run(session: Arc<Session>, transport: Arc<dyn Transport>, period: Duration) {
    loop {
        if let Err(e) = tick(&session, transport.as_ref()).await {
            tracing::debug!(pending = session.queue().pending(), "delivery failed, stopping");
            session.exit(Exit::Fatal(e));
            return;
        }
        tokio::time::sleep(period).await;
    }
}
