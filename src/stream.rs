/// Streaming mode: wire the producer, delivery loop and shutdown handling
/// around one session and wait for the run to end.
use crate::delivery;
use crate::ingest;
use crate::session::{Exit, Session};
use crate::signals::ShutdownCoordinator;
use crate::transport::{Channel, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite};

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub flush_interval: Duration,
    pub drain_poll_interval: Duration,
    pub dry_run: bool,
    /// Listen for process interrupts (disabled in tests).
    pub handle_signals: bool,
}

/// Stream `reader` into `channel` until drained, aborted or failed.
pub async fn run<R, W>(
    transport: Arc<dyn Transport>,
    channel: Channel,
    reader: R,
    tee: Option<W>,
    options: StreamOptions,
) -> Exit
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (session, mut exits) = Session::new(channel, options.dry_run);
    let coordinator = Arc::new(ShutdownCoordinator::new(
        Arc::clone(&session),
        options.drain_poll_interval,
    ));

    tracing::debug!(
        channel = %session.channel().name,
        flush_interval_ms = options.flush_interval.as_millis() as u64,
        dry_run = options.dry_run,
        "starting stream"
    );

    let delivery = tokio::spawn(delivery::run(
        Arc::clone(&session),
        transport,
        options.flush_interval,
    ));
    let signals = options
        .handle_signals
        .then(|| tokio::spawn(Arc::clone(&coordinator).listen()));
    let producer = {
        let session = Arc::clone(&session);
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            // errors are logged by ingest; the drain still runs
            let _ = ingest::run(&session, &coordinator, reader, tee).await;
        })
    };

    // The session keeps a sender alive, so this only ends with an exit request.
    let exit = exits.recv().await.unwrap_or(Exit::Aborted);

    delivery.abort();
    producer.abort();
    if let Some(signals) = signals {
        signals.abort();
    }
    exit
}
