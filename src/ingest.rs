/// Producer side of the stream: read input lines into the queue.
///
/// Lines are split on `\n` (a trailing `\r` is dropped) and decoded lossily,
/// so binary noise in a log does not stop the stream. End of input, or a read
/// error, hands over to the drain sequence.
use crate::signals::ShutdownCoordinator;
use crate::session::Session;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Errors that can occur while reading input.
#[derive(Debug)]
pub enum IngestError {
    Read { source: std::io::Error },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Read { source } => write!(f, "failed to read input: {}", source),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Read { source } => Some(source),
        }
    }
}

/// Strip the line terminator and decode.
fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Queue every line from `reader`, optionally echoing it to `tee`.
///
/// Returns the number of lines queued. The drain is requested before
/// returning on both success and error.
pub async fn run<R, W>(
    session: &Session,
    coordinator: &ShutdownCoordinator,
    reader: R,
    tee: Option<W>,
) -> Result<u64, IngestError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = read_lines(session, reader, tee).await;
    match &result {
        Ok(count) => tracing::debug!(lines = count, "end of input"),
        Err(e) => tracing::warn!(error = %e, "input stopped early"),
    }
    coordinator.request_drain();
    result
}

async fn read_lines<R, W>(
    session: &Session,
    mut reader: R,
    mut tee: Option<W>,
) -> Result<u64, IngestError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut count = 0u64;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| IngestError::Read { source: e })?;
        if n == 0 {
            return Ok(count);
        }

        if let Some(out) = tee.as_mut() {
            if let Err(e) = echo(out, &buf).await {
                tracing::warn!(error = %e, "tee output closed, no longer echoing");
                tee = None;
            }
        }

        session.queue().add(decode_line(&buf));
        count += 1;
    }
}

async fn echo<W: AsyncWrite + Unpin>(out: &mut W, raw: &[u8]) -> std::io::Result<()> {
    out.write_all(raw).await?;
    if !raw.ends_with(b"\n") {
        out.write_all(b"\n").await?;
    }
    out.flush().await
}
