/// One-shot file upload: no queue, no batching, no retry.
use crate::transport::{Channel, FileUpload, Transport, TransportError};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

/// Result of a finished upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UploadOutcome {
    /// Dry-run: nothing was sent.
    Skipped,
    Uploaded { elapsed: Duration },
}

/// Display name for an upload: the explicit name, else the Unix timestamp.
pub fn display_name(explicit: Option<&str>, now: DateTime<Utc>) -> String {
    match explicit {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => now.timestamp().to_string(),
    }
}

/// Base name of `path`, used as the default display name for named files.
pub fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

pub async fn run(
    transport: &dyn Transport,
    channel: &Channel,
    upload: &FileUpload,
    dry_run: bool,
) -> Result<UploadOutcome, TransportError> {
    if dry_run {
        info!("skipping upload of file {} to {}", upload.name, channel.name);
        return Ok(UploadOutcome::Skipped);
    }

    let start = Instant::now();
    transport.upload_file(&channel.id, upload).await?;
    let elapsed = start.elapsed();
    info!(
        "file {} uploaded to {} ({:.3}s)",
        upload.name,
        channel.name,
        elapsed.as_secs_f64()
    );
    Ok(UploadOutcome::Uploaded { elapsed })
}

/// Copy all of `reader` into a temporary file so it can be uploaded.
///
/// When `tee` is set the input is echoed there as it is read. The file is
/// removed when the returned handle is dropped.
pub async fn buffer_input<R, W>(
    mut reader: R,
    mut tee: Option<W>,
) -> std::io::Result<NamedTempFile>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let tmp = NamedTempFile::new()?;
    let mut file = tokio::fs::File::from_std(tmp.reopen()?);
    let mut buf = vec![0u8; 8192];
    let mut total = 0usize;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        if let Some(out) = tee.as_mut() {
            out.write_all(&buf[..n]).await?;
        }
        total += n;
    }
    file.flush().await?;
    if let Some(out) = tee.as_mut() {
        out.flush().await?;
    }
    tracing::debug!(bytes = total, path = %tmp.path().display(), "buffered input");
    Ok(tmp)
}
