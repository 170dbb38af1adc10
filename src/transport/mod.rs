pub mod slack;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Who we are connected as, reported once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub team: String,
    pub user: String,
}

/// Lookup namespaces for a channel name, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Public channel.
    Channel,
    /// Private channel (legacy "group").
    Group,
    /// Direct message with a user, looked up by user name.
    Im,
}

impl Namespace {
    pub const LOOKUP_ORDER: [Namespace; 3] = [Namespace::Channel, Namespace::Group, Namespace::Im];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Channel => "channel",
            Namespace::Group => "group",
            Namespace::Im => "im",
        }
    }
}

/// A resolved destination: the id the API wants and the name operators know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// Everything needed to upload one file.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub path: PathBuf,
    /// Display name, also used as the file title.
    pub name: String,
    pub file_type: Option<String>,
    pub comment: Option<String>,
}

/// Errors produced by transport operations.
#[derive(Debug)]
pub enum TransportError {
    /// The HTTP request itself failed (connect, timeout, decode).
    Http {
        method: String,
        source: reqwest::Error,
    },
    /// The API answered with `ok: false`.
    Api { method: String, error: String },
    /// No channel, group or im matched the requested name.
    ChannelNotFound { name: String },
    /// Failed to read a file for upload.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Http { method, source } => {
                write!(f, "request to {} failed: {}", method, source)
            }
            TransportError::Api { method, error } => {
                write!(f, "Slack API error from {}: {}", method, error)
            }
            TransportError::ChannelNotFound { name } => {
                write!(f, "no such channel, group, or im: {}", name)
            }
            TransportError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Http { source, .. } => Some(source),
            TransportError::Io { source, .. } => Some(source),
            TransportError::Api { .. } | TransportError::ChannelNotFound { .. } => None,
        }
    }
}

/// The remote chat service as seen by the delivery pipeline.
///
/// Every call is awaited to completion before the caller moves on; the
/// pipeline never issues two calls concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Verify credentials and report the connected identity.
    async fn authenticate(&self) -> Result<Identity, TransportError>;

    /// Look up `name` in a single namespace. `Ok(None)` means no match.
    async fn lookup(&self, namespace: Namespace, name: &str)
        -> Result<Option<String>, TransportError>;

    /// Post `text` as one message.
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), TransportError>;

    /// Upload a file to the channel.
    async fn upload_file(&self, channel_id: &str, upload: &FileUpload)
        -> Result<(), TransportError>;
}

/// Strip a leading `#` or `@` from a user-supplied channel name.
pub fn normalize_channel_name(name: &str) -> &str {
    name.strip_prefix('#')
        .or_else(|| name.strip_prefix('@'))
        .unwrap_or(name)
}

/// Resolve a channel name to its id, trying channel, group and im in order.
///
/// A failed lookup in one namespace counts as a miss and the next namespace is
/// tried; only when all three miss is the name reported as unknown.
pub async fn resolve_channel(
    transport: &dyn Transport,
    name: &str,
) -> Result<Channel, TransportError> {
    let name = normalize_channel_name(name);
    for namespace in Namespace::LOOKUP_ORDER {
        match transport.lookup(namespace, name).await {
            Ok(Some(id)) => {
                tracing::debug!(namespace = namespace.as_str(), name, id = %id, "resolved channel");
                return Ok(Channel {
                    id,
                    name: name.to_string(),
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(namespace = namespace.as_str(), name, error = %e, "channel lookup failed");
            }
        }
    }
    Err(TransportError::ChannelNotFound {
        name: name.to_string(),
    })
}

/// Read an upload's contents, mapping failures to `TransportError::Io`.
pub(crate) async fn read_upload(path: &Path) -> Result<Vec<u8>, TransportError> {
    tokio::fs::read(path).await.map_err(|e| TransportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
