use crate::transport::slack::DEFAULT_API_URL;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the configured token.
pub const TOKEN_ENV: &str = "SLACKCAT_TOKEN";

/// Top-level configuration loaded from `~/.slackcat`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SlackcatConfig {
    pub token: Option<String>,
    pub default_channel: Option<String>,
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub delivery: DeliveryConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub flush_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub drain_poll_secs: u64,
}

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Neither the config file nor the environment supplied a token.
    MissingToken { path: PathBuf },
    /// No `--channel` flag and no `default_channel` in the config.
    MissingChannel,
    /// A duration setting is below its one-second floor.
    Invalid { field: &'static str, path: PathBuf },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::MissingToken { path } => write!(
                f,
                "no Slack token found: set `token` in {} or {}",
                path.display(),
                TOKEN_ENV
            ),
            ConfigError::MissingChannel => {
                write!(f, "no channel given: pass --channel or set `default_channel`")
            }
            ConfigError::Invalid { field, path } => write!(
                f,
                "invalid config {}: `{}` must be at least 1",
                path.display(),
                field
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::MissingToken { .. }
            | ConfigError::MissingChannel
            | ConfigError::Invalid { .. } => None,
        }
    }
}

impl SlackcatConfig {
    /// Default config location: `~/.slackcat`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".slackcat")
    }

    /// Load config from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate(path)?;
        Ok(config)
    }

    /// Zero periods would turn the delivery loop and drain watcher into busy loops.
    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let seconds = [
            ("delivery.flush_interval_secs", self.delivery.flush_interval_secs),
            ("shutdown.drain_poll_secs", self.shutdown.drain_poll_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        match seconds.into_iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(ConfigError::Invalid {
                field,
                path: path.to_path_buf(),
            }),
            None => Ok(()),
        }
    }

    /// Resolve the API token: environment first, then the config file.
    pub fn resolve_token(
        &self,
        env_token: Option<String>,
        path: &Path,
    ) -> Result<String, ConfigError> {
        env_token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.token.clone())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingToken {
                path: path.to_path_buf(),
            })
    }

    /// Resolve the target channel: CLI flag first, then `default_channel`.
    pub fn resolve_channel(&self, cli_channel: Option<&str>) -> Result<String, ConfigError> {
        cli_channel
            .map(str::to_string)
            .or_else(|| self.default_channel.clone())
            .ok_or(ConfigError::MissingChannel)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.delivery.flush_interval_secs)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_secs(self.shutdown.drain_poll_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// --- Default implementations ---

impl Default for SlackcatConfig {
    fn default() -> Self {
        Self {
            token: None,
            default_channel: None,
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 30,
            delivery: DeliveryConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 3,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_poll_secs: 3 }
    }
}
