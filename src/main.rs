mod config;
mod delivery;
mod ingest;
mod queue;
mod session;
mod signals;
mod stream;
mod transport;
mod upload;

use clap::Parser;
use config::{SlackcatConfig, TOKEN_ENV};
use session::Exit;
use std::path::PathBuf;
use std::sync::Arc;
use transport::slack::SlackTransport;
use transport::{FileUpload, Transport};

/// Stream stdin line by line, or upload a file, to a Slack channel.
///
/// Without a FILE or --stream, all of stdin is buffered and uploaded as one
/// file once input ends.
#[derive(Parser, Debug)]
#[command(name = "slackcat", version, about)]
pub struct Cli {
    /// File to upload
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Slack channel, group or user to post to (default: from config)
    #[arg(short, long)]
    channel: Option<String>,

    /// Stream stdin to the channel line by line
    #[arg(short, long, conflicts_with = "file")]
    stream: bool,

    /// Display name for the uploaded file
    #[arg(short = 'n', long)]
    filename: Option<String>,

    /// File type hint for the uploaded file (Slack infers the type)
    #[arg(long)]
    filetype: Option<String>,

    /// Initial comment for the uploaded file
    #[arg(long)]
    comment: Option<String>,

    /// Skip posting and uploading; report what would be sent
    #[arg(long)]
    noop: bool,

    /// Echo stdin to stdout
    #[arg(short, long)]
    tee: bool,

    /// Config file path (default: ~/.slackcat)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra logging (API lookups, drain progress)
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only report errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn default_log_level(&self) -> &'static str {
        if self.verbose {
            "slackcat=debug"
        } else if self.quiet {
            "slackcat=error"
        } else {
            "slackcat=info"
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so --tee output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.default_log_level())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let code = match run(cli).await {
        Ok(exit) => {
            if exit.code() == 0 {
                tracing::debug!("{exit}");
            } else {
                tracing::error!("{exit}");
            }
            exit.code()
        }
        Err(e) => {
            tracing::error!("{e}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<Exit, Box<dyn std::error::Error>> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(SlackcatConfig::default_path);
    let config = SlackcatConfig::load(&config_path)?;
    let token = config.resolve_token(std::env::var(TOKEN_ENV).ok(), &config_path)?;
    let channel_name = config.resolve_channel(cli.channel.as_deref())?;

    let transport: Arc<dyn Transport> = Arc::new(SlackTransport::new(
        &config.api_url,
        &token,
        config.request_timeout(),
    )?);

    let identity = transport.authenticate().await?;
    tracing::info!("connected to {} as {}", identity.team, identity.user);
    let channel = transport::resolve_channel(transport.as_ref(), &channel_name).await?;

    if cli.stream {
        let options = stream::StreamOptions {
            flush_interval: config.flush_interval(),
            drain_poll_interval: config.drain_poll_interval(),
            dry_run: cli.noop,
            handle_signals: true,
        };
        let reader = tokio::io::BufReader::new(tokio::io::stdin());
        let tee = cli.tee.then(tokio::io::stdout);
        return Ok(stream::run(transport, channel, reader, tee, options).await);
    }

    // Keep the buffered stdin file alive until the upload finishes.
    let (path, _buffered, default_name) = match &cli.file {
        Some(path) => (path.clone(), None, upload::file_name(path)),
        None => {
            let tee = cli.tee.then(tokio::io::stdout);
            let tmp = upload::buffer_input(tokio::io::stdin(), tee).await?;
            (tmp.path().to_path_buf(), Some(tmp), None)
        }
    };

    let name = upload::display_name(
        cli.filename.as_deref().or(default_name.as_deref()),
        chrono::Utc::now(),
    );
    let file = FileUpload {
        path,
        name,
        file_type: cli.filetype.clone(),
        comment: cli.comment.clone(),
    };
    let outcome = upload::run(transport.as_ref(), &channel, &file, cli.noop).await?;
    tracing::debug!(?outcome, "upload finished");
    Ok(Exit::Uploaded)
}
