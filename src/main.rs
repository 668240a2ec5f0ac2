use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use studygate::{config::GatewayConfig, rest, video::GenerationOptions, AppContext};
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "studygate",
    about = "StudyGate — media-generation gateway for the study-planner dashboard",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port for the dashboard API
    #[arg(long, env = "STUDYGATE_PORT")]
    port: Option<u16>,

    /// Data directory holding config.toml
    #[arg(long, env = "STUDYGATE_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "STUDYGATE_LOG")]
    log: Option<String>,

    /// Bind address for the HTTP server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "STUDYGATE_BIND")]
    bind_address: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway server (default when no subcommand given).
    ///
    /// Runs studygate in the foreground. When invoked with no subcommand,
    /// this is the default.
    ///
    /// Examples:
    ///   studygate serve
    ///   studygate
    Serve,
    /// Submit one video generation job and wait for the result.
    ///
    /// Blocks until the vendor reports a terminal state, then prints the
    /// video URL to stdout. Progress notes go to stderr so the URL can be
    /// piped. Uses the same credentials and poll budget as the server.
    ///
    /// Examples:
    ///   studygate generate "a paper plane gliding over a desk"
    ///   studygate generate --size 960*960 --json "ink in water"
    Generate {
        /// Text prompt describing the clip
        prompt: String,
        /// Frame size, e.g. 1280*720 (falls back to the configured default)
        #[arg(long)]
        size: Option<String>,
        /// Print the full task payload as JSON instead of just the URL
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format =
        std::env::var("STUDYGATE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    setup_logging(&log_level, &log_format);

    match args.command {
        Some(Command::Generate { prompt, size, json }) => {
            run_generate(prompt, size, json, args.data_dir).await?;
        }
        None | Some(Command::Serve) => {
            run_server(args.port, args.data_dir, args.log, args.bind_address).await?;
        }
    }

    Ok(())
}

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
    bind_address: Option<String>,
) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "studygate starting");

    let config = GatewayConfig::new(port, data_dir, log, bind_address);
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        video_model = %config.video.model,
        "config loaded"
    );

    // Missing credentials are not fatal: the server still answers health
    // checks, and the affected routes report the upstream failure.
    let missing = config.missing_credentials();
    if !missing.is_empty() {
        warn!(
            missing = ?missing,
            "vendor credentials not configured — dependent routes will fail upstream"
        );
    }

    let ctx = Arc::new(AppContext::new(config)?);
    rest::start_server(ctx).await
}

/// One-shot generation from the command line. Shares the server's client
/// wiring so endpoint overrides and credentials behave identically.
async fn run_generate(
    prompt: String,
    size: Option<String>,
    json: bool,
    data_dir: Option<std::path::PathBuf>,
) -> Result<()> {
    let config = GatewayConfig::new(None, data_dir, None, None);
    let ctx = AppContext::new(config)?;

    let options = GenerationOptions {
        size,
        ..Default::default()
    };
    let submitted = ctx.video.submit(&prompt, &options).await?;
    eprintln!("task {} submitted, waiting for the vendor", submitted.task_id);

    let task = ctx
        .video
        .wait_until_terminal(&submitted.task_id, &ctx.poll_config())
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&task)?);
    } else if let Some(url) = task.result_url {
        println!("{url}");
    }
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
fn setup_logging(log_level: &str, log_format: &str) {
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(log_level)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
    }
}
