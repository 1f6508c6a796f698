use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use kiln::banner::{BannerInfo, print_banner};
use kiln::config::ServerConfig;
use kiln::consts::{
    DEFAULT_ADDR, DEFAULT_EXAMPLE, DEFAULT_IR_MARKER, DEFAULT_MAX_CONCURRENT, DEFAULT_SOURCE_NAME,
    DEFAULT_TIMEOUT_SECS, DEFAULT_TOOL_PATH, MAX_OUTPUT_BYTES, MAX_SOURCE_BYTES,
    default_staging_dir,
};
use kiln::runner::RunnerConfig;
use kiln::server::{self, AppState};

#[derive(Parser)]
#[command(
    name = "kiln",
    version,
    about = "Paste source into a browser, run it through a compiler, read what it says."
)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_ADDR)]
    addr: SocketAddr,

    /// Path to the external tool executable
    #[arg(long, default_value = DEFAULT_TOOL_PATH)]
    tool: PathBuf,

    /// Tool execution timeout in seconds
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Flag the tool accepts to print only its IR (used for "ir" mode)
    #[arg(long)]
    ir_flag: Option<String>,

    /// Without --ir-flag, "ir" mode shows stdout after this line
    #[arg(long, default_value = DEFAULT_IR_MARKER)]
    ir_marker: String,

    /// Largest accepted submission in bytes
    #[arg(long, default_value_t = MAX_SOURCE_BYTES)]
    max_source_bytes: usize,

    /// Output kept per stream in bytes
    #[arg(long, default_value_t = MAX_OUTPUT_BYTES)]
    max_output_bytes: usize,

    /// Tool runs allowed at once (1 serializes the tool)
    #[arg(short = 'j', long, default_value_t = DEFAULT_MAX_CONCURRENT)]
    max_concurrent: usize,

    /// Directory for per-request staging (default: $TMPDIR/kiln)
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// File name given to the staged source
    #[arg(long, default_value = DEFAULT_SOURCE_NAME)]
    source_name: String,

    /// File whose contents pre-fill the editor
    #[arg(long)]
    example: Option<PathBuf>,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Open the page in a browser once listening
    #[arg(long, default_value_t = false)]
    open: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let example = match &self.example {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read example {}", path.display()))?,
            None => DEFAULT_EXAMPLE.to_string(),
        };

        if self.source_name.is_empty() || self.source_name.contains(std::path::is_separator) {
            anyhow::bail!("--source-name must be a plain file name");
        }

        Ok(ServerConfig {
            addr: self.addr,
            tool: self.tool,
            staging_dir: self.staging_dir.unwrap_or_else(default_staging_dir),
            source_name: self.source_name,
            max_source_bytes: self.max_source_bytes,
            example,
            runner: RunnerConfig {
                timeout: Duration::from_secs(self.timeout),
                ir_flag: self.ir_flag,
                ir_marker: self.ir_marker,
                max_output_bytes: self.max_output_bytes,
                max_concurrent: self.max_concurrent,
            },
        })
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let open_browser = cli.open;
    let config = cli.into_config()?;

    let state = Arc::new(AppState::build(&config).await?);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    let addr = listener.local_addr()?;

    let runner = state.runner();
    let ir_mode = match &runner.config().ir_flag {
        Some(flag) => format!("flag {flag}"),
        None => format!("after \"{}\"", runner.config().ir_marker),
    };
    print_banner(&BannerInfo {
        addr,
        tool: runner.tool(),
        ir_mode: &ir_mode,
        timeout: runner.config().timeout,
        staging_dir: runner.stager().root(),
        max_source_bytes: config.max_source_bytes,
        max_concurrent: runner.config().max_concurrent,
    });

    if open_browser {
        // Headless or SSH sessions have no browser; the URL is in the banner.
        let _ = open::that(format!("http://{addr}"));
    }

    info!(%addr, "listening");
    server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await?;

    println!("goodbye.");
    Ok(())
}
