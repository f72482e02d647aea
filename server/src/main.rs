use anyhow::Result;
use clap::Parser;
use quill_core::analyzer::AnalyzerKind;
use quill_core::composer::DEFAULT_TITLE_BOOST;
use quill_core::TextConfig;
use server::{router, AppState, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "quill-server")]
#[command(about = "Blog content API with keyword-based similar posts", long_about = None)]
struct Args {
    /// Data directory holding the content database
    #[arg(long, env = "QUILL_DATA", default_value = "./data")]
    data: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Noun analyzer: hangul, command or none
    #[arg(long, env = "QUILL_ANALYZER", default_value = "hangul")]
    analyzer: AnalyzerKind,
    /// MeCab-compatible program used when --analyzer=command
    #[arg(long, env = "QUILL_ANALYZER_CMD")]
    analyzer_cmd: Option<PathBuf>,
    /// Extra argument passed to the analyzer program (repeatable)
    #[arg(long = "analyzer-arg")]
    analyzer_args: Vec<String>,
    /// Per-call analyzer timeout in milliseconds
    #[arg(long, env = "QUILL_ANALYZER_TIMEOUT_MS")]
    analyzer_timeout_ms: Option<u64>,
    /// How many times title keywords are repeated in the derived field
    #[arg(long, default_value_t = DEFAULT_TITLE_BOOST)]
    title_boost: usize,
    /// Token required in X-ADMIN-TOKEN for admin endpoints
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,
    /// Comma-separated list of allowed CORS origins
    #[arg(long, env = "CORS_ALLOW_ORIGIN")]
    cors_allow_origin: Option<String>,
}

impl Args {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            data_dir: self.data.clone(),
            text: TextConfig {
                analyzer: self.analyzer,
                analyzer_command: self.analyzer_cmd.clone(),
                analyzer_args: self.analyzer_args.clone(),
                analyzer_timeout: self.analyzer_timeout_ms.map(Duration::from_millis),
                title_boost: self.title_boost,
            },
            admin_token: self.admin_token.clone(),
            cors_allow_origin: self.cors_allow_origin.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let state = AppState::open(&args.config())?;
    let store = state.store.clone();
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, data = %args.data.display(), "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    store.flush()?;
    tracing::info!("content store flushed, bye");
    Ok(())
}
