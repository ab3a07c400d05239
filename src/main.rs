//! `bridgemcp` binary: relay server with optional MCP stdio mode.

use std::io::IsTerminal;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bridgemcp::{AuthToken, Error, Relay, RelayConfig, RelayServer, Result, StdioAdapter};

/// Relay between MCP/HTTP clients and the BridgeMCP browser extension.
#[derive(Parser, Debug, Clone)]
#[command(name = "bridgemcp")]
#[command(version)]
struct Args {
    /// Port for HTTP and the extension WebSocket.
    #[arg(long, default_value_t = bridgemcp::config::DEFAULT_PORT, env = "BRIDGEMCP_PORT")]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1", env = "BRIDGEMCP_HOST")]
    host: IpAddr,

    /// Serve MCP on stdin/stdout even when stdin is a terminal.
    #[arg(long)]
    mcp: bool,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Shared secret. Defaults to the token file, or a new random token.
    #[arg(long, env = "BRIDGEMCP_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Token file location (default `~/.bridgemcp/token`).
    #[arg(long, env = "BRIDGEMCP_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Origin scheme of the browser extension.
    #[arg(long, default_value = bridgemcp::config::DEFAULT_EXTENSION_SCHEME)]
    extension_scheme: String,
}

fn init_tracing(verbose: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("bridgemcp=debug")
    } else {
        EnvFilter::new("bridgemcp=info")
    };

    // stdout carries the MCP stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

/// Resolves the shared secret and makes sure it is on disk.
fn resolve_token(args: &Args) -> Result<AuthToken> {
    let path = args
        .token_file
        .clone()
        .or_else(AuthToken::default_path)
        .ok_or_else(|| Error::config("no home directory; pass --token-file"))?;

    if let Some(token) = &args.token {
        let token = AuthToken::new(token.clone())?;
        token.persist(&path)?;
        return Ok(token);
    }

    match load_existing(&path) {
        Some(token) => {
            info!(path = %path.display(), "Using existing token");
            Ok(token)
        }
        None => {
            let token = AuthToken::generate();
            token.persist(&path)?;
            info!(path = %path.display(), "Generated new token");
            Ok(token)
        }
    }
}

fn load_existing(path: &Path) -> Option<AuthToken> {
    if !path.exists() {
        return None;
    }
    match AuthToken::load(path) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable token file");
            None
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = RelayConfig::new()
        .with_host(args.host)
        .with_port(args.port)
        .with_extension_scheme(args.extension_scheme.clone());
    let token = resolve_token(&args)?;
    let relay = Relay::new(config, token)?;

    let mcp_mode = args.mcp || !std::io::stdin().is_terminal();
    let server = RelayServer::bind(relay.clone()).await?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = if mcp_mode { "MCP + HTTP" } else { "HTTP only" },
        http = %server.http_url(),
        "BridgeMCP started"
    );
    info!("Waiting for extension connection...");

    if mcp_mode {
        let server_task = tokio::spawn(server.serve());
        let adapter = StdioAdapter::new(relay);
        run_mcp(adapter, server_task, tokio::io::stdin(), tokio::io::stdout()).await
    } else {
        server
            .serve_with_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for ctrl-c");
                }
            })
            .await
    }
}

/// Serves stdio until EOF or until the HTTP server stops.
async fn run_mcp<R, W>(
    adapter: StdioAdapter,
    mut server_task: JoinHandle<Result<()>>,
    reader: R,
    writer: W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::select! {
        outcome = adapter.run(reader, writer) => {
            server_task.abort();
            outcome
        }
        joined = &mut server_task => match joined {
            Ok(Ok(())) => {
                warn!("HTTP server stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "HTTP server failed");
                Err(e)
            }
            Err(e) => {
                error!(error = %e, "HTTP server task panicked");
                Err(Error::Io(std::io::Error::other(e)))
            }
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
