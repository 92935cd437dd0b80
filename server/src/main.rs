//! **txkv-server** – HTTP transport for the transactional key-value store.
//!
//! This binary contains no command semantics of its own: it decodes an
//! HTTP request into a command line and a client id, hands both to
//! [`txkv_core::Database::parse_and_execute`], and renders the result with
//! [`txkv_core::format`]. Everything interesting — parsing, storage,
//! transactions — lives in `txkv-core`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use clap::Parser;
use rand::Rng;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use txkv_core::Database;

const CLIENT_NAME_HEADER: &str = "x-client-name";

#[derive(Debug, Parser)]
#[command(name = "txkv-server", author, version, about = "Transactional key-value store server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:7878")]
    listen: SocketAddr,

    /// Directory holding storage.dat and the transactions/ subdirectory.
    #[arg(long, default_value = "data")]
    data_dir: std::path::PathBuf,

    /// Log level passed to the env-filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone)]
struct ServiceState {
    db: Arc<Database>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("starting txkv-server v{}", env!("CARGO_PKG_VERSION"));

    let db = Database::open(&args.data_dir)
        .with_context(|| format!("failed to open database at {:?}", args.data_dir))?;
    let state = ServiceState { db: Arc::new(db) };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind to {}", args.listen))?;
    info!("listening on {}", args.listen);

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(err) = result {
                error!("server error: {err}");
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("txkv-server stopped");
    Ok(())
}

fn create_app(state: ServiceState) -> Router {
    Router::new()
        .route("/", post(handle_command))
        .fallback(post(handle_command))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Handles one command: the request body is the command line verbatim, the
/// `X-Client-Name` header (if present) names the client for transaction
/// state; anonymous callers get a fresh random client id per request, so a
/// `BEGIN` with no header can never be followed by a matching `COMMIT`.
async fn handle_command(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let client = headers
        .get(CLIENT_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(random_client_id);

    let result = state.db.parse_and_execute(&body, &client);
    let is_ok = result.is_ok();
    let body = txkv_core::format(&result);

    let status = if is_ok { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    (status, body)
}

fn random_client_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn init_logging(log_level: &str) -> Result<()> {
    tracing_log::LogTracer::init().context("failed to install the log -> tracing bridge")?;

    let filter = format!("txkv_server={log_level},txkv_core={log_level}");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
