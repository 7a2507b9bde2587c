//! Canvas server - HTTP and SSE front end for a shared pixel board.

mod pruner;
mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use canvas::engine::Engine;
use canvas::io::config::load_config;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "canvas-server")]
#[command(about = "Serve a shared pixel canvas over HTTP and SSE")]
struct Args {
    /// Path to the canvas config file
    #[arg(long, default_value = "canvas.toml")]
    config: PathBuf,

    /// Address to bind the server to (overrides server.bind)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("canvas_server=info".parse()?)
                .add_directive("canvas=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    info!(
        config = %args.config.display(),
        width = config.width,
        height = config.height,
        "starting canvas-server"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("parse listen address")?;

    let engine = Engine::open(config).context("open canvas engine")?;
    let state = AppState::new(engine);

    pruner::start_cooldown_pruner(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state.clone());

    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

/// Resolves on ctrl-c, after closing every live subscription so that open
/// event streams end and the server can drain.
async fn shutdown_signal(state: AppState) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        return;
    }
    let closed = state.engine.shutdown();
    info!(closed, "shutting down");
}
