//! `callforge-server`: the HTTP binding for the multi-agent call
//! orchestration engine. Parses settings, connects the shared
//! [`AppContext`], wires the full route table, and serves it. `clap` is
//! kept only for a `--port`/`--host` CLI override since the rest of
//! configuration is env-sourced.

use std::net::SocketAddr;

use callforge_core::{logging, AppContext};
use clap::Parser;

mod error;
mod handlers;
mod media_stream;
mod routes;
mod sse;

#[derive(Debug, Parser)]
#[command(name = "callforge-server", about = "Multi-agent call orchestration engine")]
struct Cli {
    /// Port to bind the HTTP server to.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Host/interface to bind to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = callforge_core::config::Settings::from_env()?;
    logging::init_tracing(&settings);

    tracing::info!(backend_url = %settings.backend_url, demo_mode = settings.demo_mode, "starting callforge-server");

    let ctx = AppContext::connect(settings).await?;
    let app = routes::build_router(ctx);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
