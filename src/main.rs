//! MEW Gateway - the runtime protocol plane for Multi-Entity Workspace
//! spaces: routing, capability matching, and the proposal/stream
//! lifecycles participants exchange over.
//!
//! `tracing_subscriber` init, `anyhow::Result` error propagation, and a
//! bind-and-serve main, plus the process-bootstrap CLI flags (bind address,
//! config path) this crate keeps in scope while excluding the interactive
//! CLI surface (§1).

use anyhow::{Context, Result};
use clap::Parser;
use mew_gateway::config::GatewayConfig;
use mew_gateway::metrics::AtomicMetricsCollector;
use mew_gateway::resolver::{InMemoryTokenResolver, ResolvedIdentity};
use mew_gateway::server::{create_router, AppState};
use mew_gateway::{Capability, ParticipantId, SpaceId};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Process bootstrap flags. Interactive CLI surface (space scaffolding,
/// participant subprocess supervision) is out of scope (§1) — this is the
/// minimal set needed to start the gateway process itself.
#[derive(Parser, Debug)]
#[command(name = "mew-gateway", about = "MEW protocol gateway")]
struct Args {
    /// Socket address to bind the WebSocket/HTTP server to. Overrides the
    /// config file's `bind_addr` when set.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Path to a JSON `GatewayConfig` file. Falls back to
    /// [`GatewayConfig::development`] if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run with production defaults instead of development defaults when
    /// no `--config` is given.
    #[arg(long)]
    production: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mew_gateway=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None if args.production => GatewayConfig::production(),
        None => GatewayConfig::development(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    config.validate().context("invalid gateway configuration")?;
    info!(
        bind_addr = %config.bind_addr,
        outbound_queue_size = %config.outbound_queue_size,
        "gateway configuration loaded"
    );

    let resolver = Arc::new(development_resolver());
    let metrics = Arc::new(AtomicMetricsCollector::new());
    let state = Arc::new(AppState::new(resolver, Arc::new(config.clone()), metrics));

    let router = create_router(state);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, router)
        .await
        .context("gateway server failed")?;

    info!("gateway shutting down gracefully");
    Ok(())
}

/// A development-only resolver seeding three participants in a `demo`
/// space, standing in for the space-configuration loader this crate
/// excludes (§1, §6). A production deployment injects its own
/// [`mew_gateway::resolver::TokenResolver`] backed by real capability
/// tables.
fn development_resolver() -> InMemoryTokenResolver {
    let resolver = InMemoryTokenResolver::new();
    let space = SpaceId::try_new("demo").expect("literal space id is valid");
    let chat = Capability::new(
        mew_gateway::domain::KindPattern::parse("chat").expect("literal kind pattern is valid"),
        None,
    );
    resolver.grant(
        "dev-token",
        ResolvedIdentity {
            space,
            participant_id: ParticipantId::generate(),
            capabilities: vec![chat],
        },
    );
    resolver
}
