// Copyright 2025 Alejandro Martínez Corriá and the Thinkube contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod badge;
mod cache;
mod error;
mod format;
mod handlers;
mod registry;

use cache::{NoopStore, ResponseCache, ResponseStore};
use handlers::BadgeServer;
use registry::{CachePolicy, MetricsClient, DEFAULT_REGISTRY_URL};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8787")]
    port: u16,

    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Base URL of the package registry
    #[arg(long, env = "REGISTRY_URL", default_value = DEFAULT_REGISTRY_URL)]
    registry_url: String,

    /// Seconds to cache successful registry responses
    #[arg(long, env = "FOUND_TTL", default_value = "600")]
    found_ttl: u64,

    /// Seconds to cache unsuccessful registry responses
    #[arg(long, env = "NOT_FOUND_TTL", default_value = "300")]
    not_found_ttl: u64,

    /// Maximum number of cached registry responses (0 disables caching)
    #[arg(long, env = "CACHE_CAPACITY", default_value = "10000")]
    cache_capacity: u64,

    /// Upstream request timeout in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT", default_value = "10")]
    upstream_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("thunderstore_badge={},tower_http=debug", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting thunderstore-badge server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Registry: {}", args.registry_url);

    let policy = CachePolicy {
        found_ttl: Duration::from_secs(args.found_ttl),
        not_found_ttl: Duration::from_secs(args.not_found_ttl),
    };
    let store: Arc<dyn ResponseStore> = if args.cache_capacity == 0 {
        info!("Response cache disabled");
        Arc::new(NoopStore)
    } else {
        Arc::new(ResponseCache::new(args.cache_capacity))
    };
    let metrics = MetricsClient::new(
        args.registry_url,
        store,
        policy,
        Duration::from_secs(args.upstream_timeout),
    )?;

    let app = BadgeServer::new(metrics).router().layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);
    info!("Health endpoint: http://{}:{}/health", "0.0.0.0", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down gracefully...");
}
