// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use gantry::config::{self, ConfigSource};
use gantry::gateway::Gateway;
use gantry::server;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gantry", version, about = "LLM gateway with a tool-calling agent loop")]
struct Cli {
    /// Path to the gantry.yaml config file
    #[arg(long, default_value = "gantry.yaml", env = "GANTRY_CONFIG")]
    config: String,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "GANTRY_HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "GANTRY_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let addr = SocketAddr::new(cli.host, cli.port);
    tracing::info!(%addr, "gantry starting");

    let source = config::FileSource::new(&cli.config);
    let config = match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(source = %source.describe(), "failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = %config.version,
        environment = %config.environment,
        providers = ?config.providers.keys().collect::<Vec<_>>(),
        tool_servers = config.tools.servers.len(),
        max_iterations = config.agent.max_iterations,
        config_hash = %config.config_hash,
        "config loaded"
    );

    let gateway = match Gateway::from_config(&config) {
        Ok(g) => Arc::new(g),
        Err(e) => {
            tracing::error!("failed to build gateway: {e}");
            std::process::exit(1);
        }
    };

    let app = server::build_router(gateway);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "gantry listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
    tracing::info!("gantry stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
