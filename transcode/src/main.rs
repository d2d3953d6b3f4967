//! # Transcode Gateway
//!
//! Serves the unary methods of a gRPC server as HTTP/JSON endpoints.
//!
//! 1. **Configuration**: Reads the TOML configuration and applies [`cli::Cli`] overrides.
//! 2. **Schema**: Decodes the descriptor set and builds the method schema, merging the
//!    `google.api.http` annotations with the configured HTTP rules.
//! 3. **Dispatch**: Lazily connects to the upstream server through `transcode_core`.
//! 4. **Serving**: Runs the axum server until Ctrl+C.

mod cli;
mod config;
mod server;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use config::GatewayConfig;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcode_core::Transcoder;
use transcode_core::grpc::GrpcDispatcher;
use transcode_core::prost_reflect::DescriptorPool;
use transcode_core::reflect::schema_from_pool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcode=info,transcode_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::load(&cli).context("Invalid configuration")?;

    tracing::info!(
        listen = %config.listen,
        upstream = %config.upstream,
        rules = config.http.rules.len(),
        "Configuration loaded"
    );

    let pool = load_descriptor_pool(&config)?;
    let schema = schema_from_pool(&pool, &config.services, &config.http.rules)
        .context("Failed to build the method schema")?;
    let schema = Arc::new(schema);

    let dispatcher = GrpcDispatcher::connect_lazy(&config.upstream, pool, schema.clone(), config.codec_options())
        .with_context(|| format!("Invalid upstream '{}'", config.upstream))?;

    let transcoder = Transcoder::with_options(schema, dispatcher, config.transcoder_options())
        .context("Failed to build the route table")?;

    tracing::info!(routes = transcoder.routes().len(), "Routes registered");
    for route in transcoder.routes().routes() {
        tracing::debug!(binding = %route.binding(), method = %route.method().full_name(), "Route");
    }

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;

    let router = server::router(Arc::new(transcoder), config.body_limit_bytes);
    server::run(listener, router).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn load_descriptor_pool(config: &GatewayConfig) -> anyhow::Result<DescriptorPool> {
    let path = config
        .descriptor_set
        .as_deref()
        .context("No descriptor set configured")?;

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;

    DescriptorPool::decode(bytes.as_slice())
        .with_context(|| format!("'{}' is not a valid FileDescriptorSet", path.display()))
}
