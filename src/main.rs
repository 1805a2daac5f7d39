use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use swr_proxy::background::Background;
use swr_proxy::cache::{CacheAdapter, MemoryBackend};
use swr_proxy::config::ProxyConfig;
use swr_proxy::engine::Engine;
use swr_proxy::middleware::{LoggerMiddleware, Pipeline};
use swr_proxy::origin::HttpOrigin;
use swr_proxy::proxy::ProxyHandler;
use swr_proxy::server::Server;

/// Stale-while-revalidate caching reverse proxy.
#[derive(Debug, Parser)]
#[command(name = "swr-proxy", version, about)]
struct Cli {
    /// JSON configuration file; flags below override its values.
    #[arg(short, long, env = "SWR_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "SWR_LISTEN")]
    listen: Option<String>,

    /// Upstream host, e.g. `example.com` or `10.0.0.5:8080`.
    #[arg(long, env = "SWR_ORIGIN_HOST")]
    origin_host: Option<String>,

    #[arg(long, env = "SWR_ORIGIN_SCHEME")]
    origin_scheme: Option<String>,

    /// Path of the cached resource, e.g. `/posts/`.
    #[arg(long, env = "SWR_CACHED_PATH")]
    cached_path: Option<String>,

    #[arg(long, env = "SWR_FRESH_TTL")]
    fresh_ttl_secs: Option<u64>,

    #[arg(long, env = "SWR_STALE_TTL")]
    stale_ttl_secs: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<ProxyConfig, swr_proxy::config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::from_json_file(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(host) = self.origin_host {
            config.origin_host = host;
        }
        if let Some(scheme) = self.origin_scheme {
            config.origin_scheme = scheme;
        }
        if let Some(path) = self.cached_path {
            config.cached_path = path;
        }
        if let Some(secs) = self.fresh_ttl_secs {
            config.fresh_ttl_secs = secs;
        }
        if let Some(secs) = self.stale_ttl_secs {
            config.stale_ttl_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Cli::parse().into_config()?;
    let ttl = config.ttl_pair()?;

    let backend = Arc::new(MemoryBackend::new(config.cache_capacity));
    let origin = Arc::new(HttpOrigin::new(config.origin_timeout())?);
    let background = Background::new();

    let engine = Engine::new(
        CacheAdapter::new(backend),
        origin.clone(),
        Arc::new(background.clone()),
        ttl,
    );
    let handler = Arc::new(ProxyHandler::new(engine, origin, config.clone()));
    info!(
        cached = %handler.cached_url(),
        fresh_ttl = ?ttl.fresh(),
        stale_ttl = ?ttl.stale(),
        "proxy configured"
    );

    let pipeline = Pipeline::new(handler.routes()).with(Arc::new(LoggerMiddleware));

    let server = Server::bind(&config.listen).await?;
    server
        .run_until(
            move |req| {
                let pipeline = pipeline.clone();
                async move { pipeline.handle(req).await }
            },
            shutdown_signal(),
        )
        .await?;

    background.drain(config.drain_timeout()).await;
    info!("bye");
    Ok(())
}
