//! flowchat-server
//!
//! Designer backend binary: env-driven configuration, tracing setup, and
//! the serve loop.

use anyhow::{Context, Result};
use flowchat_http::{CompletionClient, FlowService};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:5000";

struct Config {
    addr: SocketAddr,
    api_key: String,
    upstream_base_url: Option<String>,
}

impl Config {
    fn from_env() -> Result<Self> {
        let addr = std::env::var("FLOWCHAT_ADDR")
            .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
            .parse()
            .context("FLOWCHAT_ADDR is not a valid socket address")?;
        let api_key =
            std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
        let upstream_base_url = std::env::var("OPENAI_BASE_URL").ok();
        Ok(Self {
            addr,
            api_key,
            upstream_base_url,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let mut upstream = CompletionClient::new(config.api_key);
    if let Some(base_url) = config.upstream_base_url {
        upstream = upstream.with_base_url(base_url);
    }

    tracing::info!(flowchat.addr = %config.addr, "starting flowchat backend");

    FlowService::new(Arc::new(upstream))
        .serve(config.addr)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}
