use std::convert::Infallible;

use anyhow::Context;
use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use clap::Parser;
use tower::{Layer, ServiceExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pantry_path::config::{self, PantryPathConfig};
use pantry_path::middleware::{PantryPathLayer, RewrittenPath};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "pantry_path=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Cli::parse();
    let cfg = config::load(args.config.as_deref())?;

    let result = match args.command {
        cli::Commands::Rewrite { path, key } => run_rewrite(cfg, &path, key.as_deref()).await,
        cli::Commands::Check => run_check(cfg),
    };

    if let Err(ref e) = result {
        tracing::error!("{:#}", e);
    }
    result
}

fn run_check(cfg: PantryPathConfig) -> anyhow::Result<()> {
    PantryPathLayer::new(cfg.clone()).context("invalid pantry path configuration")?;
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}

async fn run_rewrite(cfg: PantryPathConfig, path: &str, key: Option<&str>) -> anyhow::Result<()> {
    let key_header = cfg.key_header.clone();
    let layer = PantryPathLayer::new(cfg).context("invalid pantry path configuration")?;

    // Stand-in for the upstream: answers with the target it was handed.
    let upstream = tower::service_fn(|req: Request<Body>| async move {
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_default();
        let decoded = req
            .extensions()
            .get::<RewrittenPath>()
            .map(|p| String::from_utf8_lossy(&p.0).into_owned());
        tracing::info!(forwarded_to = %target, decoded = ?decoded, "forwarded");
        Ok::<Response, Infallible>(target.into_response())
    });

    let mut builder = Request::builder().uri(path);
    if let Some(key) = key {
        builder = builder.header(key_header.as_str(), key);
    }
    let req = builder
        .body(Body::empty())
        .with_context(|| format!("invalid request path '{}'", path))?;

    let resp = match layer.layer(upstream).oneshot(req).await {
        Ok(resp) => resp,
        Err(never) => match never {},
    };
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    let body = String::from_utf8_lossy(&body);

    if status.is_success() {
        println!("{}", body);
        Ok(())
    } else {
        anyhow::bail!("request rejected with {}: {}", status, body)
    }
}
