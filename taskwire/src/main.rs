//! Taskwire gateway -- JWT-gated task event broker.
//!
//! An axum HTTP/WebSocket server that verifies a bearer token on every
//! request, serves task queries and mutations from an in-memory engine, and
//! fans task-lifecycle events out to subscribed clients.
//!
//! # Usage
//!
//! ```bash
//! # Run with the issuer's public key
//! cargo run --bin taskwire -- --public-key /etc/taskwire/issuer.pem
//!
//! # Run on a custom address with an EC key
//! cargo run --bin taskwire -- \
//!     --bind 127.0.0.1:8080 --public-key issuer.pem --algorithm ES256
//!
//! # Or via environment variables
//! TASKWIRE_ADDR=127.0.0.1:8080 TASKWIRE_PUBLIC_KEY=issuer.pem cargo run
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use taskwire::auth::{TokenVerifier, parse_algorithm};
use taskwire::bus::EventBus;
use taskwire::config::{GatewayCliArgs, GatewayConfig};
use taskwire::directory::InMemoryDirectory;
use taskwire::engine::TaskEngine;
use taskwire::ratelimit::RateLimiter;
use taskwire::server::{self, AppState};

#[tokio::main]
async fn main() {
    let cli = GatewayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match GatewayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting taskwire gateway");

    // Load the issuer's public key once at startup; verification must never
    // touch the filesystem per request.
    let Some(key_path) = config.public_key_path.as_ref() else {
        tracing::error!("no public key configured (--public-key or [auth] public_key_path)");
        std::process::exit(1);
    };
    let pem = match std::fs::read(key_path) {
        Ok(pem) => pem,
        Err(e) => {
            tracing::error!(path = %key_path.display(), error = %e, "failed to read public key");
            std::process::exit(1);
        }
    };
    let verifier = match parse_algorithm(&config.algorithm)
        .and_then(|algorithm| TokenVerifier::from_pem(&pem, algorithm))
    {
        Ok(verifier) => verifier,
        Err(e) => {
            tracing::error!(error = %e, "failed to build token verifier");
            std::process::exit(1);
        }
    };
    tracing::info!(
        path = %key_path.display(),
        algorithm = %config.algorithm,
        "issuer public key loaded"
    );

    let bus = Arc::new(EventBus::with_capacity(config.channel_capacity));
    let directory = Arc::new(InMemoryDirectory::new());
    let engine = Arc::new(TaskEngine::new(Arc::clone(&bus), directory));
    let limiter = RateLimiter::new(
        config.rate_limit_max,
        Duration::from_secs(config.rate_limit_window_secs),
    );

    let state = AppState {
        engine,
        bus,
        verifier: Arc::new(verifier),
        limiter,
    };

    match server::start_server(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "gateway listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "gateway server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start gateway");
            std::process::exit(1);
        }
    }
}
