use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use alloy::providers::ProviderBuilder;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ezpay::RelayService;
use ezpay_relay::config::RelayConfig;
use ezpay_relay::routes;
use ezpay_relay::state::{AppState, ChainLedger};

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let identity = Arc::new(config.identity);
    let sponsor = identity.address();

    let mut relay = RelayService::new(identity.clone()).with_receipt_timeout(config.receipt_timeout);
    for chain in &config.chains {
        let url = match chain.rpc_url.parse::<url::Url>() {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(chain_id = chain.chain_id, "invalid RPC URL {}: {e}", chain.rpc_url);
                std::process::exit(1);
            }
        };
        let provider = ProviderBuilder::new()
            .wallet(identity.wallet())
            .connect_http(url);
        relay = relay.with_ledger(
            ChainLedger::new(provider, chain.chain_id, chain.contract_address, sponsor)
                .with_authorized_create(config.authorized_create),
        );
        tracing::info!(
            chain_id = chain.chain_id,
            contract = %chain.contract_address,
            "Serving {}",
            chain.name
        );
    }

    if config.metrics_token.is_none() && !config.public_metrics {
        tracing::warn!("METRICS_TOKEN not set: /metrics is disabled");
    }

    let state = web::Data::new(
        AppState::new(relay, config.chains)
            .with_metrics_token(config.metrics_token)
            .with_public_metrics(config.public_metrics),
    );

    let port = config.port;
    let rate_limit_rpm = config.rate_limit_rpm;
    let cors_origins = config.allowed_origins;

    tracing::info!("Ezpay relay listening on port {port}");
    tracing::info!("Sponsor address: {sponsor}");
    tracing::info!("Rate limit: {rate_limit_rpm} req/min per IP");
    tracing::info!("  GET  http://localhost:{port}/supported");
    tracing::info!("  POST http://localhost:{port}/api/gasless-payment");

    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm)
        .finish()
    {
        Some(conf) => conf,
        None => {
            tracing::error!("failed to build rate limiter config");
            std::process::exit(1);
        }
    };

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::default().limit(65_536))
            .configure(routes::configure::<ChainLedger>)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
