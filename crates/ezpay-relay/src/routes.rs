use std::future::Future;
use std::time::Instant;

use actix_web::{web, HttpRequest, HttpResponse};
use ezpay::{
    ApproveCheckRequest, DynamicPaymentRequest, EzpayError, GaslessCreateRequest,
    GaslessPaymentRequest, LedgerClient, AvailabilityResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;

/// Mount every relay route for a server backed by ledgers of type `L`.
pub fn configure<L: LedgerClient + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::<L>))
        .route("/supported", web::get().to(supported::<L>))
        .route("/metrics", web::get().to(metrics_endpoint::<L>))
        .service(
            web::resource("/api/gasless-create")
                .route(web::get().to(availability))
                .route(web::post().to(gasless_create::<L>)),
        )
        .service(
            web::resource("/api/gasless-payment")
                .route(web::get().to(availability))
                .route(web::post().to(gasless_payment::<L>)),
        )
        .service(
            web::resource("/api/gasless-approve")
                .route(web::get().to(availability))
                .route(web::post().to(gasless_approve::<L>)),
        )
        .service(
            web::resource("/api/gasless-dynamic-payment")
                .route(web::get().to(availability))
                .route(web::post().to(gasless_dynamic_payment::<L>)),
        );
}

pub async fn health<L: LedgerClient + 'static>(state: web::Data<AppState<L>>) -> HttpResponse {
    let mut healthy = true;
    let chains: Vec<serde_json::Value> = state
        .relay
        .block_numbers()
        .await
        .into_iter()
        .map(|(chain_id, block)| match block {
            Ok(block) => serde_json::json!({
                "chainId": chain_id,
                "latestBlock": block.to_string(),
            }),
            Err(e) => {
                healthy = false;
                tracing::warn!(chain_id, error = %e, "health check: RPC unreachable");
                serde_json::json!({
                    "chainId": chain_id,
                    "error": "RPC unreachable",
                })
            }
        })
        .collect();

    let body = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "service": "ezpay-relay",
        "sponsor": state.relay.sponsor_address(),
        "chains": chains,
    });
    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

pub async fn supported<L: LedgerClient + 'static>(state: web::Data<AppState<L>>) -> HttpResponse {
    let chains: Vec<serde_json::Value> = state
        .relay
        .supported()
        .into_iter()
        .map(|(chain_id, contract)| {
            let meta = state.chains.iter().find(|c| c.chain_id == chain_id);
            serde_json::json!({
                "chainId": chain_id,
                "contractAddress": contract,
                "name": meta.map(|c| c.name.as_str()),
                "explorer": meta.map(|c| c.explorer_base.as_str()),
            })
        })
        .collect();
    HttpResponse::Ok().json(serde_json::json!({
        "chains": chains,
        "sponsor": state.relay.sponsor_address(),
    }))
}

pub async fn metrics_endpoint<L: LedgerClient + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<L>>,
) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let header = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            if !ezpay::security::bearer_matches(header, token) {
                metrics::METRICS_AUTH_FAILURES
                    .with_label_values(&[if header.is_some() { "invalid" } else { "missing" }])
                    .inc();
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None if !state.public_metrics => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN or EZPAY_PUBLIC_METRICS=true to access /metrics"
            }));
        }
        None => {}
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

/// `GET` on a relay path: tells clients the endpoint is up.
pub async fn availability(req: HttpRequest) -> HttpResponse {
    let what = match req.path() {
        "/api/gasless-create" => "Gasless bill creation",
        "/api/gasless-payment" => "Gasless payment",
        "/api/gasless-approve" => "Approval check",
        "/api/gasless-dynamic-payment" => "Gasless dynamic payment",
        _ => "Relay",
    };
    HttpResponse::Ok().json(AvailabilityResponse {
        message: format!("{what} endpoint is available"),
        available: true,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn gasless_payment<L: LedgerClient + 'static>(
    state: web::Data<AppState<L>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: GaslessPaymentRequest = parse_body(&body)?;
    timed("gasless_payment", state.relay.gasless_payment(req)).await
}

pub async fn gasless_create<L: LedgerClient + 'static>(
    state: web::Data<AppState<L>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: GaslessCreateRequest = parse_body(&body)?;
    timed("gasless_create", state.relay.gasless_create(req)).await
}

pub async fn gasless_approve<L: LedgerClient + 'static>(
    state: web::Data<AppState<L>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: ApproveCheckRequest = parse_body(&body)?;
    timed("gasless_approve", state.relay.check_approval(req)).await
}

pub async fn gasless_dynamic_payment<L: LedgerClient + 'static>(
    state: web::Data<AppState<L>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: DynamicPaymentRequest = parse_body(&body)?;
    timed("gasless_dynamic_payment", state.relay.dynamic_payment(req)).await
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        ApiError(EzpayError::Validation(format!("invalid request body: {e}")))
    })
}

async fn timed<T, F>(endpoint: &'static str, op: F) -> Result<HttpResponse, ApiError>
where
    T: Serialize,
    F: Future<Output = Result<T, EzpayError>>,
{
    let start = Instant::now();
    let result = op.await;
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(body) => {
            metrics::observe(endpoint, "success", elapsed);
            Ok(HttpResponse::Ok().json(body))
        }
        Err(e) => {
            let e = ApiError(e);
            metrics::observe(endpoint, e.outcome(), elapsed);
            tracing::warn!(endpoint, code = e.0.code(), error = %e, "relay request failed");
            Err(e)
        }
    }
}
