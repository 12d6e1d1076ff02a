use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use actix_web::{test, web, App};
use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;

use ezpay::authorization::{sign_authorization, SignatureScheme};
use ezpay::constants::ChainConfig;
use ezpay::permit::TokenDomain;
use ezpay::{
    Authorization, BillLedger, CallContext, LocalLedger, RelayIdentity, RelayService,
    EZPAY_SEPOLIA_CONTRACT, MANTLE_SEPOLIA_CHAIN_ID, NATIVE_TOKEN, SEPOLIA_USDC,
};
use ezpay_relay::routes;
use ezpay_relay::state::AppState;

const MERCHANT: Address = Address::repeat_byte(0x11);

/// Build an AppState over an in-process ledger with USDC registered.
fn make_state(
    receipt_timeout: Duration,
    metrics_token: Option<Vec<u8>>,
) -> (web::Data<AppState<LocalLedger>>, LocalLedger) {
    let sponsor = Arc::new(RelayIdentity::new(PrivateKeySigner::random()));
    let mut bills = BillLedger::new(EZPAY_SEPOLIA_CONTRACT, MANTLE_SEPOLIA_CHAIN_ID);
    bills
        .tokens_mut()
        .register_token(SEPOLIA_USDC, TokenDomain::new("USD Coin", "1"));
    let ledger = LocalLedger::new(bills, sponsor.address());

    let relay = RelayService::new(sponsor)
        .with_ledger(ledger.clone())
        .with_receipt_timeout(receipt_timeout);
    let state = AppState::new(relay, vec![ChainConfig::default()]).with_metrics_token(metrics_token);
    (web::Data::new(state), ledger)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

async fn open_bill(ledger: &LocalLedger, bill_id: B256, token: Address, amount: U256) {
    ledger
        .lock()
        .await
        .create_bill(CallContext::new(MERCHANT, now()), bill_id, token, amount)
        .unwrap();
}

async fn fund(ledger: &LocalLedger, payer: Address, amount: U256) {
    let mut l = ledger.lock().await;
    l.tokens_mut().mint(SEPOLIA_USDC, payer, amount).unwrap();
    l.tokens_mut()
        .approve(SEPOLIA_USDC, payer, EZPAY_SEPOLIA_CONTRACT, amount);
}

/// JSON body a wallet front end would post to /api/gasless-payment.
fn payment_body(payer: &PrivateKeySigner, bill_id: B256, nonce: u64) -> serde_json::Value {
    let msg = Authorization {
        billId: bill_id,
        nonce: U256::from(nonce),
        chainId: U256::from(MANTLE_SEPOLIA_CHAIN_ID),
        contractAddress: EZPAY_SEPOLIA_CONTRACT,
    };
    let signed = sign_authorization(payer, &msg, SignatureScheme::TypedData).unwrap();
    serde_json::json!({
        "billId": bill_id,
        "contractAddress": EZPAY_SEPOLIA_CONTRACT,
        "chainId": MANTLE_SEPOLIA_CHAIN_ID,
        "authorization": {
            "authorizer": payer.address(),
            "billId": bill_id,
            "nonce": nonce.to_string(),
            "chainId": MANTLE_SEPOLIA_CHAIN_ID,
            "contractAddress": EZPAY_SEPOLIA_CONTRACT,
            "signature": alloy::hex::encode_prefixed(&signed.signature),
        },
    })
}

fn fifty_usdc() -> U256 {
    U256::from(50_000_000u64)
}

// -- Discovery --

#[actix_rt::test]
async fn test_supported_lists_chain_and_contract() {
    let (state, _) = make_state(Duration::from_secs(2), None);
    let sponsor = state.relay.sponsor_address();
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let req = test::TestRequest::get().uri("/supported").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["chains"][0]["chainId"], MANTLE_SEPOLIA_CHAIN_ID);
    assert_eq!(
        body["chains"][0]["contractAddress"],
        serde_json::json!(EZPAY_SEPOLIA_CONTRACT)
    );
    assert_eq!(body["chains"][0]["name"], "Mantle Sepolia Testnet");
    assert_eq!(body["sponsor"], serde_json::json!(sponsor));
}

#[actix_rt::test]
async fn test_health_reports_latest_block() {
    let (state, _) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "ezpay-relay");
    assert_eq!(body["chains"][0]["latestBlock"], "1");
}

#[actix_rt::test]
async fn test_availability_endpoints_report_available() {
    let (state, _) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    for path in [
        "/api/gasless-create",
        "/api/gasless-payment",
        "/api/gasless-approve",
        "/api/gasless-dynamic-payment",
    ] {
        let req = test::TestRequest::get().uri(path).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200, "{path}");
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["available"], true);
        assert!(body["message"].as_str().unwrap().ends_with("endpoint is available"));
        assert!(body["timestamp"].as_str().is_some());
    }
}

// -- Request validation --

#[actix_rt::test]
async fn test_payment_missing_fields() {
    let (state, ledger) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/gasless-payment")
        .set_payload("{}")
        .insert_header(("Content-Type", "application/json"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "ValidationError");
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("billId"));
    assert!(error.contains("authorization"));
    assert_eq!(ledger.lock().await.total_bills(), U256::ZERO);
}

#[actix_rt::test]
async fn test_payment_rejects_malformed_body() {
    let (state, _) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/gasless-payment")
        .set_payload("not valid json at all")
        .insert_header(("Content-Type", "application/json"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("invalid request body"));
}

#[actix_rt::test]
async fn test_payment_unknown_chain() {
    let (state, _) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let payer = PrivateKeySigner::random();
    let mut body = payment_body(&payer, B256::repeat_byte(1), 0);
    body["chainId"] = serde_json::json!(5000);

    let req = test::TestRequest::post()
        .uri("/api/gasless-payment")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "UnsupportedChain");
}

// -- Payment flow --

#[actix_rt::test]
async fn test_payment_settles_then_conflicts_on_replay() {
    let (state, ledger) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let payer = PrivateKeySigner::random();
    let bill_id = B256::repeat_byte(0x22);
    open_bill(&ledger, bill_id, SEPOLIA_USDC, fifty_usdc()).await;
    fund(&ledger, payer.address(), fifty_usdc()).await;
    let body = payment_body(&payer, bill_id, 0);

    let req = test::TestRequest::post()
        .uri("/api/gasless-payment")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["success"], true);
    assert!(json["txHash"].as_str().unwrap().starts_with("0x"));
    assert_eq!(json["blockNumber"], 2);

    {
        let l = ledger.lock().await;
        let bill = l.get_bill(bill_id);
        assert!(bill.paid);
        assert_eq!(bill.payer, payer.address());
        assert_eq!(l.tokens().balance_of(SEPOLIA_USDC, MERCHANT), fifty_usdc());
    }

    let req = test::TestRequest::post()
        .uri("/api/gasless-payment")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["code"], "BillAlreadyPaid");
}

#[actix_rt::test]
async fn test_payment_accepts_wallet_body_verbatim() {
    let (state, ledger) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let payer = PrivateKeySigner::random();
    let bill_id = B256::repeat_byte(0x2A);
    open_bill(&ledger, bill_id, SEPOLIA_USDC, fifty_usdc()).await;
    fund(&ledger, payer.address(), fifty_usdc()).await;

    // The pay page signs the raw message hash, sends no scheme tag and
    // stringifies the nested nonce and chainId.
    let msg = Authorization {
        billId: bill_id,
        nonce: U256::ZERO,
        chainId: U256::from(MANTLE_SEPOLIA_CHAIN_ID),
        contractAddress: EZPAY_SEPOLIA_CONTRACT,
    };
    let signed = sign_authorization(&payer, &msg, SignatureScheme::RawHash).unwrap();
    let body = format!(
        r#"{{
            "billId": "{bill_id}",
            "contractAddress": "{contract}",
            "chainId": 5003,
            "authorization": {{
                "authorizer": "{payer}",
                "billId": "{bill_id}",
                "nonce": "0",
                "chainId": "5003",
                "contractAddress": "{contract}",
                "signature": "{signature}"
            }}
        }}"#,
        contract = EZPAY_SEPOLIA_CONTRACT,
        payer = payer.address(),
        signature = alloy::hex::encode_prefixed(&signed.signature),
    );

    let req = test::TestRequest::post()
        .uri("/api/gasless-payment")
        .set_payload(body)
        .insert_header(("Content-Type", "application/json"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["success"], true);

    let l = ledger.lock().await;
    let bill = l.get_bill(bill_id);
    assert!(bill.paid);
    assert_eq!(bill.payer, payer.address());
}

#[actix_rt::test]
async fn test_create_accepts_dashboard_body() {
    let (state, ledger) = make_state(Duration::from_secs(2), None);
    let sponsor = state.relay.sponsor_address();
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let bill_id = B256::repeat_byte(0x2B);
    let body = serde_json::json!({
        "billId": bill_id,
        "token": SEPOLIA_USDC,
        "amount": "50000000",
        "contractAddress": EZPAY_SEPOLIA_CONTRACT,
        "chainId": "5003",
    });
    let req = test::TestRequest::post()
        .uri("/api/gasless-create")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["billId"], serde_json::json!(bill_id));

    {
        let l = ledger.lock().await;
        let bill = l.get_bill(bill_id);
        assert_eq!(bill.receiver, sponsor);
        assert_eq!(bill.amount, fifty_usdc());
    }

    let req = test::TestRequest::post()
        .uri("/api/gasless-create")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
}

#[actix_rt::test]
async fn test_payment_unknown_bill_not_found() {
    let (state, _) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let payer = PrivateKeySigner::random();
    let req = test::TestRequest::post()
        .uri("/api/gasless-payment")
        .set_json(payment_body(&payer, B256::repeat_byte(0x33), 0))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 404);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["code"], "BillNotFound");
}

#[actix_rt::test]
async fn test_native_bill_rejected() {
    let (state, ledger) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let bill_id = B256::repeat_byte(0x44);
    open_bill(&ledger, bill_id, NATIVE_TOKEN, U256::from(1_000u64)).await;
    let payer = PrivateKeySigner::random();

    let req = test::TestRequest::post()
        .uri("/api/gasless-payment")
        .set_json(payment_body(&payer, bill_id, 0))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["code"], "UnsupportedForNativeAsset");
    assert!(!ledger.lock().await.get_bill(bill_id).paid);
}

#[actix_rt::test]
async fn test_payment_without_allowance_returns_instructions() {
    let (state, ledger) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let bill_id = B256::repeat_byte(0x55);
    open_bill(&ledger, bill_id, SEPOLIA_USDC, fifty_usdc()).await;
    let payer = PrivateKeySigner::random();

    let req = test::TestRequest::post()
        .uri("/api/gasless-payment")
        .set_json(payment_body(&payer, bill_id, 0))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["code"], "InsufficientAllowance");
    assert_eq!(json["instructions"]["action"], "approve");
    assert_eq!(json["instructions"]["amount"], "50000000");
    assert_eq!(json["instructions"]["currentAllowance"], "0");
}

#[actix_rt::test]
async fn test_receipt_timeout_maps_to_gateway_timeout() {
    let (state, ledger) = make_state(Duration::from_millis(100), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let payer = PrivateKeySigner::random();
    let bill_id = B256::repeat_byte(0x66);
    open_bill(&ledger, bill_id, SEPOLIA_USDC, fifty_usdc()).await;
    fund(&ledger, payer.address(), fifty_usdc()).await;
    ledger.set_withhold_receipts(true);

    let req = test::TestRequest::post()
        .uri("/api/gasless-payment")
        .set_json(payment_body(&payer, bill_id, 0))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 504);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["code"], "Timeout");
}

// -- Approval check --

#[actix_rt::test]
async fn test_approve_check_reports_instructions() {
    let (state, ledger) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let user = Address::repeat_byte(0x77);
    let body = serde_json::json!({
        "tokenAddress": SEPOLIA_USDC,
        "amount": "50000000",
        "userAddress": user,
        "contractAddress": EZPAY_SEPOLIA_CONTRACT,
        "chainId": MANTLE_SEPOLIA_CHAIN_ID,
    });

    let req = test::TestRequest::post()
        .uri("/api/gasless-approve")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Approval required");
    assert_eq!(
        json["instructions"]["spender"],
        serde_json::json!(EZPAY_SEPOLIA_CONTRACT)
    );

    fund(&ledger, user, fifty_usdc()).await;
    let req = test::TestRequest::post()
        .uri("/api/gasless-approve")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["currentAllowance"], "50000000");
}

// -- Metrics --

#[actix_rt::test]
async fn test_metrics_requires_token() {
    let (state, _) = make_state(Duration::from_secs(2), Some(b"metrics-token-123".to_vec()));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer wrong-token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer metrics-token-123"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_rt::test]
async fn test_metrics_forbidden_when_no_token() {
    let (state, _) = make_state(Duration::from_secs(2), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<LocalLedger>),
    )
    .await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}
