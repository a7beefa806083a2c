use actix_web::test;
use market_payment_engine::db_types::{Order, PaymentIntentStatus, Role};
use mpg_common::CoinAmount;

use super::helpers::{access_token, bearer, prepare_env, priced_metadata, seed_catalog, test_service, TestEnv};
use crate::{
    data_objects::{ApprovePaymentRequest, JsonResponse},
    helpers::calculate_hmac,
    webhook_routes::WEBHOOK_SIGNATURE_HEADER,
};

fn webhook_body(env: &TestEnv, payment_id: &str, status: &str, tx_ref: Option<&str>) -> (String, Vec<u8>) {
    let body = match tx_ref {
        Some(tx) => format!(r#"{{"payment_id":"{payment_id}","status":"{status}","tx_ref":"{tx}"}}"#),
        None => format!(r#"{{"payment_id":"{payment_id}","status":"{status}"}}"#),
    }
    .into_bytes();
    let signature = hex::encode(calculate_hmac(env.config.webhook_secret.reveal(), &body));
    (signature, body)
}

#[actix_web::test]
async fn the_full_payment_flow_over_http() {
    let env = prepare_env().await;
    seed_catalog(&env).await;
    let app = test_service!(&env);
    let token = access_token(&env, "cust-1", vec![Role::Customer]);

    // Approve: 2 gadgets at 10 + 2 delivery = 22
    let metadata = priced_metadata(&env, "cust-1", 2).await;
    let request = ApprovePaymentRequest {
        payment_id: "pay-http".into(),
        amount: metadata.total,
        memo: Some("two gadgets".to_string()),
        metadata,
    };
    let req = test::TestRequest::post()
        .uri("/api/payments/approve")
        .insert_header(bearer(&token))
        .set_json(&request)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success(), "approve failed: {}", res.status());

    // The poller view: approved, no tx yet.
    let req = test::TestRequest::get()
        .uri("/api/payments/pay-http/status")
        .insert_header(bearer(&token))
        .to_request();
    let status: market_payment_engine::PaymentStatus = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status.status, PaymentIntentStatus::ServerApproved);
    assert!(status.tx_ref.is_none());

    // The webhook completes the payment out-of-band.
    let (signature, body) = webhook_body(&env, "pay-http", "completed", Some("tx-http-1"));
    let req = test::TestRequest::post()
        .uri("/wallet/webhook/payment")
        .insert_header((WEBHOOK_SIGNATURE_HEADER, signature))
        .set_payload(body)
        .to_request();
    let res: JsonResponse = test::call_and_read_body_json(&app, req).await;
    assert!(res.success, "{}", res.message);

    let req = test::TestRequest::get()
        .uri("/api/payments/pay-http/status")
        .insert_header(bearer(&token))
        .to_request();
    let status: market_payment_engine::PaymentStatus = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status.status, PaymentIntentStatus::Completed);
    assert_eq!(status.tx_ref.as_deref(), Some("tx-http-1"));

    // The customer sees exactly one order with the approved total.
    let req = test::TestRequest::get().uri("/api/orders").insert_header(bearer(&token)).to_request();
    let orders: Vec<Order> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].total_price, CoinAmount::from_coins(22));
}

#[actix_web::test]
async fn the_client_callback_and_webhook_agree_on_one_order() {
    let env = prepare_env().await;
    seed_catalog(&env).await;
    let app = test_service!(&env);
    let token = access_token(&env, "cust-2", vec![Role::Customer]);

    let metadata = priced_metadata(&env, "cust-2", 1).await;
    let request = ApprovePaymentRequest {
        payment_id: "pay-both".into(),
        amount: metadata.total,
        memo: None,
        metadata,
    };
    let req = test::TestRequest::post()
        .uri("/api/payments/approve")
        .insert_header(bearer(&token))
        .set_json(&request)
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    // Channel 1: the client callback endpoint.
    let req = test::TestRequest::post()
        .uri("/api/payments/pay-both/complete")
        .insert_header(bearer(&token))
        .set_json(serde_json::json!({ "tx_ref": "tx-both" }))
        .to_request();
    let first: Order = test::call_and_read_body_json(&app, req).await;

    // Channel 2: the webhook replays the same completion.
    let (signature, body) = webhook_body(&env, "pay-both", "completed", Some("tx-both"));
    let req = test::TestRequest::post()
        .uri("/wallet/webhook/payment")
        .insert_header((WEBHOOK_SIGNATURE_HEADER, signature))
        .set_payload(body)
        .to_request();
    let res: JsonResponse = test::call_and_read_body_json(&app, req).await;
    assert!(res.success);

    let req = test::TestRequest::get().uri("/api/orders").insert_header(bearer(&token)).to_request();
    let orders: Vec<Order> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_id, first.order_id);
}

#[actix_web::test]
async fn a_tampered_amount_is_rejected_with_bad_request() {
    let env = prepare_env().await;
    seed_catalog(&env).await;
    let app = test_service!(&env);
    let token = access_token(&env, "cust-3", vec![Role::Customer]);

    let mut metadata = priced_metadata(&env, "cust-3", 1).await;
    metadata.total = CoinAmount::from_coins(1);
    let request = ApprovePaymentRequest {
        payment_id: "pay-bad".into(),
        amount: CoinAmount::from_coins(1),
        memo: None,
        metadata,
    };
    let req = test::TestRequest::post()
        .uri("/api/payments/approve")
        .insert_header(bearer(&token))
        .set_json(&request)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 400);
}

#[actix_web::test]
async fn webhooks_with_bad_signatures_are_refused() {
    let env = prepare_env().await;
    seed_catalog(&env).await;
    let app = test_service!(&env);

    let (_, body) = webhook_body(&env, "pay-x", "completed", Some("tx-x"));
    let req = test::TestRequest::post()
        .uri("/wallet/webhook/payment")
        .insert_header((WEBHOOK_SIGNATURE_HEADER, "deadbeef"))
        .set_payload(body.clone())
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 403);

    let req = test::TestRequest::post().uri("/wallet/webhook/payment").set_payload(body).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 403);
}

#[actix_web::test]
async fn approving_requires_the_customer_role() {
    let env = prepare_env().await;
    seed_catalog(&env).await;
    let app = test_service!(&env);
    let token = access_token(&env, "op-1", vec![Role::StoreOperator]);

    let metadata = priced_metadata(&env, "op-1", 1).await;
    let request = ApprovePaymentRequest {
        payment_id: "pay-role".into(),
        amount: metadata.total,
        memo: None,
        metadata,
    };
    let req = test::TestRequest::post()
        .uri("/api/payments/approve")
        .insert_header(bearer(&token))
        .set_json(&request)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 403);
}
