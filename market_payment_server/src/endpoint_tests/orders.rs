use actix_web::test;
use market_payment_engine::{
    db_types::{Order, PaymentId, Role},
    events::EventProducers,
    PaymentFlowApi,
};

use super::helpers::{access_token, bearer, prepare_env, priced_metadata, seed_catalog, test_service, TestEnv};
use crate::data_objects::UpdateOrderStatusRequest;

/// Takes a payment through approval and completion directly against the
/// engine, leaving a `Confirmed` order for the HTTP tests to act on.
async fn confirmed_order(env: &TestEnv, payment_id: &str, customer_id: &str) -> Order {
    let api = PaymentFlowApi::new(env.db.clone(), EventProducers::default());
    let metadata = priced_metadata(env, customer_id, 1).await;
    api.approve_payment(customer_id, &PaymentId::from(payment_id), metadata.total, None, &metadata).await.unwrap();
    api.complete_payment(&PaymentId::from(payment_id), "tx").await.unwrap()
}

#[actix_web::test]
async fn operators_walk_an_order_through_its_lifecycle() {
    let env = prepare_env().await;
    let driver_id = seed_catalog(&env).await;
    let order = confirmed_order(&env, "pay-ord-1", "cust-1").await;
    let app = test_service!(&env);
    let token = access_token(&env, "op-1", vec![Role::StoreOperator]);
    let uri = format!("/api/orders/{}/status", order.order_id.as_str());

    for (status, driver) in [("Preparing", None), ("OutForDelivery", Some(driver_id)), ("Delivered", None)] {
        let body = serde_json::json!({ "new_status": status, "driver_id": driver });
        let req = test::TestRequest::post().uri(&uri).insert_header(bearer(&token)).set_json(&body).to_request();
        let updated: Order = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated.status.to_string(), status);
    }
}

#[actix_web::test]
async fn out_of_order_transitions_conflict() {
    let env = prepare_env().await;
    seed_catalog(&env).await;
    let order = confirmed_order(&env, "pay-ord-2", "cust-2").await;
    let app = test_service!(&env);
    let token = access_token(&env, "op-1", vec![Role::StoreOperator]);

    let request = UpdateOrderStatusRequest {
        new_status: market_payment_engine::db_types::OrderStatus::Delivered,
        driver_id: None,
    };
    let req = test::TestRequest::post()
        .uri(&format!("/api/orders/{}/status", order.order_id.as_str()))
        .insert_header(bearer(&token))
        .set_json(&request)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 409);
}

#[actix_web::test]
async fn customers_cannot_drive_the_state_machine() {
    let env = prepare_env().await;
    seed_catalog(&env).await;
    let order = confirmed_order(&env, "pay-ord-3", "cust-3").await;
    let app = test_service!(&env);
    let token = access_token(&env, "cust-3", vec![Role::Customer]);

    let request = UpdateOrderStatusRequest {
        new_status: market_payment_engine::db_types::OrderStatus::Preparing,
        driver_id: None,
    };
    let req = test::TestRequest::post()
        .uri(&format!("/api/orders/{}/status", order.order_id.as_str()))
        .insert_header(bearer(&token))
        .set_json(&request)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 403);
}

#[actix_web::test]
async fn store_listings_are_operator_only() {
    let env = prepare_env().await;
    seed_catalog(&env).await;
    confirmed_order(&env, "pay-ord-4", "cust-4").await;
    let app = test_service!(&env);

    let op = access_token(&env, "op-1", vec![Role::StoreOperator]);
    let req = test::TestRequest::get().uri("/api/orders?store_id=store-1").insert_header(bearer(&op)).to_request();
    let orders: Vec<Order> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(orders.len(), 1);

    let cust = access_token(&env, "cust-4", vec![Role::Customer]);
    let req = test::TestRequest::get().uri("/api/orders?store_id=store-1").insert_header(bearer(&cust)).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 403);
}
