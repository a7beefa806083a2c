//! The order state machine: monotonic transitions, driver dispatch
//! preconditions, authorization and cancellation compensation.

mod common;

use common::*;
use market_payment_engine::{
    db_types::{DriverStatus, OrderStatus, PaymentId, Role},
    events::EventProducers,
    traits::{CheckoutStore, OrderManagement, PaymentGatewayError},
    Actor,
    OrderFlowApi,
    SqliteDatabase,
};

async fn confirmed_order(env: &TestEnv, payment_id: &str, customer_id: &str) -> market_payment_engine::db_types::Order {
    approved_payment(&env.db, payment_id, customer_id, &[line("gadget", 1)], None).await;
    payment_api(&env.db).complete_payment(&PaymentId::from(payment_id), "tx").await.unwrap()
}

fn order_api(db: &SqliteDatabase) -> OrderFlowApi<SqliteDatabase> {
    OrderFlowApi::new(db.clone(), EventProducers::default())
}

fn operator() -> Actor {
    Actor::new("op-1", vec![Role::StoreOperator])
}

#[tokio::test]
async fn the_full_delivery_lifecycle() {
    let env = prepare_test_env().await;
    let driver_id = seed_catalog(&env.db).await;
    let order = confirmed_order(&env, "pay-life", "cust-1").await;
    let api = order_api(&env.db);
    let op = operator();

    let order2 = api.update_order_status(&op, &order.order_id, OrderStatus::Preparing, None).await.unwrap();
    assert_eq!(order2.status, OrderStatus::Preparing);

    let order3 =
        api.update_order_status(&op, &order.order_id, OrderStatus::OutForDelivery, Some(driver_id)).await.unwrap();
    assert_eq!(order3.status, OrderStatus::OutForDelivery);
    assert_eq!(order3.driver_id, Some(driver_id));
    let driver = env.db.fetch_driver(driver_id).await.unwrap().unwrap();
    assert_eq!(driver.status, DriverStatus::OnDelivery);

    // The bound driver may mark their own delivery as done.
    let courier = Actor::new("drv-user-1", vec![Role::Driver]);
    let order4 = api.update_order_status(&courier, &order.order_id, OrderStatus::Delivered, None).await.unwrap();
    assert_eq!(order4.status, OrderStatus::Delivered);
    let driver = env.db.fetch_driver(driver_id).await.unwrap().unwrap();
    assert_eq!(driver.status, DriverStatus::Active, "delivery releases the driver back into the pool");
}

#[tokio::test]
async fn skipping_ahead_is_rejected_and_leaves_the_order_unchanged() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let order = confirmed_order(&env, "pay-skip", "cust-2").await;
    let api = order_api(&env.db);

    let err = api.update_order_status(&operator(), &order.order_id, OrderStatus::Delivered, None).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentGatewayError::InvalidTransition { from: OrderStatus::Confirmed, to: OrderStatus::Delivered, .. }
    ));
    let unchanged = env.db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn terminal_states_admit_no_transition() {
    let env = prepare_test_env().await;
    let driver_id = seed_catalog(&env.db).await;
    let order = confirmed_order(&env, "pay-term", "cust-3").await;
    let api = order_api(&env.db);
    let op = operator();
    api.update_order_status(&op, &order.order_id, OrderStatus::Preparing, None).await.unwrap();
    api.update_order_status(&op, &order.order_id, OrderStatus::OutForDelivery, Some(driver_id)).await.unwrap();
    api.update_order_status(&op, &order.order_id, OrderStatus::Delivered, None).await.unwrap();

    for target in [OrderStatus::Confirmed, OrderStatus::Preparing, OrderStatus::OutForDelivery, OrderStatus::Cancelled] {
        let err = api.update_order_status(&op, &order.order_id, target, None).await.unwrap_err();
        assert!(matches!(err, PaymentGatewayError::InvalidTransition { .. }), "Delivered -> {target} must fail");
    }
}

#[tokio::test]
async fn dispatch_with_an_inactive_driver_leaves_the_order_preparing() {
    let env = prepare_test_env().await;
    let driver_id = seed_catalog(&env.db).await;
    env.db.set_driver_status(driver_id, DriverStatus::Inactive).await.unwrap();
    let order = confirmed_order(&env, "pay-nodrv", "cust-4").await;
    let api = order_api(&env.db);
    let op = operator();
    api.update_order_status(&op, &order.order_id, OrderStatus::Preparing, None).await.unwrap();

    let err =
        api.update_order_status(&op, &order.order_id, OrderStatus::OutForDelivery, Some(driver_id)).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::DriverUnavailable { .. }), "got {err}");
    let unchanged = env.db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, OrderStatus::Preparing);
    assert_eq!(unchanged.driver_id, None, "no driver may be bound on a failed dispatch");
}

#[tokio::test]
async fn dispatch_requires_a_driver_from_the_stores_pool() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let foreign_driver = env.db.add_driver("store-2", "drv-user-2", "Alex").await.unwrap();
    let order = confirmed_order(&env, "pay-pool", "cust-5").await;
    let api = order_api(&env.db);
    let op = operator();
    api.update_order_status(&op, &order.order_id, OrderStatus::Preparing, None).await.unwrap();

    let err = api
        .update_order_status(&op, &order.order_id, OrderStatus::OutForDelivery, Some(foreign_driver))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentGatewayError::DriverUnavailable { .. }));
}

#[tokio::test]
async fn dispatch_without_a_driver_id_asks_for_one() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let order = confirmed_order(&env, "pay-prompt", "cust-6").await;
    let api = order_api(&env.db);
    let op = operator();
    api.update_order_status(&op, &order.order_id, OrderStatus::Preparing, None).await.unwrap();

    let err = api.update_order_status(&op, &order.order_id, OrderStatus::OutForDelivery, None).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::DriverRequired(_)));
}

#[tokio::test]
async fn cancellation_restocks_inventory_and_releases_the_discount() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    approved_payment(&env.db, "pay-comp", "cust-7", &[line("gadget", 2)], Some("SAVE10")).await;
    let order = payment_api(&env.db).complete_payment(&PaymentId::from("pay-comp"), "tx-comp").await.unwrap();
    assert_eq!(env.db.fetch_product("gadget").await.unwrap().unwrap().quantity, 3);
    assert_eq!(env.db.fetch_discount(STORE, "SAVE10").await.unwrap().unwrap().usage_count, 1);

    let api = order_api(&env.db);
    let cancelled = api.update_order_status(&operator(), &order.order_id, OrderStatus::Cancelled, None).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(env.db.fetch_product("gadget").await.unwrap().unwrap().quantity, 5);
    assert_eq!(env.db.fetch_discount(STORE, "SAVE10").await.unwrap().unwrap().usage_count, 0);
}

#[tokio::test]
async fn only_staff_of_the_owning_store_may_transition() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    env.db.add_store_operator("store-2", "op-2").await.unwrap();
    let order = confirmed_order(&env, "pay-auth", "cust-8").await;
    let api = order_api(&env.db);

    // A customer cannot drive the state machine.
    let customer = Actor::new("cust-8", vec![Role::Customer]);
    let err = api.update_order_status(&customer, &order.order_id, OrderStatus::Preparing, None).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::NotAuthorized(_)));

    // Neither can an operator of a different store.
    let foreign_op = Actor::new("op-2", vec![Role::StoreOperator]);
    let err = api.update_order_status(&foreign_op, &order.order_id, OrderStatus::Preparing, None).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::NotAuthorized(_)));

    // An admin can.
    let admin = Actor::new("root", vec![Role::Admin]);
    let updated = api.update_order_status(&admin, &order.order_id, OrderStatus::Preparing, None).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Preparing);
}

#[tokio::test]
async fn a_driver_may_only_deliver_their_own_binding() {
    let env = prepare_test_env().await;
    let driver_id = seed_catalog(&env.db).await;
    env.db.add_driver(STORE, "drv-user-3", "Sam").await.unwrap();
    let order = confirmed_order(&env, "pay-drv-auth", "cust-9").await;
    let api = order_api(&env.db);
    let op = operator();
    api.update_order_status(&op, &order.order_id, OrderStatus::Preparing, None).await.unwrap();
    api.update_order_status(&op, &order.order_id, OrderStatus::OutForDelivery, Some(driver_id)).await.unwrap();

    let other_courier = Actor::new("drv-user-3", vec![Role::Driver]);
    let err = api.update_order_status(&other_courier, &order.order_id, OrderStatus::Delivered, None).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::NotAuthorized(_)));

    let bound_courier = Actor::new("drv-user-1", vec![Role::Driver]);
    let delivered = api.update_order_status(&bound_courier, &order.order_id, OrderStatus::Delivered, None).await.unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
}
