//! The authoritative completion mutation: idempotency, the concurrent-writer
//! race, amount integrity and the pre-completion terminal transitions.

mod common;

use common::*;
use market_payment_engine::{
    db_types::{NewPaymentIntent, PaymentId, PaymentIntentStatus},
    traits::{CheckoutStore, OrderManagement, OrderQueryFilter, PaymentGatewayDatabase, PaymentGatewayError},
    CheckoutApi,
};
use mpg_common::CoinAmount;

#[tokio::test]
async fn completing_a_payment_n_times_yields_exactly_one_order() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    approved_payment(&env.db, "pay-idem", "cust-1", &[line("gadget", 2)], Some("SAVE10")).await;
    let api = payment_api(&env.db);
    let pid = PaymentId::from("pay-idem");

    let first = api.complete_payment(&pid, "tx-1").await.unwrap();
    for _ in 0..3 {
        let again = api.complete_payment(&pid, "tx-1").await.unwrap();
        assert_eq!(again.order_id, first.order_id);
        assert_eq!(again.id, first.id);
    }

    let orders = env.db.fetch_orders(OrderQueryFilter::default().with_customer_id("cust-1".to_string())).await.unwrap();
    assert_eq!(orders.len(), 1);

    // Side effects applied exactly once: 2 gadgets gone, one redemption.
    let gadget = env.db.fetch_product("gadget").await.unwrap().unwrap();
    assert_eq!(gadget.quantity, 3);
    let discount = env.db.fetch_discount(STORE, "SAVE10").await.unwrap().unwrap();
    assert_eq!(discount.usage_count, 1);

    let status = api.payment_status(&pid).await.unwrap();
    assert_eq!(status.status, PaymentIntentStatus::Completed);
    assert_eq!(status.tx_ref.as_deref(), Some("tx-1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_completions_create_exactly_one_order() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    approved_payment(&env.db, "pay-race", "cust-2", &[line("gadget", 1)], None).await;
    let pid = PaymentId::from("pay-race");

    // The wallet callback and the webhook racing for the same payment.
    let callback_api = payment_api(&env.db);
    let webhook_api = payment_api(&env.db);
    let (a, b) = tokio::join!(
        tokio::spawn({
            let pid = pid.clone();
            async move { callback_api.complete_payment(&pid, "tx-race").await }
        }),
        tokio::spawn({
            let pid = pid.clone();
            async move { webhook_api.complete_payment(&pid, "tx-race").await }
        }),
    );
    let order_a = a.unwrap().unwrap();
    let order_b = b.unwrap().unwrap();
    assert_eq!(order_a.id, order_b.id);

    let orders = env.db.fetch_orders(OrderQueryFilter::default().with_customer_id("cust-2".to_string())).await.unwrap();
    assert_eq!(orders.len(), 1, "exactly one order row may exist after the race");
    let gadget = env.db.fetch_product("gadget").await.unwrap().unwrap();
    assert_eq!(gadget.quantity, 4, "inventory must only be decremented by the winning writer");
}

#[tokio::test]
async fn order_total_always_equals_the_approved_metadata_total() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    // 2 x 10 subtotal, 10% discount, 2 delivery -> 20 - 2 + 2 = 20
    approved_payment(&env.db, "pay-amounts", "cust-3", &[line("gadget", 2)], Some("SAVE10")).await;
    let api = payment_api(&env.db);
    let pid = PaymentId::from("pay-amounts");
    let order = api.complete_payment(&pid, "tx-amounts").await.unwrap();
    let intent = env.db.fetch_payment_intent(&pid).await.unwrap().unwrap();
    assert_eq!(order.total_price, intent.metadata.0.total);
    assert_eq!(order.total_price, CoinAmount::from_coins(20));
    assert_eq!(order.subtotal, CoinAmount::from_coins(20));
    assert_eq!(order.discount, CoinAmount::from_coins(2));
    assert_eq!(order.delivery_fee, CoinAmount::from_coins(2));
}

#[tokio::test]
async fn a_tampered_total_is_rejected_before_approval() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let api = payment_api(&env.db);
    let checkout = CheckoutApi::new(env.db.clone());
    let cart = checkout.price_cart(STORE, "cust-4", &[line("gadget", 1)], None, ADDRESS).await.unwrap();
    let mut metadata = cart.to_metadata();
    // Client claims a cheaper total than the server recomputes.
    metadata.total = CoinAmount::from_coins(1);
    let err = api
        .approve_payment("cust-4", &PaymentId::from("pay-tampered"), metadata.total, None, &metadata)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentGatewayError::AmountMismatch { .. }), "got {err}");
    // Nothing was stored for the rejected payment.
    assert!(env.db.fetch_payment_intent(&PaymentId::from("pay-tampered")).await.unwrap().is_none());
}

#[tokio::test]
async fn completion_requires_server_approval() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let api = payment_api(&env.db);

    // Unknown payment id
    let err = api.complete_payment(&PaymentId::from("pay-unknown"), "tx-x").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::PaymentNotFound(_)));

    // Initiated but never approved
    let checkout = CheckoutApi::new(env.db.clone());
    let cart = checkout.price_cart(STORE, "cust-5", &[line("gadget", 1)], None, ADDRESS).await.unwrap();
    let metadata = cart.to_metadata();
    let intent = NewPaymentIntent::new(
        PaymentId::from("pay-unapproved"),
        "cust-5".to_string(),
        metadata.total,
        metadata,
    );
    env.db.insert_payment_intent(intent).await.unwrap();
    let err = api.complete_payment(&PaymentId::from("pay-unapproved"), "tx-x").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::PaymentNotApproved(_)), "got {err}");
}

#[tokio::test]
async fn cancellation_is_only_honoured_before_completion() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let api = payment_api(&env.db);

    // Before completion: cancel wins and no order is created.
    approved_payment(&env.db, "pay-cancel", "cust-6", &[line("gadget", 1)], None).await;
    let cancelled = api.cancel_payment(&PaymentId::from("pay-cancel")).await.unwrap();
    assert_eq!(cancelled.payment_id, PaymentId::from("pay-cancel"));
    let err = api.complete_payment(&PaymentId::from("pay-cancel"), "tx-late").await.unwrap_err();
    assert!(matches!(
        err,
        PaymentGatewayError::PaymentAlreadyTerminal { status: PaymentIntentStatus::Cancelled, .. }
    ));
    assert!(env.db.fetch_order_by_payment_id(&PaymentId::from("pay-cancel")).await.unwrap().is_none());

    // After completion: the payment layer refuses; the order state machine owns it now.
    approved_payment(&env.db, "pay-done", "cust-6", &[line("gadget", 1)], None).await;
    api.complete_payment(&PaymentId::from("pay-done"), "tx-done").await.unwrap();
    let err = api.cancel_payment(&PaymentId::from("pay-done")).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentGatewayError::PaymentAlreadyTerminal { status: PaymentIntentStatus::Completed, .. }
    ));
}

#[tokio::test]
async fn approving_for_someone_elses_payment_is_refused() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    approved_payment(&env.db, "pay-owned", "cust-7", &[line("gadget", 1)], None).await;
    let api = payment_api(&env.db);
    let checkout = CheckoutApi::new(env.db.clone());
    let cart = checkout.price_cart(STORE, "cust-8", &[line("gadget", 1)], None, ADDRESS).await.unwrap();
    let metadata = cart.to_metadata();
    let err = api
        .approve_payment("cust-8", &PaymentId::from("pay-owned"), metadata.total, None, &metadata)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentGatewayError::NotAuthorized(_)), "got {err}");
}

#[tokio::test]
async fn stale_unfinished_intents_are_expired() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    approved_payment(&env.db, "pay-stale", "cust-9", &[line("gadget", 1)], None).await;
    approved_payment(&env.db, "pay-fresh-done", "cust-9", &[line("gadget", 1)], None).await;
    let api = payment_api(&env.db);
    api.complete_payment(&PaymentId::from("pay-fresh-done"), "tx-f").await.unwrap();

    // A negative grace period puts the cutoff in the future, expiring
    // everything still unfinished.
    let expired = api.expire_stale_intents(chrono::Duration::seconds(-5)).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].payment_id, PaymentId::from("pay-stale"));
    let status = api.payment_status(&PaymentId::from("pay-stale")).await.unwrap();
    assert_eq!(status.status, PaymentIntentStatus::Failed);
    // Completed intents are untouched.
    let status = api.payment_status(&PaymentId::from("pay-fresh-done")).await.unwrap();
    assert_eq!(status.status, PaymentIntentStatus::Completed);
}

#[tokio::test]
async fn approval_is_idempotent() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let api = payment_api(&env.db);
    let checkout = CheckoutApi::new(env.db.clone());
    let cart = checkout.price_cart(STORE, "cust-10", &[line("gadget", 1)], None, ADDRESS).await.unwrap();
    let metadata = cart.to_metadata();
    let pid = PaymentId::from("pay-twice");
    let first = api.approve_payment("cust-10", &pid, metadata.total, None, &metadata).await.unwrap();
    let second = api.approve_payment("cust-10", &pid, metadata.total, None, &metadata).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.status, PaymentIntentStatus::ServerApproved);
}

/// Two customers redeem a limited discount concurrently on different
/// payments; the usage counter must reflect both, not lose an increment.
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_redemptions_both_count() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    approved_payment(&env.db, "pay-d1", "cust-a", &[line("gadget", 1)], Some("SAVE10")).await;
    approved_payment(&env.db, "pay-d2", "cust-b", &[line("gadget", 1)], Some("SAVE10")).await;
    let api_a = payment_api(&env.db);
    let api_b = payment_api(&env.db);
    let (a, b) = tokio::join!(
        tokio::spawn(async move { api_a.complete_payment(&PaymentId::from("pay-d1"), "tx-d1").await }),
        tokio::spawn(async move { api_b.complete_payment(&PaymentId::from("pay-d2"), "tx-d2").await }),
    );
    a.unwrap().unwrap();
    b.unwrap().unwrap();
    let discount = env.db.fetch_discount(STORE, "SAVE10").await.unwrap().unwrap();
    assert_eq!(discount.usage_count, 2);
}
