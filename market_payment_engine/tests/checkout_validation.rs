//! Checkout-time inventory and discount validation against a seeded catalog.

mod common;

use chrono::{Duration, Utc};
use common::*;
use market_payment_engine::{
    db_types::{DiscountRejection, PaymentId, StockStatus},
    CheckoutApi,
    SqliteDatabase,
};
use mpg_common::CoinAmount;

fn checkout(db: &SqliteDatabase) -> CheckoutApi<SqliteDatabase> {
    CheckoutApi::new(db.clone())
}

#[tokio::test]
async fn a_cart_within_stock_validates_cleanly() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let result = checkout(&env.db)
        .validate_cart(&[line("gadget", 3), line_with_options("tee", 2, &["size:m", "colour:blue"])])
        .await
        .unwrap();
    assert!(result.valid, "issues: {:?}", result.issues);
}

#[tokio::test]
async fn availability_is_the_minimum_across_selected_options() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    // size:m has 3 left, colour:blue has 7; asking for 4 must fail with 3 available.
    let result = checkout(&env.db)
        .validate_cart(&[line_with_options("tee", 4, &["size:m", "colour:blue"])])
        .await
        .unwrap();
    assert!(!result.valid);
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].status, StockStatus::InsufficientStock);
    assert_eq!(result.issues[0].available, 3);
    assert_eq!(result.issues[0].line, 0);
}

#[tokio::test]
async fn unlimited_stock_products_never_block_checkout() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    // flat-white has quantity 0 but is in an unlimited-stock category.
    let result = checkout(&env.db).validate_cart(&[line("flat-white", 250)]).await.unwrap();
    assert!(result.valid);
}

#[tokio::test]
async fn unknown_products_and_choices_are_unavailable() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let result = checkout(&env.db)
        .validate_cart(&[line("discontinued", 1), line_with_options("tee", 1, &["size:xxl"])])
        .await
        .unwrap();
    assert!(!result.valid);
    assert_eq!(result.issues.len(), 2);
    assert!(result.issues.iter().all(|i| i.status == StockStatus::Unavailable));
}

#[tokio::test]
async fn discount_validation_covers_the_whole_rejection_taxonomy() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let api = checkout(&env.db);
    let total = CoinAmount::from_coins(30);

    let v = api.validate_discount(STORE, "NOPE", "cust-1", total).await.unwrap();
    assert_eq!(v.reason, Some(DiscountRejection::UnknownCode));

    let mut d = percentage_discount("PAUSED", 10);
    d.active = false;
    env.db.upsert_discount(&d).await.unwrap();
    let v = api.validate_discount(STORE, "PAUSED", "cust-1", total).await.unwrap();
    assert_eq!(v.reason, Some(DiscountRejection::Inactive));

    let mut d = percentage_discount("SOON", 10);
    d.starts_at = Some(Utc::now() + Duration::days(1));
    env.db.upsert_discount(&d).await.unwrap();
    let v = api.validate_discount(STORE, "SOON", "cust-1", total).await.unwrap();
    assert_eq!(v.reason, Some(DiscountRejection::NotStarted));

    let mut d = percentage_discount("BYGONE", 10);
    d.ends_at = Some(Utc::now() - Duration::days(1));
    env.db.upsert_discount(&d).await.unwrap();
    let v = api.validate_discount(STORE, "BYGONE", "cust-1", total).await.unwrap();
    assert_eq!(v.reason, Some(DiscountRejection::Expired));

    let mut d = percentage_discount("BIGSPEND", 10);
    d.min_order_value = CoinAmount::from_coins(50);
    env.db.upsert_discount(&d).await.unwrap();
    let v = api.validate_discount(STORE, "BIGSPEND", "cust-1", total).await.unwrap();
    assert_eq!(v.reason, Some(DiscountRejection::BelowMinimum(CoinAmount::from_coins(50))));

    let mut d = percentage_discount("SOLDOUT", 10);
    d.usage_limit = Some(5);
    d.usage_count = 5;
    env.db.upsert_discount(&d).await.unwrap();
    let v = api.validate_discount(STORE, "SOLDOUT", "cust-1", total).await.unwrap();
    assert_eq!(v.reason, Some(DiscountRejection::UsageLimitReached));
}

#[tokio::test]
async fn usage_count_survives_an_upsert() {
    // The provisioning upsert must not reset live usage counters.
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    approved_payment(&env.db, "pay-keep", "cust-2", &[line("gadget", 1)], Some("SAVE10")).await;
    payment_api(&env.db).complete_payment(&PaymentId::from("pay-keep"), "tx").await.unwrap();
    env.db.upsert_discount(&percentage_discount("SAVE10", 10)).await.unwrap();
    let api = checkout(&env.db);
    let v = api.validate_discount(STORE, "SAVE10", "cust-3", CoinAmount::from_coins(30)).await.unwrap();
    assert!(v.is_valid);
    use market_payment_engine::traits::CheckoutStore;
    assert_eq!(env.db.fetch_discount(STORE, "SAVE10").await.unwrap().unwrap().usage_count, 1);
}

#[tokio::test]
async fn per_customer_limits_count_confirmed_redemptions_only() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let mut d = percentage_discount("ONEEACH", 10);
    d.per_customer_limit = Some(1);
    env.db.upsert_discount(&d).await.unwrap();
    let api = checkout(&env.db);
    let total = CoinAmount::from_coins(30);

    // Valid until the customer actually redeems it through a completed order.
    let v = api.validate_discount(STORE, "ONEEACH", "cust-4", total).await.unwrap();
    assert!(v.is_valid);
    approved_payment(&env.db, "pay-each", "cust-4", &[line("gadget", 1)], Some("ONEEACH")).await;
    payment_api(&env.db).complete_payment(&PaymentId::from("pay-each"), "tx").await.unwrap();

    let v = api.validate_discount(STORE, "ONEEACH", "cust-4", total).await.unwrap();
    assert_eq!(v.reason, Some(DiscountRejection::CustomerLimitReached));
    // A different customer is unaffected.
    let v = api.validate_discount(STORE, "ONEEACH", "cust-5", total).await.unwrap();
    assert!(v.is_valid);
}

#[tokio::test]
async fn new_customer_codes_reject_returning_customers() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let mut d = percentage_discount("WELCOME", 15);
    d.new_customers_only = true;
    env.db.upsert_discount(&d).await.unwrap();
    let api = checkout(&env.db);
    let total = CoinAmount::from_coins(30);

    let v = api.validate_discount(STORE, "WELCOME", "cust-6", total).await.unwrap();
    assert!(v.is_valid, "a customer with no orders is new");

    approved_payment(&env.db, "pay-first", "cust-6", &[line("gadget", 1)], None).await;
    payment_api(&env.db).complete_payment(&PaymentId::from("pay-first"), "tx").await.unwrap();
    let v = api.validate_discount(STORE, "WELCOME", "cust-6", total).await.unwrap();
    assert_eq!(v.reason, Some(DiscountRejection::NewCustomersOnly));
}

#[tokio::test]
async fn pricing_caps_a_fixed_discount_at_the_subtotal() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    env.db.upsert_discount(&fixed_discount("BIGFIX", CoinAmount::from_coins(15))).await.unwrap();
    let api = checkout(&env.db);
    // One gadget: subtotal 10, fixed discount 15 -> capped at 10; total is
    // just the delivery fee.
    let cart = api.price_cart(STORE, "cust-7", &[line("gadget", 1)], Some("BIGFIX"), ADDRESS).await.unwrap();
    assert_eq!(cart.subtotal, CoinAmount::from_coins(10));
    assert_eq!(cart.discount, CoinAmount::from_coins(10));
    assert_eq!(cart.total, CoinAmount::from_coins(2));
    assert!(!cart.total.is_negative());
}

#[tokio::test]
async fn pricing_uses_catalog_prices_not_client_prices() {
    let env = prepare_test_env().await;
    seed_catalog(&env.db).await;
    let api = checkout(&env.db);
    // 20% of 50 -> 10 discount; 2 delivery
    env.db.upsert_discount(&percentage_discount("FIFTH", 20)).await.unwrap();
    let cart = api.price_cart(STORE, "cust-8", &[line("gadget", 5)], Some("FIFTH"), ADDRESS).await.unwrap();
    assert_eq!(cart.subtotal, CoinAmount::from_coins(50));
    assert_eq!(cart.discount, CoinAmount::from_coins(10));
    assert_eq!(cart.total, CoinAmount::from_coins(42));
    assert_eq!(cart.line_items[0].unit_price, CoinAmount::from_coins(10));
}
