#![allow(dead_code)]

use market_payment_engine::{
    db_types::{CartLine, Discount, DiscountKind, OptionStock, PaymentId, PaymentIntent, Product, Store},
    events::EventProducers,
    CheckoutApi,
    PaymentFlowApi,
    SqliteDatabase,
};
use mpg_common::CoinAmount;
use tempfile::TempDir;

pub const STORE: &str = "store-1";
pub const ADDRESS: &str = "12 Harbour Lane";

/// A scratch database in a throwaway directory. Keep the guard alive for the
/// duration of the test.
pub struct TestEnv {
    pub db: SqliteDatabase,
    _dir: TempDir,
}

pub async fn prepare_test_env() -> TestEnv {
    let _ = env_logger::try_init();
    let dir = TempDir::new().expect("Error creating temp dir");
    let url = format!("sqlite://{}/test.db", dir.path().display());
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    TestEnv { db, _dir: dir }
}

/// Seeds a store with a small catalog, one percentage discount, an operator
/// and a driver. Returns the driver id.
pub async fn seed_catalog(db: &SqliteDatabase) -> i64 {
    db.upsert_store(&Store {
        id: STORE.to_string(),
        name: "Corner Deli".to_string(),
        delivery_fee: CoinAmount::from_coins(2),
    })
    .await
    .unwrap();
    db.upsert_product(&Product {
        id: "gadget".to_string(),
        store_id: STORE.to_string(),
        name: "Gadget".to_string(),
        unit_price: CoinAmount::from_coins(10),
        quantity: 5,
        unlimited_stock: false,
    })
    .await
    .unwrap();
    db.upsert_product(&Product {
        id: "flat-white".to_string(),
        store_id: STORE.to_string(),
        name: "Flat white".to_string(),
        unit_price: CoinAmount::from_coins(4),
        quantity: 0,
        unlimited_stock: true,
    })
    .await
    .unwrap();
    db.upsert_product(&Product {
        id: "tee".to_string(),
        store_id: STORE.to_string(),
        name: "T-shirt".to_string(),
        unit_price: CoinAmount::from_coins(8),
        quantity: 10,
        unlimited_stock: false,
    })
    .await
    .unwrap();
    db.set_option_stock("tee", &OptionStock { choice: "size:m".to_string(), quantity: 3 }).await.unwrap();
    db.set_option_stock("tee", &OptionStock { choice: "colour:blue".to_string(), quantity: 7 }).await.unwrap();
    db.upsert_discount(&percentage_discount("SAVE10", 10)).await.unwrap();
    db.add_store_operator(STORE, "op-1").await.unwrap();
    db.add_driver(STORE, "drv-user-1", "Jo").await.unwrap()
}

pub fn percentage_discount(code: &str, value: i64) -> Discount {
    Discount {
        code: code.to_string(),
        store_id: STORE.to_string(),
        kind: DiscountKind::Percentage,
        value,
        active: true,
        starts_at: None,
        ends_at: None,
        min_order_value: CoinAmount::from(0),
        usage_limit: Some(100),
        usage_count: 0,
        per_customer_limit: None,
        new_customers_only: false,
    }
}

pub fn fixed_discount(code: &str, amount: CoinAmount) -> Discount {
    Discount {
        code: code.to_string(),
        store_id: STORE.to_string(),
        kind: DiscountKind::Fixed,
        value: amount.value(),
        active: true,
        starts_at: None,
        ends_at: None,
        min_order_value: CoinAmount::from(0),
        usage_limit: None,
        usage_count: 0,
        per_customer_limit: None,
        new_customers_only: false,
    }
}

pub fn line(product_id: &str, quantity: i64) -> CartLine {
    CartLine { product_id: product_id.to_string(), quantity, options: vec![] }
}

pub fn line_with_options(product_id: &str, quantity: i64, options: &[&str]) -> CartLine {
    CartLine {
        product_id: product_id.to_string(),
        quantity,
        options: options.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn payment_api(db: &SqliteDatabase) -> PaymentFlowApi<SqliteDatabase> {
    PaymentFlowApi::new(db.clone(), EventProducers::default())
}

/// Prices a cart server-side and takes the resulting payment through server
/// approval, leaving it one completion call away from an order.
pub async fn approved_payment(
    db: &SqliteDatabase,
    payment_id: &str,
    customer_id: &str,
    lines: &[CartLine],
    discount_code: Option<&str>,
) -> PaymentIntent {
    let api = payment_api(db);
    let checkout = CheckoutApi::new(db.clone());
    let cart = checkout.price_cart(STORE, customer_id, lines, discount_code, ADDRESS).await.unwrap();
    let metadata = cart.to_metadata();
    api.approve_payment(customer_id, &PaymentId::from(payment_id), metadata.total, None, &metadata)
        .await
        .unwrap()
}
