use chrono::Utc;
use market_payment_engine::{
    db_types::{PaymentMetadata, Product, Role, Store},
    CheckoutApi,
    SqliteDatabase,
};
use mpg_common::{CoinAmount, Secret};
use tempfile::TempDir;

use crate::{
    auth::{LoginToken, TokenIssuer},
    config::ServerConfig,
};

pub const STORE: &str = "store-1";

pub struct TestEnv {
    pub db: SqliteDatabase,
    pub config: ServerConfig,
    _dir: TempDir,
}

pub async fn prepare_env() -> TestEnv {
    let _ = env_logger::try_init();
    let dir = TempDir::new().expect("Error creating temp dir");
    let url = format!("sqlite://{}/server.db", dir.path().display());
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let mut config = ServerConfig::new("127.0.0.1", 0);
    config.database_url = url;
    config.jwt_secret = Secret::new("test-jwt-secret".to_string());
    config.webhook_secret = Secret::new("whsec-test".to_string());
    TestEnv { db, config, _dir: dir }
}

/// Builds the full service for one test. A macro because the `App` type
/// cannot be named in a helper function signature.
macro_rules! test_service {
    ($env:expr) => {{
        actix_web::test::init_service(actix_web::App::new().configure(crate::server::app_config(
            $env.db.clone(),
            $env.config.clone(),
            market_payment_engine::events::EventProducers::default(),
        )))
        .await
    }};
}
pub(crate) use test_service;

pub async fn seed_catalog(env: &TestEnv) -> i64 {
    env.db
        .upsert_store(&Store {
            id: STORE.to_string(),
            name: "Corner Deli".to_string(),
            delivery_fee: CoinAmount::from_coins(2),
        })
        .await
        .unwrap();
    env.db
        .upsert_product(&Product {
            id: "gadget".to_string(),
            store_id: STORE.to_string(),
            name: "Gadget".to_string(),
            unit_price: CoinAmount::from_coins(10),
            quantity: 5,
            unlimited_stock: false,
        })
        .await
        .unwrap();
    env.db.add_store_operator(STORE, "op-1").await.unwrap();
    env.db.add_driver(STORE, "drv-user-1", "Jo").await.unwrap()
}

/// Mints a login token the way the external identity service would: signed
/// with the shared secret.
pub fn login_token(env: &TestEnv, sub: &str, roles: Vec<Role>) -> String {
    let claims = LoginToken {
        sub: sub.to_string(),
        address: None,
        desired_roles: roles,
        exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(env.config.jwt_secret.reveal().as_bytes()),
    )
    .unwrap()
}

/// Shortcut straight to an access token, skipping the `/auth` round trip.
pub fn access_token(env: &TestEnv, sub: &str, roles: Vec<Role>) -> String {
    let issuer = TokenIssuer::new(&env.config.jwt_secret, env.config.access_token_ttl);
    let claims = LoginToken {
        sub: sub.to_string(),
        address: None,
        desired_roles: roles,
        exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    issuer.issue_token(claims).unwrap()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

/// Prices a one-gadget cart server-side, returning the metadata a client
/// would embed in the wallet payment.
pub async fn priced_metadata(env: &TestEnv, customer_id: &str, quantity: i64) -> PaymentMetadata {
    let checkout = CheckoutApi::new(env.db.clone());
    let lines = vec![market_payment_engine::db_types::CartLine {
        product_id: "gadget".to_string(),
        quantity,
        options: vec![],
    }];
    let cart = checkout.price_cart(STORE, customer_id, &lines, None, "12 Harbour Lane").await.unwrap();
    cart.to_metadata()
}
