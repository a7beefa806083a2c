use std::{future::Future, pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use market_payment_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    CheckoutApi,
    OrderFlowApi,
    PaymentFlowApi,
    SqliteDatabase,
};

use crate::{
    auth::TokenIssuer,
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    routes::{
        approve_payment,
        auth,
        cancel_payment,
        complete_payment,
        health,
        my_orders,
        payment_status,
        update_order_status,
        validate_cart,
        validate_discount,
    },
    webhook_routes::payment_webhook,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    // Order events feed the push notification registrar; delivery is out of
    // scope here, so the server wires logging consumers.
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev| {
        Box::pin(async move {
            info!("📦️ Order {} confirmed for {} ({})", ev.order.order_id, ev.order.customer_id, ev.order.total_price);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks.on_order_status_changed(|ev| {
        Box::pin(async move {
            info!("📦️ Order {} is now {} (was {})", ev.order.order_id, ev.new_status, ev.old_status);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(64, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _expiry_worker = start_expiry_worker(db.clone(), producers.clone(), config.payment_expiry);
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::InitializeError(e.to_string()))
}

/// Registers the API objects and every route on an actix app. Shared between
/// the real server and the endpoint tests.
pub fn app_config(
    db: SqliteDatabase,
    config: ServerConfig,
    producers: EventProducers,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let payments_api = PaymentFlowApi::new(db.clone(), producers.clone());
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let checkout_api = CheckoutApi::new(db);
        let token_issuer = TokenIssuer::new(&config.jwt_secret, config.access_token_ttl);
        let api_scope = web::scope("/api")
            .service(approve_payment)
            .service(complete_payment)
            .service(payment_status)
            .service(cancel_payment)
            .service(update_order_status)
            .service(my_orders)
            .service(validate_cart)
            .service(validate_discount);
        let wallet_scope = web::scope("/wallet").service(payment_webhook);
        cfg.app_data(web::Data::new(payments_api))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(token_issuer))
            .app_data(web::Data::new(config))
            .service(health)
            .service(auth)
            .service(api_scope)
            .service(wallet_scope);
    }
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mpg::access_log"))
            .configure(app_config(db.clone(), config.clone(), producers.clone()))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host, port))?
    .run();
    Ok(srv)
}
