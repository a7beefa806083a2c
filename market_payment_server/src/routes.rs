//! Request handler definitions.
//!
//! Handlers stay thin: authenticate, deserialize, delegate to the engine API
//! and map the result onto HTTP. Anything longer than a screen belongs in the
//! engine, not here.

use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use log::*;
use market_payment_engine::{
    db_types::{OrderId, OrderStatus, PaymentId, Role},
    CheckoutApi,
    OrderFlowApi,
    PaymentFlowApi,
    SqliteDatabase,
};

use crate::{
    auth::{JwtClaims, TokenIssuer, LOGIN_TOKEN_HEADER},
    data_objects::{
        ApprovePaymentRequest,
        CompletePaymentRequest,
        JsonResponse,
        OrdersQuery,
        UpdateOrderStatusRequest,
        ValidateCartRequest,
        ValidateDiscountRequest,
    },
    errors::ServerError,
};

type Payments = web::Data<PaymentFlowApi<SqliteDatabase>>;
type Orders = web::Data<OrderFlowApi<SqliteDatabase>>;
type Checkout = web::Data<CheckoutApi<SqliteDatabase>>;

// ----------------------------------------------   Health  ----------------------------------------------------

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------    Auth   ----------------------------------------------------

/// Exchanges a login token (minted by the identity service, supplied in the
/// `mpg_auth_token` header) for a short-lived access token.
#[post("/auth")]
pub async fn auth(req: HttpRequest, signer: web::Data<TokenIssuer>) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received auth request");
    let payload = req.headers().get(LOGIN_TOKEN_HEADER).ok_or(ServerError::CouldNotDeserializeAuthToken)?;
    let login_token = payload.to_str().map_err(|e| {
        debug!("💻️ Could not read auth token. {e}");
        ServerError::CouldNotDeserializeAuthToken
    })?;
    let token = signer.check_login_token(login_token)?;
    debug!("💻️ Login token was validated for {}", token.sub);
    let access_token = signer.issue_token(token)?;
    trace!("💻️ Issued access token");
    Ok(HttpResponse::Ok().content_type("application/json").body(access_token))
}

// ----------------------------------------------  Payments ----------------------------------------------------

/// Server-side approval. The wallet network holds the transfer until this
/// endpoint re-verifies the amount against a server-side re-pricing of the
/// cart.
#[post("/payments/approve")]
pub async fn approve_payment(
    claims: JwtClaims,
    body: web::Json<ApprovePaymentRequest>,
    api: Payments,
) -> Result<HttpResponse, ServerError> {
    claims.require_role(Role::Customer)?;
    let request = body.into_inner();
    trace!("💻️ POST approve payment {}", request.payment_id);
    let intent = api
        .approve_payment(&claims.sub, &request.payment_id, request.amount, request.memo, &request.metadata)
        .await?;
    Ok(HttpResponse::Ok().json(intent))
}

/// The client-callback completion channel. Idempotent with the webhook: both
/// funnel into the same completion mutation.
#[post("/payments/{payment_id}/complete")]
pub async fn complete_payment(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<CompletePaymentRequest>,
    api: Payments,
) -> Result<HttpResponse, ServerError> {
    claims.require_role(Role::Customer)?;
    let payment_id = PaymentId::from(path.into_inner());
    trace!("💻️ POST complete payment {payment_id}");
    let order = api.complete_payment(&payment_id, &body.tx_ref).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// Authoritative status, polled by the client's reconciliation loop.
#[get("/payments/{payment_id}/status")]
pub async fn payment_status(
    _claims: JwtClaims,
    path: web::Path<String>,
    api: Payments,
) -> Result<HttpResponse, ServerError> {
    let payment_id = PaymentId::from(path.into_inner());
    let status = api.payment_status(&payment_id).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// User-initiated cancellation. Refused once the completion writer has run.
#[post("/payments/{payment_id}/cancel")]
pub async fn cancel_payment(
    claims: JwtClaims,
    path: web::Path<String>,
    api: Payments,
) -> Result<HttpResponse, ServerError> {
    claims.require_role(Role::Customer)?;
    let payment_id = PaymentId::from(path.into_inner());
    api.cancel_payment(&payment_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Payment cancelled.")))
}

// ----------------------------------------------   Orders  ----------------------------------------------------

/// Store-operator (or bound-driver) status changes, including dispatch when
/// `driver_id` accompanies an `OutForDelivery` request.
#[post("/orders/{order_id}/status")]
pub async fn update_order_status(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<UpdateOrderStatusRequest>,
    api: Orders,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let request = body.into_inner();
    debug!("💻️ POST order {order_id} -> {}", request.new_status);
    let actor = claims.actor();
    let order = api.update_order_status(&actor, &order_id, request.new_status, request.driver_id).await?;
    if request.new_status == OrderStatus::Delivered {
        trace!("💻️ Order {order_id} delivered; customer review becomes available");
    }
    Ok(HttpResponse::Ok().json(order))
}

/// The caller's orders; with `?store_id=`, the store's orders instead
/// (operators and admins only).
#[get("/orders")]
pub async fn my_orders(
    claims: JwtClaims,
    query: web::Query<OrdersQuery>,
    api: Orders,
) -> Result<HttpResponse, ServerError> {
    let orders = match &query.store_id {
        Some(store_id) => api.orders_for_store(&claims.actor(), store_id).await?,
        None => api.orders_for_customer(&claims.sub).await?,
    };
    Ok(HttpResponse::Ok().json(orders))
}

// ----------------------------------------------  Checkout ----------------------------------------------------

/// Read-only inventory validation, called reactively as the cart changes.
#[post("/cart/validate")]
pub async fn validate_cart(
    _claims: JwtClaims,
    body: web::Json<ValidateCartRequest>,
    api: Checkout,
) -> Result<HttpResponse, ServerError> {
    let result = api.validate_cart(&body.lines).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// Read-only discount validation for the calling customer.
#[post("/discount/validate")]
pub async fn validate_discount(
    claims: JwtClaims,
    body: web::Json<ValidateDiscountRequest>,
    api: Checkout,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    let result = api.validate_discount(&request.store_id, &request.code, &claims.sub, request.order_total).await?;
    Ok(HttpResponse::Ok().json(result))
}
