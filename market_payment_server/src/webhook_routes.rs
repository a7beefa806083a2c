//! The wallet network's webhook receiver.
//!
//! This is the out-of-band completion channel; it performs the exact same
//! idempotent mutations as the client-callback endpoints. Signature checks
//! use the shared webhook secret over the raw body. Processing outcomes are
//! always answered in the 200 range so the network does not retry
//! indefinitely; only a bad signature is refused outright.

use actix_web::{post, web, HttpRequest, HttpResponse};
use log::*;
use market_payment_engine::{traits::PaymentGatewayError, PaymentFlowApi, SqliteDatabase};

use crate::{
    config::ServerConfig,
    data_objects::{JsonResponse, PaymentWebhookNotification, WebhookPaymentStatus},
    errors::ServerError,
    helpers::verify_signature,
};

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-wallet-signature";

#[post("/webhook/payment")]
pub async fn payment_webhook(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<PaymentFlowApi<SqliteDatabase>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    trace!("🔔️ Received webhook request: {}", req.uri());
    if config.webhook_signature_checks {
        let signature = req
            .headers()
            .get(WEBHOOK_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ServerError::WebhookSignatureInvalid)?;
        if !verify_signature(config.webhook_secret.reveal(), &body, signature) {
            warn!("🔔️ Webhook signature check failed");
            return Err(ServerError::WebhookSignatureInvalid);
        }
    }
    let notification: PaymentWebhookNotification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            warn!("🔔️ Could not parse webhook payload. {e}");
            return Ok(HttpResponse::Ok().json(JsonResponse::failure(format!("Unparseable payload: {e}"))));
        },
    };
    let payment_id = notification.payment_id.clone();
    let result = match notification.status {
        WebhookPaymentStatus::Completed => {
            let Some(tx_ref) = notification.tx_ref else {
                warn!("🔔️ Completion notification for {payment_id} without a transaction reference");
                return Ok(HttpResponse::Ok().json(JsonResponse::failure("Missing tx_ref on completion")));
            };
            match api.complete_payment(&payment_id, &tx_ref).await {
                Ok(order) => {
                    info!("🔔️ Webhook completed payment {payment_id}; order {}", order.order_id);
                    JsonResponse::success(format!("Order {} confirmed.", order.order_id))
                },
                Err(e) => webhook_failure(&payment_id, "completion", e),
            }
        },
        WebhookPaymentStatus::Cancelled => match api.cancel_payment(&payment_id).await {
            Ok(_) => JsonResponse::success("Payment cancelled."),
            Err(e) => webhook_failure(&payment_id, "cancellation", e),
        },
        WebhookPaymentStatus::Failed => match api.fail_payment(&payment_id).await {
            Ok(_) => JsonResponse::success("Payment marked as failed."),
            Err(e) => webhook_failure(&payment_id, "failure", e),
        },
    };
    Ok(HttpResponse::Ok().json(result))
}

fn webhook_failure(
    payment_id: &market_payment_engine::db_types::PaymentId,
    action: &str,
    e: PaymentGatewayError,
) -> JsonResponse {
    match e {
        // A duplicate terminal notification is business as usual for an
        // at-least-once webhook; acknowledge it.
        PaymentGatewayError::PaymentAlreadyTerminal { status, .. } => {
            info!("🔔️ Webhook {action} for {payment_id}: already {status}");
            JsonResponse::success(format!("Payment already {status}."))
        },
        e => {
            warn!("🔔️ Webhook {action} for {payment_id} failed. {e}");
            JsonResponse::failure(e)
        },
    }
}
