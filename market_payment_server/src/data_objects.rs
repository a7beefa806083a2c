use std::fmt::Display;

use market_payment_engine::db_types::{CartLine, OrderStatus, PaymentId, PaymentMetadata};
use mpg_common::CoinAmount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovePaymentRequest {
    pub payment_id: PaymentId,
    pub amount: CoinAmount,
    pub memo: Option<String>,
    pub metadata: PaymentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletePaymentRequest {
    pub tx_ref: String,
}

/// The wallet network's out-of-band notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhookNotification {
    pub payment_id: PaymentId,
    pub status: WebhookPaymentStatus,
    pub tx_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookPaymentStatus {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub new_status: OrderStatus,
    /// Required when `new_status` is `OutForDelivery`.
    pub driver_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateCartRequest {
    pub lines: Vec<CartLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateDiscountRequest {
    pub store_id: String,
    pub code: String,
    pub order_total: CoinAmount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersQuery {
    pub store_id: Option<String>,
}
