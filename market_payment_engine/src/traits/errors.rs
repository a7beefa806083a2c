use mpg_common::CoinAmount;
use thiserror::Error;

use crate::db_types::{CartIssue, DiscountRejection, OrderId, OrderStatus, PaymentId, PaymentIntentStatus};

/// The error type shared by the engine's database traits and public APIs.
#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Payment {0} was not found")]
    PaymentNotFound(PaymentId),
    #[error("Order {0} was not found")]
    OrderNotFound(OrderId),
    #[error("Payment {id} already reached terminal status {status}")]
    PaymentAlreadyTerminal { id: PaymentId, status: PaymentIntentStatus },
    #[error("Payment {0} has not been approved by the server")]
    PaymentNotApproved(PaymentId),
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: OrderId, from: OrderStatus, to: OrderStatus },
    #[error("Server-recomputed total {server} does not match the submitted amount {client}")]
    AmountMismatch { server: CoinAmount, client: CoinAmount },
    #[error("Driver {driver_id} is not available for order {order_id}")]
    DriverUnavailable { order_id: OrderId, driver_id: i64 },
    #[error("A driver id is required to move order {0} out for delivery")]
    DriverRequired(OrderId),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("{} cart line(s) failed inventory validation", .0.len())]
    InventoryConflict(Vec<CartIssue>),
    #[error("Discount rejected: {0}")]
    DiscountInvalid(DiscountRejection),
    #[error("Product {0} is not known")]
    ProductNotFound(String),
    #[error("Store {0} is not known")]
    StoreNotFound(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for PaymentGatewayError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::DatabaseError(format!("Migration error: {e}"))
    }
}

impl From<serde_json::Error> for PaymentGatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::DatabaseError(format!("Metadata encoding error: {e}"))
    }
}
