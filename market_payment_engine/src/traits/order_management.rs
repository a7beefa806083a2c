use crate::{
    db_types::{Driver, Order, OrderId, OrderStatus, PaymentId},
    traits::PaymentGatewayError,
};

#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub store_id: Option<String>,
    pub customer_id: Option<String>,
    pub statuses: Vec<OrderStatus>,
}

impl OrderQueryFilter {
    pub fn with_store_id(mut self, store_id: String) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn with_customer_id(mut self, customer_id: String) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.store_id.is_none() && self.customer_id.is_none() && self.statuses.is_empty()
    }
}

/// Storage behaviour for the order fulfilment state machine.
///
/// Status changes are compare-and-set on the expected current status, so a
/// lost race surfaces as an invalid transition rather than silently skipping
/// a state.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError>;

    async fn fetch_order_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Order>, PaymentGatewayError>;

    /// Fetches orders matching the filter, ordered by creation time.
    async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PaymentGatewayError>;

    /// Compare-and-set `from -> to` on the order status. When `to` is
    /// `Delivered`, the bound driver (if any) is returned to the active pool
    /// in the same transaction.
    async fn update_order_status(&self, id: i64, from: OrderStatus, to: OrderStatus)
        -> Result<Order, PaymentGatewayError>;

    /// Atomically binds an active driver from the order's store pool and
    /// moves the order `Preparing -> OutForDelivery`. If the driver is
    /// missing, inactive or belongs to another store, the order is left in
    /// `Preparing` with no driver bound.
    async fn dispatch_driver(&self, id: i64, driver_id: i64) -> Result<Order, PaymentGatewayError>;

    /// Cancels a `Confirmed` or `Preparing` order and, in the same
    /// transaction, restocks its inventory and releases its discount
    /// redemption.
    async fn cancel_order_with_compensation(&self, id: i64, from: OrderStatus) -> Result<Order, PaymentGatewayError>;

    async fn fetch_driver(&self, driver_id: i64) -> Result<Option<Driver>, PaymentGatewayError>;

    async fn fetch_driver_for_user(&self, user_id: &str) -> Result<Option<Driver>, PaymentGatewayError>;
}
