use crate::db_types::{Order, OrderStatus};

/// Emitted exactly once per order, by whichever completion channel won the
/// authoritative completion race.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted on every order state machine transition after the change has been
/// committed.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusChangedEvent {
    pub order: Order,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
}

impl OrderStatusChangedEvent {
    pub fn new(order: Order, old_status: OrderStatus) -> Self {
        let new_status = order.status;
        Self { order, old_status, new_status }
    }
}
