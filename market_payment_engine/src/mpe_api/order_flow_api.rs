use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Order, OrderId, OrderStatus, Role},
    events::{EventProducers, OrderStatusChangedEvent},
    traits::{CheckoutStore, OrderManagement, OrderQueryFilter, PaymentGatewayError},
};

/// The identity a status change runs under, as established by the server's
/// session layer. Never trusted from client-submitted state.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new<S: Into<String>>(user_id: S, roles: Vec<Role>) -> Self {
        Self { user_id: user_id.into(), roles }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// How a requested `(from, to)` pair is executed, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Direct,
    Dispatch,
    CancelWithCompensation,
    Invalid,
}

/// The order status table:
///
/// | From \ To      | Preparing | OutForDelivery | Delivered | Cancelled |
/// |----------------|-----------|----------------|-----------|-----------|
/// | Confirmed      | ok        | Err            | Err       | ok (1)    |
/// | Preparing      | Err       | ok (2)         | Err       | ok (1)    |
/// | OutForDelivery | Err       | Err            | ok        | Err       |
/// | Delivered      | Err       | Err            | Err       | Err       |
/// | Cancelled      | Err       | Err            | Err       | Err       |
///
/// (1) restocks inventory and releases the discount redemption.
/// (2) runs driver dispatch; the driver must be active and in the store pool.
fn classify(from: OrderStatus, to: OrderStatus) -> Transition {
    use OrderStatus::*;
    match (from, to) {
        (Confirmed, Preparing) | (OutForDelivery, Delivered) => Transition::Direct,
        (Preparing, OutForDelivery) => Transition::Dispatch,
        (Confirmed | Preparing, Cancelled) => Transition::CancelWithCompensation,
        (_, _) => Transition::Invalid,
    }
}

/// `OrderFlowApi` is the server-authoritative order state machine, including
/// driver dispatch. Every transition is authorized against the store that
/// owns the order and applied as a compare-and-set in the backend.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement + CheckoutStore
{
    /// Applies one status change to an order on behalf of `actor`.
    ///
    /// `driver_id` is only consulted for the `Preparing -> OutForDelivery`
    /// transition, where it is required. Terminal states are final: any
    /// transition out of `Delivered` or `Cancelled` is rejected.
    pub async fn update_order_status(
        &self,
        actor: &Actor,
        order_id: &OrderId,
        new_status: OrderStatus,
        driver_id: Option<i64>,
    ) -> Result<Order, PaymentGatewayError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        self.authorize(actor, &order, new_status).await?;
        let old_status = order.status;
        let updated = match classify(order.status, new_status) {
            Transition::Direct => self.db.update_order_status(order.id, order.status, new_status).await?,
            Transition::Dispatch => {
                let driver_id = driver_id.ok_or_else(|| PaymentGatewayError::DriverRequired(order_id.clone()))?;
                self.db.dispatch_driver(order.id, driver_id).await?
            },
            Transition::CancelWithCompensation => self.db.cancel_order_with_compensation(order.id, order.status).await?,
            Transition::Invalid => {
                return Err(PaymentGatewayError::InvalidTransition {
                    order_id: order.order_id,
                    from: order.status,
                    to: new_status,
                })
            },
        };
        info!("🚚️ Order {} moved {} -> {}", updated.order_id, old_status, updated.status);
        self.call_status_changed_hook(&updated, old_status).await;
        Ok(updated)
    }

    /// Orders belonging to the calling customer.
    pub async fn orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, PaymentGatewayError> {
        let filter = OrderQueryFilter::default().with_customer_id(customer_id.to_string());
        self.db.fetch_orders(filter).await
    }

    /// Orders for a store, restricted to that store's operators (or admins).
    pub async fn orders_for_store(&self, actor: &Actor, store_id: &str) -> Result<Vec<Order>, PaymentGatewayError> {
        if !actor.has_role(Role::Admin) && !self.db.is_store_operator(store_id, &actor.user_id).await? {
            return Err(PaymentGatewayError::NotAuthorized(format!(
                "User {} is not an operator of store {store_id}",
                actor.user_id
            )));
        }
        let filter = OrderQueryFilter::default().with_store_id(store_id.to_string());
        self.db.fetch_orders(filter).await
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    /// Store operators (with a staff binding for the owning store) and admins
    /// may drive any transition; the bound driver may only mark the order
    /// delivered.
    async fn authorize(&self, actor: &Actor, order: &Order, new_status: OrderStatus) -> Result<(), PaymentGatewayError> {
        if actor.has_role(Role::Admin) {
            return Ok(());
        }
        if actor.has_role(Role::StoreOperator) && self.db.is_store_operator(&order.store_id, &actor.user_id).await? {
            return Ok(());
        }
        if actor.has_role(Role::Driver) && new_status == OrderStatus::Delivered {
            if let Some(driver) = self.db.fetch_driver_for_user(&actor.user_id).await? {
                if Some(driver.id) == order.driver_id {
                    return Ok(());
                }
            }
        }
        debug!("🚚️ Denying status change on {} for user {}", order.order_id, actor.user_id);
        Err(PaymentGatewayError::NotAuthorized(format!(
            "User {} may not modify order {}",
            actor.user_id, order.order_id
        )))
    }

    async fn call_status_changed_hook(&self, order: &Order, old_status: OrderStatus) {
        for producer in &self.producers.order_status_changed_producer {
            debug!("🚚️📦️ Notifying status-changed hook subscribers");
            producer.publish_event(OrderStatusChangedEvent::new(order.clone(), old_status)).await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn the_happy_path_is_a_chain_of_valid_transitions() {
        assert_eq!(classify(Confirmed, Preparing), Transition::Direct);
        assert_eq!(classify(Preparing, OutForDelivery), Transition::Dispatch);
        assert_eq!(classify(OutForDelivery, Delivered), Transition::Direct);
    }

    #[test]
    fn cancellation_is_only_reachable_before_dispatch() {
        assert_eq!(classify(Confirmed, Cancelled), Transition::CancelWithCompensation);
        assert_eq!(classify(Preparing, Cancelled), Transition::CancelWithCompensation);
        assert_eq!(classify(OutForDelivery, Cancelled), Transition::Invalid);
    }

    #[test]
    fn no_transition_leaves_a_terminal_state() {
        for from in [Delivered, Cancelled] {
            for to in [Confirmed, Preparing, OutForDelivery, Delivered, Cancelled] {
                assert_eq!(classify(from, to), Transition::Invalid, "{from} -> {to} should be rejected");
            }
        }
    }

    #[test]
    fn skipping_forward_is_rejected() {
        assert_eq!(classify(Confirmed, Delivered), Transition::Invalid);
        assert_eq!(classify(Confirmed, OutForDelivery), Transition::Invalid);
        assert_eq!(classify(Preparing, Delivered), Transition::Invalid);
    }

    #[test]
    fn moving_backward_is_rejected() {
        assert_eq!(classify(Preparing, Confirmed), Transition::Invalid);
        assert_eq!(classify(OutForDelivery, Preparing), Transition::Invalid);
        assert_eq!(classify(Delivered, OutForDelivery), Transition::Invalid);
    }
}
