use std::fmt::Debug;

use log::*;
use mpg_common::CoinAmount;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CartLine, NewPaymentIntent, Order, PaymentId, PaymentIntent, PaymentIntentStatus, PaymentMetadata},
    events::{EventProducers, OrderPaidEvent},
    mpe_api::checkout_api::CheckoutApi,
    traits::{CheckoutStore, CompletionResult, InsertIntentResult, OrderManagement, PaymentGatewayDatabase, PaymentGatewayError},
};

/// Answer to the poller's status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub status: PaymentIntentStatus,
    pub tx_ref: Option<String>,
}

/// `PaymentFlowApi` owns the server side of a payment's lifecycle: approval
/// with server-side re-pricing, the authoritative completion that creates
/// the order, and the pre-completion terminal transitions.
pub struct PaymentFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B: Clone> Clone for PaymentFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> PaymentFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> PaymentFlowApi<B>
where B: PaymentGatewayDatabase + CheckoutStore
{
    /// Server-side approval of a payment the wallet network is holding.
    ///
    /// The cart is re-priced from the catalog and the store configuration;
    /// the client-submitted amount and metadata total must both equal the
    /// recomputed total or the approval is rejected outright. On success the
    /// stored intent carries the *recomputed* metadata, which is the only
    /// pricing information the completion path will ever read.
    pub async fn approve_payment(
        &self,
        customer_id: &str,
        payment_id: &PaymentId,
        amount: CoinAmount,
        memo: Option<String>,
        metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        trace!("💸️ Approval requested for payment {payment_id}");
        let checkout = CheckoutApi::new(self.db.clone());
        let lines = metadata
            .line_items
            .iter()
            .map(|li| CartLine { product_id: li.product_id.clone(), quantity: li.quantity, options: li.options.clone() })
            .collect::<Vec<_>>();
        let priced = checkout
            .price_cart(
                &metadata.store_id,
                customer_id,
                &lines,
                metadata.discount_code.as_deref(),
                &metadata.delivery_address,
            )
            .await?;
        if priced.total != amount || metadata.total != amount {
            warn!(
                "💸️ Rejecting approval for {payment_id}: recomputed total {} but client submitted {amount}",
                priced.total
            );
            return Err(PaymentGatewayError::AmountMismatch { server: priced.total, client: amount });
        }
        let mut intent = NewPaymentIntent::new(payment_id.clone(), customer_id.to_string(), amount, priced.to_metadata());
        if let Some(memo) = memo {
            intent = intent.with_memo(memo);
        }
        if let InsertIntentResult::AlreadyExists(existing) = self.db.insert_payment_intent(intent).await? {
            if existing.customer_id != customer_id {
                return Err(PaymentGatewayError::NotAuthorized(format!(
                    "Payment {payment_id} belongs to another customer"
                )));
            }
        }
        let approved = self.db.approve_payment_intent(payment_id).await?;
        info!("💸️ Payment {payment_id} approved for {amount}");
        Ok(approved)
    }

    /// The authoritative completion. All three channels (wallet callback,
    /// webhook, operator retry) funnel into this one idempotent mutation:
    /// the first caller creates the order and fires the order-paid hook,
    /// every later caller gets the same order back with no side effects.
    pub async fn complete_payment(&self, payment_id: &PaymentId, tx_ref: &str) -> Result<Order, PaymentGatewayError> {
        match self.db.complete_payment_intent(payment_id, tx_ref).await? {
            CompletionResult::Created(order) => {
                info!("💸️ Payment {payment_id} completed. Order {} confirmed for {}", order.order_id, order.total_price);
                self.call_order_paid_hook(&order).await;
                Ok(order)
            },
            CompletionResult::AlreadyCompleted(order) => {
                debug!("💸️ Payment {payment_id} was already completed; returning order {}", order.order_id);
                Ok(order)
            },
        }
    }

    /// User-initiated cancellation from the wallet app. Only honoured before
    /// the completion writer has run; once an order exists, cancellation goes
    /// through the order state machine instead.
    pub async fn cancel_payment(&self, payment_id: &PaymentId) -> Result<PaymentIntent, PaymentGatewayError> {
        let intent = self.db.cancel_payment_intent(payment_id).await?;
        info!("💸️ Payment {payment_id} cancelled by the user");
        Ok(intent)
    }

    /// Terminal failure reported by the wallet network.
    pub async fn fail_payment(&self, payment_id: &PaymentId) -> Result<PaymentIntent, PaymentGatewayError> {
        let intent = self.db.fail_payment_intent(payment_id).await?;
        info!("💸️ Payment {payment_id} marked as failed");
        Ok(intent)
    }

    /// Authoritative status, as queried by the reconciliation poller.
    pub async fn payment_status(&self, payment_id: &PaymentId) -> Result<PaymentStatus, PaymentGatewayError> {
        let intent = self
            .db
            .fetch_payment_intent(payment_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::PaymentNotFound(payment_id.clone()))?;
        Ok(PaymentStatus { status: intent.status, tx_ref: intent.tx_ref })
    }

    /// Fails unfinished intents older than `older_than`. Run periodically so
    /// abandoned sessions cannot accumulate forever.
    pub async fn expire_stale_intents(
        &self,
        older_than: chrono::Duration,
    ) -> Result<Vec<PaymentIntent>, PaymentGatewayError> {
        self.db.expire_stale_intents(older_than).await
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for producer in &self.producers.order_paid_producer {
            debug!("💸️📦️ Notifying order-paid hook subscribers");
            producer.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }
}

impl<B> PaymentFlowApi<B>
where B: OrderManagement
{
    pub async fn order_for_payment(&self, payment_id: &PaymentId) -> Result<Option<Order>, PaymentGatewayError> {
        self.db.fetch_order_by_payment_id(payment_id).await
    }
}
