use mpg_common::CoinAmount;

use crate::{
    db_types::{Order, PaymentId, PaymentMetadata},
    mpe_api::payment_flow_api::{PaymentFlowApi, PaymentStatus},
    traits::{CheckoutStore, OrderManagement, PaymentGatewayDatabase, PaymentGatewayError},
};

/// The authoritative backend as seen from a client payment session. In-process
/// embedders use [`PaymentFlowApi`] directly; a remote client would implement
/// this over the HTTP mutations instead.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn approve(
        &self,
        customer_id: &str,
        payment_id: &PaymentId,
        amount: CoinAmount,
        memo: Option<String>,
        metadata: &PaymentMetadata,
    ) -> Result<(), PaymentGatewayError>;

    async fn complete(&self, payment_id: &PaymentId, tx_ref: &str) -> Result<Order, PaymentGatewayError>;

    async fn cancel(&self, payment_id: &PaymentId) -> Result<(), PaymentGatewayError>;

    async fn status(&self, payment_id: &PaymentId) -> Result<PaymentStatus, PaymentGatewayError>;

    async fn order_for_payment(&self, payment_id: &PaymentId) -> Result<Option<Order>, PaymentGatewayError>;
}

impl<B> PaymentGateway for PaymentFlowApi<B>
where B: PaymentGatewayDatabase + OrderManagement + CheckoutStore
{
    async fn approve(
        &self,
        customer_id: &str,
        payment_id: &PaymentId,
        amount: CoinAmount,
        memo: Option<String>,
        metadata: &PaymentMetadata,
    ) -> Result<(), PaymentGatewayError> {
        self.approve_payment(customer_id, payment_id, amount, memo, metadata).await.map(|_| ())
    }

    async fn complete(&self, payment_id: &PaymentId, tx_ref: &str) -> Result<Order, PaymentGatewayError> {
        self.complete_payment(payment_id, tx_ref).await
    }

    async fn cancel(&self, payment_id: &PaymentId) -> Result<(), PaymentGatewayError> {
        self.cancel_payment(payment_id).await.map(|_| ())
    }

    async fn status(&self, payment_id: &PaymentId) -> Result<PaymentStatus, PaymentGatewayError> {
        self.payment_status(payment_id).await
    }

    async fn order_for_payment(&self, payment_id: &PaymentId) -> Result<Option<Order>, PaymentGatewayError> {
        PaymentFlowApi::order_for_payment(self, payment_id).await
    }
}
