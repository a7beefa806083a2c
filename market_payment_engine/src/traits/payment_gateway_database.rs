use crate::{
    db_types::{NewPaymentIntent, Order, PaymentId, PaymentIntent},
    traits::PaymentGatewayError,
};

/// Result of the idempotent payment-intent insert.
#[derive(Debug, Clone)]
pub enum InsertIntentResult {
    Inserted(PaymentIntent),
    AlreadyExists(PaymentIntent),
}

impl InsertIntentResult {
    pub fn into_intent(self) -> PaymentIntent {
        match self {
            Self::Inserted(i) | Self::AlreadyExists(i) => i,
        }
    }
}

/// Result of the authoritative completion mutation. Exactly one caller per
/// payment id ever observes `Created`; every other caller gets
/// `AlreadyCompleted` with the same order.
#[derive(Debug, Clone)]
pub enum CompletionResult {
    Created(Order),
    AlreadyCompleted(Order),
}

impl CompletionResult {
    pub fn order(&self) -> &Order {
        match self {
            Self::Created(o) | Self::AlreadyCompleted(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            Self::Created(o) | Self::AlreadyCompleted(o) => o,
        }
    }
}

/// Storage behaviour required to run the payment side of the gateway.
///
/// Every method is a single atomic unit: implementations wrap multi-table
/// work in one transaction so that the three racing completion channels
/// (wallet callback, webhook, poller-triggered retries) can call into them
/// concurrently without coordination.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Stores a new payment intent. If an intent with the same `payment_id`
    /// already exists, nothing is written and the existing row is returned.
    async fn insert_payment_intent(&self, intent: NewPaymentIntent) -> Result<InsertIntentResult, PaymentGatewayError>;

    /// Compare-and-set `Initiated -> ServerApproved`. Re-approving an already
    /// approved intent is a no-op returning the current row; approving a
    /// terminal intent is an error.
    async fn approve_payment_intent(&self, payment_id: &PaymentId) -> Result<PaymentIntent, PaymentGatewayError>;

    /// The single-writer completion mutation. In one transaction:
    /// * compare-and-set the intent `ServerApproved -> Completed`, recording
    ///   the transaction reference;
    /// * if this call won the CAS, create the order, increment discount usage
    ///   and decrement inventory.
    ///
    /// A caller that loses the CAS to a concurrent writer observes the
    /// already-completed state and gets the existing order back, with no
    /// side effects repeated.
    async fn complete_payment_intent(
        &self,
        payment_id: &PaymentId,
        tx_ref: &str,
    ) -> Result<CompletionResult, PaymentGatewayError>;

    /// Compare-and-set to `Cancelled`. Only honoured before the completion
    /// writer has run; a completed intent must be unwound through the order
    /// state machine instead.
    async fn cancel_payment_intent(&self, payment_id: &PaymentId) -> Result<PaymentIntent, PaymentGatewayError>;

    /// Compare-and-set to `Failed`. Same pre-completion rule as cancellation.
    async fn fail_payment_intent(&self, payment_id: &PaymentId) -> Result<PaymentIntent, PaymentGatewayError>;

    async fn fetch_payment_intent(&self, payment_id: &PaymentId) -> Result<Option<PaymentIntent>, PaymentGatewayError>;

    /// Marks unfinished intents older than `older_than` as `Failed` and
    /// returns them. Intents are never deleted; the audit trail stays.
    async fn expire_stale_intents(&self, older_than: chrono::Duration) -> Result<Vec<PaymentIntent>, PaymentGatewayError>;
}
