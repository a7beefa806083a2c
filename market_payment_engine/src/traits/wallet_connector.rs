use mpg_common::{CoinAmount, Secret};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::db_types::{PaymentId, PaymentMetadata, WalletAddress};

/// Error shapes surfaced by the external wallet network's client SDK.
///
/// `ClientTimeout` is special: the SDK gives up after a fixed 60-second
/// window, but the underlying transfer may still confirm on-chain minutes
/// later, so the session coordinator must never treat it as terminal.
#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("The wallet SDK timed out waiting for on-chain confirmation")]
    ClientTimeout,
    #[error("A pending payment already exists: {0}")]
    PendingPaymentConflict(PaymentId),
    #[error("The wallet network is unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("No authenticated wallet session")]
    AuthenticationRequired,
    #[error("The wallet network rejected the payment: {0}")]
    Rejected(String),
}

/// Permission scopes requested from the wallet network during authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Payments,
    WalletAddress,
}

/// An authenticated link to the customer's wallet identity.
///
/// This is a capability, not durable state: it is acquired on first use,
/// passed by reference for the lifetime of the owning UI session, and
/// discarded on sign-out. It must never be cached across processes.
#[derive(Debug, Clone)]
pub struct WalletSession {
    pub address: WalletAddress,
    pub access_token: Secret<String>,
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: CoinAmount,
    pub memo: String,
    pub metadata: PaymentMetadata,
}

/// Notifications from the wallet network about an in-flight payment. The
/// SDK's callback API is reframed as an event stream so the session
/// coordinator can consume it from one explicit state machine instead of
/// nested callbacks.
#[derive(Debug, Clone)]
pub enum WalletEvent {
    /// The network wants server-side approval before executing the transfer.
    ApprovalRequired { payment_id: PaymentId },
    /// The client SDK observed the transfer being acknowledged.
    Completed { payment_id: PaymentId, tx_ref: String },
    /// The user cancelled the payment from their wallet app.
    Cancelled { payment_id: PaymentId },
    /// The SDK call failed; see [`WalletError`] for which shapes are terminal.
    Failed(WalletError),
}

/// Client seam to the external wallet network. The network's consensus and
/// transaction format stay opaque behind this trait.
#[allow(async_fn_in_trait)]
pub trait WalletConnector: Clone {
    /// Authenticates the current user against the wallet network with the
    /// given scopes, establishing the wallet link if it does not exist yet.
    /// Re-authenticating also surfaces any stuck earlier payment to the
    /// user's wallet app for forced resolution.
    async fn authenticate(&self, scopes: &[Scope]) -> Result<WalletSession, WalletError>;

    /// Starts a payment on the wallet network. Returns the network-issued
    /// payment id and the stream of events for this payment.
    async fn initiate_payment(
        &self,
        session: &WalletSession,
        request: PaymentRequest,
    ) -> Result<(PaymentId, mpsc::Receiver<WalletEvent>), WalletError>;

    /// Asks the network to abandon an in-flight payment.
    async fn cancel_payment(&self, session: &WalletSession, payment_id: &PaymentId) -> Result<(), WalletError>;
}
