use std::time::Duration;

use futures_util::{future::LocalBoxFuture, stream::FuturesUnordered, StreamExt};
use log::*;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    coordinator::{
        poller::{PollOutcome, ReconciliationPoller},
        PaymentGateway,
    },
    db_types::{Order, PaymentId},
    mpe_api::checkout_api::PricedCart,
    traits::{PaymentGatewayError, PaymentRequest, Scope, WalletConnector, WalletError, WalletEvent, WalletSession},
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Blockchain confirmation can legitimately take minutes, so the fallback
/// poller outlives the SDK's 60-second window by a wide margin.
const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(300);

/// The session's observable state.
///
/// `AwaitingConfirmation` is reachable *only* through the SDK's
/// timeout-shaped error: the SDK has given up but the transfer may still be
/// confirming on-chain, so the session keeps polling instead of failing. Its
/// only exits are through the poller.
#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    Initiated { payment_id: PaymentId },
    AwaitingCompletion { payment_id: PaymentId },
    AwaitingConfirmation { payment_id: PaymentId },
    Completed { order: Order },
    Cancelled,
    Failed { reason: String },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Cancelled | Self::Failed { .. })
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A payment is already in progress in this session")]
    SessionBusy,
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
    #[error("Gateway error: {0}")]
    Gateway(#[from] PaymentGatewayError),
}

/// What one run of the event loop asks the outer retry loop to do.
enum DriveOutcome {
    Finished,
    RetryInitiate(WalletError),
}

/// The payment session coordinator.
///
/// Owns the lifecycle of one payment attempt: wallet-link establishment,
/// initiation, server approval, and convergence to a terminal state across
/// the three racing completion channels (client callback, webhook, poller).
/// The session itself is single-threaded cooperative: everything multiplexes
/// over one `select!` loop, and only the fire-and-forget completion calls
/// run as detached (still local) futures.
pub struct PaymentSession<C, G>
where
    C: WalletConnector,
    G: PaymentGateway + Clone + 'static,
{
    connector: C,
    gateway: G,
    customer_id: String,
    wallet: Option<WalletSession>,
    state: SessionState,
    poll_interval: Duration,
    poll_deadline: Duration,
}

impl<C, G> PaymentSession<C, G>
where
    C: WalletConnector,
    G: PaymentGateway + Clone + 'static,
{
    pub fn new<S: Into<String>>(connector: C, gateway: G, customer_id: S) -> Self {
        Self {
            connector,
            gateway,
            customer_id: customer_id.into(),
            wallet: None,
            state: SessionState::Idle,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_deadline: DEFAULT_POLL_DEADLINE,
        }
    }

    pub fn with_polling(mut self, interval: Duration, deadline: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_deadline = deadline;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Drops the wallet link, e.g. on sign-out. The capability is
    /// session-scoped and is never persisted anywhere else.
    pub fn clear_wallet_link(&mut self) {
        self.wallet = None;
    }

    /// Runs one payment attempt to its resolution and returns the resulting
    /// state.
    ///
    /// The returned state is terminal except in one case: if the poller's
    /// deadline passes while the payment is still unresolved, the session
    /// stays in `AwaitingCompletion`/`AwaitingConfirmation` and the caller
    /// (the owning UI session) decides whether to start a fresh session
    /// later. The cart is borrowed, not consumed: on cancellation it is
    /// exactly as it was before the attempt.
    pub async fn pay(&mut self, cart: &PricedCart, memo: &str) -> Result<SessionState, SessionError> {
        if !matches!(self.state, SessionState::Idle) {
            return Err(SessionError::SessionBusy);
        }
        let metadata = cart.to_metadata();
        let request = PaymentRequest { amount: metadata.total, memo: memo.to_string(), metadata };
        let mut attempts = 0;
        loop {
            attempts += 1;
            let wallet = self.ensure_wallet_link().await?;
            match self.connector.initiate_payment(&wallet, request.clone()).await {
                Ok((payment_id, events)) => {
                    info!("🧾️ Payment {payment_id} initiated for {}", request.amount);
                    self.state = SessionState::Initiated { payment_id: payment_id.clone() };
                    match self.drive(payment_id, &request, events).await {
                        DriveOutcome::Finished => return Ok(self.state.clone()),
                        DriveOutcome::RetryInitiate(e) if attempts < 2 => {
                            info!("♻️ {e}. Re-authenticating to force resolution of the stuck payment, then retrying.");
                            self.reauthenticate().await?;
                            self.state = SessionState::Idle;
                        },
                        DriveOutcome::RetryInitiate(e) => {
                            error!("♻️ Recovery retry also failed: {e}");
                            self.state = SessionState::Failed { reason: e.to_string() };
                            return Ok(self.state.clone());
                        },
                    }
                },
                Err(WalletError::PendingPaymentConflict(pid)) if attempts < 2 => {
                    info!("♻️ A pending payment {pid} blocks initiation. Re-authenticating to force resolution.");
                    self.reauthenticate().await?;
                },
                Err(WalletError::AuthenticationRequired) if attempts < 2 => {
                    debug!("🧾️ Wallet link was stale; re-authenticating once");
                    self.reauthenticate().await?;
                },
                Err(e) => {
                    error!("🧾️ Could not initiate payment: {e}");
                    self.state = SessionState::Failed { reason: e.to_string() };
                    return Ok(self.state.clone());
                },
            }
        }
    }

    /// Establishes the wallet link if this session does not have one yet,
    /// requesting only the scope payments need.
    async fn ensure_wallet_link(&mut self) -> Result<WalletSession, SessionError> {
        if let Some(wallet) = &self.wallet {
            return Ok(wallet.clone());
        }
        debug!("🧾️ No wallet link yet; authenticating with the wallet network");
        let wallet = self.connector.authenticate(&[Scope::Payments]).await?;
        self.wallet = Some(wallet.clone());
        Ok(wallet)
    }

    /// Re-authentication surfaces any stuck prior payment to the user's
    /// wallet app for forced resolution.
    async fn reauthenticate(&mut self) -> Result<(), SessionError> {
        let wallet = self.connector.authenticate(&[Scope::Payments, Scope::WalletAddress]).await?;
        self.wallet = Some(wallet);
        Ok(())
    }

    /// The event loop for one initiated payment. Multiplexes the wallet event
    /// stream, the reconciliation poller and any in-flight fire-and-forget
    /// completion calls until the session resolves.
    async fn drive(
        &mut self,
        payment_id: PaymentId,
        request: &PaymentRequest,
        mut events: mpsc::Receiver<WalletEvent>,
    ) -> DriveOutcome {
        let mut events_open = true;
        let mut poll_run: Option<LocalBoxFuture<'static, PollOutcome>> = None;
        let mut completions: FuturesUnordered<LocalBoxFuture<'static, Result<Order, PaymentGatewayError>>> =
            FuturesUnordered::new();
        loop {
            tokio::select! {
                maybe_ev = events.recv(), if events_open => match maybe_ev {
                    Some(WalletEvent::ApprovalRequired { payment_id: pid }) => {
                        debug!("🧾️ Server approval requested for {pid}");
                        let approval = self
                            .gateway
                            .approve(&self.customer_id, &pid, request.amount, Some(request.memo.clone()), &request.metadata)
                            .await;
                        match approval {
                            Ok(()) => {
                                self.state = SessionState::AwaitingCompletion { payment_id: pid.clone() };
                                if poll_run.is_none() {
                                    poll_run = Some(self.make_poller(pid));
                                }
                            },
                            Err(e) => {
                                // Approval rejection (amount mismatch etc.) is terminal.
                                error!("🧾️ Server rejected approval of {pid}: {e}");
                                if let Some(wallet) = &self.wallet {
                                    let _ = self.connector.cancel_payment(wallet, &pid).await;
                                }
                                self.state = SessionState::Failed { reason: e.to_string() };
                                return DriveOutcome::Finished;
                            },
                        }
                    },
                    Some(WalletEvent::Completed { payment_id: pid, tx_ref }) => {
                        debug!("🧾️ Client completion callback for {pid}; dispatching completion without waiting");
                        let gateway = self.gateway.clone();
                        completions.push(Box::pin(async move { gateway.complete(&pid, &tx_ref).await }));
                        if poll_run.is_none() {
                            poll_run = Some(self.make_poller(payment_id.clone()));
                        }
                    },
                    Some(WalletEvent::Cancelled { payment_id: pid }) => {
                        info!("🧾️ Payment {pid} cancelled from the wallet app; the cart is untouched");
                        self.state = SessionState::Cancelled;
                        return DriveOutcome::Finished;
                    },
                    Some(WalletEvent::Failed(WalletError::ClientTimeout)) => {
                        // The SDK gave up, but the transfer may still confirm
                        // on-chain. Suppress the failure and rely on the poller.
                        warn!("🧾️ SDK timeout on {payment_id}; awaiting final confirmation via the poller");
                        self.state = SessionState::AwaitingConfirmation { payment_id: payment_id.clone() };
                        if poll_run.is_none() {
                            poll_run = Some(self.make_poller(payment_id.clone()));
                        }
                    },
                    Some(WalletEvent::Failed(e @ WalletError::PendingPaymentConflict(_))) => {
                        return DriveOutcome::RetryInitiate(e);
                    },
                    Some(WalletEvent::Failed(e)) => {
                        error!("🧾️ Terminal wallet error on {payment_id}: {e}");
                        self.state = SessionState::Failed { reason: e.to_string() };
                        return DriveOutcome::Finished;
                    },
                    None => {
                        events_open = false;
                        if poll_run.is_none() {
                            warn!("🧾️ Wallet event stream closed before {payment_id} was approved");
                            self.state = SessionState::Failed { reason: "wallet event stream closed".to_string() };
                            return DriveOutcome::Finished;
                        }
                    },
                },
                outcome = async { poll_run.as_mut().expect("guarded by is_some").await }, if poll_run.is_some() => {
                    match outcome {
                        PollOutcome::Completed { order: Some(order), .. } => {
                            info!("🧾️ Payment {payment_id} confirmed. Order {} is on its way.", order.order_id);
                            self.state = SessionState::Completed { order };
                            return DriveOutcome::Finished;
                        },
                        PollOutcome::Completed { order: None, tx_ref } => {
                            error!(
                                "🧾️ Payment {payment_id} is complete (tx {tx_ref:?}) but its order could not be \
                                 fetched"
                            );
                            self.state = SessionState::Failed { reason: "completed payment has no order".to_string() };
                            return DriveOutcome::Finished;
                        },
                        PollOutcome::Cancelled => {
                            info!("🧾️ Payment {payment_id} was cancelled");
                            self.state = SessionState::Cancelled;
                            return DriveOutcome::Finished;
                        },
                        PollOutcome::Failed => {
                            error!("🧾️ Payment {payment_id} failed on the network");
                            self.state = SessionState::Failed { reason: "payment failed on the network".to_string() };
                            return DriveOutcome::Finished;
                        },
                        PollOutcome::DeadlineExceeded => {
                            // Not silently dropped: the session stays in its
                            // awaiting state and the caller decides what next.
                            warn!("🧾️ Poller deadline passed for {payment_id}; session remains unresolved");
                            return DriveOutcome::Finished;
                        },
                    }
                },
                Some(result) = completions.next() => match result {
                    Ok(order) => debug!("🧾️ Fire-and-forget completion acknowledged order {}", order.order_id),
                    // The poller remains the source of truth; a lost race or
                    // transient error here changes nothing for the user.
                    Err(e) => debug!("🧾️ Fire-and-forget completion returned: {e}"),
                },
            }
        }
    }

    fn make_poller(&self, payment_id: PaymentId) -> LocalBoxFuture<'static, PollOutcome> {
        let poller =
            ReconciliationPoller::new(self.gateway.clone(), payment_id, self.poll_interval, self.poll_deadline);
        Box::pin(poller.run())
    }
}
