use std::time::Duration;

use log::*;

use crate::{
    coordinator::PaymentGateway,
    db_types::{Order, PaymentId, PaymentIntentStatus},
};

/// What the poller observed when it stopped.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The authoritative store reports the payment completed. `order` is the
    /// order created by whichever channel performed the mutation.
    Completed { order: Option<Order>, tx_ref: Option<String> },
    Cancelled,
    Failed,
    /// The deadline passed without the payment reaching a terminal state.
    DeadlineExceeded,
}

/// A bounded-frequency, time-bounded polling loop over a payment's
/// authoritative status.
///
/// The poller is strictly a read-side fallback: it never performs the
/// completion mutation itself, only observes the result of whichever channel
/// did, so it can never become a fourth independent writer.
pub struct ReconciliationPoller<G> {
    gateway: G,
    payment_id: PaymentId,
    interval: Duration,
    deadline: Duration,
}

impl<G> ReconciliationPoller<G>
where G: PaymentGateway
{
    pub fn new(gateway: G, payment_id: PaymentId, interval: Duration, deadline: Duration) -> Self {
        Self { gateway, payment_id, interval, deadline }
    }

    /// Polls until the payment is terminal or the deadline passes. The first
    /// poll happens immediately.
    pub async fn run(self) -> PollOutcome {
        let started = tokio::time::Instant::now();
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        debug!("🔁️ Reconciliation poller started for payment {}", self.payment_id);
        loop {
            timer.tick().await;
            if started.elapsed() > self.deadline {
                warn!("🔁️ Poller for {} gave up after {:?} without a terminal status", self.payment_id, self.deadline);
                return PollOutcome::DeadlineExceeded;
            }
            match self.gateway.status(&self.payment_id).await {
                Ok(status) => match status.status {
                    PaymentIntentStatus::Completed => {
                        info!("🔁️ Payment {} confirmed complete by the authoritative store", self.payment_id);
                        let order = match self.gateway.order_for_payment(&self.payment_id).await {
                            Ok(order) => order,
                            Err(e) => {
                                warn!("🔁️ Could not fetch the order for {}: {e}", self.payment_id);
                                None
                            },
                        };
                        return PollOutcome::Completed { order, tx_ref: status.tx_ref };
                    },
                    PaymentIntentStatus::Cancelled => return PollOutcome::Cancelled,
                    PaymentIntentStatus::Failed => return PollOutcome::Failed,
                    s => trace!("🔁️ Payment {} still {s}; polling continues", self.payment_id),
                },
                // Transient read failures are retried on the next tick; the
                // loop only ends on a terminal status or the deadline.
                Err(e) => warn!("🔁️ Status poll for {} failed: {e}. Retrying.", self.payment_id),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use mockall::mock;
    use mpg_common::CoinAmount;

    use super::*;
    use crate::{
        db_types::PaymentMetadata,
        mpe_api::payment_flow_api::PaymentStatus,
        traits::PaymentGatewayError,
    };

    mock! {
        pub Gateway {}
        impl PaymentGateway for Gateway {
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
    }

    #[tokio::test]
    async fn poller_stops_on_the_first_completed_observation() {
        let mut gateway = MockGateway::new();
        let polls = Arc::new(AtomicUsize::new(0));
        let p2 = polls.clone();
        gateway.expect_status().returning(move |_| {
            let n = p2.fetch_add(1, Ordering::SeqCst);
            let status =
                if n < 2 { PaymentIntentStatus::ServerApproved } else { PaymentIntentStatus::Completed };
            Ok(PaymentStatus { status, tx_ref: (n >= 2).then(|| "tx-1".to_string()) })
        });
        gateway.expect_order_for_payment().times(1).returning(|_| Ok(None));
        let poller = ReconciliationPoller::new(
            gateway,
            PaymentId::from("pay-1"),
            Duration::from_millis(5),
            Duration::from_secs(2),
        );
        match poller.run().await {
            PollOutcome::Completed { tx_ref, .. } => assert_eq!(tx_ref.as_deref(), Some("tx-1")),
            other => panic!("Expected Completed, got {other:?}"),
        }
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poller_gives_up_at_the_deadline() {
        let mut gateway = MockGateway::new();
        gateway.expect_status().returning(|_| {
            Ok(PaymentStatus { status: PaymentIntentStatus::ServerApproved, tx_ref: None })
        });
        let poller = ReconciliationPoller::new(
            gateway,
            PaymentId::from("pay-2"),
            Duration::from_millis(5),
            Duration::from_millis(30),
        );
        assert!(matches!(poller.run().await, PollOutcome::DeadlineExceeded));
    }

    #[tokio::test]
    async fn transient_read_errors_do_not_stop_the_poller() {
        let mut gateway = MockGateway::new();
        let polls = Arc::new(AtomicUsize::new(0));
        let p2 = polls.clone();
        gateway.expect_status().returning(move |pid| {
            let n = p2.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(PaymentGatewayError::DatabaseError("connection reset".to_string()))
            } else if n == 1 {
                Err(PaymentGatewayError::PaymentNotFound(pid.clone()))
            } else {
                Ok(PaymentStatus { status: PaymentIntentStatus::Cancelled, tx_ref: None })
            }
        });
        let poller = ReconciliationPoller::new(
            gateway,
            PaymentId::from("pay-3"),
            Duration::from_millis(5),
            Duration::from_secs(2),
        );
        assert!(matches!(poller.run().await, PollOutcome::Cancelled));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }
}
