use chrono::Duration;
use log::*;
use market_payment_engine::{db_types::PaymentIntent, events::EventProducers, PaymentFlowApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the stale payment expiry worker. Do not await the returned
/// JoinHandle, as it runs indefinitely.
///
/// Abandoned sessions leave intents stuck in `Initiated` or `ServerApproved`;
/// the worker fails anything older than `expiry` so they cannot pile up, while
/// leaving the rows in place as an audit trail.
pub fn start_expiry_worker(db: SqliteDatabase, producers: EventProducers, expiry: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        let api = PaymentFlowApi::new(db, producers);
        info!("🕰️ Stale payment expiry worker started");
        loop {
            timer.tick().await;
            match api.expire_stale_intents(expiry).await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ No stale payment intents this round"),
                Ok(expired) => {
                    info!("🕰️ {} stale payment intents failed", expired.len());
                    debug!("🕰️ Expired: {}", intent_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running the payment expiry job: {e}");
                },
            }
        }
    })
}

fn intent_list(intents: &[PaymentIntent]) -> String {
    intents
        .iter()
        .map(|i| format!("[{}] payment_id: {} cust_id: {}", i.id, i.payment_id, i.customer_id))
        .collect::<Vec<String>>()
        .join(", ")
}
