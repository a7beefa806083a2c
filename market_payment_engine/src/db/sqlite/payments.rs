use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentIntent, PaymentId, PaymentIntent, PaymentIntentStatus},
    traits::{InsertIntentResult, PaymentGatewayError},
};

const INTENT_COLUMNS: &str =
    "id, payment_id, customer_id, amount, memo, metadata, status, tx_ref, created_at, updated_at";

pub async fn idempotent_insert(
    intent: NewPaymentIntent,
    conn: &mut SqliteConnection,
) -> Result<InsertIntentResult, PaymentGatewayError> {
    let metadata = serde_json::to_string(&intent.metadata)?;
    let result = sqlx::query(
        r#"
            INSERT INTO payment_intents (payment_id, customer_id, amount, memo, metadata)
            VALUES ($1, $2, $3, $4, $5);
        "#,
    )
    .bind(&intent.payment_id)
    .bind(&intent.customer_id)
    .bind(intent.amount)
    .bind(&intent.memo)
    .bind(metadata)
    .execute(&mut *conn)
    .await;
    match result {
        Ok(_) => {
            let row = must_fetch(&intent.payment_id, conn).await?;
            Ok(InsertIntentResult::Inserted(row))
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            let row = must_fetch(&intent.payment_id, conn).await?;
            Ok(InsertIntentResult::AlreadyExists(row))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_intent(
    payment_id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentIntent>, PaymentGatewayError> {
    let sql = format!("SELECT {INTENT_COLUMNS} FROM payment_intents WHERE payment_id = $1");
    let intent = sqlx::query_as::<_, PaymentIntent>(&sql).bind(payment_id).fetch_optional(&mut *conn).await?;
    Ok(intent)
}

async fn must_fetch(payment_id: &PaymentId, conn: &mut SqliteConnection) -> Result<PaymentIntent, PaymentGatewayError> {
    fetch_intent(payment_id, conn).await?.ok_or_else(|| {
        PaymentGatewayError::DatabaseError(format!("Payment intent {payment_id} disappeared mid-transaction"))
    })
}

/// Compare-and-set on the intent status. Returns true iff this call performed
/// the transition.
pub async fn cas_status(
    payment_id: &PaymentId,
    from: &[PaymentIntentStatus],
    to: PaymentIntentStatus,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentGatewayError> {
    let allowed = from.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
    let sql = format!(
        "UPDATE payment_intents SET status = $1, updated_at = CURRENT_TIMESTAMP \
         WHERE payment_id = $2 AND status IN ({allowed})"
    );
    let rows = sqlx::query(&sql).bind(to.to_string()).bind(payment_id).execute(&mut *conn).await?.rows_affected();
    Ok(rows == 1)
}

/// The completion compare-and-set. Issued as the first statement of the
/// completion transaction so the write lock is taken before anything is read;
/// the losing writer's UPDATE then matches zero rows instead of tripping a
/// snapshot conflict.
pub async fn complete_cas(
    payment_id: &PaymentId,
    tx_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentGatewayError> {
    let rows = sqlx::query(
        r#"
            UPDATE payment_intents SET status = 'Completed', tx_ref = $1, updated_at = CURRENT_TIMESTAMP
            WHERE payment_id = $2 AND status = 'ServerApproved';
        "#,
    )
    .bind(tx_ref)
    .bind(payment_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}

pub async fn fetch_stale_unfinished(
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentIntent>, PaymentGatewayError> {
    let sql = format!(
        "SELECT {INTENT_COLUMNS} FROM payment_intents \
         WHERE status IN ('Initiated','ServerApproved') AND datetime(created_at) < datetime($1) \
         ORDER BY created_at ASC"
    );
    let intents = sqlx::query_as::<_, PaymentIntent>(&sql).bind(cutoff.to_rfc3339()).fetch_all(&mut *conn).await?;
    Ok(intents)
}

pub async fn mark_stale_failed(cutoff: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, PaymentGatewayError> {
    let rows = sqlx::query(
        r#"
            UPDATE payment_intents SET status = 'Failed', updated_at = CURRENT_TIMESTAMP
            WHERE status IN ('Initiated','ServerApproved') AND datetime(created_at) < datetime($1);
        "#,
    )
    .bind(cutoff.to_rfc3339())
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(rows)
}
