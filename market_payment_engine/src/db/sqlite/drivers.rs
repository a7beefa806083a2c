use sqlx::SqliteConnection;

use crate::{
    db_types::{Driver, DriverStatus},
    traits::PaymentGatewayError,
};

const DRIVER_COLUMNS: &str = "id, store_id, user_id, name, status";

pub async fn fetch_driver(driver_id: i64, conn: &mut SqliteConnection) -> Result<Option<Driver>, PaymentGatewayError> {
    let sql = format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE id = $1");
    let driver = sqlx::query_as::<_, Driver>(&sql).bind(driver_id).fetch_optional(&mut *conn).await?;
    Ok(driver)
}

pub async fn fetch_driver_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Driver>, PaymentGatewayError> {
    let sql = format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE user_id = $1");
    let driver = sqlx::query_as::<_, Driver>(&sql).bind(user_id).fetch_optional(&mut *conn).await?;
    Ok(driver)
}

/// A driver can only be dispatched if they are active and belong to the pool
/// of the store that owns the order.
pub(crate) async fn fetch_active_for_store(
    driver_id: i64,
    store_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Driver>, PaymentGatewayError> {
    let sql = format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE id = $1 AND store_id = $2 AND status = 'Active'");
    let driver = sqlx::query_as::<_, Driver>(&sql).bind(driver_id).bind(store_id).fetch_optional(&mut *conn).await?;
    Ok(driver)
}

pub(crate) async fn set_status(
    driver_id: i64,
    status: DriverStatus,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query("UPDATE drivers SET status = $1 WHERE id = $2")
        .bind(status.to_string())
        .bind(driver_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
