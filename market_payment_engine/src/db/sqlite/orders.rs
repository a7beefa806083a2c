use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatus, PaymentId},
    traits::{OrderQueryFilter, PaymentGatewayError},
};

const ORDER_COLUMNS: &str = "id, order_id, payment_id, store_id, customer_id, line_items, delivery_address, \
                             subtotal, discount, discount_code, delivery_fee, total_price, currency, status, \
                             driver_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub(crate) enum InsertOrderResult {
    Inserted(Order),
    AlreadyExists(Order),
}

pub(crate) async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<InsertOrderResult, PaymentGatewayError> {
    let line_items = serde_json::to_string(&order.line_items)?;
    let result = sqlx::query(
        r#"
            INSERT INTO orders (
                order_id, payment_id, store_id, customer_id, line_items, delivery_address,
                subtotal, discount, discount_code, delivery_fee, total_price, currency
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12);
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.payment_id)
    .bind(&order.store_id)
    .bind(&order.customer_id)
    .bind(line_items)
    .bind(&order.delivery_address)
    .bind(order.subtotal)
    .bind(order.discount)
    .bind(&order.discount_code)
    .bind(order.delivery_fee)
    .bind(order.total_price)
    .bind(&order.currency)
    .execute(&mut *conn)
    .await;
    match result {
        Ok(_) => {
            let row = must_fetch_by_payment_id(&order.payment_id, conn).await?;
            Ok(InsertOrderResult::Inserted(row))
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            let row = must_fetch_by_payment_id(&order.payment_id, conn).await?;
            Ok(InsertOrderResult::AlreadyExists(row))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1");
    let order = sqlx::query_as::<_, Order>(&sql).bind(order_id).fetch_optional(&mut *conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_payment_id(
    payment_id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_id = $1");
    let order = sqlx::query_as::<_, Order>(&sql).bind(payment_id).fetch_optional(&mut *conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_pk(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, PaymentGatewayError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let order = sqlx::query_as::<_, Order>(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(order)
}

async fn must_fetch_by_payment_id(
    payment_id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentGatewayError> {
    fetch_order_by_payment_id(payment_id, conn).await?.ok_or_else(|| {
        PaymentGatewayError::DatabaseError(format!("Order for payment {payment_id} disappeared mid-transaction"))
    })
}

/// Fetches orders according to the criteria in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn fetch_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, PaymentGatewayError> {
    let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders "));
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(store_id) = query.store_id {
        where_clause.push("store_id = ");
        where_clause.push_bind_unseparated(store_id);
    }
    if let Some(customer_id) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(customer_id);
    }
    if !query.statuses.is_empty() {
        let statuses = query.statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    builder.push(" ORDER BY created_at ASC");
    trace!("📦️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(&mut *conn).await?;
    Ok(orders)
}

/// Compare-and-set on the order status. Returns true iff this call performed
/// the transition.
pub(crate) async fn cas_status(
    id: i64,
    from: OrderStatus,
    to: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentGatewayError> {
    let rows = sqlx::query(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND status = $3",
    )
    .bind(to.to_string())
    .bind(id)
    .bind(from.to_string())
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}

/// Binds a driver and moves the order out for delivery in a single statement.
pub(crate) async fn bind_driver(id: i64, driver_id: i64, conn: &mut SqliteConnection) -> Result<bool, PaymentGatewayError> {
    let rows = sqlx::query(
        r#"
            UPDATE orders SET status = 'OutForDelivery', driver_id = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'Preparing';
        "#,
    )
    .bind(driver_id)
    .bind(id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}
