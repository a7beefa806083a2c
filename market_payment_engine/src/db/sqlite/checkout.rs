use log::warn;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Discount, LineItem, OptionStock, OrderId, Product, Store},
    traits::PaymentGatewayError,
};

const DISCOUNT_COLUMNS: &str = "code, store_id, kind, value, active, starts_at, ends_at, min_order_value, \
                                usage_limit, usage_count, per_customer_limit, new_customers_only";

pub async fn fetch_store(store_id: &str, conn: &mut SqliteConnection) -> Result<Option<Store>, PaymentGatewayError> {
    let store = sqlx::query_as::<_, Store>("SELECT id, name, delivery_fee FROM stores WHERE id = $1")
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(store)
}

pub async fn fetch_product(
    product_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Product>, PaymentGatewayError> {
    let product = sqlx::query_as::<_, Product>(
        "SELECT id, store_id, name, unit_price, quantity, unlimited_stock FROM products WHERE id = $1",
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(product)
}

pub async fn fetch_option_stock(
    product_id: &str,
    choices: &[String],
    conn: &mut SqliteConnection,
) -> Result<Vec<OptionStock>, PaymentGatewayError> {
    if choices.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT choice, quantity FROM product_options WHERE product_id = ");
    builder.push_bind(product_id);
    builder.push(" AND choice IN (");
    let mut in_clause = builder.separated(", ");
    for choice in choices {
        in_clause.push_bind(choice);
    }
    builder.push(")");
    let stock = builder.build_query_as::<OptionStock>().fetch_all(&mut *conn).await?;
    Ok(stock)
}

pub async fn fetch_discount(
    store_id: &str,
    code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Discount>, PaymentGatewayError> {
    let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE store_id = $1 AND code = $2");
    let discount = sqlx::query_as::<_, Discount>(&sql).bind(store_id).bind(code).fetch_optional(&mut *conn).await?;
    Ok(discount)
}

pub async fn count_customer_redemptions(
    store_id: &str,
    code: &str,
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, PaymentGatewayError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM discount_redemptions WHERE store_id = $1 AND code = $2 AND customer_id = $3",
    )
    .bind(store_id)
    .bind(code)
    .bind(customer_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

pub async fn count_customer_orders(customer_id: &str, conn: &mut SqliteConnection) -> Result<i64, PaymentGatewayError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

pub async fn is_store_operator(
    store_id: &str,
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentGatewayError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM store_staff WHERE store_id = $1 AND user_id = $2")
        .bind(store_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Records one confirmed redemption: bumps the usage counter and writes the
/// per-customer audit row. Runs inside the order-creation transaction.
pub(crate) async fn record_redemption(
    store_id: &str,
    code: &str,
    customer_id: &str,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query("UPDATE discounts SET usage_count = usage_count + 1 WHERE store_id = $1 AND code = $2")
        .bind(store_id)
        .bind(code)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "INSERT INTO discount_redemptions (store_id, code, customer_id, order_id) VALUES ($1, $2, $3, $4)",
    )
    .bind(store_id)
    .bind(code)
    .bind(customer_id)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Reverses [`record_redemption`] when an order is cancelled.
pub(crate) async fn release_redemption(
    store_id: &str,
    code: &str,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query(
        "UPDATE discounts SET usage_count = MAX(usage_count - 1, 0) WHERE store_id = $1 AND code = $2",
    )
    .bind(store_id)
    .bind(code)
    .execute(&mut *conn)
    .await?;
    sqlx::query("DELETE FROM discount_redemptions WHERE order_id = $1").bind(order_id).execute(&mut *conn).await?;
    Ok(())
}

/// Decrements product and option stock for the given line items. Stock floors
/// at zero: checkout validation is best-effort, so a concurrent sale can leave
/// less stock than the order consumed. The clamp is logged as the signal for
/// post-hoc reconciliation.
pub(crate) async fn decrement_stock_for_items(
    items: &[LineItem],
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    for item in items {
        let product = match fetch_product(&item.product_id, &mut *conn).await? {
            Some(p) => p,
            None => {
                warn!("🛒️ Product {} no longer exists; skipping stock decrement", item.product_id);
                continue;
            },
        };
        if product.unlimited_stock {
            continue;
        }
        if product.quantity < item.quantity {
            warn!(
                "🛒️ Product {} oversold: {} remaining, {} ordered. Clamping stock at zero.",
                item.product_id, product.quantity, item.quantity
            );
        }
        sqlx::query("UPDATE products SET quantity = MAX(quantity - $1, 0) WHERE id = $2")
            .bind(item.quantity)
            .bind(&item.product_id)
            .execute(&mut *conn)
            .await?;
        for choice in &item.options {
            sqlx::query(
                "UPDATE product_options SET quantity = MAX(quantity - $1, 0) WHERE product_id = $2 AND choice = $3",
            )
            .bind(item.quantity)
            .bind(&item.product_id)
            .bind(choice)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

/// Returns stock consumed by a cancelled order to the shelves.
pub(crate) async fn restock_for_items(
    items: &[LineItem],
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    for item in items {
        sqlx::query("UPDATE products SET quantity = quantity + $1 WHERE id = $2 AND unlimited_stock = 0")
            .bind(item.quantity)
            .bind(&item.product_id)
            .execute(&mut *conn)
            .await?;
        for choice in &item.options {
            sqlx::query("UPDATE product_options SET quantity = quantity + $1 WHERE product_id = $2 AND choice = $3")
                .bind(item.quantity)
                .bind(&item.product_id)
                .bind(choice)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}
