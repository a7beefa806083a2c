use std::{fmt::Debug, str::FromStr, time::Duration};

use chrono::Utc;
use log::*;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use super::{checkout, drivers, orders, payments};
use crate::{
    db_types::{
        Discount,
        Driver,
        DriverStatus,
        NewOrder,
        NewPaymentIntent,
        OptionStock,
        Order,
        OrderId,
        OrderStatus,
        PaymentId,
        PaymentIntent,
        PaymentIntentStatus,
        Product,
        Store,
    },
    traits::{
        CheckoutStore,
        CompletionResult,
        InsertIntentResult,
        OrderManagement,
        OrderQueryFilter,
        PaymentGatewayDatabase,
        PaymentGatewayError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Opens (creating if necessary) the database at `url` and brings the
    /// schema up to date. WAL mode keeps the concurrent completion writers
    /// from starving each other; the busy timeout covers the lock handover.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, PaymentGatewayError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("🗃️ Connected to database at {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_payment_intent(&self, intent: NewPaymentIntent) -> Result<InsertIntentResult, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let result = payments::idempotent_insert(intent, &mut conn).await?;
        if let InsertIntentResult::Inserted(i) = &result {
            debug!("🗃️ Payment intent {} saved with id {}", i.payment_id, i.id);
        }
        Ok(result)
    }

    async fn approve_payment_intent(&self, payment_id: &PaymentId) -> Result<PaymentIntent, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let won = payments::cas_status(
            payment_id,
            &[PaymentIntentStatus::Initiated],
            PaymentIntentStatus::ServerApproved,
            &mut tx,
        )
        .await?;
        let intent = payments::fetch_intent(payment_id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::PaymentNotFound(payment_id.clone()))?;
        if !won && intent.status != PaymentIntentStatus::ServerApproved {
            tx.rollback().await?;
            return Err(PaymentGatewayError::PaymentAlreadyTerminal { id: payment_id.clone(), status: intent.status });
        }
        tx.commit().await?;
        debug!("🗃️ Payment intent {payment_id} is server-approved");
        Ok(intent)
    }

    async fn complete_payment_intent(
        &self,
        payment_id: &PaymentId,
        tx_ref: &str,
    ) -> Result<CompletionResult, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let won = payments::complete_cas(payment_id, tx_ref, &mut tx).await?;
        if !won {
            tx.rollback().await?;
            let mut conn = self.pool.acquire().await?;
            let intent = payments::fetch_intent(payment_id, &mut conn)
                .await?
                .ok_or_else(|| PaymentGatewayError::PaymentNotFound(payment_id.clone()))?;
            return match intent.status {
                PaymentIntentStatus::Completed => {
                    let order =
                        orders::fetch_order_by_payment_id(payment_id, &mut conn).await?.ok_or_else(|| {
                            PaymentGatewayError::DatabaseError(format!(
                                "Payment {payment_id} is completed but has no order. This should be unreachable."
                            ))
                        })?;
                    trace!("🗃️ Completion for {payment_id} lost the race; returning existing order {}", order.order_id);
                    Ok(CompletionResult::AlreadyCompleted(order))
                },
                PaymentIntentStatus::Initiated => {
                    Err(PaymentGatewayError::PaymentNotApproved(payment_id.clone()))
                },
                status => Err(PaymentGatewayError::PaymentAlreadyTerminal { id: payment_id.clone(), status }),
            };
        }
        // This call won the compare-and-set: create the order and apply the
        // discount and inventory side effects in the same transaction.
        let intent = payments::fetch_intent(payment_id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::PaymentNotFound(payment_id.clone()))?;
        let metadata = intent.metadata.0.clone();
        let new_order = NewOrder::from_metadata(payment_id, &intent.customer_id, &metadata);
        let order = match orders::idempotent_insert(new_order, &mut tx).await? {
            orders::InsertOrderResult::Inserted(o) => o,
            orders::InsertOrderResult::AlreadyExists(o) => {
                warn!("🗃️ Order {} already existed for freshly completed payment {payment_id}", o.order_id);
                o
            },
        };
        if let Some(code) = &metadata.discount_code {
            checkout::record_redemption(&metadata.store_id, code, &intent.customer_id, &order.order_id, &mut tx)
                .await?;
        }
        checkout::decrement_stock_for_items(&metadata.line_items, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment {payment_id} completed; order {} created for {}", order.order_id, order.total_price);
        Ok(CompletionResult::Created(order))
    }

    async fn cancel_payment_intent(&self, payment_id: &PaymentId) -> Result<PaymentIntent, PaymentGatewayError> {
        self.terminate_intent(payment_id, PaymentIntentStatus::Cancelled).await
    }

    async fn fail_payment_intent(&self, payment_id: &PaymentId) -> Result<PaymentIntent, PaymentGatewayError> {
        self.terminate_intent(payment_id, PaymentIntentStatus::Failed).await
    }

    async fn fetch_payment_intent(&self, payment_id: &PaymentId) -> Result<Option<PaymentIntent>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_intent(payment_id, &mut conn).await
    }

    async fn expire_stale_intents(
        &self,
        older_than: chrono::Duration,
    ) -> Result<Vec<PaymentIntent>, PaymentGatewayError> {
        let cutoff = Utc::now() - older_than;
        let mut tx = self.pool.begin().await?;
        let mut stale = payments::fetch_stale_unfinished(cutoff, &mut tx).await?;
        if stale.is_empty() {
            tx.rollback().await?;
            return Ok(stale);
        }
        let count = payments::mark_stale_failed(cutoff, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Expired {count} stale payment intents");
        for intent in &mut stale {
            intent.status = PaymentIntentStatus::Failed;
        }
        Ok(stale)
    }
}

impl SqliteDatabase {
    /// Common path for the two pre-completion terminal transitions. A
    /// completed intent can no longer be terminated here; that has to go
    /// through the order state machine.
    async fn terminate_intent(
        &self,
        payment_id: &PaymentId,
        to: PaymentIntentStatus,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let won = payments::cas_status(
            payment_id,
            &[PaymentIntentStatus::Initiated, PaymentIntentStatus::ServerApproved],
            to,
            &mut tx,
        )
        .await?;
        let intent = payments::fetch_intent(payment_id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::PaymentNotFound(payment_id.clone()))?;
        if !won {
            tx.rollback().await?;
            return Err(PaymentGatewayError::PaymentAlreadyTerminal { id: payment_id.clone(), status: intent.status });
        }
        tx.commit().await?;
        debug!("🗃️ Payment intent {payment_id} marked as {to}");
        Ok(intent)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_order_id(order_id, &mut conn).await
    }

    async fn fetch_order_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_payment_id(payment_id, &mut conn).await
    }

    async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders(query, &mut conn).await
    }

    async fn update_order_status(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let won = orders::cas_status(id, from, to, &mut tx).await?;
        let order = orders::fetch_order_by_pk(id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::DatabaseError(format!("Order with row id {id} does not exist")))?;
        if !won {
            tx.rollback().await?;
            return Err(PaymentGatewayError::InvalidTransition { order_id: order.order_id, from: order.status, to });
        }
        if to == OrderStatus::Delivered {
            if let Some(driver_id) = order.driver_id {
                drivers::set_status(driver_id, DriverStatus::Active, &mut tx).await?;
            }
        }
        tx.commit().await?;
        Ok(order)
    }

    async fn dispatch_driver(&self, id: i64, driver_id: i64) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_pk(id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::DatabaseError(format!("Order with row id {id} does not exist")))?;
        let driver = drivers::fetch_active_for_store(driver_id, &order.store_id, &mut tx).await?;
        let Some(driver) = driver else {
            tx.rollback().await?;
            return Err(PaymentGatewayError::DriverUnavailable { order_id: order.order_id, driver_id });
        };
        let won = orders::bind_driver(id, driver.id, &mut tx).await?;
        if !won {
            tx.rollback().await?;
            return Err(PaymentGatewayError::InvalidTransition {
                order_id: order.order_id,
                from: order.status,
                to: OrderStatus::OutForDelivery,
            });
        }
        drivers::set_status(driver.id, DriverStatus::OnDelivery, &mut tx).await?;
        let updated = orders::fetch_order_by_pk(id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::DatabaseError(format!("Order with row id {id} disappeared")))?;
        tx.commit().await?;
        debug!("🗃️ Driver {} bound to order {}", driver.id, updated.order_id);
        Ok(updated)
    }

    async fn cancel_order_with_compensation(&self, id: i64, from: OrderStatus) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let won = orders::cas_status(id, from, OrderStatus::Cancelled, &mut tx).await?;
        let order = orders::fetch_order_by_pk(id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::DatabaseError(format!("Order with row id {id} does not exist")))?;
        if !won {
            tx.rollback().await?;
            return Err(PaymentGatewayError::InvalidTransition {
                order_id: order.order_id,
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }
        checkout::restock_for_items(&order.line_items.0, &mut tx).await?;
        if let Some(code) = &order.discount_code {
            checkout::release_redemption(&order.store_id, code, &order.order_id, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order {} cancelled; inventory and discount usage compensated", order.order_id);
        Ok(order)
    }

    async fn fetch_driver(&self, driver_id: i64) -> Result<Option<Driver>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        drivers::fetch_driver(driver_id, &mut conn).await
    }

    async fn fetch_driver_for_user(&self, user_id: &str) -> Result<Option<Driver>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        drivers::fetch_driver_for_user(user_id, &mut conn).await
    }
}

impl CheckoutStore for SqliteDatabase {
    async fn fetch_store(&self, store_id: &str) -> Result<Option<Store>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        checkout::fetch_store(store_id, &mut conn).await
    }

    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        checkout::fetch_product(product_id, &mut conn).await
    }

    async fn fetch_option_stock(
        &self,
        product_id: &str,
        choices: &[String],
    ) -> Result<Vec<OptionStock>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        checkout::fetch_option_stock(product_id, choices, &mut conn).await
    }

    async fn fetch_discount(&self, store_id: &str, code: &str) -> Result<Option<Discount>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        checkout::fetch_discount(store_id, code, &mut conn).await
    }

    async fn count_customer_redemptions(
        &self,
        store_id: &str,
        code: &str,
        customer_id: &str,
    ) -> Result<i64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        checkout::count_customer_redemptions(store_id, code, customer_id, &mut conn).await
    }

    async fn count_customer_orders(&self, customer_id: &str) -> Result<i64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        checkout::count_customer_orders(customer_id, &mut conn).await
    }

    async fn is_store_operator(&self, store_id: &str, user_id: &str) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        checkout::is_store_operator(store_id, user_id, &mut conn).await
    }
}

/// Provisioning helpers used by operator tooling and tests. Catalog
/// management proper lives outside the gateway; these only seed the lookups
/// the engine itself needs.
impl SqliteDatabase {
    pub async fn upsert_store(&self, store: &Store) -> Result<(), PaymentGatewayError> {
        sqlx::query(
            r#"
                INSERT INTO stores (id, name, delivery_fee) VALUES ($1, $2, $3)
                ON CONFLICT (id) DO UPDATE SET name = excluded.name, delivery_fee = excluded.delivery_fee;
            "#,
        )
        .bind(&store.id)
        .bind(&store.name)
        .bind(store.delivery_fee)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_product(&self, product: &Product) -> Result<(), PaymentGatewayError> {
        sqlx::query(
            r#"
                INSERT INTO products (id, store_id, name, unit_price, quantity, unlimited_stock)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    store_id = excluded.store_id, name = excluded.name, unit_price = excluded.unit_price,
                    quantity = excluded.quantity, unlimited_stock = excluded.unlimited_stock;
            "#,
        )
        .bind(&product.id)
        .bind(&product.store_id)
        .bind(&product.name)
        .bind(product.unit_price)
        .bind(product.quantity)
        .bind(product.unlimited_stock)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_option_stock(&self, product_id: &str, stock: &OptionStock) -> Result<(), PaymentGatewayError> {
        sqlx::query(
            r#"
                INSERT INTO product_options (product_id, choice, quantity) VALUES ($1, $2, $3)
                ON CONFLICT (product_id, choice) DO UPDATE SET quantity = excluded.quantity;
            "#,
        )
        .bind(product_id)
        .bind(&stock.choice)
        .bind(stock.quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_discount(&self, discount: &Discount) -> Result<(), PaymentGatewayError> {
        sqlx::query(
            r#"
                INSERT INTO discounts (
                    code, store_id, kind, value, active, starts_at, ends_at, min_order_value,
                    usage_limit, usage_count, per_customer_limit, new_customers_only
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (store_id, code) DO UPDATE SET
                    kind = excluded.kind, value = excluded.value, active = excluded.active,
                    starts_at = excluded.starts_at, ends_at = excluded.ends_at,
                    min_order_value = excluded.min_order_value, usage_limit = excluded.usage_limit,
                    per_customer_limit = excluded.per_customer_limit,
                    new_customers_only = excluded.new_customers_only;
            "#,
        )
        .bind(&discount.code)
        .bind(&discount.store_id)
        .bind(discount.kind.to_string())
        .bind(discount.value)
        .bind(discount.active)
        .bind(discount.starts_at)
        .bind(discount.ends_at)
        .bind(discount.min_order_value)
        .bind(discount.usage_limit)
        .bind(discount.usage_count)
        .bind(discount.per_customer_limit)
        .bind(discount.new_customers_only)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_driver(&self, store_id: &str, user_id: &str, name: &str) -> Result<i64, PaymentGatewayError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO drivers (store_id, user_id, name) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(store_id)
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn set_driver_status(&self, driver_id: i64, status: DriverStatus) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        drivers::set_status(driver_id, status, &mut conn).await
    }

    pub async fn add_store_operator(&self, store_id: &str, user_id: &str) -> Result<(), PaymentGatewayError> {
        sqlx::query("INSERT OR IGNORE INTO store_staff (store_id, user_id) VALUES ($1, $2)")
            .bind(store_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
