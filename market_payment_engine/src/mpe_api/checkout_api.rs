use chrono::Utc;
use log::debug;
use mpg_common::CoinAmount;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CartIssue, CartLine, Discount, DiscountKind, DiscountRejection, LineItem, PaymentMetadata, Product, StockStatus},
    traits::{CheckoutStore, PaymentGatewayError},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartValidation {
    pub valid: bool,
    pub issues: Vec<CartIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountValidation {
    pub is_valid: bool,
    pub reason: Option<DiscountRejection>,
    pub discount: Option<CoinAmount>,
}

impl DiscountValidation {
    fn rejected(reason: DiscountRejection) -> Self {
        Self { is_valid: false, reason: Some(reason), discount: None }
    }
}

/// A cart that has been re-priced server-side. All amounts come from the
/// product catalog and store configuration, never from the client.
#[derive(Debug, Clone)]
pub struct PricedCart {
    pub store_id: String,
    pub line_items: Vec<LineItem>,
    pub delivery_address: String,
    pub subtotal: CoinAmount,
    pub discount_code: Option<String>,
    pub discount: CoinAmount,
    pub delivery_fee: CoinAmount,
    pub total: CoinAmount,
}

impl PricedCart {
    /// The metadata embedded in the payment on the wallet network.
    pub fn to_metadata(&self) -> PaymentMetadata {
        PaymentMetadata {
            store_id: self.store_id.clone(),
            line_items: self.line_items.clone(),
            delivery_address: self.delivery_address.clone(),
            subtotal: self.subtotal,
            discount_code: self.discount_code.clone(),
            discount: self.discount,
            delivery_fee: self.delivery_fee,
            total: self.total,
            created_at: Utc::now(),
        }
    }
}

/// Resolves the discount amount a code is worth against a subtotal. The
/// result is capped at the subtotal so an over-generous fixed discount can
/// never produce a negative total.
pub fn resolve_discount(discount: &Discount, subtotal: CoinAmount) -> CoinAmount {
    let resolved = match discount.kind {
        DiscountKind::Percentage => subtotal.percent(discount.value),
        DiscountKind::Fixed => CoinAmount::from(discount.value),
    };
    resolved.min(subtotal)
}

/// Checkout-time inventory and discount validation.
///
/// Everything here is read-only and is called reactively as the customer
/// edits their cart; the same pricing path runs again at payment approval so
/// the charged amount always agrees with what was validated.
pub struct CheckoutApi<B> {
    db: B,
}

impl<B> CheckoutApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CheckoutApi<B>
where B: CheckoutStore
{
    /// Checks every cart line against remaining stock. Products in
    /// unlimited-stock categories (prepared food and the like) always pass;
    /// otherwise availability is the minimum remaining quantity across the
    /// selected option choices, or the product's own quantity if no option
    /// constrains it.
    pub async fn validate_cart(&self, lines: &[CartLine]) -> Result<CartValidation, PaymentGatewayError> {
        let mut issues = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            match self.db.fetch_product(&line.product_id).await? {
                None => issues.push(CartIssue { line: i, status: StockStatus::Unavailable, available: 0 }),
                Some(p) if p.unlimited_stock => {},
                Some(p) => match self.line_availability(&p, line).await? {
                    None => issues.push(CartIssue { line: i, status: StockStatus::Unavailable, available: 0 }),
                    Some(available) if available < line.quantity => {
                        issues.push(CartIssue { line: i, status: StockStatus::InsufficientStock, available })
                    },
                    Some(_) => {},
                },
            }
        }
        Ok(CartValidation { valid: issues.is_empty(), issues })
    }

    /// Availability for one line, or `None` if a selected choice does not
    /// exist for the product.
    async fn line_availability(&self, product: &Product, line: &CartLine) -> Result<Option<i64>, PaymentGatewayError> {
        if line.options.is_empty() {
            return Ok(Some(product.quantity));
        }
        let stock = self.db.fetch_option_stock(&product.id, &line.options).await?;
        if stock.len() < line.options.len() {
            return Ok(None);
        }
        Ok(stock.iter().map(|s| s.quantity).min())
    }

    /// Validates a discount code for a customer and order total. Read-only;
    /// usage counters are only touched when an order is actually created.
    pub async fn validate_discount(
        &self,
        store_id: &str,
        code: &str,
        customer_id: &str,
        order_total: CoinAmount,
    ) -> Result<DiscountValidation, PaymentGatewayError> {
        let Some(discount) = self.db.fetch_discount(store_id, code).await? else {
            return Ok(DiscountValidation::rejected(DiscountRejection::UnknownCode));
        };
        if !discount.active {
            return Ok(DiscountValidation::rejected(DiscountRejection::Inactive));
        }
        let now = Utc::now();
        if let Some(starts_at) = discount.starts_at {
            if now < starts_at {
                return Ok(DiscountValidation::rejected(DiscountRejection::NotStarted));
            }
        }
        if let Some(ends_at) = discount.ends_at {
            if now > ends_at {
                return Ok(DiscountValidation::rejected(DiscountRejection::Expired));
            }
        }
        if order_total < discount.min_order_value {
            return Ok(DiscountValidation::rejected(DiscountRejection::BelowMinimum(discount.min_order_value)));
        }
        if let Some(limit) = discount.usage_limit {
            if discount.usage_count >= limit {
                return Ok(DiscountValidation::rejected(DiscountRejection::UsageLimitReached));
            }
        }
        if let Some(limit) = discount.per_customer_limit {
            let used = self.db.count_customer_redemptions(store_id, code, customer_id).await?;
            if used >= limit {
                return Ok(DiscountValidation::rejected(DiscountRejection::CustomerLimitReached));
            }
        }
        if discount.new_customers_only && self.db.count_customer_orders(customer_id).await? > 0 {
            return Ok(DiscountValidation::rejected(DiscountRejection::NewCustomersOnly));
        }
        let resolved = resolve_discount(&discount, order_total);
        Ok(DiscountValidation { is_valid: true, reason: None, discount: Some(resolved) })
    }

    /// Prices a cart entirely from server-side data. This is the only path
    /// that produces the totals a payment may be approved against.
    pub async fn price_cart(
        &self,
        store_id: &str,
        customer_id: &str,
        lines: &[CartLine],
        discount_code: Option<&str>,
        delivery_address: &str,
    ) -> Result<PricedCart, PaymentGatewayError> {
        let validation = self.validate_cart(lines).await?;
        if !validation.valid {
            return Err(PaymentGatewayError::InventoryConflict(validation.issues));
        }
        let store = self
            .db
            .fetch_store(store_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::StoreNotFound(store_id.to_string()))?;
        let mut line_items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .db
                .fetch_product(&line.product_id)
                .await?
                .filter(|p| p.store_id == store.id)
                .ok_or_else(|| PaymentGatewayError::ProductNotFound(line.product_id.clone()))?;
            line_items.push(LineItem {
                product_id: product.id,
                quantity: line.quantity,
                unit_price: product.unit_price,
                options: line.options.clone(),
            });
        }
        let subtotal: CoinAmount = line_items.iter().map(LineItem::line_total).sum();
        let discount = match discount_code {
            None => CoinAmount::from(0),
            Some(code) => {
                let validation = self.validate_discount(store_id, code, customer_id, subtotal).await?;
                match validation {
                    DiscountValidation { is_valid: true, discount: Some(d), .. } => d,
                    DiscountValidation { reason, .. } => {
                        return Err(PaymentGatewayError::DiscountInvalid(
                            reason.unwrap_or(DiscountRejection::UnknownCode),
                        ))
                    },
                }
            },
        };
        let total = subtotal - discount + store.delivery_fee;
        debug!(
            "🛒️ Cart priced for store {store_id}: subtotal {subtotal}, discount {discount}, delivery {}, total \
             {total}",
            store.delivery_fee
        );
        Ok(PricedCart {
            store_id: store.id,
            line_items,
            delivery_address: delivery_address.to_string(),
            subtotal,
            discount_code: discount_code.map(String::from),
            discount,
            delivery_fee: store.delivery_fee,
            total,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn discount(kind: DiscountKind, value: i64) -> Discount {
        Discount {
            code: "SAVE".to_string(),
            store_id: "store-1".to_string(),
            kind,
            value,
            active: true,
            starts_at: None,
            ends_at: None,
            min_order_value: CoinAmount::from(0),
            usage_limit: None,
            usage_count: 0,
            per_customer_limit: None,
            new_customers_only: false,
        }
    }

    #[test]
    fn fixed_discount_is_capped_at_the_subtotal() {
        // subtotal 10.0000000, fixed discount 15.0000000 -> resolved 10.0000000
        let d = discount(DiscountKind::Fixed, CoinAmount::from_coins(15).value());
        let subtotal = CoinAmount::from_coins(10);
        assert_eq!(resolve_discount(&d, subtotal), subtotal);
    }

    #[test]
    fn fixed_discount_below_subtotal_is_taken_at_face_value() {
        let d = discount(DiscountKind::Fixed, CoinAmount::from_coins(3).value());
        assert_eq!(resolve_discount(&d, CoinAmount::from_coins(10)), CoinAmount::from_coins(3));
    }

    #[test]
    fn percentage_discount_resolves_against_the_subtotal() {
        // 20% of 50.0000000 -> 10.0000000
        let d = discount(DiscountKind::Percentage, 20);
        assert_eq!(resolve_discount(&d, CoinAmount::from_coins(50)), CoinAmount::from_coins(10));
    }

    #[test]
    fn hundred_percent_discount_never_goes_negative() {
        let d = discount(DiscountKind::Percentage, 100);
        let subtotal = CoinAmount::from_coins(7);
        assert_eq!(resolve_discount(&d, subtotal), subtotal);
    }
}
