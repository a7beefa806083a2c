use crate::{
    db_types::{Discount, OptionStock, Product, Store},
    traits::PaymentGatewayError,
};

/// Read-only lookups used by checkout-time validation and server-side
/// re-pricing. Everything here is safe to call repeatedly while the customer
/// edits their cart.
#[allow(async_fn_in_trait)]
pub trait CheckoutStore: Clone {
    async fn fetch_store(&self, store_id: &str) -> Result<Option<Store>, PaymentGatewayError>;

    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>, PaymentGatewayError>;

    /// Remaining stock for the given option choices of a product. Choices
    /// with no stock row are absent from the result.
    async fn fetch_option_stock(
        &self,
        product_id: &str,
        choices: &[String],
    ) -> Result<Vec<OptionStock>, PaymentGatewayError>;

    async fn fetch_discount(&self, store_id: &str, code: &str) -> Result<Option<Discount>, PaymentGatewayError>;

    /// Confirmed redemptions of a code by one customer.
    async fn count_customer_redemptions(
        &self,
        store_id: &str,
        code: &str,
        customer_id: &str,
    ) -> Result<i64, PaymentGatewayError>;

    /// Orders this customer has ever placed, for the new-customer check.
    async fn count_customer_orders(&self, customer_id: &str) -> Result<i64, PaymentGatewayError>;

    async fn is_store_operator(&self, store_id: &str, user_id: &str) -> Result<bool, PaymentGatewayError>;
}
