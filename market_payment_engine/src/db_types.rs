//! Data types shared between the database layer and the public engine APIs.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mpg_common::{CoinAmount, COIN_CURRENCY_CODE};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------      PaymentId       --------------------------------------------------------
/// The opaque payment identifier issued by the external wallet network. It is
/// the idempotency key for the entire completion flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PaymentId(pub String);

impl Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for PaymentId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl PaymentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        OrderId       --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Orders are keyed off the payment that created them, so the same
    /// completion replayed through any channel derives the same order id.
    pub fn for_payment(payment_id: &PaymentId) -> Self {
        Self(format!("ord-{}", payment_id.as_str()))
    }
}

//--------------------------------------    WalletAddress     --------------------------------------------------------
/// A lightweight wrapper around the string form of a wallet-network address.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct WalletAddress(pub String);

impl Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for WalletAddress {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

//--------------------------------------  PaymentIntentStatus -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentIntentStatus {
    /// The intent exists but the server has not yet approved the amount.
    Initiated,
    /// The server re-verified amount and metadata and approved the transfer.
    ServerApproved,
    /// The transfer landed on-chain and the order has been created.
    Completed,
    /// The user abandoned the payment from their wallet app.
    Cancelled,
    /// The wallet network reported a terminal failure, or the intent expired.
    Failed,
}

impl PaymentIntentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiated => write!(f, "Initiated"),
            Self::ServerApproved => write!(f, "ServerApproved"),
            Self::Completed => write!(f, "Completed"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for PaymentIntentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Initiated" => Ok(Self::Initiated),
            "ServerApproved" => Ok(Self::ServerApproved),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid payment intent status: {s}"))),
        }
    }
}

//--------------------------------------      LineItem        --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: CoinAmount,
    /// The option choices the customer selected, e.g. `size:large`.
    #[serde(default)]
    pub options: Vec<String>,
}

impl LineItem {
    pub fn line_total(&self) -> CoinAmount {
        self.unit_price * self.quantity
    }
}

//--------------------------------------   PaymentMetadata    --------------------------------------------------------
/// The signed metadata embedded in a payment on the wallet network. After
/// server approval this is the only pricing information trusted to create an
/// order; client-submitted copies are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub store_id: String,
    pub line_items: Vec<LineItem>,
    pub delivery_address: String,
    pub subtotal: CoinAmount,
    pub discount_code: Option<String>,
    pub discount: CoinAmount,
    pub delivery_fee: CoinAmount,
    pub total: CoinAmount,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   NewPaymentIntent   --------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub payment_id: PaymentId,
    pub customer_id: String,
    pub amount: CoinAmount,
    pub memo: Option<String>,
    pub metadata: PaymentMetadata,
}

impl NewPaymentIntent {
    pub fn new(payment_id: PaymentId, customer_id: String, amount: CoinAmount, metadata: PaymentMetadata) -> Self {
        Self { payment_id, customer_id, amount, memo: None, metadata }
    }

    pub fn with_memo(mut self, memo: String) -> Self {
        self.memo = Some(memo);
        self
    }
}

//--------------------------------------    PaymentIntent     --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentIntent {
    pub id: i64,
    pub payment_id: PaymentId,
    pub customer_id: String,
    pub amount: CoinAmount,
    pub memo: Option<String>,
    pub metadata: Json<PaymentMetadata>,
    pub status: PaymentIntentStatus,
    /// The transaction reference on the wallet network. Set on completion only.
    pub tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     OrderStatus      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Payment completed; the order exists and the store has been notified.
    Confirmed,
    /// The store operator has started preparing the order.
    Preparing,
    /// A driver has been dispatched with the order.
    OutForDelivery,
    /// The order reached the customer. Terminal.
    Delivered,
    /// The order was cancelled by the operator or by timeout policy. Terminal.
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed => write!(f, "Confirmed"),
            Self::Preparing => write!(f, "Preparing"),
            Self::OutForDelivery => write!(f, "OutForDelivery"),
            Self::Delivered => write!(f, "Delivered"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Confirmed" => Ok(Self::Confirmed),
            "Preparing" => Ok(Self::Preparing),
            "OutForDelivery" => Ok(Self::OutForDelivery),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        Order         --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub store_id: String,
    pub customer_id: String,
    pub line_items: Json<Vec<LineItem>>,
    pub delivery_address: String,
    pub subtotal: CoinAmount,
    pub discount: CoinAmount,
    pub discount_code: Option<String>,
    pub delivery_fee: CoinAmount,
    pub total_price: CoinAmount,
    pub currency: String,
    pub status: OrderStatus,
    pub driver_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder       --------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub store_id: String,
    pub customer_id: String,
    pub line_items: Vec<LineItem>,
    pub delivery_address: String,
    pub subtotal: CoinAmount,
    pub discount: CoinAmount,
    pub discount_code: Option<String>,
    pub delivery_fee: CoinAmount,
    pub total_price: CoinAmount,
    pub currency: String,
}

impl NewOrder {
    /// Build the order record for a completed payment from its server-approved
    /// metadata. The totals come straight from the metadata; they were
    /// recomputed at approval time and have not been client-editable since.
    pub fn from_metadata(payment_id: &PaymentId, customer_id: &str, metadata: &PaymentMetadata) -> Self {
        Self {
            order_id: OrderId::for_payment(payment_id),
            payment_id: payment_id.clone(),
            store_id: metadata.store_id.clone(),
            customer_id: customer_id.to_string(),
            line_items: metadata.line_items.clone(),
            delivery_address: metadata.delivery_address.clone(),
            subtotal: metadata.subtotal,
            discount: metadata.discount,
            discount_code: metadata.discount_code.clone(),
            delivery_fee: metadata.delivery_fee,
            total_price: metadata.total,
            currency: COIN_CURRENCY_CODE.to_string(),
        }
    }
}

//--------------------------------------       Discount       --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

impl Display for DiscountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Percentage => write!(f, "Percentage"),
            Self::Fixed => write!(f, "Fixed"),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Discount {
    pub code: String,
    pub store_id: String,
    pub kind: DiscountKind,
    /// Percent (0-100) for `Percentage`, subunits for `Fixed`.
    pub value: i64,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub min_order_value: CoinAmount,
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    pub per_customer_limit: Option<i64>,
    pub new_customers_only: bool,
}

//--------------------------------------        Store         --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Store {
    pub id: String,
    pub name: String,
    pub delivery_fee: CoinAmount,
}

//--------------------------------------       Product        --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Product {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub unit_price: CoinAmount,
    pub quantity: i64,
    /// Prepared-to-order items (e.g. restaurant food) never run out of stock.
    pub unlimited_stock: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct OptionStock {
    pub choice: String,
    pub quantity: i64,
}

//--------------------------------------        Driver        --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DriverStatus {
    Active,
    Inactive,
    OnDelivery,
}

impl Display for DriverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Inactive => write!(f, "Inactive"),
            Self::OnDelivery => write!(f, "OnDelivery"),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Driver {
    pub id: i64,
    pub store_id: String,
    pub user_id: String,
    pub name: String,
    pub status: DriverStatus,
}

//--------------------------------------      Cart types      --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    Ok,
    InsufficientStock,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartIssue {
    /// Index of the offending line in the submitted cart.
    pub line: usize,
    pub status: StockStatus,
    pub available: i64,
}

//--------------------------------------  DiscountRejection   --------------------------------------------------------
/// Why a discount code was refused at validation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountRejection {
    UnknownCode,
    Inactive,
    NotStarted,
    Expired,
    BelowMinimum(CoinAmount),
    UsageLimitReached,
    CustomerLimitReached,
    NewCustomersOnly,
}

impl Display for DiscountRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownCode => write!(f, "This code is not valid"),
            Self::Inactive => write!(f, "This code is no longer active"),
            Self::NotStarted => write!(f, "This code is not active yet"),
            Self::Expired => write!(f, "This code has expired"),
            Self::BelowMinimum(min) => write!(f, "This code requires a minimum order of {min}"),
            Self::UsageLimitReached => write!(f, "This code has been fully redeemed"),
            Self::CustomerLimitReached => write!(f, "You have already used this code"),
            Self::NewCustomersOnly => write!(f, "This code is for new customers only"),
        }
    }
}

//--------------------------------------         Role         --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Customer,
    StoreOperator,
    Driver,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "Customer"),
            Self::StoreOperator => write!(f, "StoreOperator"),
            Self::Driver => write!(f, "Driver"),
            Self::Admin => write!(f, "Admin"),
        }
    }
}
