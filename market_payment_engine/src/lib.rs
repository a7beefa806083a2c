//! Marketplace Payment Engine
//!
//! The core of a marketplace that settles through an external
//! cryptocurrency-wallet payment network. The engine is provider-agnostic:
//! the wallet network is consumed through the [`traits::WalletConnector`]
//! seam and the storage backend through the database traits in [`traits`].
//!
//! The library is divided into four main sections:
//! 1. Database management ([`mod@db`]). SQLite is the supported backend. You
//!    should never need to touch the database directly; go through the public
//!    APIs instead. The data types are public in [`db_types`].
//! 2. The engine public API ([`mod@mpe_api`]): checkout-time inventory and
//!    discount validation, the server side of the payment flow (approval,
//!    authoritative completion, cancellation), and the order fulfilment state
//!    machine with driver dispatch.
//! 3. The client-side payment session coordinator ([`coordinator`]): an
//!    explicit state machine over the wallet SDK's event stream, with a
//!    read-only reconciliation poller as the fallback completion signal.
//! 4. Events ([`events`]): a small hook system for reacting to order-paid and
//!    order-status-changed events, e.g. to feed the push notification
//!    registrar.

mod db;

pub mod coordinator;
pub mod db_types;
pub mod events;
mod mpe_api;
pub mod traits;

pub use db::sqlite::SqliteDatabase;
pub use mpe_api::{
    checkout_api::{resolve_discount, CartValidation, CheckoutApi, DiscountValidation, PricedCart},
    order_flow_api::{Actor, OrderFlowApi},
    payment_flow_api::{PaymentFlowApi, PaymentStatus},
};
