mod checkout_store;
mod errors;
mod order_management;
mod payment_gateway_database;
mod wallet_connector;

pub use checkout_store::CheckoutStore;
pub use errors::PaymentGatewayError;
pub use order_management::{OrderManagement, OrderQueryFilter};
pub use payment_gateway_database::{CompletionResult, InsertIntentResult, PaymentGatewayDatabase};
pub use wallet_connector::{PaymentRequest, Scope, WalletConnector, WalletError, WalletEvent, WalletSession};
