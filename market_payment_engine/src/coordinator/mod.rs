//! The client-side payment session coordinator and its reconciliation poller.
//!
//! The external wallet SDK's nested callbacks and fixed timeout are reframed
//! here as one explicit finite state machine ([`session::PaymentSession`])
//! fed by a wallet event stream, with a read-only polling loop
//! ([`poller::ReconciliationPoller`]) as the fallback completion signal.

mod gateway;
pub mod poller;
pub mod session;

pub use gateway::PaymentGateway;
