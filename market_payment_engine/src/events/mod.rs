//! Stateless async pub-sub for gateway events.
//!
//! Components that need to react to order lifecycle changes (the push
//! notification registrar, audit sinks) register hooks here. Handlers only
//! receive the event itself; they have no access to engine internals.

mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::{OrderPaidEvent, OrderStatusChangedEvent};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
