//! Domain events and their distribution.
//!
//! - [`Event`]: the contract every aggregate event type implements.
//! - [`EventEnvelope`]: restaurant-scoped stream metadata around a payload.
//! - [`EventBus`]: publish/subscribe after commit (at-least-once, best effort).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, StreamRef};
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
