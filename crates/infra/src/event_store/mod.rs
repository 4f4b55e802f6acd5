//! Append-only event store boundary.
//!
//! Streams are keyed by `(restaurant_id, aggregate_id)`. A commit may touch
//! several streams; it either lands on all of them or on none.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
