//! Infrastructure layer: event store, command dispatch, row locks, read models
//! and configuration.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod locks;
pub mod projections;
pub mod read_model;

pub use command_dispatcher::{CommandDispatcher, DispatchError, Tracked, Transaction};
pub use self::config::{ProcurementSettings, SupplierLinkSettings};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, StreamAppend};
pub use locks::{LockError, LockKey, RowLockGuard, RowLocks};
