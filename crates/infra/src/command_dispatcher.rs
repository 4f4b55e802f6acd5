//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (restaurant-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Stage events in a transaction (one or more streams)
//!   ↓
//! 5. Commit atomically (optimistic version check per stream)
//!   ↓
//! 6. Publish committed envelopes to the bus (soft failure)
//! ```
//!
//! Single-aggregate commands go through [`CommandDispatcher::dispatch`].
//! Multi-aggregate operations (receiving, payments, sale deduction) open a
//! [`Transaction`], execute against several [`Tracked`] aggregates and commit
//! them together.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use core::ops::Deref;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use galley_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, RestaurantId};
use galley_events::{EventBus, EventEnvelope};
use rust_decimal::Decimal;

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Domain validation failure (deterministic).
    #[error("validation failed: {0}")]
    Validation(String),
    /// Domain invariant failure (deterministic).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Business-state conflict (duplicate, wrong status).
    #[error("conflict: {0}")]
    Conflict(String),
    /// Optimistic concurrency failure (stale stream version).
    #[error("concurrent modification: {0}")]
    Concurrency(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: Decimal, available: Decimal },
    /// Restaurant isolation violation (cross-restaurant or cross-aggregate stream mixing).
    #[error("restaurant isolation violation: {0}")]
    TenantIsolation(String),
    /// Historical payload did not deserialize into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::NotFound(what) => DispatchError::NotFound(what),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::InsufficientStock { requested, available } => {
                DispatchError::InsufficientStock { requested, available }
            }
        }
    }
}

/// A rehydrated aggregate together with the stream version it was loaded at.
#[derive(Debug, Clone)]
pub struct Tracked<A> {
    aggregate_id: AggregateId,
    loaded_version: u64,
    aggregate: A,
}

impl<A> Tracked<A> {
    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Stream version at load time (0 = stream did not exist).
    pub fn loaded_version(&self) -> u64 {
        self.loaded_version
    }

    pub fn into_inner(self) -> A {
        self.aggregate
    }
}

impl<A> Deref for Tracked<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.aggregate
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// - `S`: event store implementation
/// - `B`: event bus receiving committed envelopes
///
/// Events are published only after the store accepted the commit. A publish
/// failure is logged and does not undo the commit (at-least-once consumers
/// catch up from the store).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate one aggregate.
    ///
    /// `make_aggregate` builds the empty instance (e.g. `Ingredient::empty`).
    pub fn load<A>(
        &self,
        restaurant_id: RestaurantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Tracked<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(restaurant_id, aggregate_id)?;
        validate_loaded_stream(restaurant_id, aggregate_id, A::AGGREGATE_TYPE, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        Ok(Tracked {
            aggregate_id,
            loaded_version: stream_version(&history),
            aggregate,
        })
    }

    /// Ids of every `A` stream in the restaurant, in creation order.
    pub fn list<A: Aggregate>(&self, restaurant_id: RestaurantId) -> Result<Vec<AggregateId>, DispatchError> {
        Ok(self.store.list_streams(restaurant_id, A::AGGREGATE_TYPE)?)
    }

    /// Open a transaction scoped to one restaurant.
    pub fn begin(&self, restaurant_id: RestaurantId) -> Transaction<'_, S, B> {
        Transaction {
            dispatcher: self,
            restaurant_id,
            pending: Vec::new(),
        }
    }

    /// Dispatch a command against a single aggregate and commit it.
    ///
    /// Returns the aggregate state after the command. A command that decides
    /// no events commits nothing.
    pub fn dispatch<A>(
        &self,
        restaurant_id: RestaurantId,
        aggregate_id: AggregateId,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: galley_events::Event + Serialize + DeserializeOwned,
    {
        let mut tx = self.begin(restaurant_id);
        let mut tracked = tx.load(aggregate_id, make_aggregate)?;
        tx.execute(&mut tracked, command)?;
        tx.commit()?;
        Ok(tracked.into_inner())
    }

    fn publish(&self, committed: &[StoredEvent]) {
        for stored in committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    event_id = %stored.event_id,
                    event_type = %stored.event_type,
                    error = ?err,
                    "event publication failed after commit"
                );
            }
        }
    }
}

/// Staged writes across one or more streams of a restaurant.
///
/// Nothing reaches the store until [`Transaction::commit`]. Dropping a
/// transaction discards its staged events.
pub struct Transaction<'d, S, B> {
    dispatcher: &'d CommandDispatcher<S, B>,
    restaurant_id: RestaurantId,
    pending: Vec<StreamAppend>,
}

impl<'d, S, B> Transaction<'d, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn restaurant_id(&self) -> RestaurantId {
        self.restaurant_id
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Tracked<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        self.dispatcher.load(self.restaurant_id, aggregate_id, make_aggregate)
    }

    /// Decide, evolve and stage.
    ///
    /// On error the tracked aggregate and the staged events are unchanged.
    pub fn execute<A>(
        &mut self,
        tracked: &mut Tracked<A>,
        command: &A::Command,
    ) -> Result<Vec<A::Event>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: galley_events::Event + Serialize,
    {
        let decided = tracked.aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(decided);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    self.restaurant_id,
                    tracked.aggregate_id,
                    A::AGGREGATE_TYPE,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        for ev in &decided {
            tracked.aggregate.apply(ev);
        }

        match self
            .pending
            .iter_mut()
            .find(|p| p.aggregate_id == tracked.aggregate_id)
        {
            Some(existing) => existing.events.extend(uncommitted),
            None => self.pending.push(StreamAppend {
                restaurant_id: self.restaurant_id,
                aggregate_id: tracked.aggregate_id,
                aggregate_type: A::AGGREGATE_TYPE.to_string(),
                expected_version: ExpectedVersion::Exact(tracked.loaded_version),
                events: uncommitted,
            }),
        }

        Ok(decided)
    }

    /// Commit every staged stream atomically, then publish.
    pub fn commit(self) -> Result<Vec<StoredEvent>, DispatchError> {
        if self.pending.is_empty() {
            return Ok(vec![]);
        }

        let streams = self.pending.len();
        let committed = self.dispatcher.store.commit(self.pending)?;
        tracing::debug!(
            restaurant_id = %self.restaurant_id,
            streams,
            events = committed.len(),
            "transaction committed"
        );

        self.dispatcher.publish(&committed);
        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    restaurant_id: RestaurantId,
    aggregate_id: AggregateId,
    aggregate_type: &str,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce isolation even if a buggy backend returns foreign data.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.restaurant_id != restaurant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong restaurant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.aggregate_type != aggregate_type {
            return Err(DispatchError::Store(EventStoreError::AggregateTypeMismatch(format!(
                "stream {aggregate_id} is '{}', expected '{aggregate_type}'",
                e.aggregate_type
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
