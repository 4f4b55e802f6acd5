use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use galley_core::{AggregateId, RestaurantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    restaurant_id: RestaurantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Streams {
    events: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Creation order, with the stream's aggregate type.
    created: Vec<(StreamKey, String)>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single write lock makes each commit atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<Streams>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: Option<&Vec<StoredEvent>>) -> u64 {
        stream
            .and_then(|s| s.last())
            .map(|e| e.sequence_number)
            .unwrap_or(0)
    }

    fn validate_append(append: &StreamAppend) -> Result<(), EventStoreError> {
        for (idx, e) in append.events.iter().enumerate() {
            if e.restaurant_id != append.restaurant_id {
                return Err(EventStoreError::TenantIsolation(format!(
                    "event {idx} targets another restaurant"
                )));
            }
            if e.aggregate_id != append.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "event {idx} targets another aggregate"
                )));
            }
            if e.aggregate_type != append.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "event {idx} has aggregate_type '{}', stream append is '{}'",
                    e.aggregate_type, append.aggregate_type
                )));
            }
        }
        Ok(())
    }
}

impl EventStore for InMemoryEventStore {
    fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let appends: Vec<StreamAppend> = appends.into_iter().filter(|a| !a.events.is_empty()).collect();
        if appends.is_empty() {
            return Ok(vec![]);
        }

        let mut seen = HashSet::with_capacity(appends.len());
        for append in &appends {
            Self::validate_append(append)?;
            let key = StreamKey {
                restaurant_id: append.restaurant_id,
                aggregate_id: append.aggregate_id,
            };
            if !seen.insert(key) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "stream {} appears twice in one commit",
                    append.aggregate_id
                )));
            }
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        // Check every stream before touching any of them.
        for append in &appends {
            let key = StreamKey {
                restaurant_id: append.restaurant_id,
                aggregate_id: append.aggregate_id,
            };
            let stream = streams.events.get(&key);
            let current = Self::current_version(stream);

            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    append.aggregate_id, append.expected_version
                )));
            }

            if let Some(existing) = stream.and_then(|s| s.first()) {
                if existing.aggregate_type != append.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, append.aggregate_type
                    )));
                }
            }
        }

        let mut committed = Vec::new();
        for append in appends {
            let key = StreamKey {
                restaurant_id: append.restaurant_id,
                aggregate_id: append.aggregate_id,
            };
            if !streams.events.contains_key(&key) {
                streams.created.push((key, append.aggregate_type.clone()));
            }
            let stream = streams.events.entry(key).or_default();

            let mut next = Self::current_version(Some(&*stream)) + 1;
            for e in append.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    restaurant_id: e.restaurant_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        restaurant_id: RestaurantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            restaurant_id,
            aggregate_id,
        };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(streams.events.get(&key).cloned().unwrap_or_default())
    }

    fn list_streams(
        &self,
        restaurant_id: RestaurantId,
        aggregate_type: &str,
    ) -> Result<Vec<AggregateId>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(streams
            .created
            .iter()
            .filter(|(key, ty)| key.restaurant_id == restaurant_id && ty == aggregate_type)
            .map(|(key, _)| key.aggregate_id)
            .collect())
    }
}
