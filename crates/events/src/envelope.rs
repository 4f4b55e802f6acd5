use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use galley_core::{AggregateId, RestaurantId};

/// Identity of one event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRef {
    pub restaurant_id: RestaurantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
}

impl StreamRef {
    pub fn new(
        restaurant_id: RestaurantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
    ) -> Self {
        Self {
            restaurant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
        }
    }
}

/// A committed event as seen by bus consumers.
///
/// Carries enough metadata to route, order and deduplicate without touching
/// the payload: `event_id` is unique, `sequence_number` increases by one per
/// stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    stream: StreamRef,
    sequence_number: u64,
    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        stream: StreamRef,
        sequence_number: u64,
        event_type: impl Into<String>,
        event_version: u32,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            stream,
            sequence_number,
            event_type: event_type.into(),
            event_version,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn stream(&self) -> &StreamRef {
        &self.stream
    }

    pub fn restaurant_id(&self) -> RestaurantId {
        self.stream.restaurant_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.stream.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.stream.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
