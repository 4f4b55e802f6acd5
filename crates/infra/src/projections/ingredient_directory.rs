use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use galley_core::{Aggregate, AggregateId, RestaurantId};
use galley_events::EventEnvelope;
use galley_inventory::{Ingredient, IngredientEvent, IngredientId, name_key};

use crate::read_model::RestaurantStore;

/// Queryable ingredient read model: current stock and valuation per ingredient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientSummary {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub base_unit: String,
    pub current_stock: Decimal,
    pub packages: Decimal,
    pub cost_per_unit: Decimal,
    pub reorder_level: Option<Decimal>,
}

impl IngredientSummary {
    pub fn is_low_stock(&self) -> bool {
        self.reorder_level.is_some_and(|level| self.current_stock <= level)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    restaurant_id: RestaurantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum IngredientDirectoryError {
    #[error("failed to deserialize ingredient event: {0}")]
    Deserialize(String),

    #[error("restaurant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Ingredient directory projection.
///
/// Consumes published envelopes and keeps a per-restaurant list of ingredients.
/// Envelopes of other aggregate types are ignored. Replays at or below the
/// stream cursor are ignored too, so at-least-once delivery is safe.
#[derive(Debug)]
pub struct IngredientDirectory<S>
where
    S: RestaurantStore<IngredientId, IngredientSummary>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> IngredientDirectory<S>
where
    S: RestaurantStore<IngredientId, IngredientSummary>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, restaurant_id: RestaurantId, ingredient_id: &IngredientId) -> Option<IngredientSummary> {
        self.store.get(restaurant_id, ingredient_id)
    }

    /// All ingredients of a restaurant, ordered by name (case-insensitive).
    pub fn list(&self, restaurant_id: RestaurantId) -> Vec<IngredientSummary> {
        let mut all = self.store.list(restaurant_id);
        all.sort_by(|a, b| name_key(&a.name).cmp(&name_key(&b.name)));
        all
    }

    pub fn find_by_name(&self, restaurant_id: RestaurantId, name: &str) -> Option<IngredientSummary> {
        let key = name_key(name);
        self.store
            .list(restaurant_id)
            .into_iter()
            .find(|s| name_key(&s.name) == key)
    }

    pub fn low_stock(&self, restaurant_id: RestaurantId) -> Vec<IngredientSummary> {
        self.list(restaurant_id)
            .into_iter()
            .filter(IngredientSummary::is_low_stock)
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), IngredientDirectoryError> {
        if envelope.aggregate_type() != Ingredient::AGGREGATE_TYPE {
            return Ok(());
        }

        let restaurant_id = envelope.restaurant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let Ok(mut cursors) = self.cursors.write() else {
            return Ok(());
        };
        let key = CursorKey {
            restaurant_id,
            aggregate_id,
        };
        let last = cursors.get(&key).copied().unwrap_or(0);

        if seq == 0 {
            return Err(IngredientDirectoryError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate or replay.
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(IngredientDirectoryError::NonMonotonicSequence { last, found: seq });
        }

        let event: IngredientEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| IngredientDirectoryError::Deserialize(e.to_string()))?;

        let (event_restaurant, ingredient_id) = match &event {
            IngredientEvent::IngredientCreated(e) => (e.restaurant_id, e.ingredient_id),
            IngredientEvent::StockReceived(e) => (e.restaurant_id, e.ingredient_id),
            IngredientEvent::StockDeducted(e) => (e.restaurant_id, e.ingredient_id),
            IngredientEvent::ReorderLevelSet(e) => (e.restaurant_id, e.ingredient_id),
        };
        if event_restaurant != restaurant_id {
            return Err(IngredientDirectoryError::TenantIsolation(
                "event restaurant_id does not match envelope restaurant_id".to_string(),
            ));
        }
        if ingredient_id.0 != aggregate_id {
            return Err(IngredientDirectoryError::TenantIsolation(
                "event ingredient_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let mut summary = self
            .store
            .get(restaurant_id, &ingredient_id)
            .unwrap_or(IngredientSummary {
                ingredient_id,
                name: String::new(),
                base_unit: String::new(),
                current_stock: Decimal::ZERO,
                packages: Decimal::ZERO,
                cost_per_unit: Decimal::ZERO,
                reorder_level: None,
            });

        match event {
            IngredientEvent::IngredientCreated(e) => {
                summary.name = e.name;
                summary.base_unit = e.base_unit;
                summary.reorder_level = e.reorder_level;
            }
            IngredientEvent::StockReceived(e) => {
                summary.current_stock = e.stock_after;
                summary.packages = e.packages_after;
                summary.cost_per_unit = e.cost_per_unit_after;
            }
            IngredientEvent::StockDeducted(e) => {
                summary.current_stock = e.stock_after;
            }
            IngredientEvent::ReorderLevelSet(e) => {
                summary.reorder_level = e.reorder_level;
            }
        }
        self.store.upsert(restaurant_id, ingredient_id, summary);

        cursors.insert(key, seq);
        Ok(())
    }

    /// Rebuild from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), IngredientDirectoryError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut restaurants = envs.iter().map(|e| e.restaurant_id()).collect::<Vec<_>>();
        restaurants.sort();
        restaurants.dedup();
        for r in restaurants {
            self.store.clear_restaurant(r);
        }

        // Deterministic replay order: restaurant, aggregate, sequence.
        envs.sort_by_key(|e| (e.restaurant_id(), e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryRestaurantStore;
    use chrono::Utc;
    use galley_inventory::{IngredientCreated, StockReceived, StockSource};
    use galley_events::StreamRef;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn envelope(restaurant_id: RestaurantId, id: IngredientId, seq: u64, event: IngredientEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            StreamRef::new(restaurant_id, id.0, Ingredient::AGGREGATE_TYPE),
            seq,
            "test",
            1,
            Utc::now(),
            serde_json::to_value(event).unwrap(),
        )
    }

    fn created(restaurant_id: RestaurantId, id: IngredientId, name: &str) -> IngredientEvent {
        IngredientEvent::IngredientCreated(IngredientCreated {
            restaurant_id,
            ingredient_id: id,
            name: name.to_string(),
            base_unit: "kg".to_string(),
            reorder_level: Some(dec!(10)),
            occurred_at: Utc::now(),
        })
    }

    fn received(restaurant_id: RestaurantId, id: IngredientId, stock_after: Decimal) -> IngredientEvent {
        IngredientEvent::StockReceived(StockReceived {
            restaurant_id,
            ingredient_id: id,
            quantity: stock_after,
            packages: dec!(1),
            unit_cost: dec!(2),
            source: StockSource::Manual,
            stock_after,
            packages_after: dec!(1),
            cost_per_unit_after: dec!(2),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn tracks_stock_and_ignores_replays() {
        let dir = IngredientDirectory::new(InMemoryRestaurantStore::new());
        let r = RestaurantId::new();
        let id = IngredientId::new(AggregateId::new());

        dir.apply_envelope(&envelope(r, id, 1, created(r, id, "Flour"))).unwrap();
        assert!(dir.get(r, &id).unwrap().is_low_stock());

        let second = envelope(r, id, 2, received(r, id, dec!(50)));
        dir.apply_envelope(&second).unwrap();
        dir.apply_envelope(&second).unwrap();

        let s = dir.get(r, &id).unwrap();
        assert_eq!(s.current_stock, dec!(50));
        assert!(!s.is_low_stock());
        assert_eq!(dir.find_by_name(r, "  FLOUR ").unwrap().ingredient_id, id);
        assert!(dir.find_by_name(RestaurantId::new(), "flour").is_none());
    }

    #[test]
    fn gaps_are_rejected_and_rebuild_restores_state() {
        let dir = IngredientDirectory::new(InMemoryRestaurantStore::new());
        let r = RestaurantId::new();
        let id = IngredientId::new(AggregateId::new());

        let envs = vec![
            envelope(r, id, 2, received(r, id, dec!(5))),
            envelope(r, id, 1, created(r, id, "Sugar")),
        ];
        dir.apply_envelope(&envs[1]).unwrap();
        assert!(matches!(
            dir.apply_envelope(&envelope(r, id, 3, received(r, id, dec!(9)))),
            Err(IngredientDirectoryError::NonMonotonicSequence { last: 1, found: 3 })
        ));

        dir.rebuild_from_scratch(envs).unwrap();
        assert_eq!(dir.list(r).len(), 1);
        assert_eq!(dir.get(r, &id).unwrap().current_stock, dec!(5));
    }
}
