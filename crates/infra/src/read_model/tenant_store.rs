use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use galley_core::RestaurantId;
use std::sync::Arc;

/// Restaurant-isolated key/value store abstraction for disposable read models.
pub trait RestaurantStore<K, V>: Send + Sync {
    fn get(&self, restaurant_id: RestaurantId, key: &K) -> Option<V>;
    fn upsert(&self, restaurant_id: RestaurantId, key: K, value: V);
    fn list(&self, restaurant_id: RestaurantId) -> Vec<V>;
    /// Clear all read-model records for a restaurant (rebuild support).
    fn clear_restaurant(&self, restaurant_id: RestaurantId);
}

impl<K, V, S> RestaurantStore<K, V> for Arc<S>
where
    S: RestaurantStore<K, V> + ?Sized,
{
    fn get(&self, restaurant_id: RestaurantId, key: &K) -> Option<V> {
        (**self).get(restaurant_id, key)
    }

    fn upsert(&self, restaurant_id: RestaurantId, key: K, value: V) {
        (**self).upsert(restaurant_id, key, value)
    }

    fn list(&self, restaurant_id: RestaurantId) -> Vec<V> {
        (**self).list(restaurant_id)
    }

    fn clear_restaurant(&self, restaurant_id: RestaurantId) {
        (**self).clear_restaurant(restaurant_id)
    }
}

/// In-memory restaurant-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryRestaurantStore<K, V> {
    inner: RwLock<HashMap<(RestaurantId, K), V>>,
}

impl<K, V> InMemoryRestaurantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryRestaurantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> RestaurantStore<K, V> for InMemoryRestaurantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, restaurant_id: RestaurantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(restaurant_id, key.clone())).cloned()
    }

    fn upsert(&self, restaurant_id: RestaurantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((restaurant_id, key), value);
        }
    }

    fn list(&self, restaurant_id: RestaurantId) -> Vec<V> {
        let Ok(map) = self.inner.read() else {
            return vec![];
        };

        map.iter()
            .filter(|((r, _), _)| *r == restaurant_id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn clear_restaurant(&self, restaurant_id: RestaurantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(r, _), _| *r != restaurant_id);
        }
    }
}
