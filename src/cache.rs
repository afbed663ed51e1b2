//! Bounded in-memory entity cache (design notes section 9): a cache
//! keyed by id, evicted by the Pointer Manager's `entitiesDeleted` set
//! plus an LRU bound, never allowed to grow unboundedly.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::entity::Entity;

struct Node {
    entity: Arc<Entity>,
}

/// A simple LRU cache. Not generic: the deploy path is the only caller,
/// so a dedicated `Entity` cache keeps the call sites readable.
pub struct EntityCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    map: HashMap<String, Node>,
    order: Vec<String>,
}

impl EntityCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Entity>> {
        let mut inner = self.inner.lock();
        let entity = inner.map.get(id).map(|n| n.entity.clone())?;
        touch(&mut inner, id);
        Some(entity)
    }

    pub fn insert(&self, entity: Entity) {
        let id = entity.id.clone();
        let mut inner = self.inner.lock();
        if inner.map.contains_key(&id) {
            inner.map.get_mut(&id).unwrap().entity = Arc::new(entity);
            touch(&mut inner, &id);
            return;
        }
        inner.order.push(id.clone());
        inner.map.insert(
            id,
            Node {
                entity: Arc::new(entity),
            },
        );
        evict_if_needed(&mut inner, self.capacity);
    }

    /// Evicts `id` immediately — used when the Pointer Manager reports it
    /// in `entitiesDeleted`, so a displaced entity does not linger as a
    /// stale cache hit.
    pub fn evict(&self, id: &str) {
        let mut inner = self.inner.lock();
        if inner.map.remove(id).is_some() {
            inner.order.retain(|k| k != id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn touch(inner: &mut Inner, id: &str) {
    if let Some(pos) = inner.order.iter().position(|k| k == id) {
        let key = inner.order.remove(pos);
        inner.order.push(key);
    }
}

fn evict_if_needed(inner: &mut Inner, capacity: usize) {
    while inner.map.len() > capacity {
        if inner.order.is_empty() {
            break;
        }
        let oldest = inner.order.remove(0);
        inner.map.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    fn entity(id: &str) -> Entity {
        Entity {
            id: id.to_string(),
            entity_type: EntityType::from("scene"),
            pointers: vec!["0,0".to_string()],
            timestamp: 1,
            content: Default::default(),
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn evicts_least_recently_used_beyond_capacity() {
        let cache = EntityCache::new(2);
        cache.insert(entity("E1"));
        cache.insert(entity("E2"));
        cache.insert(entity("E3"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("E1").is_none());
        assert!(cache.get("E2").is_some());
        assert!(cache.get("E3").is_some());
    }

    #[test]
    fn touching_an_entry_protects_it_from_eviction() {
        let cache = EntityCache::new(2);
        cache.insert(entity("E1"));
        cache.insert(entity("E2"));
        let _ = cache.get("E1"); // E1 is now more recent than E2
        cache.insert(entity("E3"));
        assert!(cache.get("E1").is_some());
        assert!(cache.get("E2").is_none());
    }

    #[test]
    fn explicit_eviction_on_displacement() {
        let cache = EntityCache::new(10);
        cache.insert(entity("E1"));
        cache.evict("E1");
        assert!(cache.get("E1").is_none());
    }
}
