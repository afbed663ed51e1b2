//! C6 — History Manager.
//!
//! Append-only event ledger, ordered by `(timestamp, entityId)` (spec
//! section 4.3). History Manager exclusively owns the ledger (spec
//! section 3, Ownership).

use std::collections::{BTreeMap, HashSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub server_name: String,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub timestamp: i64,
}

#[derive(Default)]
struct Ledger {
    // Keyed by `(timestamp, entityId)` so iteration order is the total
    // order required by invariant (a).
    by_order: BTreeMap<(i64, String), HistoryEvent>,
    seen_ids: HashSet<String>,
}

/// A fixed bound beyond which no out-of-order event may alter pointer
/// state (spec section 3). Ten minutes, matching the spec's example.
pub const DEFAULT_IMMUTABLE_DELTA_MS: i64 = 10 * 60 * 1000;

pub struct HistoryManager {
    ledger: RwLock<Ledger>,
    immutable_delta_ms: i64,
}

impl HistoryManager {
    pub fn new(immutable_delta_ms: i64) -> Self {
        Self {
            ledger: RwLock::new(Ledger::default()),
            immutable_delta_ms,
        }
    }

    /// Appends `event`. Idempotent on `entityId`: a duplicate is silently
    /// ignored and `false` is returned so callers (the deploy path) can
    /// tell whether a *new* history entry was actually created (testable
    /// property 4: re-deploying must not create a new history event).
    pub fn append(&self, event: HistoryEvent) -> bool {
        let mut ledger = self.ledger.write();
        if ledger.seen_ids.contains(&event.entity_id) {
            return false;
        }
        ledger.seen_ids.insert(event.entity_id.clone());
        ledger
            .by_order
            .insert((event.timestamp, event.entity_id.clone()), event);
        true
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.ledger.read().seen_ids.contains(entity_id)
    }

    pub fn len(&self) -> usize {
        self.ledger.read().by_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns events in `(timestamp, entityId)` order, optionally
    /// filtered by an inclusive `[from, to]` timestamp range and/or
    /// originating server name.
    pub fn get_history(
        &self,
        from: Option<i64>,
        to: Option<i64>,
        server_name: Option<&str>,
    ) -> Vec<HistoryEvent> {
        self.ledger
            .read()
            .by_order
            .values()
            .filter(|e| from.map(|f| e.timestamp >= f).unwrap_or(true))
            .filter(|e| to.map(|t| e.timestamp <= t).unwrap_or(true))
            .filter(|e| server_name.map(|s| e.server_name == s).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// The greatest `T` such that `T + delta <= now`: history at or below
    /// this watermark is declared final (spec section 3/4.3).
    pub fn immutable_time(&self, now_ms: i64) -> i64 {
        now_ms - self.immutable_delta_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(server: &str, id: &str, ts: i64) -> HistoryEvent {
        HistoryEvent {
            server_name: server.to_string(),
            entity_id: id.to_string(),
            entity_type: EntityType::from("scene"),
            timestamp: ts,
        }
    }

    #[test]
    fn orders_by_timestamp_then_entity_id() {
        let h = HistoryManager::new(DEFAULT_IMMUTABLE_DELTA_MS);
        h.append(ev("a", "Ez", 1000));
        h.append(ev("a", "Ea", 1000));
        h.append(ev("a", "E0", 500));
        let ids: Vec<_> = h
            .get_history(None, None, None)
            .into_iter()
            .map(|e| e.entity_id)
            .collect();
        assert_eq!(ids, vec!["E0", "Ea", "Ez"]);
    }

    #[test]
    fn append_is_idempotent_on_entity_id() {
        let h = HistoryManager::new(DEFAULT_IMMUTABLE_DELTA_MS);
        assert!(h.append(ev("a", "E1", 1000)));
        assert!(!h.append(ev("a", "E1", 1000)));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn filters_by_range_and_server() {
        let h = HistoryManager::new(DEFAULT_IMMUTABLE_DELTA_MS);
        h.append(ev("a", "E1", 100));
        h.append(ev("b", "E2", 200));
        h.append(ev("a", "E3", 300));
        let from_a = h.get_history(None, None, Some("a"));
        assert_eq!(from_a.len(), 2);
        let range = h.get_history(Some(150), Some(250), None);
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].entity_id, "E2");
    }

    #[test]
    fn immutable_time_is_now_minus_delta() {
        let h = HistoryManager::new(600_000);
        assert_eq!(h.immutable_time(1_000_000), 400_000);
    }
}
