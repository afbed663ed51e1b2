//! C5 — Pointer Manager.
//!
//! Maintains the active entity per `(type, pointer)` with timestamp-
//! ordered overlap resolution (spec section 4.2). Pointer Manager
//! exclusively owns pointer state (spec section 3, Ownership); both
//! maps below are updated under a single write-lock so multi-pointer
//! commits are observed atomically by readers — design notes section 9
//! rules out per-pointer locks for exactly this reason.

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::RwLock;

use crate::entity::EntityType;

/// `(timestamp, entityId)` — the ordering key used for tie-breaking
/// (spec section 3: ties broken by lexicographically greater entity id).
pub type OrderKey = (i64, String);

#[derive(Clone, Debug, PartialEq, Eq)]
struct ActiveRef {
    entity_id: String,
    timestamp: i64,
}

impl ActiveRef {
    fn order_key(&self) -> OrderKey {
        (self.timestamp, self.entity_id.clone())
    }
}

#[derive(Default)]
struct State {
    /// The active entity per `(type, pointer)`.
    active: HashMap<(EntityType, String), ActiveRef>,
    /// The pointer set an entity had *at the time it became active*, kept
    /// only for entities that are (or were) active — needed to detect
    /// orphaning when a newer entity displaces them on some, but not
    /// all, of their pointers.
    pointers_of: HashMap<String, Vec<String>>,
}

pub struct CommitOutcome {
    pub could_commit: bool,
    pub entities_deleted: BTreeSet<String>,
}

#[derive(Default)]
pub struct PointerManager {
    state: RwLock<State>,
}

impl PointerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the active entity id for `(type, pointer)`, if any.
    pub fn active_entity(&self, entity_type: &EntityType, pointer: &str) -> Option<String> {
        self.state
            .read()
            .active
            .get(&(entity_type.clone(), pointer.to_string()))
            .map(|r| r.entity_id.clone())
    }

    /// Returns every active pointer for `entity_type`.
    pub fn active_pointers(&self, entity_type: &EntityType) -> Vec<String> {
        self.state
            .read()
            .active
            .keys()
            .filter(|(t, _)| t == entity_type)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// `true` if `candidate` is strictly newer (by `(timestamp, id)`) than
    /// whatever is currently active on any of `pointers` — used by the
    /// `checkFreshness` step of the deploy path (spec section 4.5, step 5).
    pub fn has_newer_entity(
        &self,
        entity_type: &EntityType,
        pointers: &[String],
        candidate: &OrderKey,
    ) -> bool {
        let state = self.state.read();
        pointers.iter().any(|p| {
            state
                .active
                .get(&(entity_type.clone(), p.clone()))
                .map(|r| r.order_key() > *candidate)
                .unwrap_or(false)
        })
    }

    /// Attempts to commit `entity_id`/`timestamp` onto `pointers` (spec
    /// section 4.2). Returns whether the commit took effect and which
    /// previously-active entities were orphaned as a result.
    pub fn try_to_commit(
        &self,
        entity_type: &EntityType,
        entity_id: &str,
        timestamp: i64,
        pointers: &[String],
    ) -> CommitOutcome {
        let candidate_key: OrderKey = (timestamp, entity_id.to_string());
        let mut state = self.state.write();

        // Step 1: gather the distinct incumbents across all of `pointers`.
        let mut incumbents: HashMap<String, ActiveRef> = HashMap::new();
        for p in pointers {
            if let Some(r) = state.active.get(&(entity_type.clone(), p.clone())) {
                incumbents.insert(r.entity_id.clone(), r.clone());
            }
        }

        // Step 2: shadowed if any incumbent is >= the candidate.
        if incumbents.values().any(|r| r.order_key() >= candidate_key) {
            return CommitOutcome {
                could_commit: false,
                entities_deleted: BTreeSet::new(),
            };
        }

        // Step 3: move every pointer onto the candidate.
        for p in pointers {
            state.active.insert(
                (entity_type.clone(), p.clone()),
                ActiveRef {
                    entity_id: entity_id.to_string(),
                    timestamp,
                },
            );
        }
        state
            .pointers_of
            .insert(entity_id.to_string(), pointers.to_vec());

        let candidate_pointers: HashSet<&str> = pointers.iter().map(String::as_str).collect();
        let mut entities_deleted = BTreeSet::new();
        for (incumbent_id, _) in incumbents {
            let still_referenced = state
                .pointers_of
                .get(&incumbent_id)
                .map(|ps| {
                    ps.iter().any(|p| {
                        !candidate_pointers.contains(p.as_str())
                            && state
                                .active
                                .get(&(entity_type.clone(), p.clone()))
                                .map(|r| r.entity_id == incumbent_id)
                                .unwrap_or(false)
                    })
                })
                .unwrap_or(false);
            if !still_referenced {
                entities_deleted.insert(incumbent_id.clone());
                state.pointers_of.remove(&incumbent_id);
            }
        }

        CommitOutcome {
            could_commit: true,
            entities_deleted,
        }
    }

    /// Seeds `entity_id`/`timestamp` as the active entity on `pointers`
    /// without running the overlap check `try_to_commit` performs — used
    /// only to replay the persisted `Pointer` category at boot, where
    /// every entry is already known to be a winner.
    pub fn restore(&self, entity_type: &EntityType, entity_id: &str, timestamp: i64, pointers: &[String]) {
        let mut state = self.state.write();
        for p in pointers {
            state.active.insert(
                (entity_type.clone(), p.clone()),
                ActiveRef {
                    entity_id: entity_id.to_string(),
                    timestamp,
                },
            );
        }
        state
            .pointers_of
            .insert(entity_id.to_string(), pointers.to_vec());
    }
}
