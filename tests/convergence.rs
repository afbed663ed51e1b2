//! Property tests for order-independent convergence (spec section 8,
//! invariants "pointer convergence after arbitrary-order sync" and
//! "convergence under event-set permutation once T_imm passes").

use content_mesh::entity::EntityType;
use content_mesh::history::{HistoryEvent, HistoryManager, DEFAULT_IMMUTABLE_DELTA_MS};
use content_mesh::pointers::PointerManager;
use quickcheck_macros::quickcheck;

fn ty() -> EntityType {
    EntityType::from("scene")
}

/// A handful of distinct deployments onto a shared pointer. Timestamps
/// and ids are synthesized from the shuffle seed so each permutation of
/// `order` replays the exact same event set.
fn commits(count: u8) -> Vec<(String, i64, Vec<String>)> {
    (0..count.min(8))
        .map(|i| {
            let id = format!("E{i}");
            let timestamp = 1_000 + i as i64 * 37;
            (id, timestamp, vec!["0,0".to_string()])
        })
        .collect()
}

fn replay_in_order(commits: &[(String, i64, Vec<String>)], order: &[usize]) -> Option<String> {
    let pm = PointerManager::new();
    for &idx in order {
        let (id, timestamp, pointers) = &commits[idx];
        pm.try_to_commit(&ty(), id, *timestamp, pointers);
    }
    pm.active_entity(&ty(), "0,0")
}

#[quickcheck]
fn pointer_state_converges_regardless_of_arrival_order(seed: u8, count: u8) -> bool {
    let commits_list = commits(count.max(1));
    let n = commits_list.len();

    let canonical_order: Vec<usize> = (0..n).collect();
    let canonical = replay_in_order(&commits_list, &canonical_order);

    // Derive a pseudo-shuffle from `seed` via repeated rotation — cheap,
    // deterministic, and covers every rotation as `seed` ranges over u8.
    let mut shuffled = canonical_order.clone();
    if n > 1 {
        let rotate_by = seed as usize % n;
        shuffled.rotate_left(rotate_by);
    }
    let shuffled_result = replay_in_order(&commits_list, &shuffled);

    shuffled_result == canonical
}

#[quickcheck]
fn history_total_order_is_independent_of_append_order(seed: u8, count: u8) -> bool {
    let n = (count % 6) as i64 + 1;
    let events: Vec<HistoryEvent> = (0..n)
        .map(|i| HistoryEvent {
            server_name: "origin".to_string(),
            entity_id: format!("E{i}"),
            entity_type: ty(),
            timestamp: 1_000 + i * 13,
        })
        .collect();

    let canonical = HistoryManager::new(DEFAULT_IMMUTABLE_DELTA_MS);
    for e in &events {
        canonical.append(e.clone());
    }
    let canonical_ids: Vec<String> = canonical
        .get_history(None, None, None)
        .into_iter()
        .map(|e| e.entity_id)
        .collect();

    let shuffled = HistoryManager::new(DEFAULT_IMMUTABLE_DELTA_MS);
    let mut order: Vec<usize> = (0..events.len()).collect();
    if !order.is_empty() {
        let rotate_by = seed as usize % order.len();
        order.rotate_left(rotate_by);
    }
    for idx in order {
        shuffled.append(events[idx].clone());
    }
    let shuffled_ids: Vec<String> = shuffled
        .get_history(None, None, None)
        .into_iter()
        .map(|e| e.entity_id)
        .collect();

    canonical_ids == shuffled_ids && canonical_ids.len() == events.len() as usize
}

#[test]
fn redeploy_of_an_identical_event_is_a_no_op() {
    let h = HistoryManager::new(DEFAULT_IMMUTABLE_DELTA_MS);
    let event = HistoryEvent {
        server_name: "origin".to_string(),
        entity_id: "E1".to_string(),
        entity_type: ty(),
        timestamp: 1_000,
    };
    assert!(h.append(event.clone()));
    assert!(!h.append(event));
    assert_eq!(h.len(), 1);
}
