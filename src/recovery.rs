//! Boot-time state reconstruction (spec section 6).
//!
//! `PointerManager` and `HistoryManager` are pure in-memory structures;
//! `deploy()` persists enough alongside `Storage`'s content/proof blobs
//! (the `Pointer`, `History`, and `Meta` categories) that both can be
//! replayed here on startup instead of starting empty after a restart.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::entity::{Entity, EntityType};
use crate::history::{HistoryEvent, HistoryManager};
use crate::pointers::PointerManager;
use crate::service::ENTITY_TYPES_KEY;
use crate::storage::{Category, Storage};

pub async fn rebuild_from_storage(
    storage: &dyn Storage,
    pointers: &PointerManager,
    history: &HistoryManager,
) -> anyhow::Result<()> {
    let entity_types = known_entity_types(storage).await?;
    let mut pointers_restored = 0usize;
    for entity_type in &entity_types {
        pointers_restored += restore_pointers_for_type(storage, pointers, entity_type).await?;
    }

    let mut history_restored = 0usize;
    for entity_id in storage.list(&Category::History).await? {
        let Some(bytes) = storage.get(&Category::History, &entity_id).await? else {
            continue;
        };
        match serde_json::from_slice::<HistoryEvent>(&bytes) {
            Ok(event) => {
                if history.append(event) {
                    history_restored += 1;
                }
            }
            Err(e) => warn!(entity_id = %entity_id, error = %e, "skipping unparseable history record"),
        }
    }

    info!(
        entity_types = entity_types.len(),
        pointers_restored, history_restored, "rebuilt state from storage"
    );
    Ok(())
}

async fn known_entity_types(storage: &dyn Storage) -> anyhow::Result<Vec<EntityType>> {
    let Some(bytes) = storage.get(&Category::Meta, ENTITY_TYPES_KEY).await? else {
        return Ok(Vec::new());
    };
    Ok(serde_json::from_slice(&bytes)?)
}

async fn restore_pointers_for_type(
    storage: &dyn Storage,
    pointers: &PointerManager,
    entity_type: &EntityType,
) -> anyhow::Result<usize> {
    let mut pointers_of_entity: HashMap<String, Vec<String>> = HashMap::new();
    for pointer in storage.list(&Category::Pointer(entity_type.clone())).await? {
        let Some(bytes) = storage.get(&Category::Pointer(entity_type.clone()), &pointer).await? else {
            continue;
        };
        let entity_id = String::from_utf8_lossy(&bytes).into_owned();
        pointers_of_entity.entry(entity_id).or_default().push(pointer);
    }

    let mut restored = 0usize;
    for (entity_id, held_pointers) in pointers_of_entity {
        let Some(bytes) = storage.get(&Category::Content, &entity_id).await? else {
            warn!(entity_id = %entity_id, "pointer references entity with no stored content, skipping");
            continue;
        };
        match Entity::parse(&bytes) {
            Ok(entity) => {
                pointers.restore(entity_type, &entity.id, entity.timestamp, &held_pointers);
                restored += held_pointers.len();
            }
            Err(e) => warn!(entity_id = %entity_id, error = %e, "skipping unparseable entity during recovery"),
        }
    }
    Ok(restored)
}
