//! C3 — Entity Factory.
//!
//! Parses a canonical entity descriptor from bytes and validates its shape.
//! The wire format is JSON (spec section 6: the uploaded part is named
//! `entity.json`); the content-addressed `id` is the CIDv1 of the
//! DAG-CBOR canonical re-encoding of the descriptor, excluding the `id`
//! field itself.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EntityError;
use crate::hash::{self, CODEC_DAG_CBOR};

/// An open-ended entity kind (`scene`, `profile`, `wearable`, ... — the
/// spec's enumeration is illustrative, not exhaustive).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(pub String);

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        EntityType(s.to_string())
    }
}

/// Immutable, content-addressed entity descriptor (spec section 3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Non-empty, order-significant. Order is part of the wire contract
    /// even though pointer resolution itself is order-independent.
    pub pointers: Vec<String>,
    pub timestamp: i64,
    /// Logical filename -> content hash (CIDv1 string). May be empty.
    #[serde(default)]
    pub content: BTreeMap<String, String>,
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

fn default_metadata() -> serde_json::Value {
    serde_json::Value::Null
}

/// The subset of `Entity` that participates in the canonical hash: the
/// `id` is excluded since it is derived *from* this encoding.
#[derive(Serialize)]
struct CanonicalEntity<'a> {
    #[serde(rename = "type")]
    entity_type: &'a EntityType,
    pointers: &'a [String],
    timestamp: i64,
    content: &'a BTreeMap<String, String>,
    metadata: &'a serde_json::Value,
}

impl Entity {
    /// Parses an `entity.json` byte payload. Does not verify the `id`;
    /// callers must follow up with [`Entity::verify_id`].
    pub fn parse(bytes: &[u8]) -> Result<Entity, EntityError> {
        let entity: Entity = serde_json::from_slice(bytes)?;
        if entity.pointers.is_empty() {
            return Err(EntityError::NoPointers);
        }
        Ok(entity)
    }

    /// Computes the canonical content-addressed id this entity *should*
    /// have, independent of whatever value is in `self.id`.
    pub fn compute_id(&self) -> Result<cid::Cid, EntityError> {
        let canonical = CanonicalEntity {
            entity_type: &self.entity_type,
            pointers: &self.pointers,
            timestamp: self.timestamp,
            content: &self.content,
            metadata: &self.metadata,
        };
        let bytes = serde_ipld_dagcbor::to_vec(&canonical)
            .map_err(|e| EntityError::Canonicalization(e.to_string()))?;
        Ok(hash::hash(&bytes, CODEC_DAG_CBOR))
    }

    /// `true` if `self.id` matches the canonical hash of its own content.
    pub fn verify_id(&self) -> Result<bool, EntityError> {
        Ok(self.compute_id()?.to_string() == self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json(pointers: &str, timestamp: i64) -> String {
        format!(
            r#"{{"id":"placeholder","type":"scene","pointers":{pointers},"timestamp":{timestamp},"content":{{}},"metadata":null}}"#
        )
    }

    #[test]
    fn parses_minimal_entity() {
        let bytes = sample_json(r#"["0,0"]"#, 1000);
        let e = Entity::parse(bytes.as_bytes()).unwrap();
        assert_eq!(e.pointers, vec!["0,0".to_string()]);
        assert_eq!(e.timestamp, 1000);
    }

    #[test]
    fn rejects_entity_without_pointers() {
        let bytes = sample_json("[]", 1000);
        assert!(matches!(
            Entity::parse(bytes.as_bytes()),
            Err(EntityError::NoPointers)
        ));
    }

    #[test]
    fn compute_id_is_deterministic_and_ignores_claimed_id() {
        let mut e = Entity::parse(sample_json(r#"["0,0"]"#, 1000).as_bytes()).unwrap();
        let id_a = e.compute_id().unwrap();
        e.id = "something-else".to_string();
        let id_b = e.compute_id().unwrap();
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn verify_id_detects_tampering() {
        let mut e = Entity::parse(sample_json(r#"["0,0"]"#, 1000).as_bytes()).unwrap();
        assert!(!e.verify_id().unwrap());
        e.id = e.compute_id().unwrap().to_string();
        assert!(e.verify_id().unwrap());
    }

    #[test]
    fn content_order_does_not_affect_id_but_pointer_order_is_preserved() {
        let a = Entity::parse(sample_json(r#"["0,0","1,1"]"#, 1000).as_bytes()).unwrap();
        let b = Entity::parse(sample_json(r#"["0,0","1,1"]"#, 1000).as_bytes()).unwrap();
        assert_eq!(a.compute_id().unwrap(), b.compute_id().unwrap());
        assert_eq!(a.pointers, vec!["0,0".to_string(), "1,1".to_string()]);
    }
}
