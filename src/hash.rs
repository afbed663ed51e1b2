//! C1 — Hasher.
//!
//! Content-addressed hashing on top of a CIDv1 (IPFS-style) identifier:
//! SHA2-256 digest, caller-selected codec, default (base32) multibase
//! string representation. Mirrors the `cid::new_from_cbor`-style helper
//! the wider IPLD ecosystem exposes, generalized to raw content as well
//! as canonical entity encodings.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};

use crate::error::HashError;

/// IPLD raw-binary codec, used for content blobs.
pub const CODEC_RAW: u64 = 0x55;
/// DAG-CBOR codec, used for the canonical entity encoding.
pub const CODEC_DAG_CBOR: u64 = 0x71;

/// Hashes `bytes` under `codec`, returning a CIDv1.
///
/// Large payloads are expected to be hashed via [`hash_blocking`] so the
/// digest computation does not block the async scheduler (design notes,
/// Hasher may offload to a worker pool).
pub fn hash(bytes: &[u8], codec: u64) -> Cid {
    let digest = Code::Sha2_256.digest(bytes);
    Cid::new_v1(codec, digest)
}

/// Offloads [`hash`] to the blocking thread pool for large inputs.
pub async fn hash_blocking(bytes: bytes::Bytes, codec: u64) -> Cid {
    tokio::task::spawn_blocking(move || hash(&bytes, codec))
        .await
        .expect("hashing task panicked")
}

/// Parses a CIDv1 string, as required by the `IPFS_HASHING` validator.
pub fn parse_cid(s: &str) -> Result<Cid, HashError> {
    s.parse::<Cid>()
        .map_err(|_| HashError::InvalidCid(s.to_string()))
}

/// `true` if `s` parses as a CIDv1 (v0 CIDs are rejected: spec requires
/// "IPFS v2" / CIDv1 strings only).
pub fn is_valid_cidv1(s: &str) -> bool {
    match parse_cid(s) {
        Ok(cid) => cid.version() == cid::Version::V1,
        Err(_) => false,
    }
}
