//! Fingerprint codec
//!
//! Canonicalizes the anchored subset of an asset's metadata into
//! deterministic bytes and derives its content address and hash digest.
//! Both derivations are pure functions with no network I/O, so the common
//! verification path never has to contact the content store.
//!
//! Canonical form: compact JSON (no extra whitespace), UTF-8, keys sorted
//! lexicographically at every level. The payload struct declares its fields
//! in lexicographic order and nested maps are `BTreeMap`, so plain
//! serialization is already canonical.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::metadata::CriticalMetadata;
use crate::types::{AnchorageError, Result};

/// Raw multicodec code for CIDv1
const RAW_CODEC: u64 = 0x55;

/// The payload whose canonical bytes are content-addressed and anchored.
///
/// Field order matters: declaration order is lexicographic so that serde
/// output matches the canonical (sorted-key) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorPayload {
    /// Immutable asset identifier
    pub asset_id: String,
    /// Authoritative metadata subset
    pub critical_metadata: CriticalMetadata,
    /// Owner wallet address at anchor time
    pub owner_address: String,
}

impl AnchorPayload {
    pub fn new(asset_id: &str, owner_address: &str, critical_metadata: CriticalMetadata) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            critical_metadata,
            owner_address: owner_address.to_string(),
        }
    }

    /// Canonical bytes of this payload.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AnchorageError::InvalidMetadata(format!("canonicalization failed: {}", e)))
    }

    /// Content address of this payload (canonicalize + CID).
    pub fn content_address(&self) -> Result<String> {
        Ok(compute_cid(&self.canonical_bytes()?))
    }

    /// Parse a payload from raw bytes retrieved from the content store.
    ///
    /// Shape is validated strictly: unknown fields, missing fields, or a
    /// malformed critical-metadata object are all rejected so that recovery
    /// never writes an unverified blob back into the record store.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| AnchorageError::InvalidMetadata(format!("blob is not JSON: {}", e)))?;

        let obj = value.as_object().ok_or_else(|| {
            AnchorageError::InvalidMetadata("blob root is not an object".into())
        })?;

        let asset_id = obj
            .get("asset_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AnchorageError::InvalidMetadata("blob missing asset_id".into()))?;
        let owner_address = obj
            .get("owner_address")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AnchorageError::InvalidMetadata("blob missing owner_address".into()))?;
        let critical = obj.get("critical_metadata").ok_or_else(|| {
            AnchorageError::InvalidMetadata("blob missing critical_metadata".into())
        })?;

        Ok(Self::new(
            asset_id,
            owner_address,
            CriticalMetadata::from_json(critical)?,
        ))
    }
}

/// Compute the CIDv1 (raw codec, SHA2-256, base32) for a byte string.
pub fn compute_cid(bytes: &[u8]) -> String {
    let hash = Code::Sha2_256.digest(bytes);
    Cid::new_v1(RAW_CODEC, hash).to_string()
}

/// Compute the SHA-256 digest (lowercase hex) for a byte string.
pub fn compute_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(meta: serde_json::Value) -> AnchorPayload {
        AnchorPayload::new(
            "asset-1",
            "0xAbC123",
            CriticalMetadata::from_json(&meta).unwrap(),
        )
    }

    #[test]
    fn canonical_bytes_are_sorted_and_compact() {
        let p = payload(json!({"zeta": 1, "alpha": {"y": 2, "x": 3}}));
        let bytes = p.canonical_bytes().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"asset_id":"asset-1","critical_metadata":{"alpha":{"x":3,"y":2},"zeta":1},"owner_address":"0xAbC123"}"#
        );
    }

    #[test]
    fn same_content_same_cid() {
        let a = payload(json!({"b": 2, "a": 1}));
        let b = payload(json!({"a": 1, "b": 2}));
        assert_eq!(a.content_address().unwrap(), b.content_address().unwrap());
    }

    #[test]
    fn different_content_different_cid() {
        let a = payload(json!({"name": "x"}));
        let b = payload(json!({"name": "y"}));
        assert_ne!(a.content_address().unwrap(), b.content_address().unwrap());
    }

    #[test]
    fn cid_matches_direct_multihash() {
        let data = b"hello anchorage";
        let hash = Code::Sha2_256.digest(data);
        let expected = Cid::new_v1(RAW_CODEC, hash).to_string();
        assert_eq!(compute_cid(data), expected);
        assert!(expected.starts_with('b')); // base32 CIDv1
    }

    #[test]
    fn digest_is_hex_sha256() {
        let digest = compute_digest(b"");
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn parse_round_trip() {
        let p = payload(json!({"name": "x", "n": 3}));
        let bytes = p.canonical_bytes().unwrap();
        let parsed = AnchorPayload::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn parse_rejects_malformed_blobs() {
        assert!(AnchorPayload::from_bytes(b"not json").is_err());
        assert!(AnchorPayload::from_bytes(b"[1,2,3]").is_err());
        // Missing critical_metadata
        assert!(AnchorPayload::from_bytes(
            br#"{"asset_id":"a","owner_address":"0x1"}"#
        )
        .is_err());
        // critical_metadata of the wrong semantic type
        assert!(AnchorPayload::from_bytes(
            br#"{"asset_id":"a","critical_metadata":"oops","owner_address":"0x1"}"#
        )
        .is_err());
    }
}
