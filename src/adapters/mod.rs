//! External collaborator boundary
//!
//! The engine consumes three adapters it does not implement itself: the
//! blockchain anchor, the content-addressed store, and the mutable asset
//! record store. Contracts here; implementations in [`memory`] (tests,
//! development) and [`http`] (bridge services), plus the Mongo-backed record
//! store in `crate::db`.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::types::Result;

/// The blockchain-anchored fingerprint for an asset. Immutable once mined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    /// Content address of the anchored critical-metadata payload
    pub content_hash: String,
    /// Transaction that recorded it
    pub tx_id: String,
}

/// Reads and writes the blockchain-anchored fingerprint for an asset.
#[async_trait]
pub trait AnchorClient: Send + Sync {
    /// Current anchor record for an asset, or `None` if never anchored.
    async fn read_anchor(&self, asset_id: &str) -> Result<Option<AnchorRecord>>;

    /// Record a new fingerprint; returns the transaction id. The returned id
    /// is pending until a separate confirmation signal (out of scope here).
    async fn write_anchor(&self, asset_id: &str, content_hash: &str) -> Result<String>;

    /// The original write event for a transaction, used to repair stale
    /// transaction references independently of blob content.
    async fn read_anchor_event(&self, tx_id: &str) -> Result<Option<AnchorRecord>>;
}

/// Content-addressed blob storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch a blob by content address.
    async fn get(&self, address: &str) -> Result<Option<Bytes>>;

    /// Store a blob; idempotent; identical bytes yield identical addresses.
    async fn put(&self, bytes: Bytes) -> Result<String>;
}

/// The mutable document store holding current asset state.
///
/// `write` enforces optimistic concurrency: it is rejected with
/// `VersionConflict` if another writer advanced the version since the
/// caller's read. `expected_version == 0` means the asset must not exist.
#[async_trait]
pub trait AssetRecordStore: Send + Sync {
    async fn read(&self, asset_id: &str) -> Result<Option<Asset>>;

    async fn write(&self, asset: &Asset, expected_version: u64) -> Result<()>;

    /// Assets owned by a wallet; soft-deleted assets are excluded unless
    /// `include_deleted` is set.
    async fn list_by_owner(&self, owner: &str, include_deleted: bool) -> Result<Vec<Asset>>;

    /// All current asset ids (for integrity sweeps).
    async fn list_ids(&self) -> Result<Vec<String>>;
}
