//! In-memory adapter implementations
//!
//! Used by tests and development mode. The anchor and content stores carry an
//! `unavailable` switch so adapter-outage paths can be exercised without a
//! network.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::asset::Asset;
use crate::fingerprint::compute_cid;
use crate::ledger::{
    HistoryAction, HistoryEntry, HistoryFilter, HistoryPage, LedgerStore, NewHistoryEntry,
    PageRequest,
};
use crate::types::{AnchorageError, Result};

use super::{AnchorClient, AnchorRecord, AssetRecordStore, ContentStore};

// ============================================================================
// Anchor client
// ============================================================================

#[derive(Default)]
pub struct MemoryAnchorClient {
    anchors: DashMap<String, AnchorRecord>,
    events: DashMap<String, AnchorRecord>,
    tx_counter: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryAnchorClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable anchor for outage tests.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop the event index so anchor-history recovery fails.
    pub fn clear_events(&self) {
        self.events.clear();
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AnchorageError::AdapterUnavailable(
                "anchor client unreachable".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AnchorClient for MemoryAnchorClient {
    async fn read_anchor(&self, asset_id: &str) -> Result<Option<AnchorRecord>> {
        self.check_available()?;
        Ok(self.anchors.get(asset_id).map(|r| r.clone()))
    }

    async fn write_anchor(&self, asset_id: &str, content_hash: &str) -> Result<String> {
        self.check_available()?;
        let tx_id = format!("tx-{}", self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1);
        let record = AnchorRecord {
            content_hash: content_hash.to_string(),
            tx_id: tx_id.clone(),
        };
        self.anchors.insert(asset_id.to_string(), record.clone());
        self.events.insert(tx_id.clone(), record);
        Ok(tx_id)
    }

    async fn read_anchor_event(&self, tx_id: &str) -> Result<Option<AnchorRecord>> {
        self.check_available()?;
        Ok(self.events.get(tx_id).map(|r| r.clone()))
    }
}

// ============================================================================
// Content store
// ============================================================================

#[derive(Default)]
pub struct MemoryContentStore {
    blobs: DashMap<String, Bytes>,
    unavailable: AtomicBool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert a blob under an arbitrary address, bypassing content
    /// addressing. Lets tests model a corrupted or malicious store.
    pub fn insert_raw(&self, address: &str, bytes: Bytes) {
        self.blobs.insert(address.to_string(), bytes);
    }

    pub fn remove(&self, address: &str) {
        self.blobs.remove(address);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AnchorageError::AdapterUnavailable(
                "content store unreachable".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get(&self, address: &str) -> Result<Option<Bytes>> {
        self.check_available()?;
        Ok(self.blobs.get(address).map(|b| b.clone()))
    }

    async fn put(&self, bytes: Bytes) -> Result<String> {
        self.check_available()?;
        let address = compute_cid(&bytes);
        self.blobs.insert(address.clone(), bytes);
        Ok(address)
    }
}

// ============================================================================
// Asset record store
// ============================================================================

#[derive(Default)]
pub struct MemoryAssetStore {
    assets: DashMap<String, Asset>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an asset without a version check. Test hook for modeling
    /// off-chain tampering that bypassed the engine.
    pub fn tamper(&self, asset: Asset) {
        self.assets.insert(asset.asset_id.clone(), asset);
    }
}

#[async_trait]
impl AssetRecordStore for MemoryAssetStore {
    async fn read(&self, asset_id: &str) -> Result<Option<Asset>> {
        Ok(self.assets.get(asset_id).map(|a| a.clone()))
    }

    async fn write(&self, asset: &Asset, expected_version: u64) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        // The entry guard holds the shard lock, making check-and-set atomic.
        match self.assets.entry(asset.asset_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let actual = occupied.get().version_number;
                if actual != expected_version {
                    return Err(AnchorageError::VersionConflict {
                        asset_id: asset.asset_id.clone(),
                        expected: expected_version,
                        actual,
                    });
                }
                occupied.insert(asset.clone());
                Ok(())
            }
            Entry::Vacant(vacant) => {
                if expected_version != 0 {
                    return Err(AnchorageError::VersionConflict {
                        asset_id: asset.asset_id.clone(),
                        expected: expected_version,
                        actual: 0,
                    });
                }
                vacant.insert(asset.clone());
                Ok(())
            }
        }
    }

    async fn list_by_owner(&self, owner: &str, include_deleted: bool) -> Result<Vec<Asset>> {
        let mut out: Vec<Asset> = self
            .assets
            .iter()
            .filter(|entry| {
                entry.value().is_owned_by(owner) && (include_deleted || !entry.value().is_deleted)
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        Ok(out)
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.assets.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

// ============================================================================
// Ledger store
// ============================================================================

#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn page_from(filtered: Vec<HistoryEntry>, page: &PageRequest) -> HistoryPage {
        let has_more = filtered.len() > page.limit;
        let entries: Vec<HistoryEntry> = filtered.into_iter().take(page.limit).collect();
        let next_before_seq = if has_more {
            entries.last().map(|e| e.seq)
        } else {
            None
        };
        HistoryPage {
            entries,
            next_before_seq,
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AnchorageError::Ledger("ledger lock poisoned".into()))?;
        let stored = HistoryEntry {
            seq: entries.len() as u64 + 1,
            asset_id: entry.asset_id,
            action: entry.action,
            version: entry.version,
            timestamp: entry.timestamp,
            wallet_address: entry.wallet_address,
            performed_by: entry.performed_by,
            metadata: entry.metadata,
        };
        entries.push(stored.clone());
        Ok(stored)
    }

    async fn list_history(
        &self,
        asset_id: &str,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<HistoryPage> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AnchorageError::Ledger("ledger lock poisoned".into()))?;
        let filtered: Vec<HistoryEntry> = entries
            .iter()
            .rev()
            .filter(|e| {
                e.asset_id == asset_id
                    && page.before_seq.map_or(true, |before| e.seq < before)
                    && filter.matches(e)
            })
            .cloned()
            .collect();
        Ok(Self::page_from(filtered, page))
    }

    async fn list_actor_history(
        &self,
        address: &str,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<HistoryPage> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AnchorageError::Ledger("ledger lock poisoned".into()))?;
        let filtered: Vec<HistoryEntry> = entries
            .iter()
            .rev()
            .filter(|e| {
                (e.wallet_address.eq_ignore_ascii_case(address)
                    || e.performed_by.eq_ignore_ascii_case(address))
                    && page.before_seq.map_or(true, |before| e.seq < before)
                    && filter.matches(e)
            })
            .cloned()
            .collect();
        Ok(Self::page_from(filtered, page))
    }

    async fn all_for_asset(&self, asset_id: &str) -> Result<Vec<HistoryEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AnchorageError::Ledger("ledger lock poisoned".into()))?;
        Ok(entries
            .iter()
            .filter(|e| e.asset_id == asset_id)
            .cloned()
            .collect())
    }

    async fn latest(&self, asset_id: &str, action: HistoryAction) -> Result<Option<HistoryEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AnchorageError::Ledger("ledger lock poisoned".into()))?;
        Ok(entries
            .iter()
            .rev()
            .find(|e| e.asset_id == asset_id && e.action == action)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn new_entry(asset_id: &str, action: HistoryAction, version: u64) -> NewHistoryEntry {
        NewHistoryEntry {
            asset_id: asset_id.into(),
            action,
            version,
            timestamp: Utc::now(),
            wallet_address: "0xowner".into(),
            performed_by: "0xowner".into(),
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn content_store_is_idempotent() {
        let store = MemoryContentStore::new();
        let a = store.put(Bytes::from_static(b"same bytes")).await.unwrap();
        let b = store.put(Bytes::from_static(b"same bytes")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(
            store.get(&a).await.unwrap().unwrap(),
            Bytes::from_static(b"same bytes")
        );
    }

    #[tokio::test]
    async fn anchor_unavailable_is_transient() {
        let anchor = MemoryAnchorClient::new();
        anchor.set_unavailable(true);
        let err = anchor.read_anchor("a1").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn anchor_events_are_queryable_by_tx() {
        let anchor = MemoryAnchorClient::new();
        let tx = anchor.write_anchor("a1", "bafy-1").await.unwrap();
        let event = anchor.read_anchor_event(&tx).await.unwrap().unwrap();
        assert_eq!(event.content_hash, "bafy-1");
        assert_eq!(event.tx_id, tx);
    }

    #[tokio::test]
    async fn ledger_sequences_are_monotonic() {
        let ledger = MemoryLedgerStore::new();
        for v in 1..=5 {
            ledger
                .append(new_entry("a1", HistoryAction::Update, v))
                .await
                .unwrap();
        }
        let all = ledger.all_for_asset("a1").await.unwrap();
        let seqs: Vec<u64> = all.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn pagination_is_stable_under_concurrent_appends() {
        let ledger = MemoryLedgerStore::new();
        for v in 1..=6 {
            ledger
                .append(new_entry("a1", HistoryAction::Update, v))
                .await
                .unwrap();
        }

        let page_req = PageRequest {
            limit: 3,
            before_seq: None,
        };
        let first = ledger
            .list_history("a1", &HistoryFilter::default(), &page_req)
            .await
            .unwrap();
        assert_eq!(first.entries.len(), 3);
        assert_eq!(first.entries[0].seq, 6);
        let cursor = first.next_before_seq.unwrap();

        // New appends land after the cursor and must not shift older pages
        ledger
            .append(new_entry("a1", HistoryAction::Update, 7))
            .await
            .unwrap();

        let second = ledger
            .list_history(
                "a1",
                &HistoryFilter::default(),
                &PageRequest {
                    limit: 3,
                    before_seq: Some(cursor),
                },
            )
            .await
            .unwrap();
        let seqs: Vec<u64> = second.entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 2, 1]);
        assert!(second.next_before_seq.is_none());
    }
}
