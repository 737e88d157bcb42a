//! Mongo-backed adapter implementations

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures_util::StreamExt;
use mongodb::options::ReturnDocument;
use tracing::error;

use crate::adapters::AssetRecordStore;
use crate::asset::Asset;
use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    AssetDoc, HistoryDoc, SeqCounterDoc, ASSET_COLLECTION, COUNTER_COLLECTION, HISTORY_COLLECTION,
    HISTORY_SEQ_COUNTER,
};
use crate::ledger::{
    HistoryEntry, HistoryFilter, HistoryPage, LedgerStore, NewHistoryEntry, PageRequest,
};
use crate::types::{AnchorageError, Result};

fn db_err(context: &str, e: mongodb::error::Error) -> AnchorageError {
    AnchorageError::Database(format!("{}: {}", context, e))
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == 11000
    )
}

// ============================================================================
// Asset record store
// ============================================================================

/// Asset record store backed by a MongoDB collection.
pub struct MongoAssetStore {
    collection: MongoCollection<AssetDoc>,
}

impl MongoAssetStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            collection: client.collection(ASSET_COLLECTION).await?,
        })
    }

    async fn current_version(&self, asset_id: &str) -> Result<Option<u64>> {
        Ok(self
            .collection
            .inner()
            .find_one(doc! { "asset_id": asset_id })
            .await
            .map_err(|e| db_err("asset version read failed", e))?
            .map(|d| d.version_number.max(0) as u64))
    }
}

#[async_trait]
impl AssetRecordStore for MongoAssetStore {
    async fn read(&self, asset_id: &str) -> Result<Option<Asset>> {
        match self
            .collection
            .inner()
            .find_one(doc! { "asset_id": asset_id })
            .await
            .map_err(|e| db_err("asset read failed", e))?
        {
            Some(doc) => Ok(Some(doc.into_asset()?)),
            None => Ok(None),
        }
    }

    async fn write(&self, asset: &Asset, expected_version: u64) -> Result<()> {
        let doc = AssetDoc::from_asset(asset);

        if expected_version == 0 {
            // Must not exist; the unique asset_id index carries the check
            match self.collection.inner().insert_one(doc).await {
                Ok(_) => Ok(()),
                Err(e) if is_duplicate_key(&e) => {
                    let actual = self.current_version(&asset.asset_id).await?.unwrap_or(0);
                    Err(AnchorageError::VersionConflict {
                        asset_id: asset.asset_id.clone(),
                        expected: 0,
                        actual,
                    })
                }
                Err(e) => Err(db_err("asset insert failed", e)),
            }
        } else {
            // Version-filtered replace: matching nothing means a concurrent
            // writer advanced the version (or the asset is gone)
            let replaced = self
                .collection
                .inner()
                .find_one_and_replace(
                    doc! {
                        "asset_id": &asset.asset_id,
                        "version_number": expected_version as i64,
                    },
                    doc,
                )
                .await
                .map_err(|e| db_err("asset replace failed", e))?;

            if replaced.is_some() {
                return Ok(());
            }
            match self.current_version(&asset.asset_id).await? {
                Some(actual) => Err(AnchorageError::VersionConflict {
                    asset_id: asset.asset_id.clone(),
                    expected: expected_version,
                    actual,
                }),
                None => Err(AnchorageError::NotFound(format!("asset {}", asset.asset_id))),
            }
        }
    }

    async fn list_by_owner(&self, owner: &str, include_deleted: bool) -> Result<Vec<Asset>> {
        let mut filter = doc! { "owner_key": owner.to_ascii_lowercase() };
        if !include_deleted {
            filter.insert("is_deleted", doc! { "$ne": true });
        }

        let mut cursor = self
            .collection
            .inner()
            .find(filter)
            .await
            .map_err(|e| db_err("asset listing failed", e))?;

        let mut assets = Vec::new();
        while let Some(doc) = cursor.next().await {
            match doc {
                Ok(d) => assets.push(d.into_asset()?),
                Err(e) => error!("Error reading asset document: {}", e),
            }
        }
        Ok(assets)
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let ids = self
            .collection
            .inner()
            .distinct("asset_id", doc! {})
            .await
            .map_err(|e| db_err("asset id listing failed", e))?;
        Ok(ids
            .into_iter()
            .filter_map(|b| match b {
                Bson::String(s) => Some(s),
                _ => None,
            })
            .collect())
    }
}

// ============================================================================
// Ledger store
// ============================================================================

/// Append-only ledger backed by MongoDB, with an atomic `$inc` counter
/// assigning sequence numbers.
pub struct MongoLedgerStore {
    entries: MongoCollection<HistoryDoc>,
    counters: MongoCollection<SeqCounterDoc>,
}

impl MongoLedgerStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            entries: client.collection(HISTORY_COLLECTION).await?,
            counters: client.collection(COUNTER_COLLECTION).await?,
        })
    }

    async fn next_seq(&self) -> Result<i64> {
        let counter = self
            .counters
            .inner()
            .find_one_and_update(
                doc! { "_id": HISTORY_SEQ_COUNTER },
                doc! { "$inc": { "value": 1 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| db_err("ledger sequence bump failed", e))?
            .ok_or_else(|| AnchorageError::Ledger("sequence counter upsert returned nothing".into()))?;
        Ok(counter.value)
    }

    fn filter_doc(filter: &HistoryFilter) -> Document {
        let mut doc = Document::new();
        if let Some(action) = filter.action {
            doc.insert("action", action.as_str());
        }
        if let Some(actor) = &filter.performed_by {
            doc.insert("performed_by_key", actor.to_ascii_lowercase());
        }
        let mut range = Document::new();
        if let Some(since) = filter.since {
            range.insert("$gte", bson::DateTime::from_chrono(since));
        }
        if let Some(until) = filter.until {
            range.insert("$lte", bson::DateTime::from_chrono(until));
        }
        if !range.is_empty() {
            doc.insert("timestamp", range);
        }
        doc
    }

    /// Newest-first page of entries matching `base` + `filter`.
    async fn page(
        &self,
        mut base: Document,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<HistoryPage> {
        base.extend(Self::filter_doc(filter));
        if let Some(cursor) = page.before_seq {
            base.insert("seq", doc! { "$lt": cursor as i64 });
        }

        // Fetch one extra row to learn whether an older page exists
        let mut cursor = self
            .entries
            .inner()
            .find(base)
            .sort(doc! { "seq": -1 })
            .limit(page.limit as i64 + 1)
            .await
            .map_err(|e| db_err("history query failed", e))?;

        let mut entries = Vec::with_capacity(page.limit);
        let mut has_more = false;
        while let Some(doc) = cursor.next().await {
            let entry = doc.map_err(|e| db_err("history cursor failed", e))?.into_entry()?;
            if entries.len() < page.limit {
                entries.push(entry);
            } else {
                has_more = true;
                break;
            }
        }

        let next_before_seq = if has_more {
            entries.last().map(|e| e.seq)
        } else {
            None
        };
        Ok(HistoryPage {
            entries,
            next_before_seq,
        })
    }
}

#[async_trait]
impl LedgerStore for MongoLedgerStore {
    async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        let seq = self.next_seq().await?;
        let doc = HistoryDoc {
            _id: None,
            seq,
            asset_id: entry.asset_id,
            action: entry.action,
            version: entry.version as i64,
            timestamp: entry.timestamp,
            wallet_address: entry.wallet_address.clone(),
            wallet_key: entry.wallet_address.to_ascii_lowercase(),
            performed_by: entry.performed_by.clone(),
            performed_by_key: entry.performed_by.to_ascii_lowercase(),
            metadata: entry.metadata,
        };
        self.entries
            .inner()
            .insert_one(doc.clone())
            .await
            .map_err(|e| db_err("ledger append failed", e))?;
        doc.into_entry()
    }

    async fn list_history(
        &self,
        asset_id: &str,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<HistoryPage> {
        self.page(doc! { "asset_id": asset_id }, filter, page).await
    }

    async fn list_actor_history(
        &self,
        address: &str,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<HistoryPage> {
        let key = address.to_ascii_lowercase();
        self.page(
            doc! { "$or": [ { "wallet_key": &key }, { "performed_by_key": &key } ] },
            filter,
            page,
        )
        .await
    }

    async fn all_for_asset(&self, asset_id: &str) -> Result<Vec<HistoryEntry>> {
        let mut cursor = self
            .entries
            .inner()
            .find(doc! { "asset_id": asset_id })
            .sort(doc! { "seq": 1 })
            .await
            .map_err(|e| db_err("history query failed", e))?;

        let mut entries = Vec::new();
        while let Some(doc) = cursor.next().await {
            entries.push(doc.map_err(|e| db_err("history cursor failed", e))?.into_entry()?);
        }
        Ok(entries)
    }

    async fn latest(
        &self,
        asset_id: &str,
        action: crate::ledger::HistoryAction,
    ) -> Result<Option<HistoryEntry>> {
        match self
            .entries
            .inner()
            .find_one(doc! { "asset_id": asset_id, "action": action.as_str() })
            .sort(doc! { "seq": -1 })
            .await
            .map_err(|e| db_err("history query failed", e))?
        {
            Some(doc) => Ok(Some(doc.into_entry()?)),
            None => Ok(None),
        }
    }
}
