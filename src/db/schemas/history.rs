//! History ledger document schemas

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::ledger::{HistoryAction, HistoryEntry};
use crate::types::{AnchorageError, Result};

/// Collection name for ledger entries
pub const HISTORY_COLLECTION: &str = "history";

/// Collection name for sequence counters
pub const COUNTER_COLLECTION: &str = "counters";

/// Counter id for the ledger sequence
pub const HISTORY_SEQ_COUNTER: &str = "history_seq";

/// Ledger entry document stored in MongoDB. Never updated after insert.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HistoryDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Monotonic sequence number (BSON has no u64)
    pub seq: i64,

    pub asset_id: String,

    pub action: HistoryAction,

    pub version: i64,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,

    pub wallet_address: String,

    /// Lowercased wallet address for case-insensitive queries
    pub wallet_key: String,

    pub performed_by: String,

    /// Lowercased actor address for case-insensitive queries
    pub performed_by_key: String,

    pub metadata: serde_json::Value,
}

impl HistoryDoc {
    pub fn into_entry(self) -> Result<HistoryEntry> {
        let seq = u64::try_from(self.seq).map_err(|_| {
            AnchorageError::Ledger(format!("entry for {} has negative seq {}", self.asset_id, self.seq))
        })?;
        let version = u64::try_from(self.version).map_err(|_| {
            AnchorageError::Ledger(format!(
                "entry seq {} for {} has negative version {}",
                self.seq, self.asset_id, self.version
            ))
        })?;
        Ok(HistoryEntry {
            seq,
            asset_id: self.asset_id,
            action: self.action,
            version,
            timestamp: self.timestamp,
            wallet_address: self.wallet_address,
            performed_by: self.performed_by,
            metadata: self.metadata,
        })
    }
}

impl IntoIndexes for HistoryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on seq; the counter makes collisions impossible,
            // the index makes them loud
            (
                doc! { "seq": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("seq_unique".to_string())
                        .build(),
                ),
            ),
            // Asset history paging (newest first)
            (
                doc! { "asset_id": 1, "seq": -1 },
                Some(
                    IndexOptions::builder()
                        .name("asset_seq_index".to_string())
                        .build(),
                ),
            ),
            // Actor history queries
            (
                doc! { "performed_by_key": 1, "seq": -1 },
                Some(
                    IndexOptions::builder()
                        .name("actor_seq_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "wallet_key": 1, "seq": -1 },
                Some(
                    IndexOptions::builder()
                        .name("wallet_seq_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

/// Sequence counter document, bumped atomically via `$inc`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SeqCounterDoc {
    pub _id: String,
    pub value: i64,
}

impl IntoIndexes for SeqCounterDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        Vec::new()
    }
}
