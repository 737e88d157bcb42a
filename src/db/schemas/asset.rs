//! Asset document schema

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, PendingTransfer};
use crate::db::mongo::IntoIndexes;
use crate::metadata::CriticalMetadata;
use crate::types::{AnchorageError, Result};

/// Collection name for asset records
pub const ASSET_COLLECTION: &str = "assets";

/// Pending transfer as stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PendingTransferDoc {
    pub to: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub initiated_at: DateTime<Utc>,
}

/// Asset record document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssetDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub asset_id: String,

    pub owner_address: String,

    /// Lowercased owner address for case-insensitive lookups
    pub owner_key: String,

    pub critical_metadata: CriticalMetadata,

    #[serde(default)]
    pub non_critical_metadata: serde_json::Map<String, serde_json::Value>,

    /// BSON has no u64; versions fit comfortably in i64
    pub version_number: i64,

    #[serde(default)]
    pub is_deleted: bool,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_anchor_tx_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_content_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_transfer: Option<PendingTransferDoc>,
}

impl AssetDoc {
    pub fn from_asset(asset: &Asset) -> Self {
        Self {
            _id: None,
            asset_id: asset.asset_id.clone(),
            owner_address: asset.owner_address.clone(),
            owner_key: asset.owner_address.to_ascii_lowercase(),
            critical_metadata: asset.critical_metadata.clone(),
            non_critical_metadata: asset.non_critical_metadata.clone(),
            version_number: asset.version_number as i64,
            is_deleted: asset.is_deleted,
            created_at: asset.created_at,
            updated_at: asset.updated_at,
            last_anchor_tx_id: asset.last_anchor_tx_id.clone(),
            last_content_address: asset.last_content_address.clone(),
            pending_transfer: asset.pending_transfer.as_ref().map(|p| PendingTransferDoc {
                to: p.to.clone(),
                initiated_at: p.initiated_at,
            }),
        }
    }

    pub fn into_asset(self) -> Result<Asset> {
        let version_number = u64::try_from(self.version_number).map_err(|_| {
            AnchorageError::Database(format!(
                "asset {} has negative version {}",
                self.asset_id, self.version_number
            ))
        })?;
        Ok(Asset {
            asset_id: self.asset_id,
            owner_address: self.owner_address,
            critical_metadata: self.critical_metadata,
            non_critical_metadata: self.non_critical_metadata,
            version_number,
            is_deleted: self.is_deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_anchor_tx_id: self.last_anchor_tx_id,
            last_content_address: self.last_content_address,
            pending_transfer: self.pending_transfer.map(|p| PendingTransfer {
                to: p.to,
                initiated_at: p.initiated_at,
            }),
        })
    }
}

impl IntoIndexes for AssetDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on asset_id; backs the must-not-exist create path
            (
                doc! { "asset_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("asset_id_unique".to_string())
                        .build(),
                ),
            ),
            // Index on owner_key for listings
            (
                doc! { "owner_key": 1 },
                Some(
                    IndexOptions::builder()
                        .name("owner_key_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
