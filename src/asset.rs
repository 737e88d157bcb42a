//! Asset domain model
//!
//! The mutable record held by the Asset Record Store. `version_number`
//! increases by exactly 1 per mutating action; soft-deleted assets are
//! excluded from default listings but retained for history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::AnchorPayload;
use crate::metadata::CriticalMetadata;

/// An in-flight ownership transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransfer {
    /// Recipient wallet address
    pub to: String,
    /// When the transfer was initiated
    pub initiated_at: DateTime<Utc>,
}

/// Current state of a digital asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Immutable unique identifier
    pub asset_id: String,

    /// Owner wallet address
    pub owner_address: String,

    /// Authoritative subset, fingerprinted and anchored
    pub critical_metadata: CriticalMetadata,

    /// Additional metadata, not fingerprinted
    #[serde(default)]
    pub non_critical_metadata: serde_json::Map<String, serde_json::Value>,

    /// Monotonic version, starting at 1
    pub version_number: u64,

    /// Soft-deletion flag
    #[serde(default)]
    pub is_deleted: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Reference to the most recent on-chain write
    pub last_anchor_tx_id: Option<String>,

    /// CID of the last-stored critical-metadata blob
    pub last_content_address: Option<String>,

    /// Transfer in flight, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_transfer: Option<PendingTransfer>,
}

impl Asset {
    /// The payload that is (or should be) anchored for this asset's current
    /// critical metadata and owner.
    pub fn anchor_payload(&self) -> AnchorPayload {
        AnchorPayload::new(
            &self.asset_id,
            &self.owner_address,
            self.critical_metadata.clone(),
        )
    }

    /// Case-insensitive owner check (wallet addresses compare hex-insensitive).
    pub fn is_owned_by(&self, address: &str) -> bool {
        self.owner_address.eq_ignore_ascii_case(address)
    }
}
