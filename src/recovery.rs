//! Recovery engine
//!
//! Runs when verification detects divergence. Strategies, in order:
//!
//! 1. **Content-store recovery**: fetch the blob at the anchored CID,
//!    validate its shape, and recheck that its recomputed content address
//!    matches the anchor (the content store itself may be suspect).
//! 2. **Anchor-event recovery**: query the original write event by
//!    transaction id. Repairs stale tx references without touching metadata
//!    content.
//!
//! On success the record store gets the restored state as a new version and
//! an `INTEGRITY_RECOVERY` ledger entry is appended. On failure no asset
//! mutation occurs, but the entry is still appended so the detected tamper
//! event is never lost. Callers hold the asset's mutation scope for the
//! duration of the call.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::{AnchorClient, AssetRecordStore, ContentStore};
use crate::asset::Asset;
use crate::fingerprint::{compute_cid, AnchorPayload};
use crate::ledger::{HistoryAction, LedgerStore, NewHistoryEntry};
use crate::metadata::CriticalMetadata;
use crate::types::Result;
use crate::verify::VerificationResult;

/// Failure classification: blob retrieved but malformed or mismatched shape.
pub const REASON_INVALID_IPFS_METADATA: &str = "retrieved metadata from IPFS is invalid";
/// Failure classification: both strategies exhausted.
pub const REASON_TX_AND_EVENT_FAILED: &str = "transaction and event methods failed";
/// Failure classification: blob unreachable, anchor event alone cannot
/// restore content.
pub const REASON_CONTENT_UNRECOVERABLE: &str =
    "content blob unavailable and anchor event carries no metadata content";

/// Outcome of one recovery attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryOutcome {
    pub recovery_successful: bool,
    /// Field names restored from the anchored blob
    pub restored_fields: BTreeSet<String>,
    /// Failure classification, if unsuccessful
    pub reason: Option<String>,
    pub blockchain_cid: String,
    pub computed_cid: String,
    /// Whether the stale anchor-transaction reference was repaired
    pub tx_hash_corrected: bool,
}

enum ContentAttempt {
    Restored(CriticalMetadata),
    Invalid,
    Unavailable,
}

/// Stateless recovery transformer over the adapter boundary.
#[derive(Clone)]
pub struct RecoveryEngine {
    anchor: Arc<dyn AnchorClient>,
    content: Arc<dyn ContentStore>,
    assets: Arc<dyn AssetRecordStore>,
    ledger: Arc<dyn LedgerStore>,
    adapter_timeout: Duration,
}

impl RecoveryEngine {
    pub fn new(
        anchor: Arc<dyn AnchorClient>,
        content: Arc<dyn ContentStore>,
        assets: Arc<dyn AssetRecordStore>,
        ledger: Arc<dyn LedgerStore>,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            anchor,
            content,
            assets,
            ledger,
            adapter_timeout,
        }
    }

    /// Attempt recovery for an asset whose verification flagged divergence.
    ///
    /// Invoked at most once per verification call; the caller must hold the
    /// asset's mutation scope.
    pub async fn recover(
        &self,
        asset: &Asset,
        verification: &VerificationResult,
        performed_by: &str,
    ) -> Result<RecoveryOutcome> {
        let mut restored: Option<CriticalMetadata> = None;
        let mut tx_hash_corrected = false;
        let mut failure_reason: Option<&str> = None;

        if verification.recovery_needed {
            match self.try_content_recovery(asset, verification).await {
                ContentAttempt::Restored(metadata) => restored = Some(metadata),
                ContentAttempt::Invalid => failure_reason = Some(REASON_INVALID_IPFS_METADATA),
                ContentAttempt::Unavailable => {
                    // Content store suspect or unreachable; the anchor event
                    // can confirm the reference but not restore content.
                    failure_reason = match self.read_event(&verification.anchor_tx_id).await {
                        Some(_) => Some(REASON_CONTENT_UNRECOVERABLE),
                        None => Some(REASON_TX_AND_EVENT_FAILED),
                    };
                }
            }
        } else if verification.tx_id_mismatch {
            // Lightweight path: repair the stale reference only.
            match self.read_event(&verification.anchor_tx_id).await {
                Some(event) if event.content_hash == verification.anchored_cid => {
                    tx_hash_corrected = true;
                }
                _ => failure_reason = Some(REASON_TX_AND_EVENT_FAILED),
            }
        }

        // A content restore also corrects the stored anchor reference.
        if restored.is_some() {
            tx_hash_corrected = asset.last_anchor_tx_id.as_deref()
                != Some(verification.anchor_tx_id.as_str());
        }

        let success = restored.is_some() || tx_hash_corrected;
        if success {
            self.commit_recovery(asset, verification, restored, tx_hash_corrected, performed_by)
                .await
        } else {
            let reason = failure_reason.unwrap_or(REASON_TX_AND_EVENT_FAILED);
            self.log_failure(asset, verification, reason, performed_by)
                .await?;
            warn!(asset_id = %asset.asset_id, reason, "recovery failed; asset left untouched");
            Ok(RecoveryOutcome {
                recovery_successful: false,
                restored_fields: BTreeSet::new(),
                reason: Some(reason.to_string()),
                blockchain_cid: verification.anchored_cid.clone(),
                computed_cid: verification.computed_cid.clone(),
                tx_hash_corrected: false,
            })
        }
    }

    /// Strategy 1: fetch and validate the anchored blob.
    async fn try_content_recovery(
        &self,
        asset: &Asset,
        verification: &VerificationResult,
    ) -> ContentAttempt {
        let fetched = tokio::time::timeout(
            self.adapter_timeout,
            self.content.get(&verification.anchored_cid),
        )
        .await;

        let bytes = match fetched {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => {
                warn!(asset_id = %asset.asset_id, cid = %verification.anchored_cid, "anchored blob not found in content store");
                return ContentAttempt::Unavailable;
            }
            Ok(Err(e)) => {
                warn!(asset_id = %asset.asset_id, error = %e, "content store fetch failed");
                return ContentAttempt::Unavailable;
            }
            Err(_) => {
                warn!(asset_id = %asset.asset_id, "content store fetch timed out");
                return ContentAttempt::Unavailable;
            }
        };

        // The store is only trusted if the bytes hash back to the anchored
        // address.
        if compute_cid(&bytes) != verification.anchored_cid {
            warn!(asset_id = %asset.asset_id, "retrieved blob does not hash to the anchored CID");
            return ContentAttempt::Unavailable;
        }

        let payload = match AnchorPayload::from_bytes(&bytes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(asset_id = %asset.asset_id, error = %e, "anchored blob failed shape validation");
                return ContentAttempt::Invalid;
            }
        };

        if payload.asset_id != asset.asset_id {
            warn!(
                asset_id = %asset.asset_id,
                blob_asset_id = %payload.asset_id,
                "anchored blob belongs to a different asset"
            );
            return ContentAttempt::Invalid;
        }

        ContentAttempt::Restored(payload.critical_metadata)
    }

    /// Strategy 2 helper: the original write event for a transaction.
    async fn read_event(&self, tx_id: &str) -> Option<crate::adapters::AnchorRecord> {
        match tokio::time::timeout(self.adapter_timeout, self.anchor.read_anchor_event(tx_id)).await
        {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                warn!(tx_id, error = %e, "anchor event query failed");
                None
            }
            Err(_) => {
                warn!(tx_id, "anchor event query timed out");
                None
            }
        }
    }

    async fn commit_recovery(
        &self,
        asset: &Asset,
        verification: &VerificationResult,
        restored: Option<CriticalMetadata>,
        tx_hash_corrected: bool,
        performed_by: &str,
    ) -> Result<RecoveryOutcome> {
        let now = Utc::now();
        let restored_fields = restored
            .as_ref()
            .map(|metadata| metadata.diff_fields(&asset.critical_metadata))
            .unwrap_or_default();
        let recovery_source = if restored.is_some() {
            "ipfs"
        } else {
            "anchor_event"
        };

        let mut updated = asset.clone();
        updated.version_number = asset.version_number + 1;
        updated.updated_at = now;
        updated.last_anchor_tx_id = Some(verification.anchor_tx_id.clone());
        updated.last_content_address = Some(verification.anchored_cid.clone());
        if let Some(metadata) = restored {
            updated.critical_metadata = metadata;
        }

        self.assets.write(&updated, asset.version_number).await?;

        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset.asset_id.clone(),
                action: HistoryAction::IntegrityRecovery,
                version: updated.version_number,
                timestamp: now,
                wallet_address: asset.owner_address.clone(),
                performed_by: performed_by.to_string(),
                metadata: serde_json::json!({
                    "succeeded": true,
                    "previous_version": asset.version_number,
                    "new_version": updated.version_number,
                    "blockchain_cid": verification.anchored_cid,
                    "computed_cid": verification.computed_cid,
                    "restored_fields": restored_fields,
                    "tx_hash_corrected": tx_hash_corrected,
                    "recovery_source": recovery_source,
                    "critical_metadata": updated.critical_metadata.to_json(),
                    "content_address": verification.anchored_cid,
                    "anchor_tx_id": verification.anchor_tx_id,
                }),
            })
            .await?;

        info!(
            asset_id = %asset.asset_id,
            new_version = updated.version_number,
            restored = restored_fields.len(),
            tx_hash_corrected,
            "integrity recovery succeeded"
        );

        Ok(RecoveryOutcome {
            recovery_successful: true,
            restored_fields,
            reason: None,
            blockchain_cid: verification.anchored_cid.clone(),
            computed_cid: verification.computed_cid.clone(),
            tx_hash_corrected,
        })
    }

    /// Record the detected-but-unresolved tamper event. No state transition.
    async fn log_failure(
        &self,
        asset: &Asset,
        verification: &VerificationResult,
        reason: &str,
        performed_by: &str,
    ) -> Result<()> {
        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset.asset_id.clone(),
                action: HistoryAction::IntegrityRecovery,
                version: asset.version_number,
                timestamp: Utc::now(),
                wallet_address: asset.owner_address.clone(),
                performed_by: performed_by.to_string(),
                metadata: serde_json::json!({
                    "succeeded": false,
                    "reason": reason,
                    "blockchain_cid": verification.anchored_cid,
                    "computed_cid": verification.computed_cid,
                }),
            })
            .await?;
        Ok(())
    }
}
