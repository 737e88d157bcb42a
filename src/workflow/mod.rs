//! Asset lifecycle workflow
//!
//! Orchestrates all mutating operations and the verified read path. Every
//! mutation runs inside the asset's mutation scope (see [`locks`]) as one
//! critical section: read current state, decide, perform adapter I/O, then
//! commit the record-store write and the ledger append. Reads verify without
//! the scope; a recovery write acquires it first.

mod locks;

pub use locks::SharedAssetLocks;

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::{AnchorClient, AssetRecordStore, ContentStore};
use crate::asset::{Asset, PendingTransfer};
use crate::config::EngineConfig;
use crate::fingerprint::AnchorPayload;
use crate::ledger::{
    csv_header, fold_history, ExportRow, HistoryAction, HistoryFilter, HistoryPage, LedgerStore,
    NewHistoryEntry, PageRequest, WalletSummary,
};
use crate::metadata::CriticalMetadata;
use crate::recovery::{RecoveryEngine, RecoveryOutcome};
use crate::types::{AnchorageError, Result};
use crate::verify::{VerificationEngine, VerificationResult};

/// How a read's verification concluded.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationReport {
    /// Verification ran; see the result for the outcome
    Checked(VerificationResult),
    /// Adapter outage; the asset is last-known state, unverified
    Skipped { reason: String },
}

/// Result of a verified read.
#[derive(Debug, Clone, Serialize)]
pub struct RetrieveOutcome {
    pub asset: Asset,
    pub verification: VerificationReport,
    /// Present when a recovery attempt ran during this read
    pub recovery: Option<RecoveryOutcome>,
    /// Auto-recovery was skipped because the last attempt for this version
    /// already failed; re-trigger administratively via `force_recover`
    pub recovery_suppressed: bool,
}

/// Lifecycle orchestrator over the adapter boundary.
pub struct AssetWorkflow {
    assets: Arc<dyn AssetRecordStore>,
    ledger: Arc<dyn LedgerStore>,
    anchor: Arc<dyn AnchorClient>,
    content: Arc<dyn ContentStore>,
    verifier: VerificationEngine,
    recovery: RecoveryEngine,
    locks: SharedAssetLocks,
    config: EngineConfig,
}

impl AssetWorkflow {
    pub fn new(
        assets: Arc<dyn AssetRecordStore>,
        ledger: Arc<dyn LedgerStore>,
        anchor: Arc<dyn AnchorClient>,
        content: Arc<dyn ContentStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            verifier: VerificationEngine::new(anchor.clone(), config.adapter_timeout),
            recovery: RecoveryEngine::new(
                anchor.clone(),
                content.clone(),
                assets.clone(),
                ledger.clone(),
                config.adapter_timeout,
            ),
            assets,
            ledger,
            anchor,
            content,
            locks: SharedAssetLocks::new(),
            config,
        }
    }

    // ========================================================================
    // Adapter helpers (timeout-bounded)
    // ========================================================================

    async fn put_blob(&self, bytes: Vec<u8>) -> Result<String> {
        tokio::time::timeout(self.config.adapter_timeout, self.content.put(Bytes::from(bytes)))
            .await
            .map_err(|_| AnchorageError::AdapterUnavailable("content store put timed out".into()))?
    }

    async fn write_anchor(&self, asset_id: &str, content_hash: &str) -> Result<String> {
        tokio::time::timeout(
            self.config.adapter_timeout,
            self.anchor.write_anchor(asset_id, content_hash),
        )
        .await
        .map_err(|_| AnchorageError::AdapterUnavailable("anchor write timed out".into()))?
    }

    /// Store the canonical blob and anchor its address. All adapter I/O for a
    /// mutation happens here, before anything is committed.
    async fn anchor_payload(&self, payload: &AnchorPayload) -> Result<(String, String)> {
        let bytes = payload.canonical_bytes()?;
        let cid = self.put_blob(bytes).await?;
        let tx_id = self.write_anchor(&payload.asset_id, &cid).await?;
        Ok((cid, tx_id))
    }

    async fn read_required(&self, asset_id: &str) -> Result<Asset> {
        self.assets
            .read(asset_id)
            .await?
            .ok_or_else(|| AnchorageError::NotFound(format!("asset {}", asset_id)))
    }

    async fn read_active(&self, asset_id: &str) -> Result<Asset> {
        let asset = self.read_required(asset_id).await?;
        if asset.is_deleted {
            return Err(AnchorageError::NotFound(format!(
                "asset {} is deleted",
                asset_id
            )));
        }
        Ok(asset)
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Create a new asset at version 1, anchoring its critical metadata.
    pub async fn create_asset(
        &self,
        asset_id: &str,
        owner_address: &str,
        critical_metadata: &serde_json::Value,
        non_critical_metadata: serde_json::Map<String, serde_json::Value>,
        performed_by: &str,
    ) -> Result<Asset> {
        let critical = CriticalMetadata::from_json(critical_metadata)?;
        let _scope = self.locks.acquire(asset_id).await;

        if self.assets.read(asset_id).await?.is_some() {
            return Err(AnchorageError::AlreadyExists(asset_id.to_string()));
        }

        let payload = AnchorPayload::new(asset_id, owner_address, critical.clone());
        let (cid, tx_id) = self.anchor_payload(&payload).await?;

        let now = Utc::now();
        let asset = Asset {
            asset_id: asset_id.to_string(),
            owner_address: owner_address.to_string(),
            critical_metadata: critical,
            non_critical_metadata,
            version_number: 1,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            last_anchor_tx_id: Some(tx_id.clone()),
            last_content_address: Some(cid.clone()),
            pending_transfer: None,
        };

        self.assets.write(&asset, 0).await?;
        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset_id.to_string(),
                action: HistoryAction::Create,
                version: 1,
                timestamp: now,
                wallet_address: owner_address.to_string(),
                performed_by: performed_by.to_string(),
                metadata: serde_json::json!({
                    "critical_metadata": asset.critical_metadata.to_json(),
                    "non_critical_metadata": asset.non_critical_metadata,
                    "content_address": cid,
                    "anchor_tx_id": tx_id,
                }),
            })
            .await?;

        info!(asset_id, owner = owner_address, "asset created");
        Ok(asset)
    }

    /// New version with changed critical metadata (re-anchors).
    pub async fn create_new_version(
        &self,
        asset_id: &str,
        critical_metadata: &serde_json::Value,
        non_critical_metadata: Option<serde_json::Map<String, serde_json::Value>>,
        performed_by: &str,
    ) -> Result<Asset> {
        let critical = CriticalMetadata::from_json(critical_metadata)?;
        let _scope = self.locks.acquire(asset_id).await;
        let current = self.read_active(asset_id).await?;

        let payload = AnchorPayload::new(asset_id, &current.owner_address, critical.clone());
        let (cid, tx_id) = self.anchor_payload(&payload).await?;

        let now = Utc::now();
        let mut updated = current.clone();
        updated.critical_metadata = critical;
        if let Some(non_critical) = non_critical_metadata {
            updated.non_critical_metadata = non_critical;
        }
        updated.version_number = current.version_number + 1;
        updated.updated_at = now;
        updated.last_anchor_tx_id = Some(tx_id.clone());
        updated.last_content_address = Some(cid.clone());

        self.assets.write(&updated, current.version_number).await?;
        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset_id.to_string(),
                action: HistoryAction::VersionCreate,
                version: updated.version_number,
                timestamp: now,
                wallet_address: updated.owner_address.clone(),
                performed_by: performed_by.to_string(),
                metadata: serde_json::json!({
                    "critical_metadata": updated.critical_metadata.to_json(),
                    "non_critical_metadata": updated.non_critical_metadata,
                    "content_address": cid,
                    "anchor_tx_id": tx_id,
                    "previous_version": current.version_number,
                }),
            })
            .await?;

        info!(asset_id, version = updated.version_number, "new version created");
        Ok(updated)
    }

    /// Update only non-critical metadata; no re-anchor needed.
    pub async fn update_non_critical(
        &self,
        asset_id: &str,
        non_critical_metadata: serde_json::Map<String, serde_json::Value>,
        performed_by: &str,
    ) -> Result<Asset> {
        let _scope = self.locks.acquire(asset_id).await;
        let current = self.read_active(asset_id).await?;

        let now = Utc::now();
        let mut updated = current.clone();
        updated.non_critical_metadata = non_critical_metadata;
        updated.version_number = current.version_number + 1;
        updated.updated_at = now;

        self.assets.write(&updated, current.version_number).await?;
        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset_id.to_string(),
                action: HistoryAction::Update,
                version: updated.version_number,
                timestamp: now,
                wallet_address: updated.owner_address.clone(),
                performed_by: performed_by.to_string(),
                metadata: serde_json::json!({
                    "non_critical_metadata": updated.non_critical_metadata,
                }),
            })
            .await?;

        Ok(updated)
    }

    /// Soft delete; the asset stays in the store for history.
    pub async fn delete_asset(
        &self,
        asset_id: &str,
        performed_by: &str,
        reason: Option<&str>,
    ) -> Result<Asset> {
        let _scope = self.locks.acquire(asset_id).await;
        let current = self.read_active(asset_id).await?;

        let now = Utc::now();
        let mut updated = current.clone();
        updated.is_deleted = true;
        updated.version_number = current.version_number + 1;
        updated.updated_at = now;

        self.assets.write(&updated, current.version_number).await?;
        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset_id.to_string(),
                action: HistoryAction::Delete,
                version: updated.version_number,
                timestamp: now,
                wallet_address: updated.owner_address.clone(),
                performed_by: performed_by.to_string(),
                metadata: serde_json::json!({ "reason": reason }),
            })
            .await?;

        info!(asset_id, deleted_by = performed_by, "asset soft-deleted");
        Ok(updated)
    }

    /// Bring a deleted asset back, continuing its version sequence.
    pub async fn recreate_deleted(
        &self,
        asset_id: &str,
        critical_metadata: &serde_json::Value,
        non_critical_metadata: Option<serde_json::Map<String, serde_json::Value>>,
        performed_by: &str,
    ) -> Result<Asset> {
        let critical = CriticalMetadata::from_json(critical_metadata)?;
        let _scope = self.locks.acquire(asset_id).await;
        let current = self.read_required(asset_id).await?;
        if !current.is_deleted {
            return Err(AnchorageError::AlreadyExists(format!(
                "asset {} is not deleted",
                asset_id
            )));
        }

        let payload = AnchorPayload::new(asset_id, &current.owner_address, critical.clone());
        let (cid, tx_id) = self.anchor_payload(&payload).await?;

        let now = Utc::now();
        let mut updated = current.clone();
        updated.critical_metadata = critical;
        if let Some(non_critical) = non_critical_metadata {
            updated.non_critical_metadata = non_critical;
        }
        updated.is_deleted = false;
        updated.version_number = current.version_number + 1;
        updated.updated_at = now;
        updated.last_anchor_tx_id = Some(tx_id.clone());
        updated.last_content_address = Some(cid.clone());

        self.assets.write(&updated, current.version_number).await?;
        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset_id.to_string(),
                action: HistoryAction::RecreateDeleted,
                version: updated.version_number,
                timestamp: now,
                wallet_address: updated.owner_address.clone(),
                performed_by: performed_by.to_string(),
                metadata: serde_json::json!({
                    "critical_metadata": updated.critical_metadata.to_json(),
                    "non_critical_metadata": updated.non_critical_metadata,
                    "content_address": cid,
                    "anchor_tx_id": tx_id,
                }),
            })
            .await?;

        Ok(updated)
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    pub async fn initiate_transfer(
        &self,
        asset_id: &str,
        current_owner: &str,
        new_owner: &str,
        notes: Option<&str>,
    ) -> Result<Asset> {
        let _scope = self.locks.acquire(asset_id).await;
        let current = self.read_active(asset_id).await?;

        if !current.is_owned_by(current_owner) {
            return Err(AnchorageError::Unauthorized(
                "only the asset owner can initiate a transfer".into(),
            ));
        }
        if current.pending_transfer.is_some() {
            return Err(AnchorageError::TransferPending(asset_id.to_string()));
        }

        let now = Utc::now();
        let mut updated = current.clone();
        updated.pending_transfer = Some(PendingTransfer {
            to: new_owner.to_string(),
            initiated_at: now,
        });
        updated.version_number = current.version_number + 1;
        updated.updated_at = now;

        self.assets.write(&updated, current.version_number).await?;
        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset_id.to_string(),
                action: HistoryAction::TransferInitiated,
                version: updated.version_number,
                timestamp: now,
                wallet_address: current.owner_address.clone(),
                performed_by: current_owner.to_string(),
                metadata: serde_json::json!({
                    "from": current.owner_address,
                    "to": new_owner,
                    "notes": notes,
                }),
            })
            .await?;

        info!(asset_id, from = %current.owner_address, to = new_owner, "transfer initiated");
        Ok(updated)
    }

    /// Accept a pending transfer. Ownership is part of the anchored payload,
    /// so completion re-anchors.
    pub async fn complete_transfer(&self, asset_id: &str, accepting_owner: &str) -> Result<Asset> {
        let _scope = self.locks.acquire(asset_id).await;
        let current = self.read_active(asset_id).await?;

        let pending = current
            .pending_transfer
            .clone()
            .ok_or_else(|| AnchorageError::NoPendingTransfer(asset_id.to_string()))?;
        if !pending.to.eq_ignore_ascii_case(accepting_owner) {
            return Err(AnchorageError::Unauthorized(
                "only the pending recipient can complete a transfer".into(),
            ));
        }

        let payload = AnchorPayload::new(asset_id, &pending.to, current.critical_metadata.clone());
        let (cid, tx_id) = self.anchor_payload(&payload).await?;

        let now = Utc::now();
        let mut updated = current.clone();
        updated.owner_address = pending.to.clone();
        updated.pending_transfer = None;
        updated.version_number = current.version_number + 1;
        updated.updated_at = now;
        updated.last_anchor_tx_id = Some(tx_id.clone());
        updated.last_content_address = Some(cid.clone());

        self.assets.write(&updated, current.version_number).await?;
        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset_id.to_string(),
                action: HistoryAction::TransferCompleted,
                version: updated.version_number,
                timestamp: now,
                wallet_address: updated.owner_address.clone(),
                performed_by: accepting_owner.to_string(),
                metadata: serde_json::json!({
                    "from": current.owner_address,
                    "to": updated.owner_address,
                    "content_address": cid,
                    "anchor_tx_id": tx_id,
                }),
            })
            .await?;

        info!(asset_id, new_owner = %updated.owner_address, "transfer completed");
        Ok(updated)
    }

    pub async fn cancel_transfer(&self, asset_id: &str, requester: &str) -> Result<Asset> {
        let _scope = self.locks.acquire(asset_id).await;
        let current = self.read_active(asset_id).await?;

        let pending = current
            .pending_transfer
            .clone()
            .ok_or_else(|| AnchorageError::NoPendingTransfer(asset_id.to_string()))?;
        if !current.is_owned_by(requester) && !pending.to.eq_ignore_ascii_case(requester) {
            return Err(AnchorageError::Unauthorized(
                "only the owner or the pending recipient can cancel a transfer".into(),
            ));
        }

        let now = Utc::now();
        let mut updated = current.clone();
        updated.pending_transfer = None;
        updated.version_number = current.version_number + 1;
        updated.updated_at = now;

        self.assets.write(&updated, current.version_number).await?;
        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset_id.to_string(),
                action: HistoryAction::TransferCancelled,
                version: updated.version_number,
                timestamp: now,
                wallet_address: current.owner_address.clone(),
                performed_by: requester.to_string(),
                metadata: serde_json::json!({ "to": pending.to }),
            })
            .await?;

        Ok(updated)
    }

    // ========================================================================
    // Verified reads and recovery
    // ========================================================================

    /// Read an asset, verifying its critical metadata against the anchor.
    ///
    /// An adapter outage never blocks the read: the last-known state is
    /// returned with an explicit "verification skipped" marker. At most one
    /// recovery attempt runs per call, and a previously failed attempt for
    /// the same version suppresses further automatic attempts.
    pub async fn retrieve(
        &self,
        asset_id: &str,
        auto_recover: bool,
        initiator: Option<&str>,
    ) -> Result<RetrieveOutcome> {
        let asset = self.read_active(asset_id).await?;

        let mut result = match self.verifier.verify(&asset).await {
            Ok(result) => result,
            Err(e) if e.is_transient() => {
                warn!(asset_id, error = %e, "verification skipped, adapter unavailable");
                return Ok(RetrieveOutcome {
                    asset,
                    verification: VerificationReport::Skipped {
                        reason: e.to_string(),
                    },
                    recovery: None,
                    recovery_suppressed: false,
                });
            }
            Err(e) => return Err(e),
        };

        if !result.needs_any_recovery() {
            return Ok(RetrieveOutcome {
                asset,
                verification: VerificationReport::Checked(result),
                recovery: None,
                recovery_suppressed: false,
            });
        }

        if !auto_recover {
            return Ok(RetrieveOutcome {
                asset,
                verification: VerificationReport::Checked(result),
                recovery: None,
                recovery_suppressed: false,
            });
        }

        if self.recovery_suppressed(&asset).await? {
            warn!(
                asset_id,
                version = asset.version_number,
                "auto-recovery suppressed after a failed attempt; re-trigger via force_recover"
            );
            return Ok(RetrieveOutcome {
                asset,
                verification: VerificationReport::Checked(result),
                recovery: None,
                recovery_suppressed: true,
            });
        }

        let _scope = self.locks.acquire(asset_id).await;
        let fresh = self.read_active(asset_id).await?;
        if fresh.version_number != asset.version_number {
            // Another writer advanced the asset while we waited for the
            // scope; the next read re-verifies the new state.
            return Ok(RetrieveOutcome {
                asset: fresh,
                verification: VerificationReport::Checked(result),
                recovery: None,
                recovery_suppressed: false,
            });
        }

        let actor = initiator.unwrap_or(fresh.owner_address.as_str()).to_string();
        let outcome = self.recovery.recover(&fresh, &result, &actor).await?;
        result.recovery_successful = Some(outcome.recovery_successful);

        let asset = if outcome.recovery_successful {
            self.read_active(asset_id).await?
        } else {
            fresh
        };

        Ok(RetrieveOutcome {
            asset,
            verification: VerificationReport::Checked(result),
            recovery: Some(outcome),
            recovery_suppressed: false,
        })
    }

    /// Administrative re-trigger, bypassing suppression.
    pub async fn force_recover(
        &self,
        asset_id: &str,
        performed_by: &str,
    ) -> Result<Option<RecoveryOutcome>> {
        let _scope = self.locks.acquire(asset_id).await;
        let asset = self.read_active(asset_id).await?;
        let result = self.verifier.verify(&asset).await?;
        if !result.needs_any_recovery() {
            return Ok(None);
        }
        let outcome = self.recovery.recover(&asset, &result, performed_by).await?;
        Ok(Some(outcome))
    }

    /// Whether the latest recovery attempt for the asset's current version
    /// already failed.
    async fn recovery_suppressed(&self, asset: &Asset) -> Result<bool> {
        let latest = self
            .ledger
            .latest(&asset.asset_id, HistoryAction::IntegrityRecovery)
            .await?;
        Ok(match latest {
            Some(entry) => {
                entry.version == asset.version_number
                    && entry.metadata.get("succeeded").and_then(|v| v.as_bool()) == Some(false)
            }
            None => false,
        })
    }

    /// Reconcile the record store's deletion flag against the folded ledger.
    /// Administrative repair path for desyncs that bypassed the engine.
    pub async fn restore_deletion_status(
        &self,
        asset_id: &str,
        performed_by: &str,
    ) -> Result<Option<Asset>> {
        let _scope = self.locks.acquire(asset_id).await;
        let current = self.read_required(asset_id).await?;

        let entries = self.ledger.all_for_asset(asset_id).await?;
        let folded = fold_history(&entries)?
            .ok_or_else(|| AnchorageError::Ledger(format!("no ledger for asset {}", asset_id)))?;

        if folded.is_deleted == current.is_deleted {
            return Ok(None);
        }

        let now = Utc::now();
        let mut updated = current.clone();
        updated.is_deleted = folded.is_deleted;
        updated.version_number = current.version_number + 1;
        updated.updated_at = now;

        self.assets.write(&updated, current.version_number).await?;
        self.ledger
            .append(NewHistoryEntry {
                asset_id: asset_id.to_string(),
                action: HistoryAction::DeletionStatusRestored,
                version: updated.version_number,
                timestamp: now,
                wallet_address: updated.owner_address.clone(),
                performed_by: performed_by.to_string(),
                metadata: serde_json::json!({
                    "is_deleted": updated.is_deleted,
                    "recovery_source": "ledger_fold",
                }),
            })
            .await?;

        info!(asset_id, is_deleted = updated.is_deleted, "deletion status restored");
        Ok(Some(updated))
    }

    // ========================================================================
    // History queries
    // ========================================================================

    pub async fn history(
        &self,
        asset_id: &str,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<HistoryPage> {
        self.ledger.list_history(asset_id, filter, page).await
    }

    pub async fn actor_history(
        &self,
        address: &str,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<HistoryPage> {
        self.ledger.list_actor_history(address, filter, page).await
    }

    /// Aggregate a wallet's ledger activity, paging through the full history.
    pub async fn wallet_summary(&self, address: &str) -> Result<WalletSummary> {
        let mut entries = Vec::new();
        let mut before_seq = None;
        loop {
            let page = self
                .ledger
                .list_actor_history(
                    address,
                    &HistoryFilter::default(),
                    &PageRequest {
                        limit: self.config.history_page_size,
                        before_seq,
                    },
                )
                .await?;
            entries.extend(page.entries);
            match page.next_before_seq {
                Some(cursor) => before_seq = Some(cursor),
                None => break,
            }
        }
        Ok(WalletSummary::from_entries(address, &entries))
    }

    /// Full history as CSV, newest first, for external export.
    pub async fn export_history_csv(&self, asset_id: &str) -> Result<String> {
        let entries = self.ledger.all_for_asset(asset_id).await?;
        let mut out = String::from(csv_header());
        for entry in entries.iter().rev() {
            out.push('\n');
            out.push_str(&ExportRow::from_entry(entry).to_csv_row());
        }
        Ok(out)
    }

    pub async fn list_by_owner(&self, owner: &str, include_deleted: bool) -> Result<Vec<Asset>> {
        self.assets.list_by_owner(owner, include_deleted).await
    }

    /// All current asset ids, for integrity sweeps.
    pub async fn list_asset_ids(&self) -> Result<Vec<String>> {
        self.assets.list_ids().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        MemoryAnchorClient, MemoryAssetStore, MemoryContentStore, MemoryLedgerStore,
    };
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        workflow: AssetWorkflow,
        anchor: Arc<MemoryAnchorClient>,
        content: Arc<MemoryContentStore>,
        assets: Arc<MemoryAssetStore>,
        ledger: Arc<MemoryLedgerStore>,
    }

    fn harness() -> Harness {
        let anchor = Arc::new(MemoryAnchorClient::new());
        let content = Arc::new(MemoryContentStore::new());
        let assets = Arc::new(MemoryAssetStore::new());
        let ledger = Arc::new(MemoryLedgerStore::new());
        let workflow = AssetWorkflow::new(
            assets.clone(),
            ledger.clone(),
            anchor.clone(),
            content.clone(),
            EngineConfig {
                adapter_timeout: Duration::from_secs(5),
                history_page_size: 10,
            },
        );
        Harness {
            workflow,
            anchor,
            content,
            assets,
            ledger,
        }
    }

    async fn create(h: &Harness, asset_id: &str, owner: &str) -> Asset {
        h.workflow
            .create_asset(asset_id, owner, &json!({"name": "x"}), Default::default(), owner)
            .await
            .unwrap()
    }

    fn checked(outcome: &RetrieveOutcome) -> &VerificationResult {
        match &outcome.verification {
            VerificationReport::Checked(result) => result,
            VerificationReport::Skipped { reason } => {
                panic!("expected checked verification, got skipped: {}", reason)
            }
        }
    }

    #[tokio::test]
    async fn clean_asset_verifies_on_read() {
        let h = harness();
        create(&h, "a1", "0xowner").await;

        let outcome = h.workflow.retrieve("a1", true, None).await.unwrap();
        let result = checked(&outcome);
        assert!(result.verified);
        assert!(!result.recovery_needed);
        assert!(outcome.recovery.is_none());
        assert_eq!(outcome.asset.version_number, 1);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let h = harness();
        create(&h, "a1", "0xowner").await;
        let err = h
            .workflow
            .create_asset("a1", "0xowner", &json!({"name": "x"}), Default::default(), "0xowner")
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn tampered_read_auto_recovers() {
        let h = harness();
        let asset = create(&h, "a1", "0xowner").await;

        // Direct off-chain mutation, bypassing the engine
        let mut bad = asset.clone();
        bad.critical_metadata = CriticalMetadata::from_json(&json!({"name": "y"})).unwrap();
        h.assets.tamper(bad);

        let outcome = h.workflow.retrieve("a1", true, None).await.unwrap();
        let result = checked(&outcome);
        assert!(!result.verified);
        assert_eq!(result.recovery_successful, Some(true));
        assert_eq!(
            outcome.asset.critical_metadata.to_json(),
            json!({"name": "x"})
        );
        assert_eq!(outcome.asset.version_number, 2);

        let entry = h
            .ledger
            .latest("a1", HistoryAction::IntegrityRecovery)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.metadata["succeeded"], json!(true));
    }

    #[tokio::test]
    async fn failed_recovery_is_not_retried_on_next_read() {
        let h = harness();
        let asset = create(&h, "a1", "0xowner").await;

        let mut bad = asset.clone();
        bad.critical_metadata = CriticalMetadata::from_json(&json!({"name": "y"})).unwrap();
        h.assets.tamper(bad.clone());

        // Make both recovery strategies fail
        h.content.remove(asset.last_content_address.as_deref().unwrap());
        h.anchor.clear_events();

        let first = h.workflow.retrieve("a1", true, None).await.unwrap();
        assert_eq!(
            first.recovery.as_ref().map(|o| o.recovery_successful),
            Some(false)
        );
        assert_eq!(h.assets.read("a1").await.unwrap().unwrap(), bad);

        // Second read: suppressed, no second ledger entry
        let second = h.workflow.retrieve("a1", true, None).await.unwrap();
        assert!(second.recovery_suppressed);
        assert!(second.recovery.is_none());

        let entries = h.ledger.all_for_asset("a1").await.unwrap();
        let attempts = entries
            .iter()
            .filter(|e| e.action == HistoryAction::IntegrityRecovery)
            .count();
        assert_eq!(attempts, 1);

        // Administrative re-trigger bypasses suppression
        let forced = h.workflow.force_recover("a1", "0xadmin").await.unwrap();
        assert_eq!(forced.map(|o| o.recovery_successful), Some(false));
        let entries = h.ledger.all_for_asset("a1").await.unwrap();
        let attempts = entries
            .iter()
            .filter(|e| e.action == HistoryAction::IntegrityRecovery)
            .count();
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn outage_returns_last_known_state() {
        let h = harness();
        create(&h, "a1", "0xowner").await;
        h.anchor.set_unavailable(true);

        let outcome = h.workflow.retrieve("a1", true, None).await.unwrap();
        assert!(matches!(
            outcome.verification,
            VerificationReport::Skipped { .. }
        ));
        assert!(outcome.recovery.is_none());
        assert_eq!(outcome.asset.version_number, 1);
    }

    #[tokio::test]
    async fn version_conflict_on_concurrent_update() {
        let h = harness();
        let asset = create(&h, "a1", "0xowner").await;

        // Two writers sharing the same stale read, bypassing the workflow's
        // mutation scope: the optimistic check must reject the second.
        let mut first = asset.clone();
        first.version_number = 2;
        let mut second = asset.clone();
        second.version_number = 2;

        h.assets.write(&first, 1).await.unwrap();
        let err = h.assets.write(&second, 1).await.unwrap_err();
        assert!(matches!(
            err,
            AnchorageError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn serialized_updates_have_gap_free_versions() {
        let h = Arc::new(harness());
        create(&h, "a2", "0xowner").await;

        let mut handles = Vec::new();
        for i in 0..5 {
            let h = h.clone();
            handles.push(tokio::spawn(async move {
                let mut non_critical = serde_json::Map::new();
                non_critical.insert("i".into(), json!(i));
                h.workflow
                    .update_non_critical("a2", non_critical, "0xowner")
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entries = h.ledger.all_for_asset("a2").await.unwrap();
        let versions: Vec<u64> = entries.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn fold_reproduces_current_state() {
        let h = harness();
        create(&h, "a1", "0xalice").await;

        let mut non_critical = serde_json::Map::new();
        non_critical.insert("note".into(), json!("hello"));
        h.workflow
            .update_non_critical("a1", non_critical, "0xalice")
            .await
            .unwrap();
        h.workflow
            .create_new_version("a1", &json!({"name": "x2", "size": 7}), None, "0xalice")
            .await
            .unwrap();
        h.workflow
            .initiate_transfer("a1", "0xalice", "0xbob", Some("gift"))
            .await
            .unwrap();
        h.workflow.complete_transfer("a1", "0xbob").await.unwrap();
        h.workflow
            .delete_asset("a1", "0xbob", Some("cleanup"))
            .await
            .unwrap();
        h.workflow
            .recreate_deleted("a1", &json!({"name": "x3"}), None, "0xbob")
            .await
            .unwrap();

        let stored = h.assets.read("a1").await.unwrap().unwrap();
        let entries = h.ledger.all_for_asset("a1").await.unwrap();
        let folded = fold_history(&entries).unwrap().unwrap();
        assert_eq!(folded, stored);
        assert_eq!(stored.version_number, 7);
        assert_eq!(stored.owner_address, "0xbob");
    }

    #[tokio::test]
    async fn transfer_rules_are_enforced() {
        let h = harness();
        create(&h, "a1", "0xalice").await;

        let err = h
            .workflow
            .initiate_transfer("a1", "0xmallory", "0xbob", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorageError::Unauthorized(_)));

        h.workflow
            .initiate_transfer("a1", "0xAlice", "0xbob", None) // owner match is case-insensitive
            .await
            .unwrap();

        let err = h
            .workflow
            .initiate_transfer("a1", "0xalice", "0xcarol", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorageError::TransferPending(_)));

        let err = h.workflow.complete_transfer("a1", "0xcarol").await.unwrap_err();
        assert!(matches!(err, AnchorageError::Unauthorized(_)));

        let asset = h.workflow.cancel_transfer("a1", "0xbob").await.unwrap();
        assert!(asset.pending_transfer.is_none());
        assert_eq!(asset.owner_address, "0xalice");

        let err = h.workflow.cancel_transfer("a1", "0xalice").await.unwrap_err();
        assert!(matches!(err, AnchorageError::NoPendingTransfer(_)));
    }

    #[tokio::test]
    async fn transfer_completion_still_verifies() {
        let h = harness();
        create(&h, "a1", "0xalice").await;
        h.workflow
            .initiate_transfer("a1", "0xalice", "0xbob", None)
            .await
            .unwrap();
        h.workflow.complete_transfer("a1", "0xbob").await.unwrap();

        // Ownership is part of the anchored payload; completion re-anchored
        let outcome = h.workflow.retrieve("a1", true, None).await.unwrap();
        assert!(checked(&outcome).verified);
        assert_eq!(outcome.asset.owner_address, "0xbob");
    }

    #[tokio::test]
    async fn deleted_assets_hidden_from_default_listing() {
        let h = harness();
        create(&h, "a1", "0xowner").await;
        create(&h, "a2", "0xowner").await;
        h.workflow.delete_asset("a1", "0xowner", None).await.unwrap();

        let visible = h.workflow.list_by_owner("0xowner", false).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].asset_id, "a2");

        let all = h.workflow.list_by_owner("0xowner", true).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn deletion_status_repair_follows_ledger() {
        let h = harness();
        let asset = create(&h, "a1", "0xowner").await;
        h.workflow.delete_asset("a1", "0xowner", None).await.unwrap();

        // Desync: someone flipped the store flag back without a ledger entry
        let mut desynced = h.assets.read("a1").await.unwrap().unwrap();
        desynced.is_deleted = false;
        h.assets.tamper(desynced);

        let repaired = h
            .workflow
            .restore_deletion_status("a1", "0xadmin")
            .await
            .unwrap()
            .unwrap();
        assert!(repaired.is_deleted);
        assert_eq!(repaired.version_number, 3);

        let entry = h
            .ledger
            .latest("a1", HistoryAction::DeletionStatusRestored)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.metadata["is_deleted"], json!(true));

        // Second call: nothing to repair
        assert!(h
            .workflow
            .restore_deletion_status("a1", "0xadmin")
            .await
            .unwrap()
            .is_none());
        let _ = asset;
    }

    #[tokio::test]
    async fn history_filters_and_summary() {
        let h = harness();
        create(&h, "a1", "0xowner").await;
        let mut non_critical = serde_json::Map::new();
        non_critical.insert("k".into(), json!(1));
        h.workflow
            .update_non_critical("a1", non_critical, "0xdelegate")
            .await
            .unwrap();

        let updates = h
            .workflow
            .history(
                "a1",
                &HistoryFilter {
                    action: Some(HistoryAction::Update),
                    ..Default::default()
                },
                &PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(updates.entries.len(), 1);
        assert_eq!(updates.entries[0].performed_by, "0xdelegate");

        let summary = h.workflow.wallet_summary("0xowner").await.unwrap();
        assert_eq!(summary.total_entries, 2); // owner on both entries
        assert_eq!(summary.unique_assets, 1);

        let csv = h.workflow.export_history_csv("a1").await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 entries
        assert!(lines[1].contains("UPDATE")); // newest first
        assert!(lines[2].contains("CREATE"));
    }

    #[tokio::test]
    async fn invalid_critical_metadata_is_rejected_at_the_boundary() {
        let h = harness();
        let err = h
            .workflow
            .create_asset("a1", "0xowner", &json!("not an object"), Default::default(), "0xowner")
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorageError::InvalidMetadata(_)));
        // Nothing committed anywhere
        assert!(h.assets.read("a1").await.unwrap().is_none());
        assert!(h.ledger.all_for_asset("a1").await.unwrap().is_empty());
    }
}
