//! Event-sourcing fold
//!
//! Reconstructs current asset state by folding a ledger from genesis.
//! Mutating entries carry the state they introduced in their `metadata`
//! (under the keys below), which is what makes the ledger self-contained:
//!
//! - `critical_metadata`, `non_critical_metadata`: metadata snapshots
//! - `content_address`, `anchor_tx_id`: anchor references after the action
//! - `succeeded`: recovery outcome flag (failed recoveries change nothing)
//! - `to`, `from`: transfer parties
//! - `is_deleted`: corrected flag for deletion-status repair

use crate::asset::{Asset, PendingTransfer};
use crate::metadata::CriticalMetadata;
use crate::types::{AnchorageError, Result};

use super::{HistoryAction, HistoryEntry};

fn meta_str(entry: &HistoryEntry, key: &str) -> Option<String> {
    entry.metadata.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn meta_critical(entry: &HistoryEntry) -> Result<Option<CriticalMetadata>> {
    match entry.metadata.get("critical_metadata") {
        Some(value) => Ok(Some(CriticalMetadata::from_json(value)?)),
        None => Ok(None),
    }
}

fn meta_non_critical(entry: &HistoryEntry) -> Option<serde_json::Map<String, serde_json::Value>> {
    entry
        .metadata
        .get("non_critical_metadata")
        .and_then(|v| v.as_object())
        .cloned()
}

fn malformed(entry: &HistoryEntry, what: &str) -> AnchorageError {
    AnchorageError::Ledger(format!(
        "entry seq {} ({}) for {} missing {}",
        entry.seq, entry.action, entry.asset_id, what
    ))
}

/// Fold an asset's entries (ascending sequence order) into its current state.
///
/// Returns `None` for an empty ledger. Errors indicate a malformed ledger,
/// which default write paths never produce.
pub fn fold_history(entries: &[HistoryEntry]) -> Result<Option<Asset>> {
    let mut state: Option<Asset> = None;

    for entry in entries {
        match entry.action {
            HistoryAction::Create => {
                if state.is_some() {
                    return Err(AnchorageError::Ledger(format!(
                        "duplicate CREATE for {}",
                        entry.asset_id
                    )));
                }
                let critical =
                    meta_critical(entry)?.ok_or_else(|| malformed(entry, "critical_metadata"))?;
                state = Some(Asset {
                    asset_id: entry.asset_id.clone(),
                    owner_address: entry.wallet_address.clone(),
                    critical_metadata: critical,
                    non_critical_metadata: meta_non_critical(entry).unwrap_or_default(),
                    version_number: entry.version,
                    is_deleted: false,
                    created_at: entry.timestamp,
                    updated_at: entry.timestamp,
                    last_anchor_tx_id: meta_str(entry, "anchor_tx_id"),
                    last_content_address: meta_str(entry, "content_address"),
                    pending_transfer: None,
                });
                continue;
            }
            _ => {}
        }

        let asset = state
            .as_mut()
            .ok_or_else(|| AnchorageError::Ledger(format!(
                "entry seq {} ({}) before CREATE for {}",
                entry.seq, entry.action, entry.asset_id
            )))?;

        match entry.action {
            HistoryAction::Create => unreachable!(),
            HistoryAction::VersionCreate | HistoryAction::RecreateDeleted => {
                asset.critical_metadata =
                    meta_critical(entry)?.ok_or_else(|| malformed(entry, "critical_metadata"))?;
                if let Some(non_critical) = meta_non_critical(entry) {
                    asset.non_critical_metadata = non_critical;
                }
                asset.last_content_address = meta_str(entry, "content_address");
                asset.last_anchor_tx_id = meta_str(entry, "anchor_tx_id");
                asset.is_deleted = false;
            }
            HistoryAction::Update => {
                asset.non_critical_metadata =
                    meta_non_critical(entry).ok_or_else(|| malformed(entry, "non_critical_metadata"))?;
            }
            HistoryAction::Delete => {
                asset.is_deleted = true;
            }
            HistoryAction::IntegrityRecovery => {
                let succeeded = entry
                    .metadata
                    .get("succeeded")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if !succeeded {
                    // Failure entries record the tamper event without any
                    // state transition.
                    continue;
                }
                if let Some(critical) = meta_critical(entry)? {
                    asset.critical_metadata = critical;
                }
                if let Some(address) = meta_str(entry, "content_address") {
                    asset.last_content_address = Some(address);
                }
                if let Some(tx) = meta_str(entry, "anchor_tx_id") {
                    asset.last_anchor_tx_id = Some(tx);
                }
            }
            HistoryAction::TransferInitiated => {
                let to = meta_str(entry, "to").ok_or_else(|| malformed(entry, "to"))?;
                asset.pending_transfer = Some(PendingTransfer {
                    to,
                    initiated_at: entry.timestamp,
                });
            }
            HistoryAction::TransferCompleted => {
                asset.owner_address = entry.wallet_address.clone();
                asset.pending_transfer = None;
                asset.last_content_address = meta_str(entry, "content_address");
                asset.last_anchor_tx_id = meta_str(entry, "anchor_tx_id");
            }
            HistoryAction::TransferCancelled => {
                asset.pending_transfer = None;
            }
            HistoryAction::DeletionStatusRestored => {
                asset.is_deleted = entry
                    .metadata
                    .get("is_deleted")
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| malformed(entry, "is_deleted"))?;
            }
        }

        asset.version_number = entry.version;
        asset.updated_at = entry.timestamp;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn entry(
        seq: u64,
        action: HistoryAction,
        version: u64,
        owner: &str,
        metadata: serde_json::Value,
    ) -> HistoryEntry {
        HistoryEntry {
            seq,
            asset_id: "asset-1".into(),
            action,
            version,
            timestamp: Utc::now(),
            wallet_address: owner.into(),
            performed_by: owner.into(),
            metadata,
        }
    }

    #[test]
    fn empty_ledger_folds_to_none() {
        assert!(fold_history(&[]).unwrap().is_none());
    }

    #[test]
    fn create_then_mutations() {
        let entries = vec![
            entry(
                1,
                HistoryAction::Create,
                1,
                "0xowner",
                json!({
                    "critical_metadata": {"name": "x"},
                    "non_critical_metadata": {"note": "hi"},
                    "content_address": "bafy-one",
                    "anchor_tx_id": "tx-1",
                }),
            ),
            entry(
                2,
                HistoryAction::Update,
                2,
                "0xowner",
                json!({"non_critical_metadata": {"note": "edited"}}),
            ),
            entry(
                3,
                HistoryAction::VersionCreate,
                3,
                "0xowner",
                json!({
                    "critical_metadata": {"name": "x2"},
                    "content_address": "bafy-two",
                    "anchor_tx_id": "tx-2",
                }),
            ),
        ];

        let asset = fold_history(&entries).unwrap().unwrap();
        assert_eq!(asset.version_number, 3);
        assert_eq!(asset.owner_address, "0xowner");
        assert_eq!(
            asset.critical_metadata.to_json(),
            json!({"name": "x2"})
        );
        assert_eq!(asset.non_critical_metadata["note"], json!("edited"));
        assert_eq!(asset.last_content_address.as_deref(), Some("bafy-two"));
        assert_eq!(asset.last_anchor_tx_id.as_deref(), Some("tx-2"));
        assert!(!asset.is_deleted);
    }

    #[test]
    fn delete_and_recreate_continue_versions() {
        let entries = vec![
            entry(
                1,
                HistoryAction::Create,
                1,
                "0xowner",
                json!({"critical_metadata": {"name": "x"}, "content_address": "c1", "anchor_tx_id": "t1"}),
            ),
            entry(2, HistoryAction::Delete, 2, "0xowner", json!({})),
            entry(
                3,
                HistoryAction::RecreateDeleted,
                3,
                "0xowner",
                json!({"critical_metadata": {"name": "x"}, "content_address": "c2", "anchor_tx_id": "t2"}),
            ),
        ];
        let asset = fold_history(&entries).unwrap().unwrap();
        assert!(!asset.is_deleted);
        assert_eq!(asset.version_number, 3);
        assert_eq!(asset.last_anchor_tx_id.as_deref(), Some("t2"));
    }

    #[test]
    fn failed_recovery_changes_nothing() {
        let entries = vec![
            entry(
                1,
                HistoryAction::Create,
                1,
                "0xowner",
                json!({"critical_metadata": {"name": "x"}, "content_address": "c1", "anchor_tx_id": "t1"}),
            ),
            entry(
                2,
                HistoryAction::IntegrityRecovery,
                1,
                "0xowner",
                json!({"succeeded": false, "reason": "retrieved metadata from IPFS is invalid"}),
            ),
        ];
        let asset = fold_history(&entries).unwrap().unwrap();
        assert_eq!(asset.version_number, 1);
        assert_eq!(asset.critical_metadata.to_json(), json!({"name": "x"}));
    }

    #[test]
    fn transfer_completion_moves_ownership() {
        let entries = vec![
            entry(
                1,
                HistoryAction::Create,
                1,
                "0xalice",
                json!({"critical_metadata": {"name": "x"}, "content_address": "c1", "anchor_tx_id": "t1"}),
            ),
            entry(
                2,
                HistoryAction::TransferInitiated,
                2,
                "0xalice",
                json!({"to": "0xbob"}),
            ),
            entry(
                3,
                HistoryAction::TransferCompleted,
                3,
                "0xbob",
                json!({"from": "0xalice", "to": "0xbob", "content_address": "c2", "anchor_tx_id": "t2"}),
            ),
        ];
        let asset = fold_history(&entries).unwrap().unwrap();
        assert_eq!(asset.owner_address, "0xbob");
        assert!(asset.pending_transfer.is_none());
        assert_eq!(asset.last_anchor_tx_id.as_deref(), Some("t2"));
    }

    #[test]
    fn mutation_before_create_is_malformed() {
        let entries = vec![entry(1, HistoryAction::Delete, 1, "0xowner", json!({}))];
        assert!(fold_history(&entries).is_err());
    }
}
