//! Version & history ledger
//!
//! Append-only log of lifecycle actions per asset. Entries are immutable once
//! appended and ordered by a monotonic sequence number assigned by the store,
//! not by wall-clock timestamp, so paginated reads stay stable under
//! concurrent appends.
//!
//! The ledger is the sole source of truth for an asset's lifecycle: folding
//! an asset's entries from genesis reproduces its current state (see
//! [`fold::fold_history`]).

mod export;
mod fold;

pub use export::{csv_header, ExportRow};
pub use fold::fold_history;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Result;

/// Closed set of lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Create,
    VersionCreate,
    Update,
    Delete,
    RecreateDeleted,
    IntegrityRecovery,
    TransferInitiated,
    TransferCompleted,
    TransferCancelled,
    DeletionStatusRestored,
}

impl HistoryAction {
    /// Wire name, as stored and exported.
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Create => "CREATE",
            HistoryAction::VersionCreate => "VERSION_CREATE",
            HistoryAction::Update => "UPDATE",
            HistoryAction::Delete => "DELETE",
            HistoryAction::RecreateDeleted => "RECREATE_DELETED",
            HistoryAction::IntegrityRecovery => "INTEGRITY_RECOVERY",
            HistoryAction::TransferInitiated => "TRANSFER_INITIATED",
            HistoryAction::TransferCompleted => "TRANSFER_COMPLETED",
            HistoryAction::TransferCancelled => "TRANSFER_CANCELLED",
            HistoryAction::DeletionStatusRestored => "DELETION_STATUS_RESTORED",
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An appended ledger record. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Store-assigned monotonic sequence number
    pub seq: u64,
    pub asset_id: String,
    pub action: HistoryAction,
    /// Asset version after this action (unchanged for failed recoveries)
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    /// Asset owner at time of action
    pub wallet_address: String,
    /// Actor; may differ from owner under delegation
    pub performed_by: String,
    /// Action-specific details (reason, anchor tx id, CID pair on recovery)
    pub metadata: serde_json::Value,
}

/// A record to append; the store assigns `seq`.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub asset_id: String,
    pub action: HistoryAction,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub wallet_address: String,
    pub performed_by: String,
    pub metadata: serde_json::Value,
}

/// Filter for history queries. All conditions are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub action: Option<HistoryAction>,
    pub performed_by: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Cursor-based page request. `before_seq` is exclusive; `None` starts from
/// the newest entry.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub limit: usize,
    pub before_seq: Option<u64>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: 50,
            before_seq: None,
        }
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    /// Cursor for the next (older) page, if more entries exist
    pub next_before_seq: Option<u64>,
}

/// Append-only ledger storage.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append an entry, assigning the next sequence number.
    async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry>;

    /// List an asset's history, newest first, filtered and paginated.
    async fn list_history(
        &self,
        asset_id: &str,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<HistoryPage>;

    /// List history involving a wallet (as owner or actor), newest first.
    async fn list_actor_history(
        &self,
        address: &str,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<HistoryPage>;

    /// All entries for an asset in ascending sequence order, for folding.
    async fn all_for_asset(&self, asset_id: &str) -> Result<Vec<HistoryEntry>>;

    /// Most recent entry with the given action for an asset.
    async fn latest(&self, asset_id: &str, action: HistoryAction) -> Result<Option<HistoryEntry>>;
}

impl HistoryFilter {
    /// Whether an entry passes this filter.
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(actor) = &self.performed_by {
            if !entry.performed_by.eq_ignore_ascii_case(actor) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Per-wallet activity summary, aggregated from the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub wallet_address: String,
    pub total_entries: usize,
    pub unique_assets: usize,
    /// Count per action wire name
    pub actions: std::collections::BTreeMap<String, usize>,
    pub first_entry: Option<DateTime<Utc>>,
    pub latest_entry: Option<DateTime<Utc>>,
}

impl WalletSummary {
    /// Build a summary from a wallet's entries (any order).
    pub fn from_entries(wallet_address: &str, entries: &[HistoryEntry]) -> Self {
        let mut actions = std::collections::BTreeMap::new();
        let mut assets = std::collections::BTreeSet::new();
        let mut first: Option<DateTime<Utc>> = None;
        let mut latest: Option<DateTime<Utc>> = None;

        for entry in entries {
            *actions.entry(entry.action.as_str().to_string()).or_insert(0) += 1;
            assets.insert(entry.asset_id.clone());
            first = Some(match first {
                Some(t) => t.min(entry.timestamp),
                None => entry.timestamp,
            });
            latest = Some(match latest {
                Some(t) => t.max(entry.timestamp),
                None => entry.timestamp,
            });
        }

        Self {
            wallet_address: wallet_address.to_string(),
            total_entries: entries.len(),
            unique_assets: assets.len(),
            actions,
            first_entry: first,
            latest_entry: latest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(seq: u64, action: HistoryAction, actor: &str) -> HistoryEntry {
        HistoryEntry {
            seq,
            asset_id: "a1".into(),
            action,
            version: seq,
            timestamp: Utc::now(),
            wallet_address: "0xowner".into(),
            performed_by: actor.into(),
            metadata: json!({}),
        }
    }

    #[test]
    fn action_wire_names() {
        assert_eq!(
            serde_json::to_string(&HistoryAction::IntegrityRecovery).unwrap(),
            "\"INTEGRITY_RECOVERY\""
        );
        let parsed: HistoryAction = serde_json::from_str("\"RECREATE_DELETED\"").unwrap();
        assert_eq!(parsed, HistoryAction::RecreateDeleted);
        assert_eq!(HistoryAction::DeletionStatusRestored.to_string(), "DELETION_STATUS_RESTORED");
    }

    #[test]
    fn filter_by_action_and_actor() {
        let e = entry(1, HistoryAction::Update, "0xActor");

        let all = HistoryFilter::default();
        assert!(all.matches(&e));

        let by_action = HistoryFilter {
            action: Some(HistoryAction::Update),
            ..Default::default()
        };
        assert!(by_action.matches(&e));

        let wrong_action = HistoryFilter {
            action: Some(HistoryAction::Delete),
            ..Default::default()
        };
        assert!(!wrong_action.matches(&e));

        // Actor match is case-insensitive, like wallet addresses everywhere
        let by_actor = HistoryFilter {
            performed_by: Some("0xactor".into()),
            ..Default::default()
        };
        assert!(by_actor.matches(&e));
    }

    #[test]
    fn wallet_summary_counts() {
        let entries = vec![
            entry(1, HistoryAction::Create, "0xa"),
            entry(2, HistoryAction::Update, "0xa"),
            entry(3, HistoryAction::Update, "0xb"),
        ];
        let summary = WalletSummary::from_entries("0xowner", &entries);
        assert_eq!(summary.total_entries, 3);
        assert_eq!(summary.unique_assets, 1);
        assert_eq!(summary.actions.get("UPDATE"), Some(&2));
        assert!(summary.first_entry.is_some());
    }
}
