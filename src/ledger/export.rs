//! Ledger export rows
//!
//! Stable field shape for external CSV/JSON export, consumed by the
//! presentation layer without re-deriving state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::HistoryEntry;

/// One exportable history row.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub timestamp: DateTime<Utc>,
    pub action: &'static str,
    pub version: u64,
    pub wallet_address: String,
    pub performed_by: String,
    pub metadata: serde_json::Value,
}

/// CSV header matching [`ExportRow::to_csv_row`].
pub fn csv_header() -> &'static str {
    "timestamp,action,version,wallet_address,performed_by,metadata"
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

impl ExportRow {
    pub fn from_entry(entry: &HistoryEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            action: entry.action.as_str(),
            version: entry.version,
            wallet_address: entry.wallet_address.clone(),
            performed_by: entry.performed_by.clone(),
            metadata: entry.metadata.clone(),
        }
    }

    /// Render as one CSV line (no trailing newline).
    pub fn to_csv_row(&self) -> String {
        [
            self.timestamp.to_rfc3339(),
            self.action.to_string(),
            self.version.to_string(),
            csv_escape(&self.wallet_address),
            csv_escape(&self.performed_by),
            csv_escape(&self.metadata.to_string()),
        ]
        .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::HistoryAction;
    use serde_json::json;

    #[test]
    fn csv_row_escapes_metadata() {
        let entry = HistoryEntry {
            seq: 7,
            asset_id: "a1".into(),
            action: HistoryAction::Update,
            version: 2,
            timestamp: Utc::now(),
            wallet_address: "0xowner".into(),
            performed_by: "0xactor".into(),
            metadata: json!({"note": "has, comma"}),
        };
        let row = ExportRow::from_entry(&entry).to_csv_row();
        assert!(row.contains(",UPDATE,2,0xowner,0xactor,"));
        // JSON metadata contains commas and quotes, so it must be quoted
        assert!(row.ends_with("\"{\"\"note\"\":\"\"has, comma\"\"}\""));
    }

    #[test]
    fn plain_fields_are_not_quoted() {
        assert_eq!(csv_escape("0xabc"), "0xabc");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
    }
}
