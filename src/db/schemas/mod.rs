//! Database schemas
//!
//! Defines MongoDB document structures for asset records and the history
//! ledger, plus the conversions to the domain types.

mod asset;
mod history;

pub use asset::{AssetDoc, PendingTransferDoc, ASSET_COLLECTION};
pub use history::{
    HistoryDoc, SeqCounterDoc, COUNTER_COLLECTION, HISTORY_COLLECTION, HISTORY_SEQ_COUNTER,
};
