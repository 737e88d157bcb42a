//! MongoDB persistence
//!
//! The Mongo-backed asset record store and history ledger, behind the same
//! adapter traits the in-memory implementations satisfy.

pub mod mongo;
pub mod schemas;
mod stores;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
pub use stores::{MongoAssetStore, MongoLedgerStore};
