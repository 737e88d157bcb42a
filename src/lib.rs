//! Anchorage - critical-metadata integrity engine
//!
//! Fingerprints each asset's critical metadata as a content address (CIDv1,
//! SHA2-256 over canonical JSON), anchors that address on-chain, and verifies
//! it on every read. When the off-chain record diverges from its anchor, the
//! recovery engine restores the authoritative state from the content store or
//! repairs stale anchor references, recording every attempt in an append-only
//! history ledger.
//!
//! ## Components
//!
//! - **Fingerprint**: canonical serialization and content addressing
//! - **Verify**: read-time comparison against the blockchain anchor
//! - **Recovery**: deterministic restoration of tampered state
//! - **Ledger**: append-only lifecycle history, foldable back into state
//! - **Workflow**: lifecycle orchestration with per-asset mutation scopes
//! - **Adapters**: anchor, content-store, and record-store boundaries

pub mod adapters;
pub mod asset;
pub mod config;
pub mod db;
pub mod fingerprint;
pub mod ledger;
pub mod metadata;
pub mod recovery;
pub mod types;
pub mod verify;
pub mod workflow;

pub use asset::{Asset, PendingTransfer};
pub use config::{Args, EngineConfig};
pub use metadata::CriticalMetadata;
pub use types::{AnchorageError, Result};
pub use workflow::{AssetWorkflow, RetrieveOutcome, VerificationReport};
