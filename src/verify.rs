//! Verification engine
//!
//! Compares an asset's current off-chain critical metadata against its
//! blockchain-anchored fingerprint. Read-only and idempotent; the common case
//! needs one anchor read and no content-store traffic, because the expected
//! CID is recomputed locally.
//!
//! An unreachable anchor surfaces as `AdapterUnavailable`, never as a content
//! mismatch; callers must not trigger recovery on infrastructure failure.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::AnchorClient;
use crate::asset::Asset;
use crate::types::{AnchorageError, Result};

/// Outcome of one verification pass. Transient; not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    /// Whether the computed fingerprint matches the anchored one
    pub verified: bool,
    /// Content diverged; the recovery engine should run
    pub recovery_needed: bool,
    /// Set by the recovery engine after an attempt; `None` until then
    pub recovery_successful: Option<bool>,
    /// CID computed from the asset's current critical metadata
    pub computed_cid: String,
    /// CID recorded on chain
    pub anchored_cid: String,
    /// Transaction that produced the anchor
    pub anchor_tx_id: String,
    /// Content matches but the stored anchor-transaction reference is stale.
    /// Lower severity than a content mismatch; repaired without touching
    /// metadata content.
    pub tx_id_mismatch: bool,
}

impl VerificationResult {
    /// Whether any recovery path (content or tx-reference) should run.
    pub fn needs_any_recovery(&self) -> bool {
        self.recovery_needed || self.tx_id_mismatch
    }
}

/// Stateless verifier over the anchor client boundary.
#[derive(Clone)]
pub struct VerificationEngine {
    anchor: Arc<dyn AnchorClient>,
    adapter_timeout: Duration,
}

impl VerificationEngine {
    pub fn new(anchor: Arc<dyn AnchorClient>, adapter_timeout: Duration) -> Self {
        Self {
            anchor,
            adapter_timeout,
        }
    }

    /// Verify an asset against its anchored fingerprint.
    ///
    /// No side effects; safe to call repeatedly.
    pub async fn verify(&self, asset: &Asset) -> Result<VerificationResult> {
        let payload = asset.anchor_payload();
        let computed_cid = payload.content_address()?;

        let anchor = tokio::time::timeout(self.adapter_timeout, self.anchor.read_anchor(&asset.asset_id))
            .await
            .map_err(|_| AnchorageError::AdapterUnavailable("anchor read timed out".into()))??
            .ok_or_else(|| AnchorageError::AnchorNotFound(asset.asset_id.clone()))?;

        let verified = computed_cid == anchor.content_hash;
        let tx_id_mismatch =
            verified && asset.last_anchor_tx_id.as_deref() != Some(anchor.tx_id.as_str());

        if verified {
            if tx_id_mismatch {
                warn!(
                    asset_id = %asset.asset_id,
                    stored = ?asset.last_anchor_tx_id,
                    anchored = %anchor.tx_id,
                    "content matches but anchor tx reference is stale"
                );
            } else {
                debug!(asset_id = %asset.asset_id, cid = %computed_cid, "verification passed");
            }
        } else {
            warn!(
                asset_id = %asset.asset_id,
                computed = %computed_cid,
                anchored = %anchor.content_hash,
                "fingerprint mismatch, recovery needed"
            );
        }

        Ok(VerificationResult {
            verified,
            recovery_needed: !verified,
            recovery_successful: None,
            computed_cid,
            anchored_cid: anchor.content_hash,
            anchor_tx_id: anchor.tx_id,
            tx_id_mismatch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryAnchorClient;
    use crate::metadata::CriticalMetadata;
    use chrono::Utc;
    use serde_json::json;

    fn asset(meta: serde_json::Value, tx: Option<&str>) -> Asset {
        Asset {
            asset_id: "asset-1".into(),
            owner_address: "0xowner".into(),
            critical_metadata: CriticalMetadata::from_json(&meta).unwrap(),
            non_critical_metadata: Default::default(),
            version_number: 1,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_anchor_tx_id: tx.map(String::from),
            last_content_address: None,
            pending_transfer: None,
        }
    }

    async fn anchored(anchor: &MemoryAnchorClient, asset: &Asset) -> String {
        let cid = asset.anchor_payload().content_address().unwrap();
        anchor.write_anchor(&asset.asset_id, &cid).await.unwrap()
    }

    fn engine(anchor: Arc<MemoryAnchorClient>) -> VerificationEngine {
        VerificationEngine::new(anchor, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn matching_fingerprint_verifies() {
        let anchor = Arc::new(MemoryAnchorClient::new());
        let mut a = asset(json!({"name": "x"}), None);
        let tx = anchored(&anchor, &a).await;
        a.last_anchor_tx_id = Some(tx);

        let result = engine(anchor).verify(&a).await.unwrap();
        assert!(result.verified);
        assert!(!result.recovery_needed);
        assert!(!result.tx_id_mismatch);
        assert_eq!(result.recovery_successful, None);
        assert_eq!(result.computed_cid, result.anchored_cid);
    }

    #[tokio::test]
    async fn tampered_content_needs_recovery() {
        let anchor = Arc::new(MemoryAnchorClient::new());
        let mut a = asset(json!({"name": "x"}), None);
        let tx = anchored(&anchor, &a).await;
        a.last_anchor_tx_id = Some(tx);

        // Off-chain mutation without re-anchoring
        a.critical_metadata = CriticalMetadata::from_json(&json!({"name": "y"})).unwrap();

        let result = engine(anchor).verify(&a).await.unwrap();
        assert!(!result.verified);
        assert!(result.recovery_needed);
        assert_ne!(result.computed_cid, result.anchored_cid);
    }

    #[tokio::test]
    async fn stale_tx_reference_is_its_own_class() {
        let anchor = Arc::new(MemoryAnchorClient::new());
        let mut a = asset(json!({"name": "x"}), None);
        anchored(&anchor, &a).await;
        a.last_anchor_tx_id = Some("tx-stale".into());

        let result = engine(anchor).verify(&a).await.unwrap();
        assert!(result.verified);
        assert!(!result.recovery_needed);
        assert!(result.tx_id_mismatch);
        assert!(result.needs_any_recovery());
    }

    #[tokio::test]
    async fn verify_is_idempotent() {
        let anchor = Arc::new(MemoryAnchorClient::new());
        let mut a = asset(json!({"name": "x"}), None);
        let tx = anchored(&anchor, &a).await;
        a.last_anchor_tx_id = Some(tx);

        let engine = engine(anchor);
        let first = engine.verify(&a).await.unwrap();
        let second = engine.verify(&a).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn outage_is_not_a_mismatch() {
        let anchor = Arc::new(MemoryAnchorClient::new());
        let a = asset(json!({"name": "x"}), None);
        anchored(&anchor, &a).await;
        anchor.set_unavailable(true);

        let err = engine(anchor).verify(&a).await.unwrap_err();
        assert!(matches!(err, AnchorageError::AdapterUnavailable(_)));
    }

    #[tokio::test]
    async fn missing_anchor_is_reported() {
        let anchor = Arc::new(MemoryAnchorClient::new());
        let a = asset(json!({"name": "x"}), None);
        let err = engine(anchor).verify(&a).await.unwrap_err();
        assert!(matches!(err, AnchorageError::AnchorNotFound(_)));
    }
}
