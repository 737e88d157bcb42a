//! HTTP bridge adapters
//!
//! Talks to the anchor and content-store bridge services over REST. Network
//! and timeout failures map to `AdapterUnavailable` so callers never mistake
//! an outage for tampering.
//!
//! Endpoints:
//!
//! - `GET  {base}/anchors/{asset_id}` → `{content_hash, tx_id}` | 404
//! - `POST {base}/anchors` `{asset_id, content_hash}` → `{tx_id}`
//! - `GET  {base}/anchors/tx/{tx_id}` → `{content_hash, tx_id}` | 404
//! - `GET  {base}/blobs/{address}` → bytes | 404
//! - `POST {base}/blobs` (raw body) → `{cid}`

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::types::{AnchorageError, Result};

use super::{AnchorClient, AnchorRecord, ContentStore};

fn transport_error(context: &str, err: reqwest::Error) -> AnchorageError {
    AnchorageError::AdapterUnavailable(format!("{}: {}", context, err))
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AnchorageError::AdapterUnavailable(format!("http client init: {}", e)))
}

// ============================================================================
// Anchor bridge
// ============================================================================

pub struct HttpAnchorClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct WriteAnchorResponse {
    tx_id: String,
}

impl HttpAnchorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl AnchorClient for HttpAnchorClient {
    async fn read_anchor(&self, asset_id: &str) -> Result<Option<AnchorRecord>> {
        let url = format!("{}/anchors/{}", self.base_url, asset_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error("anchor read", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let record: AnchorRecord = response
                    .json()
                    .await
                    .map_err(|e| transport_error("anchor read decode", e))?;
                Ok(Some(record))
            }
            status => Err(AnchorageError::AdapterUnavailable(format!(
                "anchor read returned {}",
                status
            ))),
        }
    }

    async fn write_anchor(&self, asset_id: &str, content_hash: &str) -> Result<String> {
        let url = format!("{}/anchors", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "asset_id": asset_id,
                "content_hash": content_hash,
            }))
            .send()
            .await
            .map_err(|e| transport_error("anchor write", e))?;

        if !response.status().is_success() {
            return Err(AnchorageError::AnchorWriteError(format!(
                "anchor write returned {}",
                response.status()
            )));
        }

        let body: WriteAnchorResponse = response
            .json()
            .await
            .map_err(|e| transport_error("anchor write decode", e))?;
        debug!(asset_id, tx_id = %body.tx_id, "anchor written");
        Ok(body.tx_id)
    }

    async fn read_anchor_event(&self, tx_id: &str) -> Result<Option<AnchorRecord>> {
        let url = format!("{}/anchors/tx/{}", self.base_url, tx_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error("anchor event read", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let record: AnchorRecord = response
                    .json()
                    .await
                    .map_err(|e| transport_error("anchor event decode", e))?;
                Ok(Some(record))
            }
            status => Err(AnchorageError::AdapterUnavailable(format!(
                "anchor event read returned {}",
                status
            ))),
        }
    }
}

// ============================================================================
// Content-store bridge
// ============================================================================

pub struct HttpContentStore {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct PutBlobResponse {
    cid: String,
}

impl HttpContentStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn get(&self, address: &str) -> Result<Option<Bytes>> {
        let url = format!("{}/blobs/{}", self.base_url, address);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error("blob get", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| transport_error("blob body", e))?;
                Ok(Some(bytes))
            }
            status => Err(AnchorageError::AdapterUnavailable(format!(
                "blob get returned {}",
                status
            ))),
        }
    }

    async fn put(&self, bytes: Bytes) -> Result<String> {
        let url = format!("{}/blobs", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport_error("blob put", e))?;

        if !response.status().is_success() {
            return Err(AnchorageError::AdapterUnavailable(format!(
                "blob put returned {}",
                response.status()
            )));
        }

        let body: PutBlobResponse = response
            .json()
            .await
            .map_err(|e| transport_error("blob put decode", e))?;
        Ok(body.cid)
    }
}
