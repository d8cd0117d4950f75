//! Ledger backends.
//!
//! Two implementations of the store-root/read-root contract: a JSON-RPC
//! client for a deployed anchor contract gateway, and a deterministic
//! in-process ledger used by tests and by deployments without a reachable
//! chain.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::AuditError;
use crate::hashing;

/// Result of submitting a root to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxSubmission {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
}

/// Confirmation state of a submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationStatus {
    pub confirmations: u64,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
}

/// The configured ledger implementation.
#[derive(Clone)]
pub enum LedgerBackend {
    Rpc(JsonRpcLedger),
    Memory(InMemoryLedger),
}

impl LedgerBackend {
    pub async fn store_root(
        &self,
        batch_id: &str,
        root: &str,
    ) -> Result<TxSubmission, AuditError> {
        match self {
            Self::Rpc(ledger) => ledger.store_root(batch_id, root).await,
            Self::Memory(ledger) => ledger.store_root(batch_id, root),
        }
    }

    pub async fn fetch_root(&self, batch_id: &str) -> Result<Option<String>, AuditError> {
        match self {
            Self::Rpc(ledger) => ledger.fetch_root(batch_id).await,
            Self::Memory(ledger) => ledger.fetch_root(batch_id),
        }
    }

    pub async fn confirmations(&self, tx_hash: &str) -> Result<ConfirmationStatus, AuditError> {
        match self {
            Self::Rpc(ledger) => ledger.confirmations(tx_hash).await,
            Self::Memory(ledger) => ledger.confirmations(tx_hash),
        }
    }
}

// ---- JSON-RPC backend ----

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client for the anchor contract gateway. Every transport or
/// protocol failure maps to `LedgerUnavailable`; callers decide whether to
/// retry.
#[derive(Clone)]
pub struct JsonRpcLedger {
    endpoint: String,
    client: reqwest::Client,
}

impl JsonRpcLedger {
    pub fn new(endpoint: String, request_timeout: Duration) -> Result<Self, AuditError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AuditError::Config(format!("Failed to build RPC client: {}", e)))?;
        info!(endpoint = %endpoint, "Using JSON-RPC ledger");
        Ok(Self { endpoint, client })
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, AuditError> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(self.endpoint.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AuditError::LedgerUnavailable(format!(
                    "RPC request to {} failed: {}",
                    self.endpoint, e
                ))
            })?;

        if !response.status().is_success() {
            return Err(AuditError::LedgerUnavailable(format!(
                "RPC endpoint {} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let body: RpcResponse = response.json().await.map_err(|e| {
            AuditError::LedgerUnavailable(format!("Malformed RPC response: {}", e))
        })?;

        if let Some(error) = body.error {
            return Err(AuditError::LedgerUnavailable(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        Ok(body.result)
    }

    pub async fn store_root(
        &self,
        batch_id: &str,
        root: &str,
    ) -> Result<TxSubmission, AuditError> {
        let result = self
            .call("anchor_storeRoot", serde_json::json!([batch_id, root]))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| AuditError::LedgerUnavailable(format!("Malformed RPC result: {}", e)))
    }

    pub async fn fetch_root(&self, batch_id: &str) -> Result<Option<String>, AuditError> {
        let result = self
            .call("anchor_getRoot", serde_json::json!([batch_id]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| AuditError::LedgerUnavailable(format!("Malformed RPC result: {}", e)))
    }

    pub async fn confirmations(&self, tx_hash: &str) -> Result<ConfirmationStatus, AuditError> {
        let result = self
            .call("anchor_getConfirmations", serde_json::json!([tx_hash]))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| AuditError::LedgerUnavailable(format!("Malformed RPC result: {}", e)))
    }
}

// ---- in-memory backend ----

#[derive(Debug, Clone)]
struct StoredRoot {
    root: String,
    tx_hash: String,
    block_number: u64,
    block_hash: String,
}

#[derive(Debug, Default)]
struct MemoryLedgerState {
    roots: HashMap<String, StoredRoot>,
    inclusion_block: HashMap<String, u64>,
    tip: u64,
    offline: bool,
}

/// Deterministic in-process ledger. The chain tip advances by one block per
/// confirmation poll, so pending transactions confirm after a few polls.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    inner: Arc<Mutex<MemoryLedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network partition: while offline, every call fails with
    /// `LedgerUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.offline = offline;
        }
    }

    pub fn store_root(&self, batch_id: &str, root: &str) -> Result<TxSubmission, AuditError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| AuditError::LedgerUnavailable("Ledger state poisoned".to_string()))?;
        if state.offline {
            return Err(AuditError::LedgerUnavailable(
                "In-memory ledger is offline".to_string(),
            ));
        }

        // idempotent write: re-storing the same pair returns the original tx
        if let Some(existing) = state.roots.get(batch_id) {
            if existing.root == root {
                return Ok(TxSubmission {
                    tx_hash: existing.tx_hash.clone(),
                    block_number: Some(existing.block_number),
                    block_hash: Some(existing.block_hash.clone()),
                });
            }
            return Err(AuditError::mismatch(
                format!("ledger root for batch {}", batch_id),
                root,
                &existing.root,
            ));
        }

        state.tip += 1;
        let block_number = state.tip;
        let tx_hash = format!(
            "0x{}",
            hashing::digest_hex(format!("{}:{}:{}", batch_id, root, block_number).as_bytes())
        );
        let block_hash = format!(
            "0x{}",
            hashing::digest_hex(format!("block:{}", block_number).as_bytes())
        );

        state.inclusion_block.insert(tx_hash.clone(), block_number);
        state.roots.insert(
            batch_id.to_string(),
            StoredRoot {
                root: root.to_string(),
                tx_hash: tx_hash.clone(),
                block_number,
                block_hash: block_hash.clone(),
            },
        );
        debug!(batch_id, block_number, "Stored root in memory ledger");

        Ok(TxSubmission {
            tx_hash,
            block_number: Some(block_number),
            block_hash: Some(block_hash),
        })
    }

    pub fn fetch_root(&self, batch_id: &str) -> Result<Option<String>, AuditError> {
        let state = self
            .inner
            .lock()
            .map_err(|_| AuditError::LedgerUnavailable("Ledger state poisoned".to_string()))?;
        if state.offline {
            return Err(AuditError::LedgerUnavailable(
                "In-memory ledger is offline".to_string(),
            ));
        }
        Ok(state.roots.get(batch_id).map(|r| r.root.clone()))
    }

    pub fn confirmations(&self, tx_hash: &str) -> Result<ConfirmationStatus, AuditError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| AuditError::LedgerUnavailable("Ledger state poisoned".to_string()))?;
        if state.offline {
            return Err(AuditError::LedgerUnavailable(
                "In-memory ledger is offline".to_string(),
            ));
        }

        state.tip += 1;
        match state.inclusion_block.get(tx_hash) {
            Some(&block) => {
                let block_hash = format!(
                    "0x{}",
                    hashing::digest_hex(format!("block:{}", block).as_bytes())
                );
                Ok(ConfirmationStatus {
                    confirmations: state.tip - block + 1,
                    block_number: Some(block),
                    block_hash: Some(block_hash),
                })
            }
            None => Ok(ConfirmationStatus {
                confirmations: 0,
                block_number: None,
                block_hash: None,
            }),
        }
    }

    /// Overwrite a stored root without going through a transaction, for
    /// exercising the reorg/corruption detection path in tests.
    #[cfg(test)]
    pub fn corrupt_root(&self, batch_id: &str, root: &str) {
        let mut state = self.inner.lock().unwrap();
        if let Some(entry) = state.roots.get_mut(batch_id) {
            entry.root = root.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_fetch_round_trip() {
        let ledger = InMemoryLedger::new();
        let tx = ledger.store_root("BATCH-1", &"a".repeat(64)).unwrap();
        assert!(tx.tx_hash.starts_with("0x"));
        assert_eq!(ledger.fetch_root("BATCH-1").unwrap(), Some("a".repeat(64)));
        assert_eq!(ledger.fetch_root("BATCH-2").unwrap(), None);
    }

    #[test]
    fn test_store_is_idempotent() {
        let ledger = InMemoryLedger::new();
        let first = ledger.store_root("BATCH-1", &"a".repeat(64)).unwrap();
        let second = ledger.store_root("BATCH-1", &"a".repeat(64)).unwrap();
        assert_eq!(first.tx_hash, second.tx_hash);
        assert_eq!(first.block_number, second.block_number);
    }

    #[test]
    fn test_conflicting_root_rejected() {
        let ledger = InMemoryLedger::new();
        ledger.store_root("BATCH-1", &"a".repeat(64)).unwrap();
        assert!(ledger.store_root("BATCH-1", &"b".repeat(64)).is_err());
    }

    #[test]
    fn test_offline_fails_every_call() {
        let ledger = InMemoryLedger::new();
        ledger.set_offline(true);
        assert!(matches!(
            ledger.store_root("BATCH-1", &"a".repeat(64)),
            Err(AuditError::LedgerUnavailable(_))
        ));
        assert!(ledger.fetch_root("BATCH-1").is_err());
        assert!(ledger.confirmations("0xdead").is_err());
    }

    #[test]
    fn test_confirmations_grow_per_poll() {
        let ledger = InMemoryLedger::new();
        let tx = ledger.store_root("BATCH-1", &"a".repeat(64)).unwrap();
        let first = ledger.confirmations(&tx.tx_hash).unwrap();
        let second = ledger.confirmations(&tx.tx_hash).unwrap();
        assert!(second.confirmations > first.confirmations);

        let unknown = ledger.confirmations("0xunknown").unwrap();
        assert_eq!(unknown.confirmations, 0);
    }
}
