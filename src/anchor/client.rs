//! Anchor submission and confirmation tracking.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ledger::{LedgerBackend, TxSubmission};
use crate::error::AuditError;
use crate::store::{AnchorRecord, AnchorStatus, Store};

/// Retry and confirmation policy for ledger interaction.
#[derive(Debug, Clone)]
pub struct AnchorPolicy {
    /// Inclusion depth required before an anchor counts as Confirmed.
    pub confirmation_depth: u64,
    pub poll_interval: Duration,
    pub confirm_timeout: Duration,
    pub max_submit_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for AnchorPolicy {
    fn default() -> Self {
        Self {
            confirmation_depth: 1,
            poll_interval: Duration::from_millis(1000),
            confirm_timeout: Duration::from_secs(120),
            max_submit_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Clone)]
pub struct AnchorClient {
    store: Store,
    ledger: LedgerBackend,
    policy: AnchorPolicy,
}

impl AnchorClient {
    pub fn new(store: Store, ledger: LedgerBackend, policy: AnchorPolicy) -> Self {
        Self {
            store,
            ledger,
            policy,
        }
    }

    /// Submit a batch root to the ledger and return a tracking anchor.
    ///
    /// `expected_root` guards against anchoring stale data: it must match the
    /// stored batch root exactly. Submission is idempotent — an existing
    /// Confirmed anchor for the same (batch, root) pair is returned as-is,
    /// and an in-flight Pending anchor is never duplicated. Only a prior
    /// Failed anchor triggers a fresh transaction.
    pub async fn submit(
        &self,
        batch_id: &str,
        expected_root: &str,
    ) -> Result<AnchorRecord, AuditError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| AuditError::not_found(format!("Batch {}", batch_id)))?;

        if batch.merkle_root != expected_root {
            return Err(AuditError::mismatch(
                format!("anchor request for batch {}", batch_id),
                expected_root,
                &batch.merkle_root,
            ));
        }

        if let Some(existing) = self.store.get_anchor_for_batch(batch_id).await? {
            match existing.status {
                AnchorStatus::Confirmed if existing.merkle_root == batch.merkle_root => {
                    debug!(batch_id, anchor_id = existing.id, "Anchor already confirmed");
                    return Ok(existing);
                }
                AnchorStatus::Pending => {
                    debug!(batch_id, anchor_id = existing.id, "Anchor already in flight");
                    return Ok(existing);
                }
                _ => {}
            }
        }

        match self.submit_with_retry(batch_id, &batch.merkle_root).await {
            Ok(tx) => {
                let anchor = self
                    .store
                    .insert_anchor(
                        batch_id,
                        &batch.merkle_root,
                        &tx.tx_hash,
                        tx.block_number.map(|b| b as i64),
                        tx.block_hash.as_deref(),
                        AnchorStatus::Pending,
                        None,
                    )
                    .await?;
                info!(batch_id, tx_hash = %tx.tx_hash, "Submitted anchor");
                Ok(anchor)
            }
            Err(e) => {
                self.store
                    .insert_anchor(
                        batch_id,
                        &batch.merkle_root,
                        "",
                        None,
                        None,
                        AnchorStatus::Failed,
                        Some(&e.to_string()),
                    )
                    .await?;
                Err(e)
            }
        }
    }

    async fn submit_with_retry(
        &self,
        batch_id: &str,
        root: &str,
    ) -> Result<TxSubmission, AuditError> {
        let mut backoff = self.policy.initial_backoff;
        let mut last_error = None;

        for attempt in 1..=self.policy.max_submit_attempts {
            match self.ledger.store_root(batch_id, root).await {
                Ok(tx) => return Ok(tx),
                Err(e @ AuditError::LedgerUnavailable(_)) => {
                    warn!(batch_id, attempt, error = %e, "Ledger submission attempt failed");
                    last_error = Some(e);
                    if attempt < self.policy.max_submit_attempts {
                        let jitter =
                            Duration::from_millis(rand::thread_rng().gen_range(0..250));
                        tokio::time::sleep(backoff + jitter).await;
                        backoff *= 2;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AuditError::LedgerUnavailable("Ledger submission failed".to_string())
        }))
    }

    /// Wait for the latest anchor of a batch to reach the configured
    /// confirmation depth, then cross-check the on-chain root against the
    /// submitted one before promoting batch and events to Anchored.
    ///
    /// Cancelling this future abandons the wait only; the submitted
    /// transaction may still land and can be awaited again later. A timeout
    /// leaves the anchor Pending for the same reason.
    pub async fn await_confirmation(&self, batch_id: &str) -> Result<AnchorRecord, AuditError> {
        let anchor = self
            .store
            .get_anchor_for_batch(batch_id)
            .await?
            .ok_or_else(|| AuditError::not_found(format!("Anchor for batch {}", batch_id)))?;

        match anchor.status {
            AnchorStatus::Confirmed => return Ok(anchor),
            AnchorStatus::Failed => {
                return Err(AuditError::LedgerUnavailable(format!(
                    "Anchor for batch {} already failed: {}",
                    batch_id,
                    anchor.error.as_deref().unwrap_or("unknown error")
                )))
            }
            AnchorStatus::Pending => {}
        }

        let deadline = Instant::now() + self.policy.confirm_timeout;
        loop {
            match self.ledger.confirmations(&anchor.tx_hash).await {
                Ok(status) if status.confirmations >= self.policy.confirmation_depth => {
                    return self.finalize(&anchor, status.block_number, status.block_hash).await;
                }
                Ok(status) => {
                    debug!(
                        batch_id,
                        confirmations = status.confirmations,
                        required = self.policy.confirmation_depth,
                        "Anchor not yet confirmed"
                    );
                }
                // transient outage: keep polling until the deadline
                Err(e @ AuditError::LedgerUnavailable(_)) => {
                    warn!(batch_id, error = %e, "Confirmation poll failed");
                }
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Err(AuditError::LedgerUnavailable(format!(
                    "Confirmation wait for batch {} timed out after {:?}",
                    batch_id, self.policy.confirm_timeout
                )));
            }
            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }

    async fn finalize(
        &self,
        anchor: &AnchorRecord,
        block_number: Option<u64>,
        block_hash: Option<String>,
    ) -> Result<AnchorRecord, AuditError> {
        // The root read back from the ledger must be exactly what was
        // submitted. Anything else signals ledger corruption or a reorg and
        // is reported, never retried as success.
        let onchain = self.ledger.fetch_root(&anchor.batch_id).await?;
        match onchain.as_deref() {
            Some(root) if root == anchor.merkle_root => {
                self.store
                    .mark_anchor_confirmed(
                        anchor.id,
                        &anchor.batch_id,
                        block_number.map(|b| b as i64),
                        block_hash.as_deref(),
                    )
                    .await?;
                self.store
                    .get_anchor_for_batch(&anchor.batch_id)
                    .await?
                    .ok_or_else(|| {
                        AuditError::not_found(format!("Anchor for batch {}", anchor.batch_id))
                    })
            }
            other => {
                let onchain_desc = other.unwrap_or("(absent)").to_string();
                let detail = format!(
                    "On-chain root {} does not match submitted root {}",
                    onchain_desc, anchor.merkle_root
                );
                self.store.mark_anchor_failed(anchor.id, &detail).await?;
                Err(AuditError::mismatch(
                    format!("on-chain root for batch {}", anchor.batch_id),
                    onchain_desc,
                    &anchor.merkle_root,
                ))
            }
        }
    }

    /// Read-only ledger query for the root anchored for a batch.
    pub async fn fetch_root(&self, batch_id: &str) -> Result<Option<String>, AuditError> {
        self.ledger.fetch_root(batch_id).await
    }
}
