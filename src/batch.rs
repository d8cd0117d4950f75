//! Batch Builder
//!
//! Groups un-batched event hashes into a Merkle batch. Builds are serialized
//! by a per-pool lock, and events are atomically claimed before hashing so
//! two racing builds can never share a leaf; a build that fails before the
//! batch is durably recorded releases its claim.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AuditError;
use crate::merkle::MerkleTree;
use crate::store::{Batch, Store};

/// Default ceiling on events per batch when no explicit set is given.
pub const DEFAULT_BATCH_SIZE_LIMIT: usize = 16;

#[derive(Clone)]
pub struct BatchBuilder {
    store: Store,
    build_lock: Arc<Mutex<()>>,
    batch_size_limit: usize,
}

impl BatchBuilder {
    pub fn new(store: Store, batch_size_limit: usize) -> Self {
        Self {
            store,
            build_lock: Arc::new(Mutex::new(())),
            batch_size_limit,
        }
    }

    /// Build a new batch from eligible events.
    ///
    /// With `event_ids`, only the eligible subset of those events is used;
    /// otherwise all currently un-batched Pending events up to the configured
    /// ceiling are taken, oldest first. Fails with `NoEligibleEvents` when
    /// nothing can be claimed — including when a concurrent build got there
    /// first.
    pub async fn build(&self, event_ids: Option<Vec<i64>>) -> Result<Batch, AuditError> {
        let _guard = self.build_lock.lock().await;

        let claim_ref = format!("claim-{}", Uuid::new_v4().simple());
        let events = self
            .store
            .claim_pending(&claim_ref, event_ids.as_deref(), self.batch_size_limit)
            .await?;

        if events.is_empty() {
            return Err(AuditError::NoEligibleEvents);
        }

        match self.record_claimed(&claim_ref, &events).await {
            Ok(batch) => Ok(batch),
            Err(e) => {
                warn!(claim = %claim_ref, error = %e, "Batch build failed, rolling back claim");
                if let Err(release_err) = self.store.release_claim(&claim_ref).await {
                    warn!(claim = %claim_ref, error = %release_err, "Claim rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn record_claimed(
        &self,
        claim_ref: &str,
        events: &[crate::event::Event],
    ) -> Result<Batch, AuditError> {
        let leaves: Vec<String> = events.iter().map(|e| e.merkle_leaf_hash.clone()).collect();
        let tree = MerkleTree::build(&leaves)?;
        let batch_id = new_batch_id();

        let batch = self
            .store
            .record_batch(&batch_id, &tree.root(), events.len() as i64, claim_ref)
            .await?;

        info!(
            batch_id = %batch.batch_id,
            root = %batch.merkle_root,
            event_count = batch.event_count,
            "Built Merkle batch"
        );
        Ok(batch)
    }
}

/// Human-readable batch identifier: BATCH- plus the first 8 hex chars of a
/// v4 UUID, uppercased.
fn new_batch_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("BATCH-{}", uuid[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NewEvent;
    use crate::merkle;
    use crate::store::BatchStatus;

    async fn store_with_events(n: usize) -> Store {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        for i in 0..n {
            let fields = NewEvent {
                model_id: format!("model-{}", i),
                model_name: None,
                model_version: None,
                framework: None,
                dataset_name: None,
                dataset_version: None,
                dataset_hash: None,
                source: None,
                event_type: "Train".to_string(),
                actor: None,
                environment: None,
                timestamp: "2026-01-15T10:30:00Z".to_string(),
                summary: None,
            }
            .into_fields()
            .unwrap();
            store.insert_event(&fields).await.unwrap();
        }
        store
    }

    #[test]
    fn test_batch_id_shape() {
        let id = new_batch_id();
        assert!(id.starts_with("BATCH-"));
        assert_eq!(id.len(), 14);
        assert!(id[6..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_build_batches_all_pending() {
        let store = store_with_events(4).await;
        let builder = BatchBuilder::new(store.clone(), DEFAULT_BATCH_SIZE_LIMIT);

        let batch = builder.build(None).await.unwrap();
        assert_eq!(batch.event_count, 4);
        assert_eq!(batch.status, BatchStatus::Pending);

        // root commits to the ordered member leaves
        let leaves: Vec<String> = store
            .batch_leaves(&batch.batch_id)
            .await
            .unwrap()
            .into_iter()
            .map(|(_, leaf)| leaf)
            .collect();
        let tree = merkle::MerkleTree::build(&leaves).unwrap();
        assert_eq!(tree.root(), batch.merkle_root);
    }

    #[tokio::test]
    async fn test_empty_pool_is_rejected() {
        let store = store_with_events(0).await;
        let builder = BatchBuilder::new(store, DEFAULT_BATCH_SIZE_LIMIT);
        assert!(matches!(
            builder.build(None).await,
            Err(AuditError::NoEligibleEvents)
        ));
    }

    #[tokio::test]
    async fn test_second_build_sees_no_events() {
        let store = store_with_events(3).await;
        let builder = BatchBuilder::new(store, DEFAULT_BATCH_SIZE_LIMIT);

        builder.build(None).await.unwrap();
        assert!(matches!(
            builder.build(None).await,
            Err(AuditError::NoEligibleEvents)
        ));
    }

    #[tokio::test]
    async fn test_explicit_ids_select_subset() {
        let store = store_with_events(5).await;
        let builder = BatchBuilder::new(store.clone(), DEFAULT_BATCH_SIZE_LIMIT);

        let batch = builder.build(Some(vec![2, 4])).await.unwrap();
        assert_eq!(batch.event_count, 2);

        let ids: Vec<i64> = store
            .batch_leaves(&batch.batch_id)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![2, 4]);

        // the rest are still eligible
        let second = builder.build(None).await.unwrap();
        assert_eq!(second.event_count, 3);
    }

    #[tokio::test]
    async fn test_size_ceiling_applies() {
        let store = store_with_events(20).await;
        let builder = BatchBuilder::new(store, DEFAULT_BATCH_SIZE_LIMIT);
        let batch = builder.build(None).await.unwrap();
        assert_eq!(batch.event_count, 16);
    }
}
