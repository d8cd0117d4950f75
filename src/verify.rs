//! Verification Engine
//!
//! Answers "is this event authentic and unaltered?" by recomputing hashes
//! and roots from first principles and comparing them against stored and
//! anchored state. Every verdict is a definite PASS or FAIL; a FAIL always
//! names the comparison that broke and both mismatching values. Detected
//! corruption is recorded, never repaired.

use serde::Serialize;
use tracing::{info, warn};

use crate::anchor::LedgerBackend;
use crate::error::AuditError;
use crate::event::NewEvent;
use crate::merkle::{self, MerkleTree};
use crate::store::{BatchStatus, Store};

/// One named comparison performed during verification, with both sides of
/// the comparison preserved for audit.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub computed: String,
    pub expected: String,
}

/// The specific comparison that failed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Mismatch {
    HashMismatch {
        computed_hash: String,
        stored_hash: String,
    },
    ProofMismatch {
        computed_root: String,
        expected_root: String,
    },
    OnchainMismatch {
        local_root: String,
        onchain_root: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub message: String,
    pub event_id: Option<i64>,
    pub batch_id: Option<String>,
    pub checks: Vec<CheckOutcome>,
    pub failure: Option<Mismatch>,
}

#[derive(Clone)]
pub struct VerificationEngine {
    store: Store,
    ledger: LedgerBackend,
}

impl VerificationEngine {
    pub fn new(store: Store, ledger: LedgerBackend) -> Self {
        Self { store, ledger }
    }

    /// Verify a stored event by id.
    ///
    /// The metadata hash is checked first and a mismatch stops verification
    /// right there — a tampered event must fail at the hash stage, not
    /// surface later as a confusing proof or root mismatch. For Batched
    /// events the inclusion proof is recomputed from the batch's member
    /// leaves; for Anchored batches the locally recomputed root is also
    /// compared against the ledger.
    pub async fn verify_event(&self, event_id: i64) -> Result<VerificationReport, AuditError> {
        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| AuditError::not_found(format!("Event {}", event_id)))?;

        let mut checks = Vec::new();

        let computed_hash = event.fields.metadata_hash();
        let hash_ok = computed_hash == event.metadata_hash;
        checks.push(CheckOutcome {
            name: "metadata_hash",
            passed: hash_ok,
            computed: computed_hash.clone(),
            expected: event.metadata_hash.clone(),
        });

        if !hash_ok {
            warn!(
                event_id,
                computed = %computed_hash,
                stored = %event.metadata_hash,
                "Metadata hash mismatch, marking event Failed"
            );
            self.store.mark_event_failed(event_id).await?;
            return Ok(VerificationReport {
                valid: false,
                message: "Metadata hash mismatch: event fields do not reproduce the stored hash"
                    .to_string(),
                event_id: Some(event_id),
                batch_id: event.batch_id,
                checks,
                failure: Some(Mismatch::HashMismatch {
                    computed_hash,
                    stored_hash: event.metadata_hash,
                }),
            });
        }

        if let Some(batch_id) = event.batch_id.clone() {
            let batch = self
                .store
                .get_batch(&batch_id)
                .await?
                .ok_or_else(|| AuditError::not_found(format!("Batch {}", batch_id)))?;

            let members = self.store.batch_leaves(&batch_id).await?;
            let index = members
                .iter()
                .position(|(id, _)| *id == event.id)
                .ok_or_else(|| {
                    AuditError::Database(format!(
                        "Event {} not in membership of batch {}",
                        event_id, batch_id
                    ))
                })?;
            let leaves: Vec<String> = members.into_iter().map(|(_, leaf)| leaf).collect();

            let tree = MerkleTree::build(&leaves)?;
            let proof = tree.prove(index)?;
            let computed_root = tree.root();

            // leaf recomputed from the fields just verified, not read back
            let leaf = event.fields.merkle_leaf_hash();
            let proof_ok = merkle::verify_proof(&leaf, &proof.steps, &batch.merkle_root)?;
            checks.push(CheckOutcome {
                name: "merkle_proof",
                passed: proof_ok,
                computed: computed_root.clone(),
                expected: batch.merkle_root.clone(),
            });

            if !proof_ok {
                return Ok(VerificationReport {
                    valid: false,
                    message: "Merkle proof mismatch: recomputed root does not match batch root"
                        .to_string(),
                    event_id: Some(event_id),
                    batch_id: Some(batch_id),
                    checks,
                    failure: Some(Mismatch::ProofMismatch {
                        computed_root,
                        expected_root: batch.merkle_root,
                    }),
                });
            }

            if batch.status == BatchStatus::Anchored {
                let onchain = self.ledger.fetch_root(&batch_id).await?;
                let onchain_ok = onchain.as_deref() == Some(computed_root.as_str());
                checks.push(CheckOutcome {
                    name: "onchain_root",
                    passed: onchain_ok,
                    computed: computed_root.clone(),
                    expected: onchain.clone().unwrap_or_else(|| "(absent)".to_string()),
                });

                if !onchain_ok {
                    return Ok(VerificationReport {
                        valid: false,
                        message:
                            "On-chain mismatch: anchored root differs from locally computed root"
                                .to_string(),
                        event_id: Some(event_id),
                        batch_id: Some(batch_id),
                        checks,
                        failure: Some(Mismatch::OnchainMismatch {
                            local_root: computed_root,
                            onchain_root: onchain,
                        }),
                    });
                }
            }

            info!(event_id, batch_id = %batch_id, "Event verified");
            return Ok(VerificationReport {
                valid: true,
                message: "Event integrity verified".to_string(),
                event_id: Some(event_id),
                batch_id: Some(batch_id),
                checks,
                failure: None,
            });
        }

        info!(event_id, "Event verified (not yet batched)");
        Ok(VerificationReport {
            valid: true,
            message: "Event integrity verified".to_string(),
            event_id: Some(event_id),
            batch_id: None,
            checks,
            failure: None,
        })
    }

    /// Verify caller-supplied metadata against a claimed hash, trusting
    /// nothing in local storage and touching no other event's data. A
    /// passing check also reports whether an event with that hash exists in
    /// the store.
    pub async fn verify_metadata(
        &self,
        metadata: NewEvent,
        claimed_hash: &str,
    ) -> Result<VerificationReport, AuditError> {
        let fields = metadata.into_fields()?;
        let computed_hash = fields.metadata_hash();
        let hash_ok = computed_hash == claimed_hash;

        let checks = vec![CheckOutcome {
            name: "metadata_hash",
            passed: hash_ok,
            computed: computed_hash.clone(),
            expected: claimed_hash.to_string(),
        }];

        if !hash_ok {
            return Ok(VerificationReport {
                valid: false,
                message: "Metadata hash mismatch: supplied fields do not reproduce the claimed hash"
                    .to_string(),
                event_id: None,
                batch_id: None,
                checks,
                failure: Some(Mismatch::HashMismatch {
                    computed_hash,
                    stored_hash: claimed_hash.to_string(),
                }),
            });
        }

        let known = self.store.find_event_by_hash(&computed_hash).await?;
        let message = match &known {
            Some(event) => format!("Metadata verified; matches stored event {}", event.id),
            None => "Metadata verified; no stored event carries this hash".to_string(),
        };

        Ok(VerificationReport {
            valid: true,
            message,
            event_id: known.map(|e| e.id),
            batch_id: None,
            checks,
            failure: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{AnchorClient, AnchorPolicy, InMemoryLedger};
    use crate::batch::BatchBuilder;
    use std::time::Duration;

    fn new_event(i: usize) -> NewEvent {
        NewEvent {
            model_id: format!("model-{}", i),
            model_name: Some("ResNet".to_string()),
            model_version: None,
            framework: Some("pytorch".to_string()),
            dataset_name: None,
            dataset_version: None,
            dataset_hash: None,
            source: None,
            event_type: "Evaluate".to_string(),
            actor: Some("ci".to_string()),
            environment: None,
            timestamp: "2026-02-01T08:00:00Z".to_string(),
            summary: Some(format!("run {}", i)),
        }
    }

    async fn engine_with_anchored_batch(
        n: usize,
    ) -> (VerificationEngine, Store, crate::store::Batch) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        for i in 0..n {
            let fields = new_event(i).into_fields().unwrap();
            store.insert_event(&fields).await.unwrap();
        }
        let batch = BatchBuilder::new(store.clone(), 16).build(None).await.unwrap();

        let ledger = LedgerBackend::Memory(InMemoryLedger::new());
        let client = AnchorClient::new(
            store.clone(),
            ledger.clone(),
            AnchorPolicy {
                poll_interval: Duration::from_millis(10),
                confirm_timeout: Duration::from_millis(500),
                ..AnchorPolicy::default()
            },
        );
        client.submit(&batch.batch_id, &batch.merkle_root).await.unwrap();
        client.await_confirmation(&batch.batch_id).await.unwrap();

        (VerificationEngine::new(store.clone(), ledger), store, batch)
    }

    #[tokio::test]
    async fn test_all_members_pass_after_anchoring() {
        let (engine, _store, batch) = engine_with_anchored_batch(5).await;
        for id in 1..=5 {
            let report = engine.verify_event(id).await.unwrap();
            assert!(report.valid, "event {} failed: {:?}", id, report.failure);
            assert_eq!(report.batch_id.as_deref(), Some(batch.batch_id.as_str()));
            assert_eq!(report.checks.len(), 3);
            assert!(report.checks.iter().all(|c| c.passed));
        }
    }

    #[tokio::test]
    async fn test_unbatched_event_passes_hash_check_only() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let event = store
            .insert_event(&new_event(0).into_fields().unwrap())
            .await
            .unwrap();
        let engine =
            VerificationEngine::new(store, LedgerBackend::Memory(InMemoryLedger::new()));

        let report = engine.verify_event(event.id).await.unwrap();
        assert!(report.valid);
        assert_eq!(report.checks.len(), 1);
    }

    #[tokio::test]
    async fn test_tampered_event_fails_at_hash_stage() {
        let (engine, store, _batch) = engine_with_anchored_batch(4).await;

        sqlx::query("UPDATE audit_events SET summary = 'revised' WHERE id = 2")
            .execute(store.pool())
            .await
            .unwrap();

        let report = engine.verify_event(2).await.unwrap();
        assert!(!report.valid);
        assert!(matches!(report.failure, Some(Mismatch::HashMismatch { .. })));
        // fails before any proof or on-chain comparison runs
        assert_eq!(report.checks.len(), 1);

        let event = store.get_event(2).await.unwrap().unwrap();
        assert_eq!(event.status, crate::event::EventStatus::Failed);

        // untampered members still pass
        let ok = engine.verify_event(1).await.unwrap();
        assert!(ok.valid);
    }

    #[tokio::test]
    async fn test_tampered_stored_root_fails_proof_stage() {
        let (engine, store, batch) = engine_with_anchored_batch(3).await;

        sqlx::query("UPDATE merkle_batches SET merkle_root = ? WHERE batch_id = ?")
            .bind("e".repeat(64))
            .bind(&batch.batch_id)
            .execute(store.pool())
            .await
            .unwrap();

        let report = engine.verify_event(1).await.unwrap();
        assert!(!report.valid);
        assert!(matches!(
            report.failure,
            Some(Mismatch::ProofMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_metadata_mode_pass_and_fail() {
        let (engine, _store, _batch) = engine_with_anchored_batch(2).await;

        let claimed = new_event(0).into_fields().unwrap().metadata_hash();
        let report = engine
            .verify_metadata(new_event(0), &claimed)
            .await
            .unwrap();
        assert!(report.valid);
        assert_eq!(report.event_id, Some(1));

        let report = engine
            .verify_metadata(new_event(1), &claimed)
            .await
            .unwrap();
        assert!(!report.valid);
        assert!(matches!(report.failure, Some(Mismatch::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn test_metadata_mode_unknown_hash_still_passes() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let engine =
            VerificationEngine::new(store, LedgerBackend::Memory(InMemoryLedger::new()));

        let claimed = new_event(7).into_fields().unwrap().metadata_hash();
        let report = engine.verify_metadata(new_event(7), &claimed).await.unwrap();
        assert!(report.valid);
        assert_eq!(report.event_id, None);
    }
}
