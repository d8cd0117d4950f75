//! Persistent Store
//!
//! SQLite-backed storage for events, batches, and anchors. The store is the
//! only component that writes lifecycle state; it also implements the
//! claim-ticket mechanism that serializes concurrent batch builds (events are
//! atomically marked `claimed_by` before any hashing, and un-claimed again if
//! a build fails before the batch is durably recorded).

pub mod models;

pub use models::{AnchorRecord, AnchorStatus, Batch, BatchStatus};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::AuditError;
use crate::event::{Event, EventFields, EventStatus};

const SCHEMA: &str = include_str!("schema.sql");

const EVENT_COLUMNS: &str = "id, model_id, model_name, model_version, framework, \
     dataset_name, dataset_version, dataset_hash, source, event_type, actor, \
     environment, timestamp, summary, metadata_hash, merkle_leaf_hash, \
     batch_id, status, created_at";

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect and initialize the schema. In-memory databases are pinned to a
    /// single connection so every query sees the same database.
    pub async fn connect(database_url: &str) -> Result<Self, AuditError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                AuditError::Config(format!("Invalid database URL '{}': {}", database_url, e))
            })?
            .create_if_missing(true);

        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        info!("Store initialized at {}", database_url);

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- events ----

    /// Insert a validated event, computing its derived hashes exactly once.
    pub async fn insert_event(&self, fields: &EventFields) -> Result<Event, AuditError> {
        let metadata_hash = fields.metadata_hash();
        let merkle_leaf_hash = fields.merkle_leaf_hash();
        let created_at = Utc::now();

        let result = sqlx::query(
            "INSERT INTO audit_events (model_id, model_name, model_version, framework, \
             dataset_name, dataset_version, dataset_hash, source, event_type, actor, \
             environment, timestamp, summary, metadata_hash, merkle_leaf_hash, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&fields.model_id)
        .bind(&fields.model_name)
        .bind(&fields.model_version)
        .bind(&fields.framework)
        .bind(&fields.dataset_name)
        .bind(&fields.dataset_version)
        .bind(&fields.dataset_hash)
        .bind(&fields.source)
        .bind(fields.event_type.to_string())
        .bind(&fields.actor)
        .bind(&fields.environment)
        .bind(fields.timestamp.to_rfc3339())
        .bind(&fields.summary)
        .bind(&metadata_hash)
        .bind(&merkle_leaf_hash)
        .bind(EventStatus::Pending.to_string())
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(event_id = id, hash = %metadata_hash, "Recorded audit event");

        Ok(Event {
            id,
            fields: fields.clone(),
            metadata_hash,
            merkle_leaf_hash,
            batch_id: None,
            status: EventStatus::Pending,
            created_at,
        })
    }

    pub async fn get_event(&self, id: i64) -> Result<Option<Event>, AuditError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM audit_events WHERE id = ?",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    pub async fn list_events(&self, limit: i64, offset: i64) -> Result<Vec<Event>, AuditError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM audit_events ORDER BY id DESC LIMIT ? OFFSET ?",
            EVENT_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    pub async fn find_event_by_hash(
        &self,
        metadata_hash: &str,
    ) -> Result<Option<Event>, AuditError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM audit_events WHERE metadata_hash = ? ORDER BY id LIMIT 1",
            EVENT_COLUMNS
        ))
        .bind(metadata_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    /// Mark an event Failed after a verification pass could not reproduce its
    /// metadata hash. Detected tampering is recorded, never repaired.
    pub async fn mark_event_failed(&self, id: i64) -> Result<(), AuditError> {
        sqlx::query("UPDATE audit_events SET status = ? WHERE id = ?")
            .bind(EventStatus::Failed.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- batch claims ----

    /// Atomically claim un-batched Pending events for one batch build.
    ///
    /// With explicit ids, only the eligible subset of those ids is claimed;
    /// otherwise the oldest eligible events up to `limit` are taken. Returns
    /// the claimed events in ascending id order, which is the leaf order the
    /// batch root will commit to.
    pub async fn claim_pending(
        &self,
        claim_ref: &str,
        event_ids: Option<&[i64]>,
        limit: usize,
    ) -> Result<Vec<Event>, AuditError> {
        let mut tx = self.pool.begin().await?;

        match event_ids {
            Some(ids) if !ids.is_empty() => {
                // ids are i64, safe to inline
                let id_list = ids
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                sqlx::query(&format!(
                    "UPDATE audit_events SET claimed_by = ? \
                     WHERE status = 'Pending' AND claimed_by IS NULL \
                     AND batch_id IS NULL AND id IN ({})",
                    id_list
                ))
                .bind(claim_ref)
                .execute(&mut *tx)
                .await?;
            }
            _ => {
                sqlx::query(
                    "UPDATE audit_events SET claimed_by = ? WHERE id IN ( \
                     SELECT id FROM audit_events \
                     WHERE status = 'Pending' AND claimed_by IS NULL AND batch_id IS NULL \
                     ORDER BY id LIMIT ?)",
                )
                .bind(claim_ref)
                .bind(limit as i64)
                .execute(&mut *tx)
                .await?;
            }
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM audit_events WHERE claimed_by = ? ORDER BY id",
            EVENT_COLUMNS
        ))
        .bind(claim_ref)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        rows.iter().map(event_from_row).collect()
    }

    /// Roll back a claim after a failed build, returning events to the
    /// un-batched pool.
    pub async fn release_claim(&self, claim_ref: &str) -> Result<(), AuditError> {
        let result = sqlx::query("UPDATE audit_events SET claimed_by = NULL WHERE claimed_by = ?")
            .bind(claim_ref)
            .execute(&self.pool)
            .await?;
        debug!(
            claim = claim_ref,
            released = result.rows_affected(),
            "Released batch claim"
        );
        Ok(())
    }

    // ---- batches ----

    /// Durably record a batch and promote its claimed events to Batched.
    /// One transaction: either the batch exists with all memberships set, or
    /// nothing changed and the claim can be rolled back.
    pub async fn record_batch(
        &self,
        batch_id: &str,
        merkle_root: &str,
        event_count: i64,
        claim_ref: &str,
    ) -> Result<Batch, AuditError> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO merkle_batches (batch_id, merkle_root, event_count, status, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(batch_id)
        .bind(merkle_root)
        .bind(event_count)
        .bind(BatchStatus::Pending.to_string())
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE audit_events SET batch_id = ?, status = ?, claimed_by = NULL \
             WHERE claimed_by = ?",
        )
        .bind(batch_id)
        .bind(EventStatus::Batched.to_string())
        .bind(claim_ref)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(batch_id, root = %merkle_root, event_count, "Recorded Merkle batch");

        Ok(Batch {
            batch_id: batch_id.to_string(),
            merkle_root: merkle_root.to_string(),
            event_count,
            status: BatchStatus::Pending,
            created_at,
        })
    }

    pub async fn get_batch(&self, batch_id: &str) -> Result<Option<Batch>, AuditError> {
        let row = sqlx::query(
            "SELECT batch_id, merkle_root, event_count, status, created_at \
             FROM merkle_batches WHERE batch_id = ?",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(batch_from_row).transpose()
    }

    pub async fn list_batches(&self) -> Result<Vec<Batch>, AuditError> {
        let rows = sqlx::query(
            "SELECT batch_id, merkle_root, event_count, status, created_at \
             FROM merkle_batches ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(batch_from_row).collect()
    }

    /// Ordered (event id, leaf hash) pairs for a batch — the exact leaf
    /// sequence its root was built from.
    pub async fn batch_leaves(&self, batch_id: &str) -> Result<Vec<(i64, String)>, AuditError> {
        let rows = sqlx::query(
            "SELECT id, merkle_leaf_hash FROM audit_events WHERE batch_id = ? ORDER BY id",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok((row.try_get("id")?, row.try_get("merkle_leaf_hash")?)))
            .collect()
    }

    // ---- anchors ----

    pub async fn insert_anchor(
        &self,
        batch_id: &str,
        merkle_root: &str,
        tx_hash: &str,
        block_number: Option<i64>,
        block_hash: Option<&str>,
        status: AnchorStatus,
        error: Option<&str>,
    ) -> Result<AnchorRecord, AuditError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO ledger_anchors (batch_id, merkle_root, tx_hash, block_number, \
             block_hash, status, error, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(batch_id)
        .bind(merkle_root)
        .bind(tx_hash)
        .bind(block_number)
        .bind(block_hash)
        .bind(status.to_string())
        .bind(error)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AnchorRecord {
            id: result.last_insert_rowid(),
            batch_id: batch_id.to_string(),
            merkle_root: merkle_root.to_string(),
            tx_hash: tx_hash.to_string(),
            block_number,
            block_hash: block_hash.map(str::to_string),
            status,
            error: error.map(str::to_string),
            created_at,
        })
    }

    /// Latest anchor attempt for a batch, if any.
    pub async fn get_anchor_for_batch(
        &self,
        batch_id: &str,
    ) -> Result<Option<AnchorRecord>, AuditError> {
        let row = sqlx::query(
            "SELECT id, batch_id, merkle_root, tx_hash, block_number, block_hash, \
             status, error, created_at FROM ledger_anchors \
             WHERE batch_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(anchor_from_row).transpose()
    }

    /// Confirm an anchor and promote its batch and member events to
    /// Anchored, in one transaction.
    pub async fn mark_anchor_confirmed(
        &self,
        anchor_id: i64,
        batch_id: &str,
        block_number: Option<i64>,
        block_hash: Option<&str>,
    ) -> Result<(), AuditError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE ledger_anchors SET status = ?, block_number = ?, block_hash = ? WHERE id = ?",
        )
        .bind(AnchorStatus::Confirmed.to_string())
        .bind(block_number)
        .bind(block_hash)
        .bind(anchor_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE merkle_batches SET status = ? WHERE batch_id = ?")
            .bind(BatchStatus::Anchored.to_string())
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE audit_events SET status = ? WHERE batch_id = ?")
            .bind(EventStatus::Anchored.to_string())
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(anchor_id, batch_id, "Anchor confirmed");
        Ok(())
    }

    pub async fn mark_anchor_failed(&self, anchor_id: i64, error: &str) -> Result<(), AuditError> {
        sqlx::query("UPDATE ledger_anchors SET status = ?, error = ? WHERE id = ?")
            .bind(AnchorStatus::Failed.to_string())
            .bind(error)
            .bind(anchor_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AuditError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AuditError::Database(format!("Invalid stored timestamp '{}': {}", raw, e)))
}

fn event_from_row(row: &SqliteRow) -> Result<Event, AuditError> {
    let event_type: String = row.try_get("event_type")?;
    let status: String = row.try_get("status")?;
    let timestamp: String = row.try_get("timestamp")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Event {
        id: row.try_get("id")?,
        fields: EventFields {
            model_id: row.try_get("model_id")?,
            model_name: row.try_get("model_name")?,
            model_version: row.try_get("model_version")?,
            framework: row.try_get("framework")?,
            dataset_name: row.try_get("dataset_name")?,
            dataset_version: row.try_get("dataset_version")?,
            dataset_hash: row.try_get("dataset_hash")?,
            source: row.try_get("source")?,
            event_type: event_type.parse()?,
            actor: row.try_get("actor")?,
            environment: row.try_get("environment")?,
            timestamp: parse_timestamp(&timestamp)?,
            summary: row.try_get("summary")?,
        },
        metadata_hash: row.try_get("metadata_hash")?,
        merkle_leaf_hash: row.try_get("merkle_leaf_hash")?,
        batch_id: row.try_get("batch_id")?,
        status: status.parse()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn batch_from_row(row: &SqliteRow) -> Result<Batch, AuditError> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(Batch {
        batch_id: row.try_get("batch_id")?,
        merkle_root: row.try_get("merkle_root")?,
        event_count: row.try_get("event_count")?,
        status: status.parse()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn anchor_from_row(row: &SqliteRow) -> Result<AnchorRecord, AuditError> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(AnchorRecord {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        merkle_root: row.try_get("merkle_root")?,
        tx_hash: row.try_get("tx_hash")?,
        block_number: row.try_get("block_number")?,
        block_hash: row.try_get("block_hash")?,
        status: status.parse()?,
        error: row.try_get("error")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, NewEvent};

    async fn memory_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    fn fields(model_id: &str) -> EventFields {
        NewEvent {
            model_id: model_id.to_string(),
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
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_event() {
        let store = memory_store().await;
        let created = store.insert_event(&fields("model-a")).await.unwrap();

        let fetched = store.get_event(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.metadata_hash, created.metadata_hash);
        assert_eq!(fetched.fields.event_type, EventType::Train);
        assert_eq!(fetched.status, EventStatus::Pending);
        assert!(fetched.batch_id.is_none());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = memory_store().await;
        for i in 0..4 {
            store.insert_event(&fields(&format!("m-{}", i))).await.unwrap();
        }

        let first = store.claim_pending("claim-a", None, 16).await.unwrap();
        assert_eq!(first.len(), 4);

        // a second claim sees nothing while the first is outstanding
        let second = store.claim_pending("claim-b", None, 16).await.unwrap();
        assert!(second.is_empty());

        // rollback makes them eligible again
        store.release_claim("claim-a").await.unwrap();
        let third = store.claim_pending("claim-c", None, 16).await.unwrap();
        assert_eq!(third.len(), 4);
    }

    #[tokio::test]
    async fn test_claim_respects_limit_and_order() {
        let store = memory_store().await;
        for i in 0..5 {
            store.insert_event(&fields(&format!("m-{}", i))).await.unwrap();
        }

        let claimed = store.claim_pending("claim-a", None, 3).await.unwrap();
        let ids: Vec<i64> = claimed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_record_batch_promotes_events() {
        let store = memory_store().await;
        for i in 0..3 {
            store.insert_event(&fields(&format!("m-{}", i))).await.unwrap();
        }
        let claimed = store.claim_pending("claim-a", None, 16).await.unwrap();

        let batch = store
            .record_batch("BATCH-TEST0001", &"a".repeat(64), claimed.len() as i64, "claim-a")
            .await
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Pending);

        let event = store.get_event(claimed[0].id).await.unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Batched);
        assert_eq!(event.batch_id.as_deref(), Some("BATCH-TEST0001"));

        let leaves = store.batch_leaves("BATCH-TEST0001").await.unwrap();
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[0].1, claimed[0].merkle_leaf_hash);
    }

    #[tokio::test]
    async fn test_anchor_confirmation_promotes_batch_and_events() {
        let store = memory_store().await;
        store.insert_event(&fields("m-0")).await.unwrap();
        store.claim_pending("c", None, 16).await.unwrap();
        store.record_batch("BATCH-X", &"b".repeat(64), 1, "c").await.unwrap();

        let anchor = store
            .insert_anchor("BATCH-X", &"b".repeat(64), "0xabc", None, None, AnchorStatus::Pending, None)
            .await
            .unwrap();
        store
            .mark_anchor_confirmed(anchor.id, "BATCH-X", Some(7), Some("0xblock"))
            .await
            .unwrap();

        let batch = store.get_batch("BATCH-X").await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Anchored);
        let event = store.get_event(1).await.unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Anchored);

        let stored = store.get_anchor_for_batch("BATCH-X").await.unwrap().unwrap();
        assert_eq!(stored.status, AnchorStatus::Confirmed);
        assert_eq!(stored.block_number, Some(7));
    }
}
