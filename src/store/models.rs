use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuditError;

/// Lifecycle state of a Merkle batch. Failures never land here; they live on
/// the anchor record and the batch stays Pending until an anchor confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Pending,
    Anchored,
}

impl FromStr for BatchStatus {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Anchored" => Ok(Self::Anchored),
            other => Err(AuditError::Database(format!(
                "Unknown batch status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Anchored => f.write_str("Anchored"),
        }
    }
}

/// One Merkle tree over a fixed, closed set of events. The member set and
/// root are immutable once recorded; re-batching only ever creates new
/// batches from still-unbatched events.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub batch_id: String,
    pub merkle_root: String,
    pub event_count: i64,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a ledger anchor transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorStatus {
    Pending,
    Confirmed,
    Failed,
}

impl FromStr for AnchorStatus {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Failed" => Ok(Self::Failed),
            other => Err(AuditError::Database(format!(
                "Unknown anchor status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AnchorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Confirmed => f.write_str("Confirmed"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// One ledger transaction recording a batch root on-chain.
#[derive(Debug, Clone, Serialize)]
pub struct AnchorRecord {
    pub id: i64,
    pub batch_id: String,
    pub merkle_root: String,
    pub tx_hash: String,
    pub block_number: Option<i64>,
    pub block_hash: Option<String>,
    pub status: AnchorStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
