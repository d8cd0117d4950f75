//! Audit Event Model
//!
//! Defines ML lifecycle events (training, evaluation, deployment) and the
//! validation applied at ingestion. Descriptive fields are immutable once
//! recorded; the derived hashes are computed exactly once from the canonical
//! serialization.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::canonical;
use crate::error::AuditError;
use crate::hashing;
use crate::merkle;

/// Kind of ML lifecycle action an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventType {
    Train,
    Evaluate,
    Deploy,
}

impl FromStr for EventType {
    type Err = AuditError;

    /// Accepts case-insensitive aliases ("training", "evaluation",
    /// "deployment") and normalizes them to the canonical form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" | "training" => Ok(Self::Train),
            "evaluate" | "evaluation" => Ok(Self::Evaluate),
            "deploy" | "deployment" => Ok(Self::Deploy),
            other => Err(AuditError::validation(format!(
                "Invalid event_type '{}'. Must be one of: Train, Evaluate, Deploy",
                other
            ))),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Train => "Train",
            Self::Evaluate => "Evaluate",
            Self::Deploy => "Deploy",
        };
        f.write_str(s)
    }
}

impl TryFrom<String> for EventType {
    type Error = AuditError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.to_string()
    }
}

/// Pipeline lifecycle state of an event. Transitioned only by the pipeline,
/// never by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Pending,
    Batched,
    Anchored,
    Failed,
}

impl FromStr for EventStatus {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Batched" => Ok(Self::Batched),
            "Anchored" => Ok(Self::Anchored),
            "Failed" => Ok(Self::Failed),
            other => Err(AuditError::Database(format!(
                "Unknown event status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Batched => "Batched",
            Self::Anchored => "Anchored",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Descriptive fields of an event, in their validated, normalized form.
/// This is the exact input to the canonicalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFields {
    pub model_id: String,
    pub model_name: Option<String>,
    pub model_version: Option<String>,
    pub framework: Option<String>,
    pub dataset_name: Option<String>,
    pub dataset_version: Option<String>,
    pub dataset_hash: Option<String>,
    pub source: Option<String>,
    pub event_type: EventType,
    pub actor: Option<String>,
    pub environment: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub summary: Option<String>,
}

impl EventFields {
    /// Canonical byte serialization of these fields.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical::canonicalize(self)
    }

    /// SHA-256 of the canonical serialization, lowercase hex.
    pub fn metadata_hash(&self) -> String {
        hashing::digest_hex(&self.canonical_bytes())
    }

    /// Domain-separated Merkle leaf hash. A pure function of the metadata
    /// hash, so it can be recomputed independently during verification.
    pub fn merkle_leaf_hash(&self) -> String {
        merkle::leaf_hash_raw(&hashing::digest(&self.canonical_bytes()))
    }
}

/// Ingestion payload for a new audit event. Required fields: model_id,
/// event_type, timestamp. Everything else is optional and recorded verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub model_id: String,
    pub model_name: Option<String>,
    pub model_version: Option<String>,
    pub framework: Option<String>,
    pub dataset_name: Option<String>,
    pub dataset_version: Option<String>,
    pub dataset_hash: Option<String>,
    pub source: Option<String>,
    pub event_type: String,
    pub actor: Option<String>,
    pub environment: Option<String>,
    pub timestamp: String,
    pub summary: Option<String>,
}

impl NewEvent {
    /// Validate and normalize into canonical event fields.
    ///
    /// Rejects empty required fields and unparseable timestamps before any
    /// hashing happens. Timestamps are converted to UTC and truncated to
    /// second precision to match the canonical serialization.
    pub fn into_fields(self) -> Result<EventFields, AuditError> {
        if self.model_id.trim().is_empty() {
            return Err(AuditError::validation("model_id is required"));
        }
        if self.event_type.trim().is_empty() {
            return Err(AuditError::validation("event_type is required"));
        }
        if self.timestamp.trim().is_empty() {
            return Err(AuditError::validation("timestamp is required"));
        }

        let event_type: EventType = self.event_type.parse()?;

        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| {
                AuditError::validation(format!(
                    "Invalid timestamp '{}': {} (expected RFC3339)",
                    self.timestamp, e
                ))
            })?
            .with_timezone(&Utc);
        let timestamp = timestamp
            .with_nanosecond(0)
            .unwrap_or(timestamp);

        Ok(EventFields {
            model_id: self.model_id,
            model_name: self.model_name,
            model_version: self.model_version,
            framework: self.framework,
            dataset_name: self.dataset_name,
            dataset_version: self.dataset_version,
            dataset_hash: self.dataset_hash,
            source: self.source,
            event_type,
            actor: self.actor,
            environment: self.environment,
            timestamp,
            summary: self.summary,
        })
    }
}

/// A recorded audit event, including derived hashes and pipeline state.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i64,
    #[serde(flatten)]
    pub fields: EventFields,
    pub metadata_hash: String,
    pub merkle_leaf_hash: String,
    pub batch_id: Option<String>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_event() -> NewEvent {
        NewEvent {
            model_id: "resnet50".to_string(),
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
    }

    #[test]
    fn test_event_type_aliases() {
        assert_eq!("training".parse::<EventType>().unwrap(), EventType::Train);
        assert_eq!("EVALUATE".parse::<EventType>().unwrap(), EventType::Evaluate);
        assert_eq!(
            "deployment".parse::<EventType>().unwrap(),
            EventType::Deploy
        );
        assert!("rollback".parse::<EventType>().is_err());
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let mut ev = new_event();
        ev.model_id = "  ".to_string();
        assert!(ev.into_fields().is_err());

        let mut ev = new_event();
        ev.event_type = String::new();
        assert!(ev.into_fields().is_err());

        let mut ev = new_event();
        ev.timestamp = "not-a-timestamp".to_string();
        assert!(ev.into_fields().is_err());
    }

    #[test]
    fn test_timestamp_truncated_to_seconds() {
        let mut ev = new_event();
        ev.timestamp = "2026-01-15T11:30:00.123456+01:00".to_string();
        let fields = ev.into_fields().unwrap();
        assert_eq!(fields.timestamp.timestamp_subsec_nanos(), 0);
        // offset converted to UTC
        assert_eq!(
            fields.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "2026-01-15T10:30:00Z"
        );
    }

    #[test]
    fn test_metadata_hash_pinned() {
        let fields = new_event().into_fields().unwrap();
        assert_eq!(
            fields.metadata_hash(),
            "7327a1a6b601742825907be4513e8e43ad431c3cee5ab11c2bedeb1dbe231974"
        );
    }

    #[test]
    fn test_leaf_hash_is_pure_function_of_metadata_hash() {
        let fields = new_event().into_fields().unwrap();
        let via_fields = fields.merkle_leaf_hash();
        let via_metadata = merkle::leaf_hash(&fields.metadata_hash()).unwrap();
        assert_eq!(via_fields, via_metadata);
        assert_eq!(
            via_fields,
            "cb9d5822edd4ee8524bb4c59f9d40625ab12b1d6e6a0d9511a6e6417b02a509e"
        );
    }

    #[test]
    fn test_hash_differs_from_leaf_hash() {
        // domain separation: the leaf hash never equals the metadata hash
        let fields = new_event().into_fields().unwrap();
        assert_ne!(fields.metadata_hash(), fields.merkle_leaf_hash());
    }
}
