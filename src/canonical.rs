//! Canonical Event Serialization
//!
//! Converts event metadata into a deterministic byte sequence for hashing.
//! The field order is fixed here and nowhere else; two events with identical
//! field values always produce byte-identical output regardless of how they
//! were constructed.
//!
//! Encoding: fields are joined with `|`, each as `name=` followed by either
//! `<byte-length>:<utf8 value>` for a present value or `-` for an absent one.
//! Length prefixes keep the encoding unambiguous when values contain `|` or
//! `:`, and absent (`-`) hashes differently from empty (`0:`), so a field
//! cannot be forged by stripping or blanking it. Timestamps serialize as
//! RFC3339 UTC at second precision.

use crate::event::EventFields;

/// Timestamp format used in canonical bytes: RFC3339 UTC, second precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Serialize event fields into canonical bytes.
///
/// Pure and total: no I/O, no failure modes. The canonical field order is
/// model_id, model_name, model_version, framework, dataset_name,
/// dataset_version, dataset_hash, source, event_type, actor, environment,
/// timestamp, summary.
pub fn canonicalize(fields: &EventFields) -> Vec<u8> {
    let event_type = fields.event_type.to_string();
    let timestamp = fields.timestamp.format(TIMESTAMP_FORMAT).to_string();

    let mut out = Vec::with_capacity(256);
    push_field(&mut out, "model_id", Some(&fields.model_id));
    push_field(&mut out, "model_name", fields.model_name.as_deref());
    push_field(&mut out, "model_version", fields.model_version.as_deref());
    push_field(&mut out, "framework", fields.framework.as_deref());
    push_field(&mut out, "dataset_name", fields.dataset_name.as_deref());
    push_field(&mut out, "dataset_version", fields.dataset_version.as_deref());
    push_field(&mut out, "dataset_hash", fields.dataset_hash.as_deref());
    push_field(&mut out, "source", fields.source.as_deref());
    push_field(&mut out, "event_type", Some(&event_type));
    push_field(&mut out, "actor", fields.actor.as_deref());
    push_field(&mut out, "environment", fields.environment.as_deref());
    push_field(&mut out, "timestamp", Some(&timestamp));
    push_field(&mut out, "summary", fields.summary.as_deref());
    out
}

fn push_field(out: &mut Vec<u8>, name: &str, value: Option<&str>) {
    if !out.is_empty() {
        out.push(b'|');
    }
    out.extend_from_slice(name.as_bytes());
    out.push(b'=');
    match value {
        Some(v) => {
            out.extend_from_slice(v.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(v.as_bytes());
        }
        None => out.push(b'-'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use chrono::{TimeZone, Utc};

    fn minimal_fields() -> EventFields {
        EventFields {
            model_id: "resnet50".to_string(),
            model_name: None,
            model_version: None,
            framework: None,
            dataset_name: None,
            dataset_version: None,
            dataset_hash: None,
            source: None,
            event_type: EventType::Train,
            actor: None,
            environment: None,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 15, 10, 30, 0).unwrap(),
            summary: None,
        }
    }

    #[test]
    fn test_canonical_bytes_pinned() {
        let canonical = canonicalize(&minimal_fields());
        assert_eq!(
            String::from_utf8(canonical).unwrap(),
            "model_id=8:resnet50|model_name=-|model_version=-|framework=-|\
             dataset_name=-|dataset_version=-|dataset_hash=-|source=-|\
             event_type=5:Train|actor=-|environment=-|\
             timestamp=20:2026-01-15T10:30:00Z|summary=-"
        );
    }

    #[test]
    fn test_canonicalize_is_deterministic() {
        let a = canonicalize(&minimal_fields());
        let b = canonicalize(&minimal_fields());
        assert_eq!(a, b);
    }

    #[test]
    fn test_absent_and_empty_differ() {
        let absent = canonicalize(&minimal_fields());

        let mut with_empty = minimal_fields();
        with_empty.summary = Some(String::new());
        let empty = canonicalize(&with_empty);

        assert_ne!(absent, empty);
    }

    #[test]
    fn test_delimiter_in_value_cannot_forge_fields() {
        // "a|model_name=5:bbbbb" as a model_id must not collide with
        // model_id "a" plus model_name "bbbbb"
        let mut tricky = minimal_fields();
        tricky.model_id = "a|model_name=5:bbbbb".to_string();

        let mut honest = minimal_fields();
        honest.model_id = "a".to_string();
        honest.model_name = Some("bbbbb".to_string());

        assert_ne!(canonicalize(&tricky), canonicalize(&honest));
    }

    #[test]
    fn test_timestamp_second_precision() {
        let fields = minimal_fields();
        let canonical = String::from_utf8(canonicalize(&fields)).unwrap();
        assert!(canonical.contains("timestamp=20:2026-01-15T10:30:00Z"));
    }
}
