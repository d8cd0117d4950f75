//! Offline verification tool.
//!
//! Recomputes an event's metadata hash from supplied field values and
//! compares it against an expected hash, without touching any server or
//! database. Optionally checks an inclusion proof (as produced by the
//! proofs endpoint) against a batch root.

use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use std::fs;

use auditchain::event::NewEvent;
use auditchain::merkle::{self, MerkleProof};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new("verify-event")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Verify AuditChain event metadata and inclusion proofs offline")
        .arg(
            Arg::new("model-id")
                .long("model-id")
                .value_name("ID")
                .help("Model identifier")
                .required(true),
        )
        .arg(
            Arg::new("event-type")
                .long("event-type")
                .value_name("TYPE")
                .help("Event type: Train, Evaluate, or Deploy")
                .required(true),
        )
        .arg(
            Arg::new("timestamp")
                .long("timestamp")
                .value_name("RFC3339")
                .help("Event timestamp, e.g. 2026-01-15T10:30:00Z")
                .required(true),
        )
        .arg(Arg::new("model-name").long("model-name").value_name("NAME"))
        .arg(
            Arg::new("model-version")
                .long("model-version")
                .value_name("VERSION"),
        )
        .arg(Arg::new("framework").long("framework").value_name("NAME"))
        .arg(
            Arg::new("dataset-name")
                .long("dataset-name")
                .value_name("NAME"),
        )
        .arg(
            Arg::new("dataset-version")
                .long("dataset-version")
                .value_name("VERSION"),
        )
        .arg(
            Arg::new("dataset-hash")
                .long("dataset-hash")
                .value_name("HASH"),
        )
        .arg(Arg::new("source").long("source").value_name("SOURCE"))
        .arg(Arg::new("actor").long("actor").value_name("ACTOR"))
        .arg(
            Arg::new("environment")
                .long("environment")
                .value_name("ENV"),
        )
        .arg(Arg::new("summary").long("summary").value_name("TEXT"))
        .arg(
            Arg::new("expected-hash")
                .long("expected-hash")
                .value_name("HASH")
                .help("Metadata hash to compare against; omit to just print the computed hash"),
        )
        .arg(
            Arg::new("proof-file")
                .long("proof-file")
                .value_name("PATH")
                .help("JSON inclusion proof to check against the recomputed leaf"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress output except errors"),
        )
        .get_matches();

    let opt = |name: &str| matches.get_one::<String>(name).cloned();

    let event = NewEvent {
        model_id: opt("model-id").unwrap_or_default(),
        model_name: opt("model-name"),
        model_version: opt("model-version"),
        framework: opt("framework"),
        dataset_name: opt("dataset-name"),
        dataset_version: opt("dataset-version"),
        dataset_hash: opt("dataset-hash"),
        source: opt("source"),
        event_type: opt("event-type").unwrap_or_default(),
        actor: opt("actor"),
        environment: opt("environment"),
        timestamp: opt("timestamp").unwrap_or_default(),
        summary: opt("summary"),
    };

    let quiet = matches.get_flag("quiet");
    let fields = event.into_fields().map_err(|e| anyhow!("{}", e))?;
    let computed = fields.metadata_hash();
    let leaf = fields.merkle_leaf_hash();

    if !quiet {
        println!("metadata_hash:    {}", computed);
        println!("merkle_leaf_hash: {}", leaf);
    }

    if let Some(expected) = opt("expected-hash") {
        if computed != expected {
            eprintln!("FAIL: computed {} but expected {}", computed, expected);
            std::process::exit(1);
        }
        if !quiet {
            println!("metadata hash matches");
        }
    }

    if let Some(path) = opt("proof-file") {
        let raw = fs::read_to_string(&path)
            .map_err(|e| anyhow!("Failed to read proof file {}: {}", path, e))?;
        let proof: MerkleProof = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("Failed to parse proof file {}: {}", path, e))?;

        if proof.leaf_hash != leaf {
            eprintln!(
                "FAIL: proof leaf {} does not match recomputed leaf {}",
                proof.leaf_hash, leaf
            );
            std::process::exit(1);
        }

        let ok = merkle::verify_proof(&leaf, &proof.steps, &proof.root)
            .map_err(|e| anyhow!("{}", e))?;
        if !ok {
            eprintln!(
                "FAIL: inclusion proof does not reproduce root {}",
                proof.root
            );
            std::process::exit(1);
        }
        if !quiet {
            println!("inclusion proof verified against root {}", proof.root);
        }
    }

    if !quiet {
        println!("OK");
    }
    Ok(())
}
