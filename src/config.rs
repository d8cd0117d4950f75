use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::batch::DEFAULT_BATCH_SIZE_LIMIT;
use crate::error::AuditError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub batch_size_limit: usize,
    pub ledger: LedgerConfig,
}

/// Ledger connectivity and confirmation policy. With no RPC URL configured
/// the in-memory ledger is used, mirroring the fallback mode of deployments
/// without a reachable chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: Option<String>,
    pub rpc_timeout_secs: u64,
    pub confirmation_depth: u64,
    pub poll_interval_ms: u64,
    pub confirm_timeout_secs: u64,
    pub max_submit_attempts: u32,
}

impl AppConfig {
    pub fn load() -> Result<Self, AuditError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://auditchain.db".to_string());

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = parse_env("SERVER_PORT", 3000u16)?;
        let batch_size_limit = parse_env("BATCH_SIZE_LIMIT", DEFAULT_BATCH_SIZE_LIMIT)?;

        let rpc_url = env::var("LEDGER_RPC_URL").ok().filter(|s| !s.is_empty());
        let ledger = LedgerConfig {
            rpc_url,
            rpc_timeout_secs: parse_env("LEDGER_RPC_TIMEOUT_SECS", 10u64)?,
            confirmation_depth: parse_env("LEDGER_CONFIRMATION_DEPTH", 1u64)?,
            poll_interval_ms: parse_env("LEDGER_POLL_INTERVAL_MS", 1000u64)?,
            confirm_timeout_secs: parse_env("LEDGER_CONFIRM_TIMEOUT_SECS", 120u64)?,
            max_submit_attempts: parse_env("LEDGER_MAX_SUBMIT_ATTEMPTS", 3u32)?,
        };

        Ok(AppConfig {
            database_url,
            server_host,
            server_port,
            batch_size_limit,
            ledger,
        })
    }
}

impl LedgerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AuditError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e| {
            AuditError::Config(format!("Invalid {} value '{}': {}", name, raw, e))
        }),
        Err(_) => Ok(default),
    }
}
