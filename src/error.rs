use thiserror::Error;

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON serialization error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Integrity mismatch in {subject}: computed {computed}, expected {expected}")]
    IntegrityMismatch {
        subject: String,
        computed: String,
        expected: String,
    },

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("No eligible events for batch creation")]
    NoEligibleEvents,

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AuditError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn mismatch(
        subject: impl Into<String>,
        computed: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::IntegrityMismatch {
            subject: subject.into(),
            computed: computed.into(),
            expected: expected.into(),
        }
    }
}
