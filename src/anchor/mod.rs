//! Anchor Client
//!
//! Submits batch roots to an external ledger and reads them back. The ledger
//! footprint is deliberately tiny: store an opaque (batch id, root) pair and
//! retrieve the root stored for a batch id. Key management, gas strategy and
//! network selection belong to the ledger deployment, not to this client.

mod client;
mod ledger;

pub use client::{AnchorClient, AnchorPolicy};
pub use ledger::{ConfirmationStatus, InMemoryLedger, JsonRpcLedger, LedgerBackend, TxSubmission};
