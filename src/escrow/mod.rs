//! Escrow state reconciliation
//!
//! Batched on-chain reads, raw-tuple parsing, the persistent pruning cache,
//! and the store that publishes active deposits and their intents.

pub mod batch;
pub mod parser;
pub mod pruning;
pub mod refresh;
pub mod store;
pub mod types;

// Re-export for convenience
pub use pruning::{should_prune, DepositPruningCache};
pub use refresh::{RefreshScheduler, RefreshState};
pub use store::{EscrowStateStore, ReconcileSummary};
pub use types::{AmountRange, Currency, DepositView, Intent, IntentView, VerificationData, Verifier};
