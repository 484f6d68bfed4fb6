//! Chain Clients Module
//!
//! This module defines the read-only interface the escrow state store consumes
//! and the raw tuple shapes it returns, plus the EVM JSON-RPC implementation.

pub mod abi;
pub mod evm;
pub mod raw;

use anyhow::Result;
use async_trait::async_trait;

// Re-export for convenience
pub use evm::EvmEscrowClient;
pub use raw::{
    RawCurrency, RawDeposit, RawDepositView, RawIntent, RawIntentView, RawNumber, RawRange,
    RawVerificationData, RawVerifierDataView,
};

/// Read-only view of an escrow contract.
///
/// Every call names the escrow contract it targets so that a single reader can
/// serve a contract switch without being rebuilt.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Number of deposits ever created on the escrow.
    async fn deposit_counter(&self, escrow: &str) -> Result<u64>;

    /// All deposits created by `owner`.
    async fn get_account_deposits(&self, escrow: &str, owner: &str) -> Result<Vec<RawDepositView>>;

    /// Deposits for the given IDs, in request order.
    async fn get_deposit_from_ids(&self, escrow: &str, ids: &[u64]) -> Result<Vec<RawDepositView>>;

    /// Intents for the given hashes, in request order.
    async fn get_intents(&self, escrow: &str, hashes: &[String]) -> Result<Vec<RawIntentView>>;
}
