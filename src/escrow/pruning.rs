//! Deposit pruning cache
//!
//! Persists, per escrow contract, the IDs of deposits known to be filled or
//! invalid so they are never fetched again. The set only grows. Store
//! failures are logged and swallowed: losing the set just means one redundant
//! refetch.

use ethereum_types::Address;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::parser::normalize_address;
use super::types::DepositView;
use crate::storage::KeyValueStore;

pub const PRUNED_IDS_KEY_PREFIX: &str = "prunedEscrowDepositIds_";

/// Whether a parsed deposit can never become active again (or is not ours to show).
///
/// A deposit is pruned when it can no longer satisfy a minimum-size intent and
/// has nothing outstanding, when its depositor slot is empty, or when it holds
/// a different token than the one this client trades.
pub fn should_prune(deposit: &DepositView, target_token: &Address) -> bool {
    let drained = deposit.available_liquidity < deposit.intent_amount_range.min
        && deposit.outstanding_intent_amount.is_zero();
    drained || deposit.depositor.is_zero() || deposit.token != *target_token
}

/// Persistent registry of pruned deposit IDs keyed by escrow contract.
#[derive(Clone)]
pub struct DepositPruningCache {
    store: Arc<dyn KeyValueStore>,
}

impl DepositPruningCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Key for `contract_address`; differently cased spellings of one contract share a key.
    pub fn storage_key(contract_address: &str) -> String {
        format!("{}{}", PRUNED_IDS_KEY_PREFIX, normalize_address(contract_address))
    }

    /// Loads the pruned set for `contract_address`; any failure yields an empty set.
    pub fn load(&self, contract_address: &str) -> BTreeSet<u64> {
        let key = Self::storage_key(contract_address);
        match self.store.get_item(&key) {
            Ok(Some(json)) => match serde_json::from_str::<Vec<u64>>(&json) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    warn!("Discarding unreadable pruned-id cache {}: {}", key, e);
                    BTreeSet::new()
                }
            },
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!("Failed to load pruned-id cache {}: {:#}", key, e);
                BTreeSet::new()
            }
        }
    }

    /// Persists `ids` merged with whatever is already stored, so the set never shrinks.
    pub fn save(&self, contract_address: &str, ids: &BTreeSet<u64>) {
        let key = Self::storage_key(contract_address);
        let mut merged = self.load(contract_address);
        merged.extend(ids.iter().copied());

        let json = match serde_json::to_string(&merged.iter().collect::<Vec<_>>()) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode pruned-id cache {}: {}", key, e);
                return;
            }
        };

        match self.store.set_item(&key, &json) {
            Ok(()) => debug!("Saved {} pruned deposit id(s) under {}", merged.len(), key),
            Err(e) => warn!("Failed to save pruned-id cache {}: {:#}", key, e),
        }
    }

    /// Drops the pruned set for `contract_address`; everything is refetched on the next pass.
    pub fn clear(&self, contract_address: &str) {
        let key = Self::storage_key(contract_address);
        if let Err(e) = self.store.remove_item(&key) {
            warn!("Failed to clear pruned-id cache {}: {:#}", key, e);
        }
    }
}
