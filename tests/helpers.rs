//! Shared test helpers for escrow client tests
//!
//! Constants, raw tuple builders and an in-memory chain reader.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use escrow_client::chains::{
    ChainReader, RawCurrency, RawDeposit, RawDepositView, RawIntent, RawIntentView, RawNumber,
    RawRange, RawVerificationData, RawVerifierDataView,
};
use escrow_client::config::{
    BridgeConfig, ChainConfig, ClientConfig, PlatformConfig, ReconciliationConfig, SequencerConfig,
    StorageConfig,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// CONSTANTS
// ============================================================================

// ------------------------- TOKENS AND CONTRACTS -------------------------

/// Dummy escrow contract (EVM format, 40 hex characters)
pub const DUMMY_ESCROW_ADDR: &str = "0x00000000000000000000000000000000000000e1";

/// Second escrow contract, for switch tests
pub const DUMMY_ESCROW_ADDR_2: &str = "0x00000000000000000000000000000000000000e2";

/// Token the client trades
pub const DUMMY_TOKEN_ADDR: &str = "0x000000000000000000000000000000000000000a";

/// Some other token
pub const DUMMY_OTHER_TOKEN_ADDR: &str = "0x000000000000000000000000000000000000000b";

pub const ZERO_ADDR: &str = "0x0000000000000000000000000000000000000000";

// -------------------------------- USERS ---------------------------------

pub const DUMMY_DEPOSITOR_ADDR: &str = "0x0000000000000000000000000000000000000006";

pub const DUMMY_OWNER_ADDR: &str = "0x0000000000000000000000000000000000000007";

pub const DUMMY_VERIFIER_ADDR: &str = "0x0000000000000000000000000000000000000009";

// --------------------------------- IDs ----------------------------------

pub const DUMMY_INTENT_HASH: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000001";

pub const DUMMY_INTENT_HASH_2: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000002";

pub const PAGE_ORIGIN: &str = "https://app.example.com";

// ============================================================================
// RAW TUPLE BUILDERS
// ============================================================================

/// A valid, active raw deposit holding the target token.
pub fn raw_deposit(id: u64, liquidity: u64) -> RawDepositView {
    RawDepositView {
        deposit_id: RawNumber::from(id.to_string()),
        deposit: RawDeposit {
            depositor: DUMMY_DEPOSITOR_ADDR.to_string(),
            token: DUMMY_TOKEN_ADDR.to_string(),
            amount: RawNumber::from(1_000_000u64),
            intent_amount_range: RawRange {
                min: RawNumber::from("10"),
                max: RawNumber::from("0x186a0"),
            },
            accepting_intents: true,
            remaining_deposits: RawNumber::from(liquidity),
            outstanding_intent_amount: RawNumber::from(0u64),
            intent_hashes: Vec::new(),
        },
        available_liquidity: RawNumber::from(liquidity.to_string()),
        verifiers: vec![RawVerifierDataView {
            verifier: DUMMY_VERIFIER_ADDR.to_string(),
            verification_data: RawVerificationData {
                intent_gating_service: ZERO_ADDR.to_string(),
                payee_details: "payee".to_string(),
                data: "0x".to_string(),
            },
            currencies: vec![RawCurrency {
                code: "0x5553440000000000000000000000000000000000000000000000000000000000".to_string(),
                conversion_rate: RawNumber::from("1000000000000000000"),
            }],
        }],
    }
}

/// A raw deposit with `hashes` open against it.
pub fn raw_deposit_with_intents(id: u64, liquidity: u64, hashes: &[&str]) -> RawDepositView {
    let mut view = raw_deposit(id, liquidity);
    view.deposit.intent_hashes = hashes.iter().map(|h| h.to_string()).collect();
    view
}

pub fn raw_intent(deposit: RawDepositView) -> RawIntentView {
    RawIntentView {
        intent: RawIntent {
            owner: DUMMY_OWNER_ADDR.to_string(),
            to: DUMMY_OWNER_ADDR.to_string(),
            deposit_id: deposit.deposit_id.clone(),
            amount: RawNumber::from(50u64),
            timestamp: RawNumber::from(1_700_000_000u64),
            payment_verifier: DUMMY_VERIFIER_ADDR.to_string(),
            fiat_currency: "0x5553440000000000000000000000000000000000000000000000000000000000"
                .to_string(),
            conversion_rate: RawNumber::from("1000000000000000000"),
        },
        deposit,
    }
}

// ============================================================================
// MOCK CHAIN READER
// ============================================================================

/// In-memory escrow contracts with call recording and failure injection.
#[derive(Default)]
pub struct MockChainReader {
    counters: Mutex<HashMap<String, u64>>,
    deposits: Mutex<HashMap<String, BTreeMap<u64, RawDepositView>>>,
    intents: Mutex<HashMap<String, RawIntentView>>,
    /// Batches requested, in order
    pub batch_calls: Mutex<Vec<Vec<u64>>>,
    /// Hash lists requested from getIntents, in order
    pub intent_calls: Mutex<Vec<Vec<String>>>,
    /// A batch containing any of these IDs fails
    pub failing_ids: Mutex<HashSet<u64>>,
    pub fail_intents: Mutex<bool>,
    pub fail_counter: Mutex<bool>,
    /// Delay applied to every deposit batch on the given escrow
    pub batch_delay: Mutex<Option<(String, Duration)>>,
}

impl MockChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `views` on `escrow` and sets its counter to the highest ID + 1.
    pub fn with_deposits(self, escrow: &str, views: Vec<RawDepositView>) -> Self {
        self.set_deposits(escrow, views);
        self
    }

    pub fn set_deposits(&self, escrow: &str, views: Vec<RawDepositView>) {
        let mut deposits = self.deposits.lock().unwrap();
        let entry = deposits.entry(escrow.to_string()).or_default();
        for view in views {
            let id = match &view.deposit_id {
                RawNumber::Int(id) => *id,
                RawNumber::Text(text) => text.parse().unwrap(),
            };
            entry.insert(id, view);
        }
        let counter = entry.keys().next_back().map_or(0, |id| id + 1);
        self.counters.lock().unwrap().insert(escrow.to_string(), counter);
    }

    /// Stores `view` under `id` regardless of the ID the tuple itself carries.
    pub fn set_deposit_at(&self, escrow: &str, id: u64, view: RawDepositView) {
        let mut deposits = self.deposits.lock().unwrap();
        let entry = deposits.entry(escrow.to_string()).or_default();
        entry.insert(id, view);
        let counter = entry.keys().next_back().map_or(0, |id| id + 1);
        self.counters.lock().unwrap().insert(escrow.to_string(), counter);
    }

    pub fn set_counter(&self, escrow: &str, counter: u64) {
        self.counters.lock().unwrap().insert(escrow.to_string(), counter);
    }

    pub fn add_intent(&self, hash: &str, view: RawIntentView) {
        self.intents.lock().unwrap().insert(hash.to_lowercase(), view);
    }

    pub fn fail_batches_containing(&self, id: u64) {
        self.failing_ids.lock().unwrap().insert(id);
    }

    pub fn requested_ids(&self) -> Vec<u64> {
        self.batch_calls.lock().unwrap().iter().flatten().copied().collect()
    }

    pub fn reset_calls(&self) {
        self.batch_calls.lock().unwrap().clear();
        self.intent_calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn deposit_counter(&self, escrow: &str) -> Result<u64> {
        if *self.fail_counter.lock().unwrap() {
            anyhow::bail!("RPC unavailable");
        }
        Ok(self.counters.lock().unwrap().get(escrow).copied().unwrap_or(0))
    }

    async fn get_account_deposits(&self, escrow: &str, owner: &str) -> Result<Vec<RawDepositView>> {
        let deposits = self.deposits.lock().unwrap();
        Ok(deposits
            .get(escrow)
            .map(|views| {
                views
                    .values()
                    .filter(|v| v.deposit.depositor.eq_ignore_ascii_case(owner))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_deposit_from_ids(&self, escrow: &str, ids: &[u64]) -> Result<Vec<RawDepositView>> {
        self.batch_calls.lock().unwrap().push(ids.to_vec());

        let delay = self
            .batch_delay
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(slow_escrow, _)| slow_escrow == escrow)
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let failing = self.failing_ids.lock().unwrap();
            if ids.iter().any(|id| failing.contains(id)) {
                anyhow::bail!("execution reverted");
            }
        }

        let deposits = self.deposits.lock().unwrap();
        let views = deposits.get(escrow);
        Ok(ids
            .iter()
            .map(|id| {
                views
                    .and_then(|v| v.get(id))
                    .cloned()
                    .unwrap_or_else(|| RawDepositView {
                        deposit_id: RawNumber::from(*id),
                        ..Default::default()
                    })
            })
            .collect())
    }

    async fn get_intents(&self, _escrow: &str, hashes: &[String]) -> Result<Vec<RawIntentView>> {
        self.intent_calls.lock().unwrap().push(hashes.to_vec());
        if *self.fail_intents.lock().unwrap() {
            anyhow::bail!("getIntents reverted");
        }
        let intents = self.intents.lock().unwrap();
        Ok(hashes
            .iter()
            .map(|h| intents.get(&h.to_lowercase()).cloned().unwrap_or_default())
            .collect())
    }
}

// ============================================================================
// CONFIG BUILDERS
// ============================================================================

pub fn reconciliation_config(batch_size: usize) -> ReconciliationConfig {
    ReconciliationConfig {
        batch_size,
        poll_interval_ms: 2000,
        poll_window_ms: 10000,
    }
}

pub fn bridge_config() -> BridgeConfig {
    BridgeConfig {
        page_origin: PAGE_ORIGIN.to_string(),
        probe_interval_ms: 5000,
    }
}

pub fn sequencer_config(timeout_ms: Option<u64>) -> SequencerConfig {
    SequencerConfig {
        proof_poll_interval_ms: 1000,
        proof_timeout_ms: timeout_ms,
    }
}

pub fn platform(name: &str, required_proofs: u32) -> PlatformConfig {
    PlatformConfig {
        name: name.to_string(),
        required_proofs,
        action_type: "transfer".to_string(),
    }
}

/// A minimal valid ClientConfig
pub fn client_config() -> ClientConfig {
    ClientConfig {
        chain: ChainConfig {
            name: "Base".to_string(),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 8453,
            escrow_contract_addr: DUMMY_ESCROW_ADDR.to_string(),
            target_token: DUMMY_TOKEN_ADDR.to_string(),
        },
        reconciliation: reconciliation_config(30),
        storage: StorageConfig {
            cache_dir: ".escrow-client".to_string(),
        },
        bridge: bridge_config(),
        sequencer: sequencer_config(None),
        platforms: vec![platform("venmo", 1), platform("revolut", 2)],
    }
}
