//! Typed escrow views produced by the parser.
//!
//! These are value objects: the state store rebuilds them on every
//! reconciliation pass and never mutates them in place.

use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Bounds on the amount a single intent may claim from a deposit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: U256,
    pub max: U256,
}

/// Data the verifier needs to check a payment against this deposit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationData {
    pub intent_gating_service: Address,
    /// Payee identifier on the payment platform (often a hash)
    pub payee_details: String,
    /// Verifier-specific extra data, `0x` hex
    pub data: String,
}

/// A fiat currency the deposit accepts and its conversion rate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    /// Currency code hash (bytes32, `0x` hex)
    pub code: String,
    pub conversion_rate: U256,
}

/// Payment verifier attached to a deposit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verifier {
    pub verifier_address: Address,
    pub verification_data: VerificationData,
    pub currencies: Vec<Currency>,
}

/// An escrow deposit as published by the state store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositView {
    pub deposit_id: u64,
    pub depositor: Address,
    pub token: Address,
    pub amount: U256,
    pub remaining_deposit_amount: U256,
    pub outstanding_intent_amount: U256,
    pub intent_amount_range: AmountRange,
    /// Hashes of the intents currently open against this deposit (lowercase `0x` hex)
    pub intent_hashes: Vec<String>,
    pub accepting_intents: bool,
    /// Remaining balance not already claimed by outstanding intents
    pub available_liquidity: U256,
    pub verifiers: Vec<Verifier>,
}

/// An on-chain claim against a deposit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub owner: Address,
    pub to: Address,
    pub deposit_id: u64,
    pub amount: U256,
    pub timestamp: U256,
    pub payment_verifier: Address,
    /// Fiat currency code hash (bytes32, `0x` hex)
    pub fiat_currency: String,
    pub conversion_rate: U256,
}

/// An intent together with the deposit it claims from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentView {
    pub intent: Intent,
    pub deposit: DepositView,
    pub intent_hash: String,
}
