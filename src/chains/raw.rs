//! Raw escrow tuples as returned by a chain read.
//!
//! Numeric fields arrive as decimal text, `0x` hex text, or plain JSON
//! integers depending on the reader; every field defaults when missing.

use serde::{Deserialize, Serialize};

/// A numeric field in one of the encodings a reader may produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Int(u64),
    Text(String),
}

impl Default for RawNumber {
    fn default() -> Self {
        RawNumber::Int(0)
    }
}

impl From<u64> for RawNumber {
    fn from(value: u64) -> Self {
        RawNumber::Int(value)
    }
}

impl From<&str> for RawNumber {
    fn from(value: &str) -> Self {
        RawNumber::Text(value.to_string())
    }
}

impl From<String> for RawNumber {
    fn from(value: String) -> Self {
        RawNumber::Text(value)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRange {
    pub min: RawNumber,
    pub max: RawNumber,
}

/// Deposit struct as stored on the escrow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDeposit {
    pub depositor: String,
    pub token: String,
    pub amount: RawNumber,
    pub intent_amount_range: RawRange,
    pub accepting_intents: bool,
    pub remaining_deposits: RawNumber,
    pub outstanding_intent_amount: RawNumber,
    pub intent_hashes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawVerificationData {
    pub intent_gating_service: String,
    pub payee_details: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCurrency {
    pub code: String,
    pub conversion_rate: RawNumber,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawVerifierDataView {
    pub verifier: String,
    pub verification_data: RawVerificationData,
    pub currencies: Vec<RawCurrency>,
}

/// Deposit view returned by `getDepositFromIds` / `getAccountDeposits`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDepositView {
    pub deposit_id: RawNumber,
    pub deposit: RawDeposit,
    pub available_liquidity: RawNumber,
    pub verifiers: Vec<RawVerifierDataView>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawIntent {
    pub owner: String,
    pub to: String,
    pub deposit_id: RawNumber,
    pub amount: RawNumber,
    pub timestamp: RawNumber,
    pub payment_verifier: String,
    pub fiat_currency: String,
    pub conversion_rate: RawNumber,
}

/// Intent view returned by `getIntents`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawIntentView {
    pub intent: RawIntent,
    pub deposit: RawDepositView,
}
