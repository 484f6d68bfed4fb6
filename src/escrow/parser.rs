//! Escrow view parser
//!
//! Normalizes raw chain tuples into typed views. Numbers may arrive as decimal
//! text, `0x` hex text, or native integers; all become `U256`. Nothing here
//! fails: missing or malformed fields coerce to zero/empty so a single bad
//! record never aborts a reconciliation pass.

use ethereum_types::{Address, U256};
use tracing::debug;

use super::types::{AmountRange, Currency, DepositView, Intent, IntentView, VerificationData, Verifier};
use crate::chains::{RawDepositView, RawIntentView, RawNumber, RawVerifierDataView};

/// Parses a numeric field in any supported encoding.
pub fn parse_uint(raw: &RawNumber) -> U256 {
    match raw {
        RawNumber::Int(value) => U256::from(*value),
        RawNumber::Text(text) => parse_uint_text(text),
    }
}

fn parse_uint_text(text: &str) -> U256 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return U256::zero();
    }

    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some("") => Ok(U256::zero()),
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16).map_err(|_| ()),
        None => U256::from_dec_str(trimmed).map_err(|_| ()),
    };

    parsed.unwrap_or_else(|_| {
        debug!("Coercing unparseable number '{}' to zero", text);
        U256::zero()
    })
}

/// Parses a numeric field that must fit in a u64 (IDs); out-of-range values coerce to zero.
pub fn parse_u64(raw: &RawNumber) -> u64 {
    let value = parse_uint(raw);
    if value > U256::from(u64::MAX) {
        debug!("Coercing out-of-range id {} to zero", value);
        return 0;
    }
    value.as_u64()
}

/// Parses an address; accepts 20-byte or left-padded 32-byte hex, anything else is the zero address.
///
/// A 32-byte word whose upper 12 bytes are not zero is not an ABI-encoded address.
pub fn parse_address(text: &str) -> Address {
    let trimmed = text.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    match hex::decode(stripped) {
        Ok(bytes) if bytes.len() == 20 => Address::from_slice(&bytes),
        Ok(bytes) if bytes.len() == 32 && bytes[..12].iter().all(|b| *b == 0) => {
            Address::from_slice(&bytes[12..])
        }
        Ok(bytes) if bytes.is_empty() => Address::zero(),
        _ => {
            debug!("Coercing malformed address '{}' to zero address", text);
            Address::zero()
        }
    }
}

/// Canonical lowercase `0x` form of a contract address, used for cache keys and comparisons.
///
/// Text that is not a valid address is only trimmed and lowercased.
pub fn normalize_address(text: &str) -> String {
    let address = parse_address(text);
    if address.is_zero() {
        return text.trim().to_ascii_lowercase();
    }
    format!("{:#x}", address)
}

fn normalize_hash(hash: &str) -> String {
    let trimmed = hash.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    format!("0x{}", stripped.to_ascii_lowercase())
}

/// Parses a raw deposit view.
pub fn parse_deposit_view(raw: &RawDepositView) -> DepositView {
    let deposit = &raw.deposit;
    DepositView {
        deposit_id: parse_u64(&raw.deposit_id),
        depositor: parse_address(&deposit.depositor),
        token: parse_address(&deposit.token),
        amount: parse_uint(&deposit.amount),
        remaining_deposit_amount: parse_uint(&deposit.remaining_deposits),
        outstanding_intent_amount: parse_uint(&deposit.outstanding_intent_amount),
        intent_amount_range: AmountRange {
            min: parse_uint(&deposit.intent_amount_range.min),
            max: parse_uint(&deposit.intent_amount_range.max),
        },
        intent_hashes: deposit
            .intent_hashes
            .iter()
            .filter(|h| !h.trim().is_empty())
            .map(|h| normalize_hash(h))
            .collect(),
        accepting_intents: deposit.accepting_intents,
        available_liquidity: parse_uint(&raw.available_liquidity),
        verifiers: parse_verifiers(&raw.verifiers),
    }
}

/// Parses a verifier array, preserving order.
pub fn parse_verifiers(raw: &[RawVerifierDataView]) -> Vec<Verifier> {
    raw.iter()
        .map(|v| Verifier {
            verifier_address: parse_address(&v.verifier),
            verification_data: VerificationData {
                intent_gating_service: parse_address(&v.verification_data.intent_gating_service),
                payee_details: v.verification_data.payee_details.clone(),
                data: v.verification_data.data.clone(),
            },
            currencies: v
                .currencies
                .iter()
                .map(|c| Currency {
                    code: c.code.clone(),
                    conversion_rate: parse_uint(&c.conversion_rate),
                })
                .collect(),
        })
        .collect()
}

/// Parses a raw intent view; the hash comes from the request since the view does not carry it.
pub fn parse_intent_view(raw: &RawIntentView, intent_hash: &str) -> IntentView {
    let intent = &raw.intent;
    IntentView {
        intent: Intent {
            owner: parse_address(&intent.owner),
            to: parse_address(&intent.to),
            deposit_id: parse_u64(&intent.deposit_id),
            amount: parse_uint(&intent.amount),
            timestamp: parse_uint(&intent.timestamp),
            payment_verifier: parse_address(&intent.payment_verifier),
            fiat_currency: intent.fiat_currency.clone(),
            conversion_rate: parse_uint(&intent.conversion_rate),
        },
        deposit: parse_deposit_view(&raw.deposit),
        intent_hash: normalize_hash(intent_hash),
    }
}
