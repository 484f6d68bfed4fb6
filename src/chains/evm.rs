//! EVM Escrow Client
//!
//! Client for reading escrow deposits and intents from an EVM chain via
//! `eth_call` against the escrow contract's view functions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::abi::{self, AbiSlice};
use super::raw::{
    RawCurrency, RawDeposit, RawDepositView, RawIntent, RawIntentView, RawRange,
    RawVerificationData, RawVerifierDataView,
};
use super::ChainReader;
use crate::config::ChainConfig;

const DEPOSIT_COUNTER_SIG: &str = "depositCounter()";
const GET_ACCOUNT_DEPOSITS_SIG: &str = "getAccountDeposits(address)";
const GET_DEPOSIT_FROM_IDS_SIG: &str = "getDepositFromIds(uint256[])";
const GET_INTENTS_SIG: &str = "getIntents(bytes32[])";

/// EVM JSON-RPC request wrapper
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<serde_json::Value>,
    id: u64,
}

/// EVM JSON-RPC response wrapper
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    #[allow(dead_code)]
    jsonrpc: String,
    result: Option<T>,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Client for reading an escrow contract on an EVM chain
pub struct EvmEscrowClient {
    /// HTTP client for JSON-RPC calls
    client: Client,
    /// Base RPC URL
    base_url: String,
}

impl EvmEscrowClient {
    /// Creates a new EVM escrow client
    ///
    /// # Arguments
    ///
    /// * `config` - Escrow chain configuration
    ///
    /// # Returns
    ///
    /// * `Ok(EvmEscrowClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to create client
    pub fn new(config: &ChainConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.rpc_url.clone(),
        })
    }

    /// Executes `eth_call` against `escrow` and returns the raw return data.
    async fn eth_call(&self, escrow: &str, data: String) -> Result<Vec<u8>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "eth_call".to_string(),
            params: vec![
                serde_json::json!({ "to": escrow, "data": data }),
                serde_json::json!("latest"),
            ],
            id: 1,
        };

        let response: JsonRpcResponse<String> = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .context("Failed to send eth_call request")?
            .json()
            .await
            .context("Failed to parse eth_call response")?;

        if let Some(error) = response.error {
            anyhow::bail!("eth_call failed: {} ({})", error.message, error.code);
        }

        let result = response.result.unwrap_or_else(|| "0x".to_string());
        abi::decode_hex(&result)
    }
}

#[async_trait]
impl ChainReader for EvmEscrowClient {
    async fn deposit_counter(&self, escrow: &str) -> Result<u64> {
        let data = abi::encode_call(DEPOSIT_COUNTER_SIG, &[]);
        let bytes = self.eth_call(escrow, data).await?;
        let counter = AbiSlice::new(&bytes).uint(0).context("Failed to decode depositCounter")?;
        if counter > ethereum_types::U256::from(u64::MAX) {
            anyhow::bail!("depositCounter {} does not fit in u64", counter);
        }
        Ok(counter.as_u64())
    }

    async fn get_account_deposits(&self, escrow: &str, owner: &str) -> Result<Vec<RawDepositView>> {
        let data = abi::encode_call(GET_ACCOUNT_DEPOSITS_SIG, &[abi::encode_address(owner)?]);
        let bytes = self.eth_call(escrow, data).await?;
        decode_deposit_views(&bytes).context("Failed to decode getAccountDeposits result")
    }

    async fn get_deposit_from_ids(&self, escrow: &str, ids: &[u64]) -> Result<Vec<RawDepositView>> {
        let items: Vec<[u8; 32]> = ids.iter().map(|id| abi::encode_u64(*id)).collect();
        let data = abi::encode_call_with_array(GET_DEPOSIT_FROM_IDS_SIG, &items);
        debug!("getDepositFromIds: escrow={}, ids={:?}", escrow, ids);
        let bytes = self.eth_call(escrow, data).await?;
        decode_deposit_views(&bytes).context("Failed to decode getDepositFromIds result")
    }

    async fn get_intents(&self, escrow: &str, hashes: &[String]) -> Result<Vec<RawIntentView>> {
        let items = hashes
            .iter()
            .map(|h| abi::encode_bytes32(h))
            .collect::<Result<Vec<_>>>()?;
        let data = abi::encode_call_with_array(GET_INTENTS_SIG, &items);
        let bytes = self.eth_call(escrow, data).await?;
        decode_intent_views(&bytes).context("Failed to decode getIntents result")
    }
}

// ============================================================================
// ABI DECODING
// ============================================================================

/// Decodes the return data of a function returning `DepositView[]`.
pub fn decode_deposit_views(bytes: &[u8]) -> Result<Vec<RawDepositView>> {
    let root = AbiSlice::new(bytes);
    let (len, items) = root.array(0)?;
    (0..len)
        .map(|i| decode_deposit_view(&items.tail(i)?))
        .collect()
}

/// Decodes the return data of a function returning `IntentView[]`.
pub fn decode_intent_views(bytes: &[u8]) -> Result<Vec<RawIntentView>> {
    let root = AbiSlice::new(bytes);
    let (len, items) = root.array(0)?;
    (0..len)
        .map(|i| {
            let view = items.tail(i)?;
            // Intent is a static tuple laid inline in words 0..8
            let intent = RawIntent {
                owner: view.address(0)?,
                to: view.address(1)?,
                deposit_id: view.uint_hex(2)?.into(),
                amount: view.uint_hex(3)?.into(),
                timestamp: view.uint_hex(4)?.into(),
                payment_verifier: view.address(5)?,
                fiat_currency: view.bytes32(6)?,
                conversion_rate: view.uint_hex(7)?.into(),
            };
            let deposit = decode_deposit_view(&view.tail(8)?)?;
            Ok(RawIntentView { intent, deposit })
        })
        .collect()
}

// DepositView(uint256 depositId, Deposit deposit, uint256 availableLiquidity, VerifierDataView[] verifiers)
fn decode_deposit_view(view: &AbiSlice<'_>) -> Result<RawDepositView> {
    let deposit = view.tail(1)?;
    let (hash_count, hashes) = deposit.array(8)?;
    let intent_hashes = (0..hash_count)
        .map(|i| hashes.bytes32(i))
        .collect::<Result<Vec<_>>>()?;

    let (verifier_count, verifiers) = view.array(3)?;
    let verifiers = (0..verifier_count)
        .map(|i| decode_verifier(&verifiers.tail(i)?))
        .collect::<Result<Vec<_>>>()?;

    Ok(RawDepositView {
        deposit_id: view.uint_hex(0)?.into(),
        deposit: RawDeposit {
            depositor: deposit.address(0)?,
            token: deposit.address(1)?,
            amount: deposit.uint_hex(2)?.into(),
            intent_amount_range: RawRange {
                min: deposit.uint_hex(3)?.into(),
                max: deposit.uint_hex(4)?.into(),
            },
            accepting_intents: deposit.bool(5)?,
            remaining_deposits: deposit.uint_hex(6)?.into(),
            outstanding_intent_amount: deposit.uint_hex(7)?.into(),
            intent_hashes,
        },
        available_liquidity: view.uint_hex(2)?.into(),
        verifiers,
    })
}

// VerifierDataView(address verifier, (address intentGatingService, string payeeDetails, bytes data), (bytes32 code, uint256 conversionRate)[])
fn decode_verifier(view: &AbiSlice<'_>) -> Result<RawVerifierDataView> {
    let data = view.tail(1)?;
    let (currency_count, currencies) = view.array(2)?;
    let currencies = (0..currency_count)
        .map(|i| {
            let currency = currencies.static_element(i, 2);
            Ok(RawCurrency {
                code: currency.bytes32(0)?,
                conversion_rate: currency.uint_hex(1)?.into(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RawVerifierDataView {
        verifier: view.address(0)?,
        verification_data: RawVerificationData {
            intent_gating_service: data.address(0)?,
            payee_details: String::from_utf8_lossy(&data.bytes(1)?).into_owned(),
            data: format!("0x{}", hex::encode(data.bytes(2)?)),
        },
        currencies,
    })
}
