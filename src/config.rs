//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the escrow client.
//! Configuration includes the escrow chain connection, reconciliation timing,
//! the pruning-cache location, and notarization bridge settings.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all client settings.
///
/// This structure holds configuration for:
/// - Escrow chain connection (RPC endpoint, escrow contract, target token)
/// - Reconciliation batching and refresh-window timing
/// - Persistent storage location for the pruning cache
/// - Notarization bridge discovery and proof sequencing
/// - Payment platforms and their proof requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Escrow chain configuration
    pub chain: ChainConfig,
    /// Reconciliation settings
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Persistent storage settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Notarization bridge settings
    pub bridge: BridgeConfig,
    /// Proof sequencing settings
    #[serde(default)]
    pub sequencer: SequencerConfig,
    /// Payment platforms (use [[platform]] in TOML for multiple)
    #[serde(default, rename = "platform")]
    pub platforms: Vec<PlatformConfig>,
}

/// Configuration for the escrow chain connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Human-readable name for the chain
    pub name: String,
    /// RPC endpoint URL for EVM chain communication
    pub rpc_url: String,
    /// Chain ID (e.g., 8453 for Base)
    pub chain_id: u64,
    /// Address of the escrow contract
    pub escrow_contract_addr: String,
    /// Token every published deposit and intent must be denominated in
    pub target_token: String,
}

/// Reconciliation batching and refresh-window timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Number of deposit IDs per bulk read
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Poll interval while a refresh window is open, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Length of a refresh window, in milliseconds
    #[serde(default = "default_poll_window_ms")]
    pub poll_window_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_window_ms: default_poll_window_ms(),
        }
    }
}

impl ReconciliationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_window(&self) -> Duration {
        Duration::from_millis(self.poll_window_ms)
    }
}

/// Persistent storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the file-backed key-value store
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
        }
    }
}

/// Notarization bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Origin of the page the bridge runs in; incoming events from any other origin are dropped
    pub page_origin: String,
    /// Interval between installation probes, in milliseconds
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

impl BridgeConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

/// Proof sequencing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Interval between FETCH_PROOF_BY_ID polls while a proof is pending, in milliseconds
    #[serde(default = "default_proof_poll_interval_ms")]
    pub proof_poll_interval_ms: u64,
    /// Optional deadline per proof index, in milliseconds (absent = wait indefinitely)
    #[serde(default)]
    pub proof_timeout_ms: Option<u64>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            proof_poll_interval_ms: default_proof_poll_interval_ms(),
            proof_timeout_ms: None,
        }
    }
}

impl SequencerConfig {
    pub fn proof_poll_interval(&self) -> Duration {
        Duration::from_millis(self.proof_poll_interval_ms)
    }

    pub fn proof_timeout(&self) -> Option<Duration> {
        self.proof_timeout_ms.map(Duration::from_millis)
    }
}

/// Payment platform configuration (single entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Platform identifier as used on the bridge (e.g., "venmo")
    pub name: String,
    /// Number of proofs the platform requires per intent
    #[serde(default = "default_required_proofs")]
    pub required_proofs: u32,
    /// Action type sent with OPEN_NEW_TAB by `ProofSequencer::open_platform_tab`
    #[serde(default = "default_action_type")]
    pub action_type: String,
}

fn default_batch_size() -> usize {
    30
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_poll_window_ms() -> u64 {
    10000
}

fn default_cache_dir() -> String {
    ".escrow-client".to_string()
}

fn default_probe_interval_ms() -> u64 {
    5000
}

fn default_proof_poll_interval_ms() -> u64 {
    1000
}

fn default_required_proofs() -> u32 {
    1
}

/// Action type for platforms that do not configure one.
pub const DEFAULT_ACTION_TYPE: &str = "transfer";

fn default_action_type() -> String {
    DEFAULT_ACTION_TYPE.to_string()
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Uses the provided path, then `ESCROW_CLIENT_CONFIG_PATH`, then
    /// `config/escrow_client.toml`. The loaded configuration is validated.
    ///
    /// # Returns
    ///
    /// * `Ok(ClientConfig)` - Successfully loaded and validated configuration
    /// * `Err(anyhow::Error)` - File missing, unparseable, or invalid
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("ESCROW_CLIENT_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/escrow_client.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: ClientConfig = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/escrow_client.template.toml config/escrow_client.toml\n\
                Then edit config/escrow_client.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Loads configuration from the default location.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Looks up a platform by name.
    pub fn platform(&self, name: &str) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|p| p.name == name)
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Configuration is valid
    /// * `Err(anyhow::Error)` - Validation failed with error message
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_evm_address(&self.chain.escrow_contract_addr)
            .map_err(|e| anyhow::anyhow!("Invalid escrow_contract_addr: {}", e))?;
        validate_evm_address(&self.chain.target_token)
            .map_err(|e| anyhow::anyhow!("Invalid target_token: {}", e))?;

        let reconciliation = &self.reconciliation;
        if reconciliation.batch_size == 0 {
            anyhow::bail!("Configuration error: reconciliation.batch_size must be positive");
        }
        if reconciliation.poll_interval_ms == 0 {
            anyhow::bail!("Configuration error: reconciliation.poll_interval_ms must be positive");
        }
        if reconciliation.poll_window_ms < reconciliation.poll_interval_ms {
            anyhow::bail!(
                "Configuration error: reconciliation.poll_window_ms ({}) is shorter than poll_interval_ms ({})",
                reconciliation.poll_window_ms,
                reconciliation.poll_interval_ms
            );
        }

        if self.bridge.page_origin.trim().is_empty() {
            anyhow::bail!("Configuration error: bridge.page_origin must not be empty");
        }
        if self.bridge.probe_interval_ms == 0 {
            anyhow::bail!("Configuration error: bridge.probe_interval_ms must be positive");
        }
        if self.sequencer.proof_poll_interval_ms == 0 {
            anyhow::bail!("Configuration error: sequencer.proof_poll_interval_ms must be positive");
        }

        let mut seen = HashSet::new();
        for platform in &self.platforms {
            if !seen.insert(platform.name.as_str()) {
                anyhow::bail!(
                    "Configuration error: platform '{}' is configured more than once",
                    platform.name
                );
            }
            if platform.required_proofs == 0 {
                anyhow::bail!(
                    "Configuration error: platform '{}' must require at least one proof",
                    platform.name
                );
            }
        }

        Ok(())
    }
}

/// Validates a `0x`-prefixed 20-byte EVM address.
fn validate_evm_address(addr: &str) -> anyhow::Result<()> {
    let stripped = addr
        .strip_prefix("0x")
        .ok_or_else(|| anyhow::anyhow!("address must be 0x-prefixed hex string"))?;
    let bytes = hex::decode(stripped).map_err(|_| anyhow::anyhow!("address is not valid hex"))?;
    if bytes.len() != 20 {
        anyhow::bail!("expected 20 bytes, got {}", bytes.len());
    }
    Ok(())
}
