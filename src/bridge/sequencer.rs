//! Multi-proof sequencing
//!
//! Some platforms need several proofs per payment. The bridge tracks one
//! outstanding request at a time, so the sequencer walks proof indices
//! strictly one after another and collects the results keyed by index.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::messages::{ProofRecord, ProofStatus};
use super::request_id::generate_request_id;
use super::{NotarizationBridge, ProofCorrelation};
use crate::config::{PlatformConfig, SequencerConfig, DEFAULT_ACTION_TYPE};

/// Why a single proof index did not produce a proof.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofFailure {
    #[error("notarization agent reported an error: {0}")]
    Agent(String),
    #[error("no proof within {0:?}")]
    TimedOut(Duration),
    #[error("bridge is not listening for agent events")]
    NotListening,
    #[error("failed to send request to the agent: {0}")]
    Send(String),
    #[error("proof state channel closed")]
    ChannelClosed,
}

/// Results of one sequencing run.
#[derive(Debug, Clone)]
pub struct ProofSequence {
    pub run_id: String,
    pub platform: String,
    pub intent_hash: String,
    pub original_index: u32,
    pub required_proofs: u32,
    pub proofs: BTreeMap<u32, ProofRecord>,
    pub failures: BTreeMap<u32, ProofFailure>,
}

impl ProofSequence {
    pub fn is_complete(&self) -> bool {
        (0..self.required_proofs).all(|index| self.proofs.contains_key(&index))
    }

    pub fn missing_indices(&self) -> Vec<u32> {
        (0..self.required_proofs)
            .filter(|index| !self.proofs.contains_key(index))
            .collect()
    }

    /// Proofs in index order, or `None` while any index is missing.
    pub fn ordered_proofs(&self) -> Option<Vec<&ProofRecord>> {
        if !self.is_complete() {
            return None;
        }
        Some(self.proofs.values().collect())
    }
}

pub struct ProofSequencer {
    bridge: NotarizationBridge,
    config: SequencerConfig,
    platforms: HashMap<String, PlatformConfig>,
}

impl ProofSequencer {
    pub fn new(bridge: NotarizationBridge, config: SequencerConfig, platforms: &[PlatformConfig]) -> Self {
        let platforms = platforms.iter().map(|p| (p.name.clone(), p.clone())).collect();
        Self {
            bridge,
            config,
            platforms,
        }
    }

    /// Proofs needed for `platform`; platforms without configuration need one.
    pub fn required_proofs(&self, platform: &str) -> u32 {
        self.platforms
            .get(platform)
            .map_or(1, |p| p.required_proofs.max(1))
    }

    /// Action type the agent opens `platform`'s tab with.
    pub fn action_type(&self, platform: &str) -> &str {
        self.platforms
            .get(platform)
            .map_or(DEFAULT_ACTION_TYPE, |p| p.action_type.as_str())
    }

    /// Asks the agent to open `platform`'s tab so the user can sign in before proving.
    pub fn open_platform_tab(&self, platform: &str) -> anyhow::Result<()> {
        self.bridge.open_new_tab(self.action_type(platform), platform)
    }

    /// Generates every proof `platform` requires for one payment.
    pub async fn run(&self, platform: &str, intent_hash: &str, original_index: u32) -> ProofSequence {
        let required = self.required_proofs(platform);
        self.run_with(platform, intent_hash, original_index, required).await
    }

    /// Like [`run`](Self::run) with an explicit proof count.
    ///
    /// A failed index is recorded and the run moves on to the next one.
    pub async fn run_with(
        &self,
        platform: &str,
        intent_hash: &str,
        original_index: u32,
        required_proofs: u32,
    ) -> ProofSequence {
        let mut sequence = ProofSequence {
            run_id: generate_request_id(),
            platform: platform.to_string(),
            intent_hash: intent_hash.to_string(),
            original_index,
            required_proofs: required_proofs.max(1),
            proofs: BTreeMap::new(),
            failures: BTreeMap::new(),
        };
        info!(
            "[{}] Generating {} {} proof(s) for intent {}",
            sequence.run_id, sequence.required_proofs, platform, intent_hash
        );

        let indices: Vec<u32> = (0..sequence.required_proofs).collect();
        self.generate_indices(&mut sequence, &indices).await;
        sequence
    }

    /// Re-runs only the indices that have no proof yet.
    pub async fn retry_failed(&self, sequence: &mut ProofSequence) {
        let missing = sequence.missing_indices();
        if missing.is_empty() {
            return;
        }
        info!("[{}] Retrying proof indices {:?}", sequence.run_id, missing);
        self.generate_indices(sequence, &missing).await;
    }

    async fn generate_indices(&self, sequence: &mut ProofSequence, indices: &[u32]) {
        for &index in indices {
            let proof_index = (sequence.required_proofs > 1).then_some(index);
            let result = self
                .generate_one(&sequence.platform, &sequence.intent_hash, sequence.original_index, proof_index)
                .await;
            match result {
                Ok(record) => {
                    debug!("[{}] Proof {} ready ({})", sequence.run_id, index, record.id);
                    sequence.failures.remove(&index);
                    sequence.proofs.insert(index, record);
                }
                Err(failure) => {
                    warn!("[{}] Proof {} failed: {}", sequence.run_id, index, failure);
                    sequence.failures.insert(index, failure);
                }
            }
        }
    }

    /// Requests one proof and waits for it to settle.
    ///
    /// # Returns
    ///
    /// The successful record, or why none arrived.
    pub async fn generate_one(
        &self,
        platform: &str,
        intent_hash: &str,
        original_index: u32,
        proof_index: Option<u32>,
    ) -> Result<ProofRecord, ProofFailure> {
        if !self.bridge.is_listening() {
            return Err(ProofFailure::NotListening);
        }

        let mut rx = self.bridge.subscribe_proof_state();
        self.bridge
            .generate_payment_proof(platform, intent_hash, original_index, proof_index)
            .map_err(|e| ProofFailure::Send(format!("{:#}", e)))?;

        match self.config.proof_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.await_proof(platform, &mut rx))
                .await
                .unwrap_or(Err(ProofFailure::TimedOut(limit))),
            None => self.await_proof(platform, &mut rx).await,
        }
    }

    /// Waits on correlation changes, polling the agent at most once per poll interval.
    async fn await_proof(
        &self,
        platform: &str,
        rx: &mut watch::Receiver<ProofCorrelation>,
    ) -> Result<ProofRecord, ProofFailure> {
        let poll = self.config.proof_poll_interval();
        let mut last_fetch: Option<Instant> = None;

        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(record) = current.payment_proof {
                match record.status {
                    ProofStatus::Success => return Ok(record),
                    ProofStatus::Error => return Err(ProofFailure::Agent(record.error_message())),
                    ProofStatus::Pending | ProofStatus::Unknown => {}
                }
            }

            let due = last_fetch.map_or(true, |at| at.elapsed() >= poll);
            if current.proof_id.is_some() && due {
                self.bridge
                    .fetch_payment_proof(platform)
                    .map_err(|e| ProofFailure::Send(format!("{:#}", e)))?;
                last_fetch = Some(Instant::now());
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(ProofFailure::ChannelClosed);
                    }
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }
}
