//! Notarization bridge
//!
//! Speaks the page-to-agent message protocol: discovers the agent by probing
//! for its version, requests proofs, and correlates the asynchronous
//! responses back to the outstanding request.

pub mod channel;
pub mod messages;
pub mod metadata;
pub mod request_id;
pub mod sequencer;

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;

// Re-export for convenience
pub use channel::{EventFilter, EventHandler, MessageBus, PageChannel, SubscriptionId};
pub use messages::{BridgeEvent, OutgoingMessage, PageEvent, ProofRecord, ProofStatus, RequestHistory};
pub use metadata::{MetadataCache, MetadataItem, PlatformMetadataEntry};
pub use request_id::generate_request_id;
pub use sequencer::{ProofFailure, ProofSequence, ProofSequencer};

/// Whether the agent has answered a version probe yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Probing,
    Discovered { version: String },
}

/// The outstanding proof request and the latest record attributed to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProofCorrelation {
    pub proof_id: Option<String>,
    pub payment_proof: Option<ProofRecord>,
}

/// Client for the notarization agent.
///
/// Cheap to clone; clones share discovery, correlation and metadata state.
#[derive(Clone)]
pub struct NotarizationBridge {
    bus: Arc<dyn MessageBus>,
    probe_interval: Duration,
    discovery: Arc<watch::Sender<Discovery>>,
    correlation: Arc<watch::Sender<ProofCorrelation>>,
    metadata: MetadataCache,
    subscription: Arc<Mutex<Option<SubscriptionId>>>,
    probe: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl NotarizationBridge {
    pub fn new(bus: Arc<dyn MessageBus>, config: &BridgeConfig) -> Self {
        Self {
            bus,
            probe_interval: config.probe_interval(),
            discovery: Arc::new(watch::Sender::new(Discovery::Probing)),
            correlation: Arc::new(watch::Sender::new(ProofCorrelation::default())),
            metadata: MetadataCache::new(),
            subscription: Arc::new(Mutex::new(None)),
            probe: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribes to page events and starts probing for the agent.
    ///
    /// Idempotent while listening. Must run inside a tokio runtime.
    pub fn init(&self) {
        {
            let mut subscription = self.subscription.lock().unwrap_or_else(PoisonError::into_inner);
            if subscription.is_some() {
                return;
            }

            let origin = self.bus.origin().to_string();
            let filter: EventFilter = Arc::new(move |event: &PageEvent| event.origin == origin);
            let bridge = self.clone();
            let handler: EventHandler = Arc::new(move |event: &PageEvent| bridge.handle_event(event));
            *subscription = Some(self.bus.subscribe(filter, handler));
        }

        self.start_probe();
    }

    /// Unsubscribes from page events and stops the probe.
    pub fn dispose(&self) {
        if let Some(id) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.bus.unsubscribe(id);
        }
        self.stop_probe();
    }

    pub fn is_listening(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn start_probe(&self) {
        if self.is_sidebar_installed() {
            return;
        }

        let bridge = self.clone();
        let interval = self.probe_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if bridge.is_sidebar_installed() {
                    break;
                }
                if let Err(e) = bridge.bus.send(&OutgoingMessage::FetchExtensionVersion) {
                    warn!("Failed to probe notarization agent: {:#}", e);
                }
            }
        });

        if let Some(previous) = self
            .probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            previous.abort();
        }
    }

    fn stop_probe(&self) {
        if let Some(handle) = self.probe.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    // ============================================================================
    // EVENT HANDLING
    // ============================================================================

    fn handle_event(&self, event: &PageEvent) {
        // Buses are expected to apply the subscription filter; checked again here regardless
        if event.origin != self.bus.origin() {
            debug!("Dropping page event from foreign origin {}", event.origin);
            return;
        }

        let parsed: BridgeEvent = match serde_json::from_value(event.data.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Ignoring unrecognized page message: {}", e);
                return;
            }
        };

        match parsed {
            BridgeEvent::ExtensionVersionResponse { version } => self.on_version(version),
            BridgeEvent::MetadataMessagesResponse {
                platform,
                metadata,
                expires_at,
            } => {
                debug!(
                    "Metadata for {}: {} item(s)",
                    platform,
                    metadata.as_ref().map_or(0, Vec::len)
                );
                self.metadata
                    .store(&platform, PlatformMetadataEntry { metadata, expires_at });
            }
            BridgeEvent::FetchProofRequestIdResponse { proof_id } => {
                debug!("Proof request accepted as {}", proof_id);
                self.correlation.send_modify(|c| c.proof_id = Some(proof_id));
            }
            BridgeEvent::FetchProofByIdResponse { request_history } => {
                self.on_proof_record(request_history.notary_request)
            }
        }
    }

    fn on_version(&self, version: String) {
        let discovered = self.discovery.send_if_modified(|state| match state {
            Discovery::Probing => {
                *state = Discovery::Discovered {
                    version: version.clone(),
                };
                true
            }
            Discovery::Discovered { .. } => false,
        });

        if discovered {
            info!("Notarization agent discovered (version {})", version);
            self.stop_probe();
        }
    }

    /// Stores `record` only when it answers the outstanding request.
    fn on_proof_record(&self, record: ProofRecord) {
        let id = record.id.clone();
        let attributed = self.correlation.send_if_modified(|c| {
            if c.proof_id.as_deref() == Some(id.as_str()) {
                c.payment_proof = Some(record);
                true
            } else {
                false
            }
        });
        if !attributed {
            debug!("Ignoring proof record {} for a superseded request", id);
        }
    }

    // ============================================================================
    // OUTGOING REQUESTS
    // ============================================================================

    /// Asks the agent to open a platform tab for the given action.
    pub fn open_new_tab(&self, action_type: &str, platform: &str) -> Result<()> {
        self.bus
            .send(&OutgoingMessage::OpenNewTab {
                action_type: action_type.to_string(),
                platform: platform.to_string(),
            })
            .context("Failed to send OPEN_NEW_TAB")
    }

    /// Starts a proof request. Clears any previous correlation first so that
    /// records for earlier requests can no longer be attributed.
    ///
    /// # Arguments
    ///
    /// * `platform` - Payment platform the proof is for
    /// * `intent_hash` - Intent being fulfilled
    /// * `original_index` - Index of the payment in the platform's metadata list
    /// * `proof_index` - Which proof of a multi-proof platform, if any
    pub fn generate_payment_proof(
        &self,
        platform: &str,
        intent_hash: &str,
        original_index: u32,
        proof_index: Option<u32>,
    ) -> Result<()> {
        self.reset_proof_state();
        self.bus
            .send(&OutgoingMessage::GenerateProof {
                intent_hash: intent_hash.to_string(),
                original_index,
                platform: platform.to_string(),
                proof_index,
            })
            .context("Failed to send GENERATE_PROOF")
    }

    /// Polls the agent for the outstanding request's record.
    ///
    /// # Returns
    ///
    /// `false` without sending anything when no request id is known yet.
    pub fn fetch_payment_proof(&self, platform: &str) -> Result<bool> {
        let proof_id = self.correlation.borrow().proof_id.clone();
        let Some(proof_id) = proof_id else {
            debug!("No outstanding {} proof request to fetch", platform);
            return Ok(false);
        };

        self.bus
            .send(&OutgoingMessage::FetchProofById { proof_id })
            .context("Failed to send FETCH_PROOF_BY_ID")?;
        Ok(true)
    }

    pub fn reset_proof_state(&self) {
        self.correlation.send_replace(ProofCorrelation::default());
    }

    // ============================================================================
    // STATE ACCESSORS
    // ============================================================================

    pub fn proof_state(&self) -> ProofCorrelation {
        self.correlation.borrow().clone()
    }

    /// Receiver that wakes on every correlation change.
    pub fn subscribe_proof_state(&self) -> watch::Receiver<ProofCorrelation> {
        self.correlation.subscribe()
    }

    pub fn discovery(&self) -> Discovery {
        self.discovery.borrow().clone()
    }

    pub fn subscribe_discovery(&self) -> watch::Receiver<Discovery> {
        self.discovery.subscribe()
    }

    pub fn is_sidebar_installed(&self) -> bool {
        matches!(*self.discovery.borrow(), Discovery::Discovered { .. })
    }

    pub fn sidebar_version(&self) -> Option<String> {
        match &*self.discovery.borrow() {
            Discovery::Discovered { version } => Some(version.clone()),
            Discovery::Probing => None,
        }
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Unexpired metadata for `platform`.
    pub fn platform_metadata(&self, platform: &str) -> Option<PlatformMetadataEntry> {
        self.metadata.get_fresh(platform)
    }

    pub fn clear_platform_metadata(&self, platform: &str) {
        self.metadata.clear(platform);
    }

    pub fn clear_all_metadata(&self) {
        self.metadata.clear_all();
    }
}
