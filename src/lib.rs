//! Escrow client library
//!
//! Reconciles on-chain escrow state (deposits and intents) into a derived,
//! pruned view and drives the external notarization agent that produces
//! off-chain payment proofs.

pub mod bridge;
pub mod chains;
pub mod config;
pub mod escrow;
pub mod storage;

// Re-export public types for convenience
pub use bridge::{
    generate_request_id, BridgeEvent, Discovery, MessageBus, MetadataCache, MetadataItem,
    NotarizationBridge, OutgoingMessage, PageChannel, PageEvent, PlatformMetadataEntry,
    ProofCorrelation, ProofFailure, ProofRecord, ProofSequence, ProofSequencer, ProofStatus,
};
pub use chains::{ChainReader, EvmEscrowClient, RawDepositView, RawIntentView};
pub use config::ClientConfig;
pub use escrow::{
    DepositPruningCache, DepositView, EscrowStateStore, IntentView, RefreshState, Verifier,
};
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
