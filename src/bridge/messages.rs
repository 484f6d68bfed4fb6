//! Wire messages exchanged with the notarization agent.
//!
//! Outgoing messages and incoming event payloads are JSON objects whose
//! `type` field names the message; remaining fields are camelCase.

use serde::{Deserialize, Serialize};

use super::metadata::MetadataItem;

/// Messages the page posts to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingMessage {
    FetchExtensionVersion,
    #[serde(rename_all = "camelCase")]
    OpenNewTab { action_type: String, platform: String },
    #[serde(rename_all = "camelCase")]
    GenerateProof {
        intent_hash: String,
        original_index: u32,
        platform: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        proof_index: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    FetchProofById { proof_id: String },
}

/// Event payloads the agent posts back to the page.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeEvent {
    ExtensionVersionResponse { version: String },
    #[serde(rename_all = "camelCase")]
    MetadataMessagesResponse {
        platform: String,
        #[serde(default)]
        metadata: Option<Vec<MetadataItem>>,
        #[serde(default)]
        expires_at: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    FetchProofRequestIdResponse { proof_id: String },
    #[serde(rename_all = "camelCase")]
    FetchProofByIdResponse { request_history: RequestHistory },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHistory {
    pub notary_request: ProofRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofStatus {
    #[default]
    Pending,
    Success,
    Error,
    #[serde(other)]
    Unknown,
}

/// A proof request as tracked by the agent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    pub id: String,
    #[serde(default)]
    pub status: ProofStatus,
    /// Opaque proof payload, present once generation succeeded
    #[serde(default)]
    pub proof: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ProofRecord {
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => "unknown error".to_string(),
        }
    }
}

/// A message event as delivered by the page: payload plus sender origin.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEvent {
    pub origin: String,
    pub data: serde_json::Value,
}
