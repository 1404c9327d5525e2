//! Overlay protocol messages
//!
//! Defines the membership messages exchanged between nodes and their JSON
//! body encoding.

use crate::dht::config::NetworkConfig;
use crate::dht::node_id::NodeId;
use crate::dht::routing::Route;
use crate::error::OverlayError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

/// Membership message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Request to become a member of the overlay
    Join,
    /// Identity and configuration issued to a joining node
    Accept,
    /// The bootstrapper refused to issue an identity
    Reject,
    /// A freshly joined node publishing its listen port
    Announce,
    /// Any type this node does not understand
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Join => write!(f, "JOIN"),
            MessageType::Accept => write!(f, "ACCEPT"),
            MessageType::Reject => write!(f, "REJECT"),
            MessageType::Announce => write!(f, "ANNOUNCE"),
            MessageType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Optional fields carried by a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_config: Option<NetworkConfig>,
    /// Identifier of the node sending the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<NodeId>,
    /// Listen port of the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A single protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
}

/// Inbound envelope: the type is read first, the body stays opaque until the type is known
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl Message {
    /// Create a message without payload
    pub fn new(kind: MessageType) -> Self {
        Self { kind, data: None }
    }

    /// Create a message with payload
    pub fn with_payload(kind: MessageType, data: Payload) -> Self {
        Self { kind, data: Some(data) }
    }

    /// Create a JOIN request
    pub fn join() -> Self {
        Self::new(MessageType::Join)
    }

    /// Create an ACCEPT reply issuing `node_id`
    pub fn accept(node_id: NodeId, network_config: NetworkConfig, sender_id: NodeId, routes: Vec<Route>) -> Self {
        Self::with_payload(
            MessageType::Accept,
            Payload {
                node_id: Some(node_id),
                network_config: Some(network_config),
                sender_id: Some(sender_id),
                routes,
                ..Payload::default()
            },
        )
    }

    /// Create a REJECT reply
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::with_payload(
            MessageType::Reject,
            Payload {
                reason: Some(reason.into()),
                ..Payload::default()
            },
        )
    }

    /// Create an ANNOUNCE carrying the sender's id and listen port
    pub fn announce(node_id: NodeId, port: u16) -> Self {
        Self::with_payload(
            MessageType::Announce,
            Payload {
                node_id: Some(node_id),
                port: Some(port),
                ..Payload::default()
            },
        )
    }

    /// Payload fields, empty if none were sent
    pub fn payload(&self) -> Payload {
        self.data.clone().unwrap_or_default()
    }

    /// Serialize the message body
    pub fn serialize(&self) -> Result<Vec<u8>> {
        trace!("Serializing {} message", self.kind);
        serde_json::to_vec(self).map_err(|e| {
            error!("Failed to serialize {} message: {}", self.kind, e);
            OverlayError::encode_error_with_source("Failed to serialize message", e.to_string()).into()
        })
    }

    /// Deserialize a message body.
    ///
    /// The body of an unknown type is not inspected, so any well-formed
    /// `{type, data}` envelope decodes.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        trace!("Deserializing message from {} bytes", data.len());
        let envelope: Envelope = serde_json::from_slice(data)
            .map_err(|e| OverlayError::decode_error_with_source("Malformed message body", e.to_string()))?;

        if envelope.kind == MessageType::Unknown {
            return Ok(Self::new(MessageType::Unknown));
        }

        let payload = match envelope.data {
            Some(value) => serde_json::from_value::<Option<Payload>>(value).map_err(|e| {
                OverlayError::decode_error_with_source(
                    format!("Malformed {} payload", envelope.kind),
                    e.to_string(),
                )
            })?,
            None => None,
        };

        Ok(Self {
            kind: envelope.kind,
            data: payload,
        })
    }
}
