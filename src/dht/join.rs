//! Join protocol
//!
//! Outbound handshake a new node runs against a bootstrapper:
//! `Idle -> Connecting -> AwaitingAccept -> Joined`, or `Failed` from any
//! waiting state. The whole exchange is bounded by a timeout.

use crate::dht::config::NetworkConfig;
use crate::dht::node_id::NodeId;
use crate::dht::routing::Route;
use crate::error::OverlayError;
use crate::protocol::{FramedConnection, Message, MessageType};
use anyhow::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default bound on connecting and waiting for ACCEPT
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Progress of a join attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Idle,
    Connecting,
    AwaitingAccept,
    Joined,
    Failed,
}

/// Contents of a usable ACCEPT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub node_id: NodeId,
    pub network_config: NetworkConfig,
    /// Identifier of the bootstrapper itself, when it sent one
    pub bootstrapper_id: Option<NodeId>,
    /// Routes the bootstrapper shared with us
    pub routes: Vec<Route>,
}

/// A completed join: the issued identity and the still-open bootstrapper connection
pub struct JoinOutcome {
    pub accepted: Accepted,
    pub bootstrapper: SocketAddr,
    pub connection: FramedConnection<TcpStream>,
}

/// One join attempt against a bootstrapper
#[derive(Debug)]
pub struct JoinProtocol {
    host: String,
    port: u16,
    timeout: Duration,
    state: JoinState,
}

impl JoinProtocol {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_JOIN_TIMEOUT,
            state: JoinState::Idle,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    fn transition(&mut self, next: JoinState) {
        debug!("Join state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the handshake. Resolves once; a second call fails without touching the network.
    pub async fn run(&mut self) -> Result<JoinOutcome> {
        if self.state != JoinState::Idle {
            return Err(OverlayError::network_error(format!(
                "Join attempt already {:?}",
                self.state
            ))
            .into());
        }

        let target = format!("{}:{}", self.host, self.port);
        let limit = self.timeout;
        match timeout(limit, self.handshake(&target)).await {
            Ok(Ok(outcome)) => {
                self.transition(JoinState::Joined);
                info!("Joined via {} as {}", outcome.bootstrapper, outcome.accepted.node_id);
                Ok(outcome)
            }
            Ok(Err(e)) => {
                self.transition(JoinState::Failed);
                warn!("Join via {} failed: {}", target, e);
                Err(e)
            }
            Err(_) => {
                self.transition(JoinState::Failed);
                warn!("Join via {} timed out after {:?}", target, limit);
                Err(OverlayError::timeout_error_with_address(
                    format!("No ACCEPT within {:?}", limit),
                    target,
                )
                .into())
            }
        }
    }

    async fn handshake(&mut self, target: &str) -> Result<JoinOutcome> {
        self.transition(JoinState::Connecting);
        info!("Starting to join a network via {}", target);

        let stream = TcpStream::connect(target).await.map_err(|e| {
            OverlayError::network_error_full("Failed to connect to bootstrapper", target, e.to_string())
        })?;
        let bootstrapper = stream.peer_addr().map_err(|e| {
            OverlayError::network_error_full("Failed to get bootstrapper address", target, e.to_string())
        })?;

        debug!("Connected to bootstrapper {}, asking to join", bootstrapper);
        let mut connection = FramedConnection::new(stream);
        connection.write_message(&Message::join()).await?;
        self.transition(JoinState::AwaitingAccept);

        let reply = connection.read_message().await?.ok_or_else(|| {
            OverlayError::network_error_with_address("Bootstrapper closed the connection before answering", target)
        })?;
        debug!("Received {} from bootstrapper {}", reply.kind, bootstrapper);

        let accepted = interpret_reply(reply)?;
        Ok(JoinOutcome {
            accepted,
            bootstrapper,
            connection,
        })
    }
}

/// Check a bootstrapper's answer to JOIN
pub fn interpret_reply(reply: Message) -> Result<Accepted, OverlayError> {
    if reply.kind != MessageType::Accept {
        let reason = reply.payload().reason;
        return Err(match reason {
            Some(reason) => OverlayError::join_rejected_with_reason("join rejected", reason),
            None => OverlayError::join_rejected(format!("join rejected with {}", reply.kind)),
        });
    }

    let payload = reply.payload();
    let node_id = payload
        .node_id
        .ok_or_else(|| OverlayError::join_incomplete("no identity assigned", "nodeId"))?;
    let network_config = payload
        .network_config
        .ok_or_else(|| OverlayError::join_incomplete("no configuration supplied", "networkConfig"))?;
    network_config.validate()?;

    if node_id.bit_len() != network_config.hash_length {
        return Err(OverlayError::join_incomplete(
            format!(
                "assigned identity has {} bits, network uses {}",
                node_id.bit_len(),
                network_config.hash_length
            ),
            "nodeId",
        ));
    }

    Ok(Accepted {
        node_id,
        network_config,
        bootstrapper_id: payload.sender_id,
        routes: payload.routes,
    })
}
