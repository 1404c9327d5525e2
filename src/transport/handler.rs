//! Connection handler seam
//!
//! The transport hands every decoded message to a [`MessageHandler`] together
//! with the state it keeps for that connection.

use crate::dht::node_id::NodeId;
use crate::protocol::Message;
use anyhow::Result;
use async_trait::async_trait;
use std::net::SocketAddr;

/// State kept for one accepted connection, dropped when it closes
#[derive(Debug, Clone)]
pub struct ConnectionState {
    /// Remote address of the connection
    pub peer: SocketAddr,
    /// Identifier issued to the peer over this connection, if any
    pub assigned_id: Option<NodeId>,
    /// Messages received so far
    pub messages: u64,
}

impl ConnectionState {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            assigned_id: None,
            messages: 0,
        }
    }
}

/// Interprets inbound messages and decides the reply
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one message; `Some` is written back on the same connection
    async fn handle(&self, message: Message, connection: &mut ConnectionState) -> Result<Option<Message>>;

    /// Called once when the connection closes
    async fn release(&self, connection: ConnectionState);
}
