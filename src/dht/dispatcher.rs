//! Message dispatcher
//!
//! Decides how a listening node answers each inbound message.

use crate::dht::config::NetworkConfig;
use crate::dht::node_id::NodeId;
use crate::dht::routing::{InsertOutcome, Route, RoutingTable};
use crate::protocol::{Message, MessageType};
use crate::transport::{ConnectionState, MessageHandler};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Random draws attempted before giving up on finding an unused identifier
const MAX_ID_ATTEMPTS: usize = 32;

/// Answers membership requests on behalf of one node
pub struct MessageDispatcher {
    local_id: NodeId,
    network_config: NetworkConfig,
    routing_table: Arc<RwLock<RoutingTable>>,
    /// Identifiers handed out to joiners; dropped again if the joiner leaves without announcing
    issued: Mutex<HashSet<NodeId>>,
}

impl MessageDispatcher {
    pub fn new(local_id: NodeId, network_config: NetworkConfig, routing_table: Arc<RwLock<RoutingTable>>) -> Self {
        Self {
            local_id,
            network_config,
            routing_table,
            issued: Mutex::new(HashSet::new()),
        }
    }

    /// Number of identifiers currently reserved
    pub async fn issued_count(&self) -> usize {
        self.issued.lock().await.len()
    }

    /// Draw an identifier unknown to this node and reserve it
    async fn issue_node_id(&self) -> Result<Option<NodeId>> {
        let table = self.routing_table.read().await;
        let mut issued = self.issued.lock().await;

        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = NodeId::generate(self.network_config.hash_length)?;
            if candidate == self.local_id || table.contains(&candidate) || issued.contains(&candidate) {
                debug!("Identifier {} already taken, drawing again", candidate);
                continue;
            }
            issued.insert(candidate.clone());
            return Ok(Some(candidate));
        }

        Ok(None)
    }

    async fn handle_join(&self, connection: &mut ConnectionState) -> Result<Option<Message>> {
        if let Some(node_id) = connection.assigned_id.clone() {
            debug!("Repeated JOIN from {}, re-issuing {}", connection.peer, node_id);
            return Ok(Some(self.accept(node_id).await));
        }

        let Some(node_id) = self.issue_node_id().await? else {
            warn!("No unused identifier found for {}", connection.peer);
            return Ok(Some(Message::reject("identifier space exhausted")));
        };

        info!("Issuing identity {} to {}", node_id, connection.peer);
        connection.assigned_id = Some(node_id.clone());

        Ok(Some(self.accept(node_id).await))
    }

    async fn accept(&self, node_id: NodeId) -> Message {
        let routes = self
            .routing_table
            .read()
            .await
            .lookup(&node_id, self.network_config.bucket_size());
        Message::accept(node_id, self.network_config, self.local_id.clone(), routes)
    }

    async fn handle_announce(&self, message: Message, connection: &mut ConnectionState) -> Result<Option<Message>> {
        let payload = message.payload();
        let (Some(node_id), Some(port)) = (payload.node_id, payload.port) else {
            warn!("ANNOUNCE from {} without identity or port", connection.peer);
            return Ok(None);
        };

        if connection.assigned_id.as_ref() != Some(&node_id) {
            warn!("ANNOUNCE from {} for {} which was not issued on this connection", connection.peer, node_id);
            return Ok(None);
        }

        let route = Route::new(node_id, SocketAddr::new(connection.peer.ip(), port));
        let outcome = self.routing_table.write().await.insert(route.clone());
        match outcome {
            InsertOutcome::Evicted(old) => {
                info!("Recorded route {} at {}, evicting {}", route.id, route.host, old.id);
            }
            InsertOutcome::Rejected => {
                warn!("Routing table refused route {}", route.id);
            }
            _ => {
                info!("Recorded route {} at {}", route.id, route.host);
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl MessageHandler for MessageDispatcher {
    async fn handle(&self, message: Message, connection: &mut ConnectionState) -> Result<Option<Message>> {
        debug!("MESSAGE {} from {}", message.kind, connection.peer);
        match message.kind {
            MessageType::Join => self.handle_join(connection).await,
            MessageType::Announce => self.handle_announce(message, connection).await,
            MessageType::Accept | MessageType::Reject => {
                warn!("Unsolicited {} from {}, ignoring", message.kind, connection.peer);
                Ok(None)
            }
            MessageType::Unknown => {
                warn!("Got a message with an invalid type from {}", connection.peer);
                Ok(None)
            }
        }
    }

    async fn release(&self, connection: ConnectionState) {
        if let Some(node_id) = &connection.assigned_id {
            let table = self.routing_table.read().await;
            let mut issued = self.issued.lock().await;
            if !table.contains(node_id) && issued.remove(node_id) {
                debug!("{} closed before announcing {}, identifier freed", connection.peer, node_id);
            }
        }
        debug!("Released connection from {} after {} messages", connection.peer, connection.messages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Payload;

    fn dispatcher(hash_length: usize, base: usize) -> (MessageDispatcher, Arc<RwLock<RoutingTable>>) {
        let config = NetworkConfig::new(hash_length, base).unwrap();
        let local_id = NodeId::generate(hash_length).unwrap();
        let table = Arc::new(RwLock::new(RoutingTable::new(local_id.clone(), &config)));
        (MessageDispatcher::new(local_id, config, table.clone()), table)
    }

    fn connection() -> ConnectionState {
        ConnectionState::new("10.0.0.7:50123".parse().unwrap())
    }

    #[tokio::test]
    async fn test_join_replies_accept() {
        let (dispatcher, _) = dispatcher(32, 4);
        let mut conn = connection();

        let reply = dispatcher.handle(Message::join(), &mut conn).await.unwrap().unwrap();
        assert_eq!(reply.kind, MessageType::Accept);

        let payload = reply.payload();
        let node_id = payload.node_id.unwrap();
        assert_eq!(node_id.to_hex().len(), 8);
        assert_ne!(node_id, dispatcher.local_id);
        assert_eq!(payload.network_config, Some(NetworkConfig::new(32, 4).unwrap()));
        assert_eq!(payload.sender_id, Some(dispatcher.local_id.clone()));
        assert_eq!(conn.assigned_id, Some(node_id));
    }

    #[tokio::test]
    async fn test_each_join_gets_fresh_identity() {
        let (dispatcher, _) = dispatcher(8, 2);
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let mut conn = connection();
            let reply = dispatcher.handle(Message::join(), &mut conn).await.unwrap().unwrap();
            if reply.kind == MessageType::Accept {
                assert!(seen.insert(reply.payload().node_id.unwrap()));
            }
        }
        assert_eq!(dispatcher.issued_count().await, seen.len());
    }

    #[tokio::test]
    async fn test_join_includes_known_routes() {
        let (dispatcher, table) = dispatcher(32, 4);
        let peer_id = NodeId::generate(32).unwrap();
        table.write().await.insert(Route::new(peer_id.clone(), "10.0.0.9:4000".parse().unwrap()));

        let reply = dispatcher.handle(Message::join(), &mut connection()).await.unwrap().unwrap();
        let routes = reply.payload().routes;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].id, peer_id);
    }

    #[tokio::test]
    async fn test_unknown_type_no_reply() {
        let (dispatcher, _) = dispatcher(8, 2);
        let message = Message::deserialize(br#"{"type":"STORE"}"#).unwrap();
        let reply = dispatcher.handle(message, &mut connection()).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_unsolicited_accept_ignored() {
        let (dispatcher, table) = dispatcher(8, 2);
        let accept = Message::accept(NodeId::new(vec![1]), NetworkConfig::new(8, 2).unwrap(), NodeId::new(vec![2]), vec![]);
        assert!(dispatcher.handle(accept, &mut connection()).await.unwrap().is_none());
        assert!(table.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_announce_records_route() {
        let (dispatcher, table) = dispatcher(32, 4);
        let mut conn = connection();
        let reply = dispatcher.handle(Message::join(), &mut conn).await.unwrap().unwrap();
        let node_id = reply.payload().node_id.unwrap();

        let reply = dispatcher.handle(Message::announce(node_id.clone(), 7000), &mut conn).await.unwrap();
        assert!(reply.is_none());

        let table = table.read().await;
        let route = table.find(&node_id).unwrap();
        assert_eq!(route.host, "10.0.0.7:7000".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_announce_for_foreign_id_ignored() {
        let (dispatcher, table) = dispatcher(32, 4);
        let mut conn = connection();
        dispatcher.handle(Message::join(), &mut conn).await.unwrap();

        let stranger = NodeId::generate(32).unwrap();
        dispatcher.handle(Message::announce(stranger, 7000), &mut conn).await.unwrap();

        let incomplete = Message::with_payload(MessageType::Announce, Payload::default());
        dispatcher.handle(incomplete, &mut conn).await.unwrap();

        assert!(table.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_join_reissues_same_identity() {
        let (dispatcher, _) = dispatcher(8, 2);
        let mut conn = connection();

        let first = dispatcher.handle(Message::join(), &mut conn).await.unwrap().unwrap();
        let node_id = first.payload().node_id.unwrap();
        for _ in 0..400 {
            let reply = dispatcher.handle(Message::join(), &mut conn).await.unwrap().unwrap();
            assert_eq!(reply.kind, MessageType::Accept);
            assert_eq!(reply.payload().node_id, Some(node_id.clone()));
        }
        assert_eq!(dispatcher.issued_count().await, 1);
        assert_eq!(conn.assigned_id, Some(node_id));
    }

    #[tokio::test]
    async fn test_release_frees_unannounced_identity() {
        let (dispatcher, _) = dispatcher(8, 2);
        for _ in 0..300 {
            let mut conn = connection();
            let reply = dispatcher.handle(Message::join(), &mut conn).await.unwrap().unwrap();
            assert_eq!(reply.kind, MessageType::Accept);
            dispatcher.release(conn).await;
        }
        assert_eq!(dispatcher.issued_count().await, 0);

        let reply = dispatcher.handle(Message::join(), &mut connection()).await.unwrap().unwrap();
        assert_eq!(reply.kind, MessageType::Accept);
    }

    #[tokio::test]
    async fn test_release_keeps_announced_identity() {
        let (dispatcher, table) = dispatcher(32, 4);
        let mut conn = connection();
        let reply = dispatcher.handle(Message::join(), &mut conn).await.unwrap().unwrap();
        let node_id = reply.payload().node_id.unwrap();
        dispatcher.handle(Message::announce(node_id.clone(), 7000), &mut conn).await.unwrap();

        dispatcher.release(conn).await;
        assert_eq!(dispatcher.issued_count().await, 1);
        assert!(table.read().await.contains(&node_id));
    }

    #[tokio::test]
    async fn test_exhausted_space_rejects() {
        let (dispatcher, _) = dispatcher(8, 2);
        {
            let mut issued = dispatcher.issued.lock().await;
            for id in 0..=255u8 {
                issued.insert(NodeId::new(vec![id]));
            }
        }
        let reply = dispatcher.handle(Message::join(), &mut connection()).await.unwrap().unwrap();
        assert_eq!(reply.kind, MessageType::Reject);
        assert!(reply.payload().reason.is_some());
    }
}
