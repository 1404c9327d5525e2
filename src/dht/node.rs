//! Overlay node
//!
//! Composition root tying together identity, routing table, dispatcher and
//! transport. A node comes into being either as the bootstrapper of a new
//! overlay ([`Node::start_network`]) or as a member admitted by one
//! ([`Node::join_network`]).

use crate::dht::config::NetworkConfig;
use crate::dht::dispatcher::MessageDispatcher;
use crate::dht::join::{JoinOutcome, JoinProtocol, DEFAULT_JOIN_TIMEOUT};
use crate::dht::node_id::NodeId;
use crate::dht::routing::{Route, RoutingTable};
use crate::protocol::{FramedConnection, Message};
use crate::transport::Transport;
use anyhow::Result;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tracing::{debug, info, info_span, warn, Span};

/// Per-node runtime settings
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Address the node listens on; port 0 picks an ephemeral port
    pub listen_addr: SocketAddr,
    /// Bound on connecting to a bootstrapper and waiting for ACCEPT
    pub join_timeout: Duration,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// How a node came to exist
#[derive(Debug, Clone)]
pub enum NodeIntent {
    /// First node of a new overlay
    Bootstrap,
    /// Member admitted by the bootstrapper at `bootstrapper`
    Join {
        bootstrapper: SocketAddr,
        bootstrapper_id: Option<NodeId>,
        routes: Vec<Route>,
    },
}

/// A running overlay node
pub struct Node {
    node_id: NodeId,
    network_config: NetworkConfig,
    routing_table: Arc<RwLock<RoutingTable>>,
    dispatcher: Arc<MessageDispatcher>,
    transport: Transport,
    bootstrapper: Option<SocketAddr>,
    span: Span,
}

impl Node {
    /// Become the bootstrapper of a new overlay, listening on an ephemeral port
    pub async fn start_network(network_config: NetworkConfig) -> Result<Node> {
        Self::start_network_with(network_config, NodeOptions::default()).await
    }

    /// Become the bootstrapper of a new overlay.
    ///
    /// Returns as soon as the node is constructed; await [`Node::ready`] for
    /// the listening port. No outbound contact is made.
    pub async fn start_network_with(network_config: NetworkConfig, options: NodeOptions) -> Result<Node> {
        network_config.validate()?;
        let node_id = NodeId::generate(network_config.hash_length)?;
        info!("Starting new network as {}", node_id);
        Ok(Self::from_intent(node_id, network_config, NodeIntent::Bootstrap, &options))
    }

    /// Join the overlay whose bootstrapper listens on `host:port`
    pub async fn join_network(host: &str, port: u16) -> Result<Node> {
        Self::join_network_with(host, port, NodeOptions::default()).await
    }

    /// Join the overlay whose bootstrapper listens on `host:port`.
    ///
    /// The local node is built from the identity and configuration the
    /// bootstrapper issues. Once it listens, its port is announced back to the
    /// bootstrapper and that connection is closed.
    pub async fn join_network_with(host: &str, port: u16, options: NodeOptions) -> Result<Node> {
        let mut protocol = JoinProtocol::new(host, port).with_timeout(options.join_timeout);
        let JoinOutcome {
            accepted,
            bootstrapper,
            mut connection,
        } = protocol.run().await?;

        let intent = NodeIntent::Join {
            bootstrapper,
            bootstrapper_id: accepted.bootstrapper_id,
            routes: accepted.routes,
        };
        let node = Self::from_intent(accepted.node_id, accepted.network_config, intent, &options);
        node.announce(&mut connection).await;
        Ok(node)
    }

    /// Build a node from an already validated identity and configuration
    fn from_intent(node_id: NodeId, network_config: NetworkConfig, intent: NodeIntent, options: &NodeOptions) -> Node {
        let span = info_span!("node", id = %node_id);
        let mut table = RoutingTable::new(node_id.clone(), &network_config);

        let bootstrapper = match intent {
            NodeIntent::Bootstrap => None,
            NodeIntent::Join {
                bootstrapper,
                bootstrapper_id,
                routes,
            } => {
                if let Some(id) = bootstrapper_id {
                    table.insert(Route::new(id, bootstrapper));
                }
                for route in routes {
                    table.insert(route);
                }
                span.in_scope(|| debug!("Seeded routing table with {} routes", table.len()));
                Some(bootstrapper)
            }
        };

        let routing_table = Arc::new(RwLock::new(table));
        let dispatcher = Arc::new(MessageDispatcher::new(
            node_id.clone(),
            network_config,
            routing_table.clone(),
        ));
        let transport = Transport::listen(options.listen_addr, dispatcher.clone(), span.clone());

        Node {
            node_id,
            network_config,
            routing_table,
            dispatcher,
            transport,
            bootstrapper,
            span,
        }
    }

    /// Publish our listen port to the bootstrapper over the join connection
    async fn announce(&self, connection: &mut FramedConnection<TcpStream>) {
        let port = match self.ready().await {
            Ok(port) => port,
            Err(e) => {
                self.span.in_scope(|| warn!("Not announcing to bootstrapper: {}", e));
                return;
            }
        };

        let result = connection.write_message(&Message::announce(self.node_id.clone(), port)).await;
        self.span.in_scope(|| match result {
            Ok(()) => debug!("Announced port {} to bootstrapper", port),
            Err(e) => warn!("Failed to announce to bootstrapper: {}", e),
        });
    }

    /// Wait until the node listens and return its port
    pub async fn ready(&self) -> Result<u16> {
        self.transport.ready().await
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn network_config(&self) -> &NetworkConfig {
        &self.network_config
    }

    /// Shared handle to the routing table
    pub fn routing_table(&self) -> Arc<RwLock<RoutingTable>> {
        self.routing_table.clone()
    }

    /// Address of the bootstrapper that admitted this node
    pub fn bootstrapper(&self) -> Option<SocketAddr> {
        self.bootstrapper
    }

    pub fn is_bootstrapper(&self) -> bool {
        self.bootstrapper.is_none()
    }

    /// All known routes
    pub async fn routes(&self) -> Vec<Route> {
        self.routing_table.read().await.routes()
    }

    /// Up to `limit` known routes nearest to `target`
    pub async fn lookup(&self, target: &NodeId, limit: usize) -> Vec<Route> {
        self.routing_table.read().await.lookup(target, limit)
    }

    /// Number of identities this node has issued to joiners
    pub async fn issued_count(&self) -> usize {
        self.dispatcher.issued_count().await
    }

    /// Stop listening and close inbound connections
    pub fn shutdown(&self) {
        self.span.in_scope(|| info!("Shutting down"));
        self.transport.shutdown();
    }
}
