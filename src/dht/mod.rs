//! DHT membership module
//!
//! Node identity, distance-bucketed routing, and the bootstrap/join handshake.

pub mod config;
pub mod node_id;
pub mod routing;
pub mod dispatcher;
pub mod join;
pub mod node;

// Re-exports for convenience
pub use config::NetworkConfig;
pub use node_id::NodeId;
pub use routing::{Bucket, InsertOutcome, Route, RoutingTable};
pub use dispatcher::MessageDispatcher;
pub use join::{Accepted, JoinOutcome, JoinProtocol, JoinState, DEFAULT_JOIN_TIMEOUT};
pub use node::{Node, NodeIntent, NodeOptions};
