//! overlay-dht
//!
//! Membership and bootstrap core of a peer-to-peer DHT node: node identity,
//! distance-bucketed routing table, and the JOIN/ACCEPT handshake served over
//! a framed TCP transport.

pub mod dht;
pub mod protocol;
pub mod transport;
pub mod cli;
pub mod error;

pub use error::OverlayError;

pub use dht::{
    Node, NodeId, NodeIntent, NodeOptions, NetworkConfig, Route, RoutingTable, Bucket,
    InsertOutcome, MessageDispatcher, JoinProtocol, JoinState, DEFAULT_JOIN_TIMEOUT,
};
pub use protocol::{Message, MessageType, Payload, FramedConnection};
pub use transport::{Transport, ReadyState, MessageHandler, ConnectionState};
pub use cli::{CliArgs, Config};
