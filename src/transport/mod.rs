//! Transport module
//!
//! Owns a node's listening socket and services inbound connections.

pub mod handler;
pub mod listener;

// Re-exports for convenience
pub use handler::{ConnectionState, MessageHandler};
pub use listener::{ReadyState, Transport};
