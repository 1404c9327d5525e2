//! Overlay protocol module
//!
//! Message types and the length-prefixed framing they travel in.

pub mod message;
pub mod wire;

// Re-export main types
pub use message::{Message, MessageType, Payload};
pub use wire::{FramedConnection, read_frame, write_frame, MAX_FRAME_LEN};
