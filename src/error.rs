//! Error types for the overlay node
//!
//! This module defines the error taxonomy shared by the identity, routing,
//! transport and membership components.

use std::fmt;

/// Error type for overlay operations
#[derive(Debug, Clone)]
pub enum OverlayError {
    /// Malformed network configuration
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Listening socket failed to bind
    BindError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// Bootstrapper answered a JOIN with something other than ACCEPT
    JoinRejected {
        message: String,
        reason: Option<String>,
    },

    /// ACCEPT reply is missing a required field
    JoinIncomplete {
        message: String,
        field: Option<String>,
    },

    /// Inbound bytes do not form a well-formed message
    DecodeError {
        message: String,
        source: Option<String>,
    },

    /// An outbound message could not be encoded
    EncodeError {
        message: String,
        source: Option<String>,
    },

    /// Connect, read or write failures
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// A bounded wait expired
    TimeoutError {
        message: String,
        address: Option<String>,
    },

    /// The random source could not produce an identifier
    IdentityError {
        message: String,
        source: Option<String>,
    },
}

impl OverlayError {
    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        OverlayError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        OverlayError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new BindError with address and source
    pub fn bind_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        OverlayError::BindError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new JoinRejected
    pub fn join_rejected(message: impl Into<String>) -> Self {
        OverlayError::JoinRejected {
            message: message.into(),
            reason: None,
        }
    }

    /// Create a new JoinRejected carrying the bootstrapper's reason
    pub fn join_rejected_with_reason(message: impl Into<String>, reason: impl Into<String>) -> Self {
        OverlayError::JoinRejected {
            message: message.into(),
            reason: Some(reason.into()),
        }
    }

    /// Create a new JoinIncomplete naming the missing field
    pub fn join_incomplete(message: impl Into<String>, field: impl Into<String>) -> Self {
        OverlayError::JoinIncomplete {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new DecodeError
    pub fn decode_error(message: impl Into<String>) -> Self {
        OverlayError::DecodeError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new DecodeError with source
    pub fn decode_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        OverlayError::DecodeError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new EncodeError with source
    pub fn encode_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        OverlayError::EncodeError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new NetworkError
    pub fn network_error(message: impl Into<String>) -> Self {
        OverlayError::NetworkError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new NetworkError with address
    pub fn network_error_with_address(message: impl Into<String>, address: impl Into<String>) -> Self {
        OverlayError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        OverlayError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new TimeoutError with address
    pub fn timeout_error_with_address(message: impl Into<String>, address: impl Into<String>) -> Self {
        OverlayError::TimeoutError {
            message: message.into(),
            address: Some(address.into()),
        }
    }

    /// Create a new IdentityError with source
    pub fn identity_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        OverlayError::IdentityError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            OverlayError::BindError { source, .. }
            | OverlayError::DecodeError { source, .. }
            | OverlayError::EncodeError { source, .. }
            | OverlayError::NetworkError { source, .. }
            | OverlayError::IdentityError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            OverlayError::JoinRejected { reason, .. } => {
                *reason = Some(reason.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            _ => {}
        }
        self
    }

    /// Check whether this error came from a JOIN that was answered but unusable
    pub fn is_join_failure(&self) -> bool {
        matches!(self, OverlayError::JoinRejected { .. } | OverlayError::JoinIncomplete { .. })
    }
}

impl fmt::Display for OverlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
            OverlayError::BindError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Bind error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Bind error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Bind error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Bind error: {}", message),
                }
            }
            OverlayError::JoinRejected { message, reason } => {
                if let Some(r) = reason {
                    write!(f, "Join rejected: {} (reason: {})", message, r)
                } else {
                    write!(f, "Join rejected: {}", message)
                }
            }
            OverlayError::JoinIncomplete { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Join incomplete: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Join incomplete: {}", message)
                }
            }
            OverlayError::DecodeError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Decode error: {} (source: {})", message, src)
                } else {
                    write!(f, "Decode error: {}", message)
                }
            }
            OverlayError::EncodeError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Encode error: {} (source: {})", message, src)
                } else {
                    write!(f, "Encode error: {}", message)
                }
            }
            OverlayError::NetworkError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Network error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Network error: {}", message),
                }
            }
            OverlayError::TimeoutError { message, address } => {
                if let Some(a) = address {
                    write!(f, "Timeout: {} (address: {})", message, a)
                } else {
                    write!(f, "Timeout: {}", message)
                }
            }
            OverlayError::IdentityError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Identity error: {} (source: {})", message, src)
                } else {
                    write!(f, "Identity error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for OverlayError {}

impl From<std::io::Error> for OverlayError {
    fn from(err: std::io::Error) -> Self {
        OverlayError::network_error_full(err.to_string(), "unknown", err.kind().to_string())
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(err: serde_json::Error) -> Self {
        OverlayError::decode_error_with_source("Failed to parse message body", err.to_string())
    }
}

impl From<hex::FromHexError> for OverlayError {
    fn from(err: hex::FromHexError) -> Self {
        OverlayError::decode_error_with_source("Invalid hex identifier", err.to_string())
    }
}

impl From<std::net::AddrParseError> for OverlayError {
    fn from(err: std::net::AddrParseError) -> Self {
        OverlayError::network_error_full("Failed to parse address", "unknown", err.to_string())
    }
}
