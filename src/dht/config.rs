//! Network configuration module
//!
//! Shape of the identifier space shared by every node of an overlay.

use crate::error::OverlayError;
use serde::{Deserialize, Serialize};

/// Identifier space parameters handed out by a bootstrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Identifier width in bits
    pub hash_length: usize,
    /// Routing table branching factor
    pub base: usize,
}

impl NetworkConfig {
    /// Create a validated network config
    pub fn new(hash_length: usize, base: usize) -> Result<Self, OverlayError> {
        let config = Self { hash_length, base };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the routing table relies on
    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.base < 2 {
            return Err(OverlayError::config_error_with_field(
                format!("base must be at least 2, got {}", self.base),
                "base",
            ));
        }
        if self.hash_length == 0 || self.hash_length % 8 != 0 {
            return Err(OverlayError::config_error_with_field(
                format!("hashLength must be a positive multiple of 8, got {}", self.hash_length),
                "hashLength",
            ));
        }
        if self.hash_length % self.base != 0 {
            return Err(OverlayError::config_error_with_field(
                format!("hashLength {} is not divisible by base {}", self.hash_length, self.base),
                "hashLength",
            ));
        }
        Ok(())
    }

    /// Number of bucket rows in the routing table
    pub fn bucket_count(&self) -> usize {
        self.hash_length / self.base
    }

    /// Number of slots in each bucket
    pub fn bucket_size(&self) -> usize {
        self.base
    }

    /// Total routing table capacity
    pub fn capacity(&self) -> usize {
        self.bucket_count() * self.bucket_size()
    }

    /// Identifier width in bytes
    pub fn id_bytes(&self) -> usize {
        self.hash_length / 8
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hash_length: 160,
            base: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bucket_count(), 40);
        assert_eq!(config.bucket_size(), 4);
    }

    #[test]
    fn test_small_config_shape() {
        let config = NetworkConfig::new(8, 2).unwrap();
        assert_eq!(config.bucket_count(), 4);
        assert_eq!(config.capacity(), 8);
        assert_eq!(config.id_bytes(), 1);
    }

    #[test]
    fn test_rejects_base_below_two() {
        let err = NetworkConfig::new(8, 1).unwrap_err();
        assert!(matches!(err, OverlayError::ConfigError { field: Some(ref f), .. } if f == "base"));
    }

    #[test]
    fn test_rejects_unaligned_hash_length() {
        assert!(NetworkConfig::new(12, 2).is_err());
        assert!(NetworkConfig::new(0, 2).is_err());
        assert!(NetworkConfig::new(16, 3).is_err());
        assert!(NetworkConfig::new(24, 3).is_ok());
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_string(&NetworkConfig::new(8, 2).unwrap()).unwrap();
        assert_eq!(json, r#"{"hashLength":8,"base":2}"#);

        let parsed: NetworkConfig = serde_json::from_str(r#"{"hashLength":32,"base":4}"#).unwrap();
        assert_eq!(parsed, NetworkConfig { hash_length: 32, base: 4 });
    }
}
