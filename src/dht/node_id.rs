//! Node identity module
//!
//! Identifiers that place a node in the overlay's address space.

use crate::error::OverlayError;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overlay node identifier of `hashLength` bits, rendered as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(Vec<u8>);

impl NodeId {
    /// Create a new NodeId from bytes
    pub fn new(id: Vec<u8>) -> Self {
        Self(id)
    }

    /// Generate a random NodeId of `hash_length` bits from the OS random source
    pub fn generate(hash_length: usize) -> Result<Self, OverlayError> {
        let mut id = vec![0u8; hash_length / 8];
        OsRng.try_fill_bytes(&mut id).map_err(|e| {
            OverlayError::identity_error_with_source("Random source failed to produce an identifier", e.to_string())
        })?;
        Ok(Self(id))
    }

    /// Get the NodeId as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Identifier width in bits
    pub fn bit_len(&self) -> usize {
        self.0.len() * 8
    }

    /// Get the NodeId as a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse a NodeId from a hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, OverlayError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.is_empty() {
            return Err(OverlayError::decode_error("Empty node identifier"));
        }
        Ok(Self(bytes))
    }

    /// XOR distance to another identifier of the same width
    pub fn distance(&self, other: &NodeId) -> Vec<u8> {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a ^ b).collect()
    }

    /// Expand the identifier into `width` base-`base` digits, most significant first
    pub fn digits(&self, base: usize, width: usize) -> Vec<usize> {
        match digit_bits(base) {
            Some(bits) => (0..width).rev().map(|i| self.bit_group(i * bits, bits)).collect(),
            None => self.digits_by_division(base, width),
        }
    }

    fn digits_by_division(&self, base: usize, width: usize) -> Vec<usize> {
        let mut value = self.0.clone();
        let mut digits = Vec::with_capacity(width);
        for _ in 0..width {
            digits.push(divide_in_place(&mut value, base));
        }
        digits.reverse();
        digits
    }

    /// `len` bits starting `offset` bits above the least significant bit
    fn bit_group(&self, offset: usize, len: usize) -> usize {
        (0..len).fold(0, |acc, i| {
            let bit = offset + i;
            let byte = match self.0.len().checked_sub(1 + bit / 8) {
                Some(index) => self.0[index],
                None => 0,
            };
            acc | ((((byte >> (bit % 8)) & 1) as usize) << i)
        })
    }
}

/// Bits per digit when `base` is a power of two
fn digit_bits(base: usize) -> Option<usize> {
    (base >= 2 && base.is_power_of_two()).then(|| base.trailing_zeros() as usize)
}

/// Number of base-`base` digits needed to write any `hash_length`-bit identifier
pub fn digit_count(hash_length: usize, base: usize) -> usize {
    match digit_bits(base) {
        Some(bits) => (hash_length + bits - 1) / bits,
        None => digit_count_by_division(hash_length, base),
    }
}

fn digit_count_by_division(hash_length: usize, base: usize) -> usize {
    let mut value = vec![0xFFu8; hash_length / 8];
    let mut count = 0;
    while value.iter().any(|b| *b != 0) {
        divide_in_place(&mut value, base);
        count += 1;
    }
    count
}

/// Divide a big-endian integer by `divisor`, returning the remainder
fn divide_in_place(value: &mut [u8], divisor: usize) -> usize {
    let mut remainder = 0usize;
    for byte in value.iter_mut() {
        let acc = (remainder << 8) | *byte as usize;
        *byte = (acc / divisor) as u8;
        remainder = acc % divisor;
    }
    remainder
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for NodeId {
    type Error = OverlayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_length() {
        for hash_length in [8, 32, 160, 256] {
            let id = NodeId::generate(hash_length).unwrap();
            assert_eq!(id.bit_len(), hash_length);
            let hex_str = id.to_hex();
            assert_eq!(hex_str.len(), hash_length / 4);
            assert!(hex_str.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_generate_distinct() {
        let id1 = NodeId::generate(160).unwrap();
        let id2 = NodeId::generate(160).unwrap();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_from_hex() {
        let node_id = NodeId::from_hex("abcd").unwrap();
        assert_eq!(node_id.as_bytes(), &[0xAB, 0xCD]);
        assert!(NodeId::from_hex("xyz").is_err());
        assert!(NodeId::from_hex("").is_err());
    }

    #[test]
    fn test_distance() {
        let a = NodeId::new(vec![0xFF, 0x00]);
        let b = NodeId::new(vec![0x0F, 0x00]);
        assert_eq!(a.distance(&b), vec![0xF0, 0x00]);
        assert_eq!(a.distance(&a), vec![0x00, 0x00]);
    }

    #[test]
    fn test_digit_count() {
        assert_eq!(digit_count(8, 2), 8);
        assert_eq!(digit_count(8, 16), 2);
        assert_eq!(digit_count(160, 4), 80);
        // 3^15 = 14348907 < 2^24 - 1 < 3^16
        assert_eq!(digit_count(24, 3), 16);
    }

    #[test]
    fn test_digits_base_two() {
        let id = NodeId::new(vec![0b1010_0001]);
        assert_eq!(id.digits(2, 8), vec![1, 0, 1, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_digits_base_sixteen() {
        let id = NodeId::new(vec![0xA5, 0x3C]);
        assert_eq!(id.digits(16, 4), vec![0xA, 0x5, 0x3, 0xC]);
    }

    #[test]
    fn test_digits_base_three() {
        // 0x00000B = 11 = 102 in base 3
        let id = NodeId::new(vec![0x00, 0x00, 0x0B]);
        let digits = id.digits(3, 16);
        assert_eq!(digits.len(), 16);
        assert_eq!(&digits[13..], &[1, 0, 2]);
        assert!(digits[..13].iter().all(|d| *d == 0));
    }

    #[test]
    fn test_power_of_two_bases_match_division() {
        for base in [2, 4, 8, 16, 32, 64] {
            for hash_length in [8, 24, 160] {
                let width = digit_count(hash_length, base);
                assert_eq!(width, digit_count_by_division(hash_length, base), "base {} width {}", base, hash_length);

                let id = NodeId::generate(hash_length).unwrap();
                assert_eq!(id.digits(base, width), id.digits_by_division(base, width), "base {} id {}", base, id);
            }
        }
    }

    #[test]
    fn test_serde_as_hex_string() {
        let id = NodeId::new(vec![0x0a, 0xff]);
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""0aff""#);
        let parsed: NodeId = serde_json::from_str(r#""0aff""#).unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<NodeId>(r#""not-hex""#).is_err());
    }
}
