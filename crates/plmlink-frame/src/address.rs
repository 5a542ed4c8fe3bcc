use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FrameError;

/// A 3-byte Insteon device address.
///
/// Ordering, equality, and hashing are byte-wise. Displays as three
/// uppercase hex octets separated by dots (`1A.2B.3C`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 3]);

impl Address {
    /// Create an address from its three bytes (high byte first).
    pub const fn new(high: u8, middle: u8, low: u8) -> Self {
        Self([high, middle, low])
    }

    /// Create an address from a byte array.
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    /// Create an address from the first three bytes of a slice.
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        Self([bytes[0], bytes[1], bytes[2]])
    }

    /// The address bytes.
    pub const fn bytes(&self) -> [u8; 3] {
        self.0
    }

    /// Compact lowercase hex form used in correlation keys (`1a2b3c`).
    pub fn hex(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }

    /// The low byte, which carries the group number in all-link broadcasts.
    pub const fn low(&self) -> u8 {
        self.0[2]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}.{:02X}.{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl From<[u8; 3]> for Address {
    fn from(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = FrameError;

    /// Accepts `1A.2B.3C`, `1a2b3c`, `1a:2b:3c`, and `1a 2b 3c`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let digits: String = input
            .trim()
            .chars()
            .filter(|c| !matches!(c, '.' | ':' | ' '))
            .collect();

        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FrameError::InvalidAddress(input.to_string()));
        }

        let mut bytes = [0u8; 3];
        for (idx, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[idx * 2..idx * 2 + 2], 16)
                .map_err(|_| FrameError::InvalidAddress(input.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
