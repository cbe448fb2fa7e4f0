// ── Hardware address types ──
//
// DeviceAddress is the canonical identity key for every remote device.
// Stacks report addresses in wildly different shapes (colons, dashes,
// lowercase); everything is normalized on construction so address equality
// is string equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bluetooth hardware address, normalized to 12 uppercase hex digits with
/// separators stripped (`0012F3A4B5C6`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Create a normalized address from any common format.
    /// Accepts colon-separated, dash-separated, or bare hex.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized: String = raw
            .as_ref()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// The local adapter, as reported by the stack at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAdapter {
    pub address: DeviceAddress,
    pub name: Option<String>,
}
