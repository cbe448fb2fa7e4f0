// ── Remote device identity ──

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::address::DeviceAddress;

/// Identity of a remote device: hardware address plus an optional friendly
/// name. Two identities are equal iff their addresses match — the name is
/// mutable metadata, not identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    address: DeviceAddress,
    name: Option<String>,
}

impl DeviceIdentity {
    pub fn new(address: DeviceAddress, name: Option<String>) -> Self {
        // An empty name is no name at all; some stacks report "" for
        // devices that withheld their name during inquiry.
        let name = name.filter(|n| !n.is_empty());
        Self { address, name }
    }

    pub fn unnamed(address: DeviceAddress) -> Self {
        Self { address, name: None }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Replace the friendly name with a resolved one.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = Some(name);
        }
        self
    }

    /// Name for humans: the friendly name when known, the address otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.address.as_str())
    }
}

impl PartialEq for DeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for DeviceIdentity {}

impl Hash for DeviceIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A device as yielded by an inquiry round: identity plus whether the stack
/// already holds authentication for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub identity: DeviceIdentity,
    pub paired: bool,
}

impl DiscoveredDevice {
    pub fn new(identity: DeviceIdentity, paired: bool) -> Self {
        Self { identity, paired }
    }

    pub fn address(&self) -> &DeviceAddress {
        self.identity.address()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_ignores_name() {
        let a = DeviceIdentity::new(DeviceAddress::new("AABBCCDDEEFF"), Some("printer".into()));
        let b = DeviceIdentity::unnamed(DeviceAddress::new("aa:bb:cc:dd:ee:ff"));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn empty_name_is_treated_as_absent() {
        let id = DeviceIdentity::new(DeviceAddress::new("AABBCCDDEEFF"), Some(String::new()));
        assert!(id.name().is_none());
        assert_eq!(id.label(), "AABBCCDDEEFF");
    }
}
