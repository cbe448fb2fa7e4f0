// ── Registry collaborator ──
//
// The engine never talks to consumers directly; all user-visible effect is
// presence or absence of entries in an external registry. The collaborator
// is assumed synchronous and fast — integrators bridging to a slow backend
// must buffer on their side.

use serde::Serialize;
use std::collections::BTreeMap;

use bluefleet_stack::{DataElement, DeviceAddress};

/// Opaque handle for one published entry. Meaningful only to the registry
/// that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RegistryHandle(pub u64);

/// One entry to publish: a present device, or one service a device exposes.
#[derive(Debug, Clone, Serialize)]
pub enum RegistryEntry {
    Device {
        /// Stable device identifier (`device.id`).
        address: DeviceAddress,
        /// Friendly name, when known (`device.name`).
        name: Option<String>,
    },
    Service {
        address: DeviceAddress,
        /// Connection URL computed from the service record.
        url: String,
        /// The record's attribute map.
        attributes: BTreeMap<u16, DataElement>,
    },
}

/// External service registry.
pub trait Registry: Send + Sync {
    fn register(&self, entry: RegistryEntry) -> RegistryHandle;
    fn unregister(&self, handle: RegistryHandle);
}
