// ── The stack trait ──

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::{DeviceAddress, LocalAdapter};
use crate::device::DiscoveredDevice;
use crate::error::StackError;
use crate::event::{EventSender, TransactionId};

/// Inquiry access code: how widely the scan reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// General/unlimited inquiry — finds every discoverable device.
    #[default]
    Giac,
    /// Limited inquiry — only devices in limited-discoverable mode.
    Liac,
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Giac => write!(f, "giac"),
            Self::Liac => write!(f, "liac"),
        }
    }
}

/// Which native stack backs the adapter. Some stacks need workarounds: the
/// winsock stack keeps reporting paired devices that already left, and
/// bluez omits bonded devices from inquiry results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackKind {
    Winsock,
    Widcomm,
    Mac,
    Bluez,
    Other,
}

impl StackKind {
    /// The stacks the engine is known to work against.
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Winsock => "winsock",
            Self::Widcomm => "widcomm",
            Self::Mac => "mac",
            Self::Bluez => "bluez",
            Self::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// The native Bluetooth stack, as seen by the discovery engine.
///
/// Control calls are synchronous and cheap; the actual work completes
/// asynchronously through [`StackEvent`](crate::StackEvent)s on the listener
/// channel registered per operation. The hardware cannot run two inquiries
/// or searches at once — callers are responsible for serializing access
/// (the engine routes every call through its task serializer).
pub trait BluetoothStack: Send + Sync {
    /// Whether the local adapter is powered and usable.
    fn is_powered_on(&self) -> bool;

    /// Address and name of the local adapter.
    fn local_adapter(&self) -> Result<LocalAdapter, StackError>;

    /// The native stack family backing the adapter.
    fn stack_kind(&self) -> StackKind;

    /// Begin an inquiry. Delivers `DeviceFound` events followed by exactly
    /// one `InquiryCompleted` on the listener.
    fn start_inquiry(&self, mode: DiscoveryMode, listener: EventSender) -> Result<(), StackError>;

    /// Begin a service search on one device. Delivers zero or more
    /// `ServicesFound` batches followed by exactly one `SearchCompleted`
    /// carrying the returned transaction id. An empty `attributes` slice
    /// requests the stack's default attribute set.
    fn search_services(
        &self,
        attributes: &[u16],
        service_classes: &[u16],
        device: &DeviceAddress,
        listener: EventSender,
    ) -> Result<TransactionId, StackError>;

    /// Look up the friendly name of a remote device. May contact the device.
    fn friendly_name(&self, device: &DeviceAddress) -> Result<Option<String>, StackError>;

    /// Pair with a device using the given PIN.
    fn authenticate(&self, device: &DeviceAddress, pin: &str) -> Result<(), StackError>;

    /// Drop stored authentication for a device.
    fn remove_authentication(&self, device: &DeviceAddress) -> Result<(), StackError>;

    /// Devices the stack holds in its bonded/cached list, independent of
    /// current reachability.
    fn cached_devices(&self) -> Result<Vec<DiscoveredDevice>, StackError>;
}
