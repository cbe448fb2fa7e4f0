// ── SDP service records ──
//
// A service record is the unit a service search yields: an attribute map
// keyed by 16-bit attribute IDs plus the protocol descriptor needed to
// compute a connection URL. Records with no usable protocol descriptor
// cannot produce a URL and are skipped by consumers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::address::DeviceAddress;

/// Attribute ID of the service name (`ServiceName`, universal attribute).
pub const SERVICE_NAME_ATTRIBUTE: u16 = 0x0100;

/// A decoded SDP data element. The native representation is a tagged tree;
/// only the shapes the engine actually consumes are modeled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataElement {
    Uint(u64),
    Int(i64),
    Uuid(u32),
    Text(String),
    Bool(bool),
    Sequence(Vec<DataElement>),
}

impl DataElement {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// The transport a service is reachable over, extracted from the record's
/// protocol descriptor list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolDescriptor {
    /// Serial port profile over RFCOMM.
    Rfcomm { channel: u8 },
    /// Raw L2CAP channel.
    L2cap { psm: u16 },
    /// OBEX session over RFCOMM.
    Obex { channel: u8 },
}

/// Security requirement used when computing a connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    NoAuthNoEncrypt,
    AuthNoEncrypt,
}

impl Security {
    fn authenticate(self) -> bool {
        matches!(self, Self::AuthNoEncrypt)
    }
}

/// One service exposed by a remote device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Stack-assigned record handle, unique per device.
    pub handle: u32,
    /// The device exposing the service.
    pub device: DeviceAddress,
    /// Attribute map as reported by the search.
    pub attributes: BTreeMap<u16, DataElement>,
    /// Transport descriptor, when the record carried one.
    pub protocol: Option<ProtocolDescriptor>,
}

impl ServiceRecord {
    /// The human-readable service name attribute, when present.
    pub fn service_name(&self) -> Option<&str> {
        self.attributes
            .get(&SERVICE_NAME_ATTRIBUTE)
            .and_then(DataElement::as_text)
    }

    /// Compute the connection URL for this record, or `None` when the
    /// record carries no protocol descriptor.
    ///
    /// The shape follows the native URL scheme: `btspp://` for RFCOMM,
    /// `btl2cap://` for L2CAP (PSM in hex), `btgoep://` for OBEX, with the
    /// `authenticate` parameter reflecting the requested security.
    pub fn connection_url(&self, security: Security) -> Option<String> {
        let auth = security.authenticate();
        match self.protocol? {
            ProtocolDescriptor::Rfcomm { channel } => Some(format!(
                "btspp://{}:{channel};authenticate={auth};encrypt=false;master=false",
                self.device
            )),
            ProtocolDescriptor::L2cap { psm } => Some(format!(
                "btl2cap://{}:{psm:04x};authenticate={auth};encrypt=false;master=false",
                self.device
            )),
            ProtocolDescriptor::Obex { channel } => Some(format!(
                "btgoep://{}:{channel};authenticate={auth};encrypt=false;master=false",
                self.device
            )),
        }
    }
}
