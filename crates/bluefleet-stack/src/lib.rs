//! Hardware abstraction for Bluetooth device and service discovery.
//!
//! The native inquiry machinery is slow, stateful, and callback-driven, and
//! it cannot run more than one operation at a time. This crate pins down the
//! seam the orchestration engine talks through:
//!
//! - **[`BluetoothStack`]** — the collaborator trait. Synchronous control
//!   calls (`start_inquiry`, `search_services`, pairing) that complete
//!   asynchronously through a per-operation listener channel. Concrete
//!   implementations bind an OS stack; tests script one.
//!
//! - **[`StackEvent`]** — the callback surface: devices found, inquiry
//!   completion, service records, search completion. Events arrive on the
//!   stack's own callback thread; the listener channel is the only bridge
//!   back to the waiting worker.
//!
//! - **Value types** — [`DeviceAddress`], [`DeviceIdentity`],
//!   [`DiscoveredDevice`], [`ServiceRecord`] with connection-URL
//!   computation, and the well-known service class words in [`class_id`].

pub mod address;
pub mod class_id;
pub mod device;
pub mod error;
pub mod event;
pub mod record;
pub mod stack;

pub use address::{DeviceAddress, LocalAdapter};
pub use device::{DeviceIdentity, DiscoveredDevice};
pub use error::StackError;
pub use event::{EventSender, InquiryStatus, SearchStatus, StackEvent, TransactionId};
pub use record::{DataElement, ProtocolDescriptor, Security, ServiceRecord};
pub use stack::{BluetoothStack, DiscoveryMode, StackKind};
