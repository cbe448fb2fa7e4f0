// ── Callback events ──
//
// The native stack reports progress through listener callbacks on its own
// thread. Each in-flight operation registers one listener channel; the
// waiting worker consumes events from the receiving end until the terminal
// completion event arrives. That channel is the rendezvous — callbacks must
// never touch engine state directly.

use std::fmt;

use tokio::sync::mpsc;

use crate::device::DiscoveredDevice;
use crate::record::ServiceRecord;

/// Identifies one service search issued while an inquiry fans out probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u32);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal status of a device inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquiryStatus {
    Completed,
    /// The inquiry was forcibly terminated before completing.
    Terminated,
    Error,
}

/// Terminal status of a service search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Completed,
    /// The device answered but holds no matching records.
    NoRecords,
    DeviceNotReachable,
    Error,
    Terminated,
}

impl SearchStatus {
    /// Whether the status proves the device is alive. "No records" still
    /// means the device answered the probe.
    pub fn device_present(self) -> bool {
        matches!(self, Self::Completed | Self::NoRecords)
    }
}

/// One callback from the native stack.
#[derive(Debug, Clone)]
pub enum StackEvent {
    /// Inquiry: a device responded to the scan.
    DeviceFound(DiscoveredDevice),
    /// Inquiry: the scan is over.
    InquiryCompleted(InquiryStatus),
    /// Service search: a batch of matching records.
    ServicesFound {
        transaction: TransactionId,
        records: Vec<ServiceRecord>,
    },
    /// Service search: the search is over.
    SearchCompleted {
        transaction: TransactionId,
        status: SearchStatus,
    },
}

/// Listener handed to the stack when an operation starts. Unbounded: the
/// callback thread must never block on a slow consumer.
pub type EventSender = mpsc::UnboundedSender<StackEvent>;
