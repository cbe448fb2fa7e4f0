// ── Presence check ──

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bluefleet_stack::{BluetoothStack, DiscoveredDevice, SearchStatus, StackEvent, class_id};

/// Why the check is running. The action on "present" and "absent" flips
/// between the two modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceAction {
    /// A known device missed an inquiry round — confirm the departure
    /// before dropping it, so a single missed beacon is not fatal.
    UnregisterIfAbsent,
    /// A device sits in the stack's cached list but not in the engine's —
    /// register it if it is actually reachable.
    RegisterIfHere,
}

/// What the engine must do with the device under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOutcome {
    Register,
    Unregister,
    /// The check resolved without requiring a state change.
    Nothing,
    Cancelled,
}

/// Verifies whether one specific device is reachable via a lightweight
/// browse-group probe.
pub struct PresenceCheckAgent {
    stack: Arc<dyn BluetoothStack>,
    device: DiscoveredDevice,
    action: PresenceAction,
    timeout: Duration,
}

impl PresenceCheckAgent {
    pub fn new(
        stack: Arc<dyn BluetoothStack>,
        device: DiscoveredDevice,
        action: PresenceAction,
        timeout: Duration,
    ) -> Self {
        Self {
            stack,
            device,
            action,
            timeout,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> PresenceOutcome {
        let device = &self.device.identity;

        // Adapter trouble means the device cannot be verified at all:
        // assume departed, in both modes.
        if !self.stack.is_powered_on() || self.stack.local_adapter().is_err() {
            error!(device = %device, "adapter not ready - assuming device departed");
            return PresenceOutcome::Unregister;
        }

        let (listener, mut events) = mpsc::unbounded_channel();
        let transaction = match self.stack.search_services(
            &[],
            &[class_id::PUBLIC_BROWSE_GROUP],
            device.address(),
            listener,
        ) {
            Ok(transaction) => transaction,
            Err(e) => {
                error!(device = %device, error = %e, "cannot probe device - assuming departed");
                return PresenceOutcome::Unregister;
            }
        };

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    warn!(device = %device, "presence check interrupted");
                    return PresenceOutcome::Cancelled;
                }
                () = &mut deadline => {
                    warn!(device = %device, timeout = ?self.timeout, "presence check timed out");
                    return self.absent_outcome();
                }
                event = events.recv() => event,
            };

            match event {
                Some(StackEvent::SearchCompleted {
                    transaction: done,
                    status,
                }) if done == transaction => {
                    return if status == SearchStatus::Completed {
                        self.present_outcome()
                    } else {
                        self.absent_outcome()
                    };
                }
                // Record payloads and stray events are irrelevant; only the
                // terminal status of our probe matters.
                Some(_) => {}
                None => {
                    warn!(device = %device, "stack dropped the listener before probe completion");
                    return self.absent_outcome();
                }
            }
        }
    }

    fn present_outcome(&self) -> PresenceOutcome {
        let device = &self.device.identity;
        match self.action {
            PresenceAction::RegisterIfHere => {
                info!(device = %device, "device is here - registering it");
                PresenceOutcome::Register
            }
            PresenceAction::UnregisterIfAbsent => {
                info!(device = %device, "device is still here");
                PresenceOutcome::Nothing
            }
        }
    }

    fn absent_outcome(&self) -> PresenceOutcome {
        let device = &self.device.identity;
        match self.action {
            PresenceAction::UnregisterIfAbsent => {
                info!(device = %device, "device has disappeared - unregistering it");
                PresenceOutcome::Unregister
            }
            PresenceAction::RegisterIfHere => {
                info!(device = %device, "device is not here");
                PresenceOutcome::Nothing
            }
        }
    }

    pub fn device(&self) -> &DiscoveredDevice {
        &self.device
    }
}
