// ── Inquiry round ──

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bluefleet_stack::{
    BluetoothStack, DiscoveredDevice, DiscoveryMode, InquiryStatus, StackEvent, TransactionId,
    class_id,
};

/// Result of one inquiry round.
#[derive(Debug)]
pub enum RoundOutcome {
    /// The round ran to an end state. `None` means hardware-level failure —
    /// the caller must assume nothing about device presence.
    Delivered(Option<Vec<DiscoveredDevice>>),
    /// The caller is stopping; nothing may be delivered.
    Cancelled,
}

/// Runs one full device-inquiry round, optionally fanning out a lightweight
/// service probe per discovered device to confirm it is genuinely reachable
/// (and not just a stale entry in the stack's paired list).
pub struct InquiryAgent {
    stack: Arc<dyn BluetoothStack>,
    mode: DiscoveryMode,
    online_check: bool,
    timeout: Duration,
}

impl InquiryAgent {
    pub fn new(
        stack: Arc<dyn BluetoothStack>,
        mode: DiscoveryMode,
        online_check: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            stack,
            mode,
            online_check,
            timeout,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> RoundOutcome {
        if !self.stack.is_powered_on() {
            info!("device inquiry aborted - adapter is not powered on");
            return RoundOutcome::Delivered(None);
        }
        let adapter = match self.stack.local_adapter() {
            Ok(adapter) => adapter,
            Err(e) => {
                error!(error = %e, "device inquiry aborted - cannot get the local adapter");
                return RoundOutcome::Delivered(None);
            }
        };
        debug!(address = %adapter.address, name = ?adapter.name, "starting device inquiry");

        let (listener, mut events) = mpsc::unbounded_channel();
        if let Err(e) = self.stack.start_inquiry(self.mode, listener.clone()) {
            error!(error = %e, "device inquiry aborted");
            return RoundOutcome::Delivered(None);
        }

        let mut devices: Vec<DiscoveredDevice> = Vec::new();
        let mut probes: HashMap<TransactionId, DiscoveredDevice> = HashMap::new();
        let mut inquiry_done = false;
        let mut failed = false;

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    warn!("inquiry interrupted - abandoning the round");
                    return RoundOutcome::Cancelled;
                }
                () = &mut deadline => {
                    warn!(timeout = ?self.timeout, "inquiry round timed out - discarding results");
                    return RoundOutcome::Delivered(Some(Vec::new()));
                }
                event = events.recv() => event,
            };

            match event {
                Some(StackEvent::DeviceFound(device)) => {
                    debug!(device = %device.identity, "device discovered");
                    if self.online_check {
                        // Some stacks re-report paired devices long after
                        // they left; only a live probe proves presence.
                        match self.stack.search_services(
                            &[],
                            &[class_id::SDP],
                            device.address(),
                            listener.clone(),
                        ) {
                            Ok(transaction) => {
                                debug!(device = %device.identity, %transaction, "online check started");
                                probes.insert(transaction, device);
                            }
                            Err(e) => {
                                warn!(device = %device.identity, error = %e, "online check failed to start - excluding device");
                            }
                        }
                    } else if !contains(&devices, &device) {
                        devices.push(device);
                    }
                }
                Some(StackEvent::InquiryCompleted(status)) => {
                    info!(?status, "inquiry completed");
                    if status != InquiryStatus::Completed {
                        // Partial results cannot be trusted.
                        info!("the inquiry was not successfully completed - discarding results");
                        devices.clear();
                        failed = true;
                    }
                    inquiry_done = true;
                    if probes.is_empty() {
                        break;
                    }
                    debug!(outstanding = probes.len(), "waiting for online checks to complete");
                }
                Some(StackEvent::SearchCompleted {
                    transaction,
                    status,
                }) => {
                    let Some(device) = probes.remove(&transaction) else {
                        warn!(%transaction, "no device associated with the probe transaction");
                        continue;
                    };
                    if failed {
                        // Late probe results must not resurrect a failed round.
                        debug!(device = %device.identity, "ignoring probe result");
                    } else if status.device_present() {
                        debug!(device = %device.identity, "online check passed");
                        if !contains(&devices, &device) {
                            devices.push(device);
                        }
                    } else {
                        warn!(device = %device.identity, ?status, "device not reachable - excluding");
                    }
                    if inquiry_done && probes.is_empty() {
                        break;
                    }
                }
                // Probe record payloads are irrelevant here; the probe only
                // proves the device answers.
                Some(StackEvent::ServicesFound { .. }) => {}
                None => {
                    warn!("stack dropped the listener before inquiry completion");
                    return RoundOutcome::Delivered(Some(Vec::new()));
                }
            }
        }

        info!(devices = devices.len(), "inquiry round delivered");
        RoundOutcome::Delivered(Some(devices))
    }
}

fn contains(devices: &[DiscoveredDevice], device: &DiscoveredDevice) -> bool {
    devices.iter().any(|d| d.address() == device.address())
}
