// ── Full service search ──

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bluefleet_stack::{BluetoothStack, DeviceIdentity, ServiceRecord, StackEvent, class_id};

/// Result of one enumeration.
#[derive(Debug)]
pub enum EnumerationOutcome {
    /// `None` means the search could not run at all (adapter not ready,
    /// driver refused). Consumers treat it like an empty result: withdraw
    /// and consult the retry policy.
    Delivered(Option<Vec<ServiceRecord>>),
    Cancelled,
}

/// Discovers the full set of services one device exposes by browsing the
/// public browse group.
pub struct ServiceSearchAgent {
    stack: Arc<dyn BluetoothStack>,
    device: DeviceIdentity,
    timeout: Duration,
}

impl ServiceSearchAgent {
    pub fn new(stack: Arc<dyn BluetoothStack>, device: DeviceIdentity, timeout: Duration) -> Self {
        Self {
            stack,
            device,
            timeout,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> EnumerationOutcome {
        info!(device = %self.device, "searching services");

        if !self.stack.is_powered_on() || self.stack.local_adapter().is_err() {
            error!(device = %self.device, "adapter not ready, aborting service search");
            return EnumerationOutcome::Delivered(None);
        }

        let (listener, mut events) = mpsc::unbounded_channel();
        if let Err(e) = self.stack.search_services(
            &[],
            &[class_id::PUBLIC_BROWSE_GROUP],
            self.device.address(),
            listener,
        ) {
            error!(device = %self.device, error = %e, "cannot search services");
            return EnumerationOutcome::Delivered(None);
        }

        let mut records: Vec<ServiceRecord> = Vec::new();

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    warn!(device = %self.device, "service search interrupted");
                    return EnumerationOutcome::Cancelled;
                }
                () = &mut deadline => {
                    warn!(device = %self.device, timeout = ?self.timeout, "service search timed out");
                    return EnumerationOutcome::Delivered(None);
                }
                event = events.recv() => event,
            };

            match event {
                Some(StackEvent::ServicesFound { records: batch, .. }) => {
                    debug!(device = %self.device, matching = batch.len(), "services found");
                    records.extend(batch);
                }
                Some(StackEvent::SearchCompleted { status, .. }) => {
                    debug!(device = %self.device, ?status, "service search completed");
                    break;
                }
                // Inquiry events never arrive on a search listener.
                Some(_) => {}
                None => {
                    warn!(device = %self.device, "stack dropped the listener before search completion");
                    return EnumerationOutcome::Delivered(None);
                }
            }
        }

        info!(
            device = %self.device,
            services = records.len(),
            "service search delivered"
        );
        EnumerationOutcome::Delivered(Some(records))
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }
}
