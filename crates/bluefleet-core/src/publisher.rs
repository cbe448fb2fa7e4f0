// ── Service publication ──
//
// Consumes service enumerations and maintains one registry entry per
// (device, service). A successful enumeration replaces the device's whole
// published set; a failed one withdraws it and consults the fleet retry
// policy. All hardware access goes through the serializer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use bluefleet_config::FleetConfig;
use bluefleet_stack::{BluetoothStack, DeviceAddress, DeviceIdentity, Security, ServiceRecord};

use crate::agent::{EnumerationOutcome, ServiceSearchAgent};
use crate::registry::{Registry, RegistryEntry, RegistryHandle};
use crate::serializer::TaskSerializer;

/// Publishes the services of bound devices to the registry collaborator.
///
/// Cheaply cloneable; all state lives behind one mutex and is only ever
/// mutated from serializer jobs, so the lock is a Sync boundary rather
/// than a point of contention.
#[derive(Clone)]
pub struct ServicePublisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    stack: Arc<dyn BluetoothStack>,
    serializer: Arc<TaskSerializer>,
    registry: Arc<dyn Registry>,
    fleet: Option<Arc<FleetConfig>>,
    timeout: Duration,
    state: Mutex<PublisherState>,
}

#[derive(Default)]
struct PublisherState {
    /// Devices currently eligible for service publication.
    bound: HashMap<DeviceAddress, DeviceIdentity>,
    /// Published service entries per device.
    services: HashMap<DeviceAddress, Vec<RegistryHandle>>,
    /// Retries issued per device since the last success.
    attempts: HashMap<DeviceAddress, u32>,
}

impl ServicePublisher {
    pub fn new(
        stack: Arc<dyn BluetoothStack>,
        serializer: Arc<TaskSerializer>,
        registry: Arc<dyn Registry>,
        fleet: Option<Arc<FleetConfig>>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                stack,
                serializer,
                registry,
                fleet,
                timeout,
                state: Mutex::new(PublisherState::default()),
            }),
        }
    }

    /// A device became registered: enumerate its services.
    pub async fn device_bound(&self, identity: DeviceIdentity) {
        let mut state = self.inner.state.lock().await;
        state.bound.insert(identity.address().clone(), identity.clone());
        drop(state);
        self.submit_search(identity);
    }

    /// A device left: withdraw its services and forget its retry state.
    pub async fn device_unbound(&self, address: &DeviceAddress) {
        let mut state = self.inner.state.lock().await;
        state.bound.remove(address);
        state.attempts.remove(address);
        self.withdraw(&mut state, address);
    }

    /// Withdraw everything and reset.
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        let addresses: Vec<DeviceAddress> = state.services.keys().cloned().collect();
        for address in addresses {
            self.withdraw(&mut state, &address);
        }
        state.bound.clear();
        state.attempts.clear();
    }

    /// Number of published service entries for a device.
    pub async fn published_count(&self, address: &DeviceAddress) -> usize {
        self.inner
            .state
            .lock()
            .await
            .services
            .get(address)
            .map_or(0, Vec::len)
    }

    fn submit_search(&self, identity: DeviceIdentity) {
        let this = self.clone();
        let stack = Arc::clone(&this.inner.stack);
        let timeout = this.inner.timeout;
        self.inner.serializer.submit("service-search", move |cancel| {
            Box::pin(async move {
                let agent = ServiceSearchAgent::new(stack, identity.clone(), timeout);
                match agent.run(&cancel).await {
                    EnumerationOutcome::Delivered(records) => {
                        this.discovered(identity, records).await;
                    }
                    EnumerationOutcome::Cancelled => {}
                }
            })
        });
    }

    /// Callback receiving the enumeration result for one device.
    pub async fn discovered(&self, identity: DeviceIdentity, records: Option<Vec<ServiceRecord>>) {
        let address = identity.address().clone();
        let mut state = self.inner.state.lock().await;

        if !state.bound.contains_key(&address) {
            debug!(device = %identity, "device no longer bound - dropping enumeration result");
            return;
        }

        match records {
            Some(records) if !records.is_empty() => {
                // Success resets retry state; the published set is replaced
                // wholesale.
                state.attempts.remove(&address);
                self.withdraw(&mut state, &address);

                let entry = self
                    .inner
                    .fleet
                    .as_deref()
                    .and_then(|f| f.find_match(address.as_str(), identity.name()));
                let security = if entry.is_some() {
                    Security::AuthNoEncrypt
                } else {
                    Security::NoAuthNoEncrypt
                };

                info!(
                    device = %identity,
                    services = records.len(),
                    "registering discovered services"
                );

                let mut handles = Vec::with_capacity(records.len());
                for record in records {
                    let Some(url) = record.connection_url(security) else {
                        warn!(device = %identity, handle = record.handle, "cannot compute the service url - ignoring service record");
                        continue;
                    };
                    match record.service_name() {
                        Some(name) => info!(service = name, %url, "service found"),
                        None => info!(%url, "service found"),
                    }
                    handles.push(self.inner.registry.register(RegistryEntry::Service {
                        address: address.clone(),
                        url,
                        attributes: record.attributes,
                    }));
                }
                state.services.insert(address, handles);
            }
            _ => {
                self.withdraw(&mut state, &address);

                let attempts = state.attempts.get(&address).copied().unwrap_or(0);
                if self.should_retry(&identity, attempts) {
                    let next = attempts + 1;
                    state.attempts.insert(address, next);
                    info!(device = %identity, attempt = next, "retrying service discovery");
                    drop(state);
                    self.submit_search(identity);
                } else {
                    // Retry disabled or budget exhausted; give up quietly.
                    state.attempts.remove(&address);
                    debug!(device = %identity, "no services and no retry - giving up");
                }
            }
        }
    }

    /// The retry policy. Without a fleet entry the device retries without
    /// bound — a deliberately permissive default. With one, retries stop
    /// once the issued count reaches the entry's budget.
    fn should_retry(&self, identity: &DeviceIdentity, attempts: u32) -> bool {
        let Some(fleet) = self.inner.fleet.as_deref() else {
            return true;
        };
        match fleet.find_match(identity.address().as_str(), identity.name()) {
            None => true,
            Some(entry) => entry.retry_enabled() && attempts < entry.max_retry(),
        }
    }

    fn withdraw(&self, state: &mut PublisherState, address: &DeviceAddress) {
        if let Some(handles) = state.services.remove(address) {
            debug!(device = %address, services = handles.len(), "withdrawing published services");
            for handle in handles {
                self.inner.registry.unregister(handle);
            }
        }
    }
}
