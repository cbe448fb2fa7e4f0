// ── Reconciliation engine ──
//
// Owns the device registry and drives everything else. One inquiry round
// runs per period on the serializer; the resulting snapshot is diffed
// against the known set. Departures are confirmed with a presence probe
// before anything is withdrawn — a single missed inquiry beacon must not
// drop a device. Arrivals pass the fleet filter, get a resolved name, are
// paired when the fleet demands it, and are published to the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use bluefleet_config::{DiscoverySettings, FleetConfig};
use bluefleet_stack::{
    BluetoothStack, DeviceAddress, DeviceIdentity, DiscoveredDevice, StackKind,
};

use crate::agent::{InquiryAgent, PresenceAction, PresenceCheckAgent, PresenceOutcome, RoundOutcome};
use crate::error::CoreError;
use crate::filter::DeviceFilter;
use crate::names::{NameCache, NameStore};
use crate::publisher::ServicePublisher;
use crate::registry::{Registry, RegistryEntry, RegistryHandle};
use crate::serializer::TaskSerializer;

/// One known device, as tracked by the engine.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub identity: DeviceIdentity,
    pub authenticated: bool,
    pub handle: RegistryHandle,
    /// Round counter value when the device was last sighted.
    pub last_seen: u64,
}

/// The discovery engine. Cheaply cloneable; create one, `start()` it, and
/// `stop()` it on the way out. Starting twice or stopping twice is a no-op.
#[derive(Clone)]
pub struct DiscoveryEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    stack: Arc<dyn BluetoothStack>,
    registry: Arc<dyn Registry>,
    name_store: Option<Arc<dyn NameStore>>,
    settings: DiscoverySettings,
    fleet: Option<Arc<FleetConfig>>,
    filter: DeviceFilter,
    serializer: Arc<TaskSerializer>,
    publisher: ServicePublisher,
    state: Mutex<EngineState>,
    /// Completion instant of the most recent reconciliation round.
    last_round: watch::Sender<Option<DateTime<Utc>>>,
}

#[derive(Default)]
struct EngineState {
    started: bool,
    /// Effective flags — the configured values, possibly forced by the
    /// stack workarounds applied at start.
    online_check: bool,
    unpair_on_departure: bool,
    round: u64,
    devices: HashMap<DeviceAddress, DeviceRecord>,
    names: NameCache,
}

enum PairingOutcome {
    Paired,
    /// No fleet configured — the device proceeds unauthenticated.
    NotRequired,
    Rejected,
}

impl DiscoveryEngine {
    /// Create an engine. Does not touch the hardware — call
    /// [`start()`](Self::start). Must be called inside a tokio runtime.
    pub fn new(
        stack: Arc<dyn BluetoothStack>,
        registry: Arc<dyn Registry>,
        settings: DiscoverySettings,
        fleet: Option<FleetConfig>,
        name_store: Option<Arc<dyn NameStore>>,
    ) -> Self {
        let fleet = fleet.map(Arc::new);
        let filter = DeviceFilter::new(fleet.as_deref().and_then(|f| f.filter().cloned()));
        let serializer = Arc::new(TaskSerializer::new());
        let publisher = ServicePublisher::new(
            Arc::clone(&stack),
            Arc::clone(&serializer),
            Arc::clone(&registry),
            fleet.clone(),
            op_timeout(settings.period()),
        );
        let (last_round, _) = watch::channel(None);

        Self {
            inner: Arc::new(EngineInner {
                stack,
                registry,
                name_store,
                settings,
                fleet,
                filter,
                serializer,
                publisher,
                state: Mutex::new(EngineState::default()),
                last_round,
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start periodic discovery. No-op when already started.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut state = self.inner.state.lock().await;
        if state.started {
            debug!("discovery already started");
            return Ok(());
        }

        let kind = self.inner.stack.stack_kind();
        if !kind.is_supported() {
            error!(stack = %kind, "the bluetooth stack is not supported");
            return Err(CoreError::UnsupportedStack { kind });
        }

        state.names = match &self.inner.name_store {
            Some(store) => NameCache::load_from(store.as_ref()),
            None => NameCache::new(),
        };

        state.online_check = self.inner.settings.online_check;
        state.unpair_on_departure = self.inner.settings.unpair_on_departure;
        if kind == StackKind::Winsock {
            // The winsock stack keeps returning paired devices forever;
            // only a live probe tells presence, and departed devices must
            // be unpaired or they come back every round.
            info!("winsock stack detected, forcing online check and lost device unpairing");
            state.online_check = true;
            state.unpair_on_departure = true;
        }
        state.started = true;

        let period = self.inner.settings.period();
        let timeout = op_timeout(period);
        let mode = self.inner.settings.mode;
        let online_check = state.online_check;
        drop(state);

        info!(stack = %kind, ?period, %mode, online_check, "starting device discovery");

        let engine = self.clone();
        let stack = Arc::clone(&self.inner.stack);
        self.inner
            .serializer
            .schedule_periodic("device-inquiry", period, move |cancel| {
                let engine = engine.clone();
                let stack = Arc::clone(&stack);
                Box::pin(async move {
                    let agent = InquiryAgent::new(stack, mode, online_check, timeout);
                    match agent.run(&cancel).await {
                        RoundOutcome::Delivered(snapshot) => engine.discovered(snapshot).await,
                        RoundOutcome::Cancelled => {}
                    }
                })
            });

        Ok(())
    }

    /// Stop discovery: flush the name cache, halt the serializer, withdraw
    /// every published entry. No-op when already stopped.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if !state.started {
                debug!("discovery already stopped");
                return;
            }
            state.started = false;
            if let Some(store) = &self.inner.name_store {
                state.names.flush_to(store.as_ref());
            }
        }

        self.inner.serializer.shutdown().await;
        self.inner.publisher.stop().await;
        self.unregister_all().await;
        info!("device discovery stopped");
    }

    // ── Round processing ─────────────────────────────────────────

    /// Callback receiving the snapshot of one inquiry round. `None` means
    /// hardware-level failure: every known device is dropped — partial
    /// trust in a broken adapter is worse than none.
    pub async fn discovered(&self, snapshot: Option<Vec<DiscoveredDevice>>) {
        let Some(snapshot) = snapshot else {
            warn!("bluetooth failure detected, unregistering all devices");
            self.unregister_all().await;
            return;
        };

        let mut state = self.inner.state.lock().await;
        state.round += 1;
        let round = state.round;
        debug!(round, devices = snapshot.len(), "processing inquiry snapshot");

        // Departures first: anything known that the round missed gets a
        // presence check instead of an immediate unregistration.
        let known: Vec<DeviceRecord> = state.devices.values().cloned().collect();
        for record in known {
            let present = snapshot
                .iter()
                .any(|d| d.address() == record.identity.address());
            if present {
                if let Some(rec) = state.devices.get_mut(record.identity.address()) {
                    rec.last_seen = round;
                }
            } else {
                info!(device = %record.identity, "lost contact, submitting departure check");
                self.submit_presence_check(
                    DiscoveredDevice::new(record.identity, record.authenticated),
                    PresenceAction::UnregisterIfAbsent,
                );
            }
        }

        // Then arrivals.
        for device in snapshot {
            if state.devices.contains_key(device.address()) {
                debug!(device = %device.identity, "already known device");
                continue;
            }
            // A device that revealed its name during the inquiry feeds the
            // cache before the policy checks run.
            if let Some(name) = device.identity.name() {
                state.names.learn(device.address(), name);
            }
            let name = self.resolve_name(&mut state, device.address());
            let identity = DeviceIdentity::new(device.address().clone(), name);
            if self.inner.filter.matches(identity.address().as_str(), identity.name()) {
                info!(device = %identity, "new device found");
                let candidate = DiscoveredDevice::new(identity, device.paired);
                self.register_candidate(&mut state, candidate, round).await;
            } else {
                info!(device = %identity, "device ignored because it does not match the device filter");
            }
        }

        // Platform compensation: bluez omits bonded devices from inquiry
        // results, so reachable cached devices would silently vanish.
        if self.inner.stack.stack_kind() == StackKind::Bluez {
            match self.inner.stack.cached_devices() {
                Ok(cached) => {
                    for device in cached {
                        if !state.devices.contains_key(device.address()) {
                            debug!(device = %device.identity, "cached device not known, submitting presence check");
                            self.submit_presence_check(device, PresenceAction::RegisterIfHere);
                        }
                    }
                }
                Err(e) => error!(error = %e, "cannot retrieve the cached device list"),
            }
        }

        drop(state);
        let _ = self.inner.last_round.send(Some(Utc::now()));
    }

    // ── Registration ─────────────────────────────────────────────

    /// Register a filtered candidate: resolve the name, honor the
    /// unnamed-device policy, pair when needed, publish, bind services.
    async fn register_candidate(
        &self,
        state: &mut EngineState,
        device: DiscoveredDevice,
        round: u64,
    ) {
        let address = device.address().clone();
        if let Some(name) = device.identity.name() {
            state.names.learn(&address, name);
        }
        let name = self.resolve_name(state, &address);
        let identity = DeviceIdentity::new(address.clone(), name);

        if identity.name().is_none() && self.inner.settings.ignore_unnamed {
            warn!(device = %address, "ignoring device - discovery is set to ignore unnamed devices");
            return;
        }

        let mut authenticated = device.paired;
        if !authenticated {
            match self.pair(&identity) {
                PairingOutcome::Paired => authenticated = true,
                PairingOutcome::NotRequired => {}
                PairingOutcome::Rejected => {
                    warn!(device = %identity, "aborting registration");
                    return;
                }
            }
        }

        info!(device = %identity, authenticated, "registering device");
        let handle = self.inner.registry.register(RegistryEntry::Device {
            address: address.clone(),
            name: identity.name().map(ToOwned::to_owned),
        });
        self.inner.publisher.device_bound(identity.clone()).await;
        state.devices.insert(
            address,
            DeviceRecord {
                identity,
                authenticated,
                handle,
                last_seen: round,
            },
        );
    }

    /// Register a device confirmed present by a cached-device check.
    async fn register_confirmed(&self, device: DiscoveredDevice) {
        let mut state = self.inner.state.lock().await;
        if !state.started {
            return;
        }
        if state.devices.contains_key(device.address()) {
            debug!(device = %device.identity, "already known device");
            return;
        }
        let round = state.round;
        self.register_candidate(&mut state, device, round).await;
    }

    /// Pairing decision for an unauthenticated device.
    fn pair(&self, identity: &DeviceIdentity) -> PairingOutcome {
        let Some(fleet) = self.inner.fleet.as_deref() else {
            info!(device = %identity, "ignoring autopairing - no fleet configured");
            return PairingOutcome::NotRequired;
        };

        if identity.name().is_none() && self.inner.settings.ignore_unnamed {
            warn!(device = %identity, "pairing not attempted - ignoring unnamed devices");
            return PairingOutcome::Rejected;
        }

        let Some(entry) = fleet.find_match(identity.address().as_str(), identity.name()) else {
            info!(device = %identity, "no fleet entry matches, rejecting unauthenticated device");
            return PairingOutcome::Rejected;
        };

        info!(device = %identity, pattern = entry.pattern(), "pairing pattern match");
        match self
            .inner
            .stack
            .authenticate(identity.address(), entry.pin().expose_secret())
        {
            Ok(()) => {
                info!(device = %identity, "device paired");
                PairingOutcome::Paired
            }
            Err(e) => {
                error!(device = %identity, error = %e, "cannot authenticate device despite the pattern match");
                PairingOutcome::Rejected
            }
        }
    }

    // ── Unregistration ───────────────────────────────────────────

    /// Withdraw one device: registry entry, published services, and —
    /// when configured — its stored authentication.
    pub async fn unregister(&self, address: &DeviceAddress) {
        let mut state = self.inner.state.lock().await;
        let Some(record) = state.devices.remove(address) else {
            return;
        };
        info!(device = %record.identity, "unregistering device");
        self.inner.registry.unregister(record.handle);
        self.inner.publisher.device_unbound(address).await;
        self.unpair(&state, &record.identity);
    }

    async fn unregister_all(&self) {
        let mut state = self.inner.state.lock().await;
        let records: Vec<DeviceRecord> = state.devices.drain().map(|(_, r)| r).collect();
        for record in records {
            self.inner.registry.unregister(record.handle);
            self.inner
                .publisher
                .device_unbound(record.identity.address())
                .await;
            self.unpair(&state, &record.identity);
        }
    }

    /// Best-effort unpairing: only for filtered fleet devices, only when
    /// configured, never fatal.
    fn unpair(&self, state: &EngineState, identity: &DeviceIdentity) {
        if !state.unpair_on_departure {
            return;
        }
        if !self
            .inner
            .filter
            .matches(identity.address().as_str(), identity.name())
        {
            return;
        }
        if let Err(e) = self.inner.stack.remove_authentication(identity.address()) {
            error!(device = %identity, error = %e, "cannot unpair device");
        }
    }

    // ── Name resolution ──────────────────────────────────────────

    /// Resolve a device name from the cache, falling back to a hardware
    /// lookup. Newly learned names go into the cache and stay there.
    fn resolve_name(&self, state: &mut EngineState, address: &DeviceAddress) -> Option<String> {
        if let Some(name) = state.names.get(address) {
            debug!(device = %address, name, "found the device name in the cache");
            return Some(name.to_owned());
        }
        match self.inner.stack.friendly_name(address) {
            Ok(Some(name)) if !name.is_empty() => {
                info!(device = %address, name, "new device name discovered");
                state.names.learn(address, &name);
                Some(name)
            }
            Ok(_) => None,
            Err(e) => {
                debug!(device = %address, error = %e, "not able to get the device friendly name");
                None
            }
        }
    }

    // ── Presence checks ──────────────────────────────────────────

    fn submit_presence_check(&self, device: DiscoveredDevice, action: PresenceAction) {
        let engine = self.clone();
        let stack = Arc::clone(&self.inner.stack);
        let timeout = op_timeout(self.inner.settings.period());
        self.inner
            .serializer
            .submit("presence-check", move |cancel| {
                Box::pin(async move {
                    let agent = PresenceCheckAgent::new(stack, device.clone(), action, timeout);
                    match agent.run(&cancel).await {
                        PresenceOutcome::Register => engine.register_confirmed(device).await,
                        PresenceOutcome::Unregister => {
                            engine.unregister(device.address()).await;
                        }
                        PresenceOutcome::Nothing | PresenceOutcome::Cancelled => {}
                    }
                })
            });
    }

    // ── Observation ──────────────────────────────────────────────

    /// Identities of every currently registered device.
    pub async fn known_devices(&self) -> Vec<DeviceIdentity> {
        let state = self.inner.state.lock().await;
        state.devices.values().map(|r| r.identity.clone()).collect()
    }

    pub async fn device_count(&self) -> usize {
        self.inner.state.lock().await.devices.len()
    }

    pub async fn is_started(&self) -> bool {
        self.inner.state.lock().await.started
    }

    /// Subscribe to round completion instants.
    pub fn last_round(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.inner.last_round.subscribe()
    }

    /// The service publisher owned by this engine.
    pub fn publisher(&self) -> &ServicePublisher {
        &self.inner.publisher
    }
}

/// Bounded rendezvous wait for one hardware operation: three periods, but
/// never under 30 seconds. Expiry counts as a protocol fault of that
/// operation only — it never escalates to the fail-safe reset.
fn op_timeout(period: Duration) -> Duration {
    (period * 3).max(Duration::from_secs(30))
}
