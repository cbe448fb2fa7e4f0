// Shared test doubles: a scriptable stack, a recording registry, and an
// in-memory name store.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bluefleet_core::{Registry, RegistryEntry, RegistryHandle};
use bluefleet_stack::{
    BluetoothStack, DataElement, DeviceAddress, DeviceIdentity, DiscoveredDevice, DiscoveryMode,
    EventSender, InquiryStatus, LocalAdapter, ProtocolDescriptor, SearchStatus, ServiceRecord,
    StackError, StackEvent, StackKind, TransactionId, record::SERVICE_NAME_ATTRIBUTE,
};

// ── Helpers ─────────────────────────────────────────────────────────

pub fn addr(s: &str) -> DeviceAddress {
    DeviceAddress::new(s)
}

pub fn device(address: &str, name: Option<&str>, paired: bool) -> DiscoveredDevice {
    DiscoveredDevice::new(
        DeviceIdentity::new(addr(address), name.map(str::to_owned)),
        paired,
    )
}

pub fn record(address: &str, channel: u8, name: &str) -> ServiceRecord {
    let mut attributes = BTreeMap::new();
    attributes.insert(SERVICE_NAME_ATTRIBUTE, DataElement::Text(name.to_owned()));
    ServiceRecord {
        handle: u32::from(channel),
        device: addr(address),
        attributes,
        protocol: Some(ProtocolDescriptor::Rfcomm { channel }),
    }
}

pub fn record_without_protocol(address: &str) -> ServiceRecord {
    ServiceRecord {
        handle: 0,
        device: addr(address),
        attributes: BTreeMap::new(),
        protocol: None,
    }
}

// ── Scripted stack ──────────────────────────────────────────────────

/// What one `start_inquiry` call does.
pub enum InquiryRound {
    /// Deliver the devices, then complete with the status. `status: None`
    /// hangs the round (no terminal callback).
    Deliver {
        devices: Vec<DiscoveredDevice>,
        status: Option<InquiryStatus>,
    },
    /// Refuse to start.
    FailStart,
}

/// What one `search_services` call on a device does.
pub enum SearchResponse {
    Respond {
        records: Vec<ServiceRecord>,
        status: SearchStatus,
    },
    /// Refuse to start.
    Fail,
    /// Never complete.
    Hang,
}

/// A `BluetoothStack` driven entirely by scripted responses. Events are
/// sent synchronously into the listener channel, which is exactly what a
/// callback thread racing ahead of the worker looks like to consumers.
pub struct ScriptedStack {
    powered: Mutex<bool>,
    kind: Mutex<StackKind>,
    inquiry_rounds: Mutex<VecDeque<InquiryRound>>,
    /// Snapshot re-delivered when the script queue is empty.
    steady_devices: Mutex<Vec<DiscoveredDevice>>,
    search_responses: Mutex<HashMap<DeviceAddress, VecDeque<SearchResponse>>>,
    names: Mutex<HashMap<String, String>>,
    cached: Mutex<Vec<DiscoveredDevice>>,
    fail_auth: Mutex<bool>,

    next_transaction: AtomicU32,
    pub inquiries: AtomicU32,
    pub searches: Mutex<Vec<DeviceAddress>>,
    pub auth_calls: Mutex<Vec<(DeviceAddress, String)>>,
    pub unpair_calls: Mutex<Vec<DeviceAddress>>,
}

impl ScriptedStack {
    pub fn new() -> Self {
        Self {
            powered: Mutex::new(true),
            kind: Mutex::new(StackKind::Bluez),
            inquiry_rounds: Mutex::new(VecDeque::new()),
            steady_devices: Mutex::new(Vec::new()),
            search_responses: Mutex::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
            cached: Mutex::new(Vec::new()),
            fail_auth: Mutex::new(false),
            next_transaction: AtomicU32::new(1),
            inquiries: AtomicU32::new(0),
            searches: Mutex::new(Vec::new()),
            auth_calls: Mutex::new(Vec::new()),
            unpair_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_kind(kind: StackKind) -> Self {
        let stack = Self::new();
        *stack.kind.lock().expect("poisoned") = kind;
        stack
    }

    pub fn set_powered(&self, powered: bool) {
        *self.powered.lock().expect("poisoned") = powered;
    }

    pub fn push_inquiry_round(&self, round: InquiryRound) {
        self.inquiry_rounds.lock().expect("poisoned").push_back(round);
    }

    pub fn set_steady_devices(&self, devices: Vec<DiscoveredDevice>) {
        *self.steady_devices.lock().expect("poisoned") = devices;
    }

    pub fn push_search_response(&self, address: &str, response: SearchResponse) {
        self.search_responses
            .lock()
            .expect("poisoned")
            .entry(addr(address))
            .or_default()
            .push_back(response);
    }

    pub fn insert_name(&self, address: &str, name: &str) {
        self.names
            .lock()
            .expect("poisoned")
            .insert(addr(address).as_str().to_owned(), name.to_owned());
    }

    pub fn set_cached_devices(&self, devices: Vec<DiscoveredDevice>) {
        *self.cached.lock().expect("poisoned") = devices;
    }

    pub fn set_fail_auth(&self, fail: bool) {
        *self.fail_auth.lock().expect("poisoned") = fail;
    }

    pub fn search_count(&self, address: &str) -> usize {
        let target = addr(address);
        self.searches
            .lock()
            .expect("poisoned")
            .iter()
            .filter(|a| **a == target)
            .count()
    }
}

impl BluetoothStack for ScriptedStack {
    fn is_powered_on(&self) -> bool {
        *self.powered.lock().expect("poisoned")
    }

    fn local_adapter(&self) -> Result<LocalAdapter, StackError> {
        if !self.is_powered_on() {
            return Err(StackError::NotReady);
        }
        Ok(LocalAdapter {
            address: addr("000000000001"),
            name: Some("local".to_owned()),
        })
    }

    fn stack_kind(&self) -> StackKind {
        *self.kind.lock().expect("poisoned")
    }

    fn start_inquiry(&self, _mode: DiscoveryMode, listener: EventSender) -> Result<(), StackError> {
        self.inquiries.fetch_add(1, Ordering::SeqCst);

        let round = self
            .inquiry_rounds
            .lock()
            .expect("poisoned")
            .pop_front()
            .unwrap_or_else(|| InquiryRound::Deliver {
                devices: self.steady_devices.lock().expect("poisoned").clone(),
                status: Some(InquiryStatus::Completed),
            });

        match round {
            InquiryRound::FailStart => Err(StackError::NotReady),
            InquiryRound::Deliver { devices, status } => {
                for device in devices {
                    let _ = listener.send(StackEvent::DeviceFound(device));
                }
                if let Some(status) = status {
                    let _ = listener.send(StackEvent::InquiryCompleted(status));
                }
                Ok(())
            }
        }
    }

    fn search_services(
        &self,
        _attributes: &[u16],
        _service_classes: &[u16],
        device: &DeviceAddress,
        listener: EventSender,
    ) -> Result<TransactionId, StackError> {
        self.searches.lock().expect("poisoned").push(device.clone());

        let response = self
            .search_responses
            .lock()
            .expect("poisoned")
            .get_mut(device)
            .and_then(VecDeque::pop_front)
            .unwrap_or(SearchResponse::Respond {
                records: Vec::new(),
                status: SearchStatus::Completed,
            });

        let transaction = TransactionId(self.next_transaction.fetch_add(1, Ordering::SeqCst));
        match response {
            SearchResponse::Fail => Err(StackError::NotReady),
            SearchResponse::Hang => Ok(transaction),
            SearchResponse::Respond { records, status } => {
                if !records.is_empty() {
                    let _ = listener.send(StackEvent::ServicesFound {
                        transaction,
                        records,
                    });
                }
                let _ = listener.send(StackEvent::SearchCompleted {
                    transaction,
                    status,
                });
                Ok(transaction)
            }
        }
    }

    fn friendly_name(&self, device: &DeviceAddress) -> Result<Option<String>, StackError> {
        Ok(self.names.lock().expect("poisoned").get(device.as_str()).cloned())
    }

    fn authenticate(&self, device: &DeviceAddress, pin: &str) -> Result<(), StackError> {
        self.auth_calls
            .lock()
            .expect("poisoned")
            .push((device.clone(), pin.to_owned()));
        if *self.fail_auth.lock().expect("poisoned") {
            return Err(StackError::Authentication {
                message: "refused".to_owned(),
            });
        }
        Ok(())
    }

    fn remove_authentication(&self, device: &DeviceAddress) -> Result<(), StackError> {
        self.unpair_calls.lock().expect("poisoned").push(device.clone());
        Ok(())
    }

    fn cached_devices(&self) -> Result<Vec<DiscoveredDevice>, StackError> {
        Ok(self.cached.lock().expect("poisoned").clone())
    }
}

// ── Recording registry ──────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingRegistry {
    next: AtomicU64,
    live: Mutex<HashMap<u64, RegistryEntry>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses of live device entries, with their published names.
    pub fn device_entries(&self) -> Vec<(DeviceAddress, Option<String>)> {
        self.live
            .lock()
            .expect("poisoned")
            .values()
            .filter_map(|entry| match entry {
                RegistryEntry::Device { address, name } => {
                    Some((address.clone(), name.clone()))
                }
                RegistryEntry::Service { .. } => None,
            })
            .collect()
    }

    /// Connection URLs of live service entries for one device.
    pub fn service_urls(&self, address: &str) -> Vec<String> {
        let target = addr(address);
        let mut urls: Vec<String> = self
            .live
            .lock()
            .expect("poisoned")
            .values()
            .filter_map(|entry| match entry {
                RegistryEntry::Service { address, url, .. } if *address == target => {
                    Some(url.clone())
                }
                _ => None,
            })
            .collect();
        urls.sort();
        urls
    }

    pub fn has_device(&self, address: &str) -> bool {
        let target = addr(address);
        self.device_entries().iter().any(|(a, _)| *a == target)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().expect("poisoned").len()
    }
}

impl Registry for RecordingRegistry {
    fn register(&self, entry: RegistryEntry) -> RegistryHandle {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        self.live.lock().expect("poisoned").insert(id, entry);
        RegistryHandle(id)
    }

    fn unregister(&self, handle: RegistryHandle) {
        self.live.lock().expect("poisoned").remove(&handle.0);
    }
}

// ── In-memory name store ────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryNameStore {
    pub names: Mutex<HashMap<String, String>>,
    pub fail_store: Mutex<bool>,
}

impl MemoryNameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preload(&self, address: &str, name: &str) {
        self.names
            .lock()
            .expect("poisoned")
            .insert(addr(address).as_str().to_owned(), name.to_owned());
    }
}

impl bluefleet_core::NameStore for MemoryNameStore {
    fn load(&self) -> std::io::Result<HashMap<String, String>> {
        Ok(self.names.lock().expect("poisoned").clone())
    }

    fn store(&self, names: &HashMap<String, String>) -> std::io::Result<()> {
        if *self.fail_store.lock().expect("poisoned") {
            return Err(std::io::Error::other("store failed"));
        }
        *self.names.lock().expect("poisoned") = names.clone();
        Ok(())
    }
}
