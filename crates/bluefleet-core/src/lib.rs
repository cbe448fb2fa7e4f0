//! Discovery orchestration engine for bluefleet.
//!
//! Turns the flaky, callback-driven hardware interface of
//! [`bluefleet_stack`] into a stable, policy-governed view of which devices
//! are present and trusted, and which services each device currently
//! offers, published through the [`Registry`] collaborator.
//!
//! - **[`TaskSerializer`]** — single-worker executor for every hardware
//!   operation. The native stack cannot run two inquiries or searches at
//!   once; serializing is the only way to avoid undefined behavior.
//!
//! - **[`DiscoveryEngine`]** — owns the device registry. Runs one inquiry
//!   round per period, diffs the snapshot against its known set, confirms
//!   suspected departures with a presence probe instead of trusting a
//!   single missed beacon, applies the device filter, pairs fleet devices,
//!   and maintains the persistent address→name cache.
//!
//! - **[`ServicePublisher`]** — per-device service enumeration with the
//!   fleet retry policy; replaces a device's published service set
//!   wholesale on each successful enumeration.
//!
//! - **Agents** ([`agent`]) — one-shot state machines (inquiry round,
//!   presence check, service search) that suspend the worker on a
//!   rendezvous channel until the stack's terminal callback arrives.

pub mod agent;
pub mod engine;
pub mod error;
pub mod filter;
pub mod names;
pub mod publisher;
pub mod registry;
pub mod serializer;

pub use engine::{DeviceRecord, DiscoveryEngine};
pub use error::CoreError;
pub use filter::DeviceFilter;
pub use names::{FileNameStore, NameCache, NameStore};
pub use publisher::ServicePublisher;
pub use registry::{Registry, RegistryEntry, RegistryHandle};
pub use serializer::TaskSerializer;
