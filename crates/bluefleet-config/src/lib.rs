//! Configuration for the bluefleet discovery engine.
//!
//! Two surfaces live here: [`DiscoverySettings`] (the engine's tunables,
//! layered from defaults + TOML file + `BLUEFLEET_`-prefixed environment
//! variables) and the fleet file — the allow-list of known device patterns
//! with pairing PINs and retry policy, compiled into a [`FleetConfig`].
//!
//! A missing fleet file is not an error: discovery runs in degraded mode
//! with pairing and filtering disabled (all devices accepted, none paired).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use bluefleet_stack::DiscoveryMode;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("cannot parse fleet file: {0}")]
    FleetParse(#[from] toml::de::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Discovery settings ──────────────────────────────────────────────

/// Engine tunables. Every field has a safe default so an empty config is a
/// working config.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoverySettings {
    /// Seconds between two inquiry rounds. Too small floods the radio and
    /// blocks correct discovery; too large makes device dynamism hard to
    /// track. Zero is coerced to the default.
    #[serde(default = "default_period")]
    pub period_secs: u64,

    /// Inquiry access code: global or limited discovery.
    #[serde(default)]
    pub mode: DiscoveryMode,

    /// Skip devices that never communicated a friendly name.
    #[serde(default = "default_true")]
    pub ignore_unnamed: bool,

    /// Probe every inquiry hit to confirm it is genuinely reachable.
    /// Works around stacks that keep returning paired devices after they
    /// left; costs one service search per discovered device per round.
    #[serde(default)]
    pub online_check: bool,

    /// Revoke stored authentication when a filtered device departs.
    #[serde(default)]
    pub unpair_on_departure: bool,

    /// Path of the persisted address→name map. `None`, empty, or the
    /// literal string `"null"` disables persistence.
    #[serde(default)]
    pub name_cache_path: Option<String>,

    /// Path of the fleet file.
    #[serde(default)]
    pub fleet_path: Option<PathBuf>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            period_secs: default_period(),
            mode: DiscoveryMode::default(),
            ignore_unnamed: true,
            online_check: false,
            unpair_on_departure: false,
            name_cache_path: None,
            fleet_path: None,
        }
    }
}

fn default_period() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

impl DiscoverySettings {
    /// The inquiry period with the zero-coercion applied.
    pub fn period(&self) -> Duration {
        let secs = if self.period_secs == 0 {
            default_period()
        } else {
            self.period_secs
        };
        Duration::from_secs(secs)
    }

    /// The name-cache file, with the disable sentinels applied.
    pub fn name_cache_file(&self) -> Option<PathBuf> {
        match self.name_cache_path.as_deref().map(str::trim) {
            None | Some("") | Some("null") => None,
            Some(path) => Some(PathBuf::from(path)),
        }
    }
}

/// Load settings from an optional TOML file plus the environment.
///
/// Layering (later wins): built-in defaults, the file, then
/// `BLUEFLEET_`-prefixed environment variables.
pub fn load_settings(path: Option<&Path>) -> Result<DiscoverySettings, ConfigError> {
    let mut figment = Figment::new().merge(Serialized::defaults(DiscoverySettings::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    let settings: DiscoverySettings = figment.merge(Env::prefixed("BLUEFLEET_")).extract()?;
    Ok(settings)
}

// ── Fleet file (raw TOML shape) ─────────────────────────────────────

/// On-disk shape of the fleet file.
#[derive(Debug, Deserialize)]
struct FleetFile {
    /// Optional device filter regex, matched against address or name.
    device_filter: Option<String>,

    #[serde(default)]
    devices: Vec<RawFleetEntry>,
}

#[derive(Debug, Deserialize)]
struct RawFleetEntry {
    /// Regex matched in full against the device address or name.
    pattern: String,

    /// Pairing PIN for matching devices.
    pin: SecretString,

    /// Whether failed service enumerations are retried for this device.
    #[serde(default = "default_true")]
    retry: bool,

    /// Retry budget. Zero or absent means one attempt.
    #[serde(default)]
    max_retry: u32,
}

// ── Compiled fleet ──────────────────────────────────────────────────

/// One compiled fleet entry: pattern, PIN, retry policy.
pub struct FleetEntry {
    pattern: Regex,
    pin: SecretString,
    retry: bool,
    max_retry: u32,
}

impl FleetEntry {
    /// Whether this entry matches the device. Patterns match the entire
    /// address or the entire name, as in the original fleet format.
    pub fn matches(&self, address: &str, name: Option<&str>) -> bool {
        self.pattern.is_match(address) || name.is_some_and(|n| self.pattern.is_match(n))
    }

    pub fn pin(&self) -> &SecretString {
        &self.pin
    }

    pub fn retry_enabled(&self) -> bool {
        self.retry
    }

    /// The effective retry budget: never less than one.
    pub fn max_retry(&self) -> u32 {
        self.max_retry.max(1)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl std::fmt::Debug for FleetEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetEntry")
            .field("pattern", &self.pattern.as_str())
            .field("retry", &self.retry)
            .field("max_retry", &self.max_retry)
            .finish_non_exhaustive()
    }
}

/// The compiled fleet: ordered entries plus the optional device filter.
#[derive(Debug, Default)]
pub struct FleetConfig {
    entries: Vec<FleetEntry>,
    filter: Option<Regex>,
}

impl FleetConfig {
    /// First entry matching the device, in file order.
    pub fn find_match(&self, address: &str, name: Option<&str>) -> Option<&FleetEntry> {
        self.entries.iter().find(|e| e.matches(address, name))
    }

    pub fn entries(&self) -> &[FleetEntry] {
        &self.entries
    }

    /// The device filter pattern, when the file configured one.
    pub fn filter(&self) -> Option<&Regex> {
        self.filter.as_ref()
    }
}

/// Compile a pattern anchored at both ends — fleet patterns match the whole
/// address or name, never a substring.
fn compile_anchored(field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
        warn!(field, pattern, "rejecting invalid pattern");
        ConfigError::Pattern {
            pattern: pattern.to_owned(),
            source,
        }
    })
}

/// Load and compile the fleet file.
///
/// `Ok(None)` when the file does not exist — the caller runs without
/// pairing or filtering, which is the documented degraded mode.
pub fn load_fleet(path: &Path) -> Result<Option<FleetConfig>, ConfigError> {
    if !path.exists() {
        warn!(path = %path.display(), "no fleet file found, ignoring auto-pairing and device filter");
        return Ok(None);
    }

    let raw = std::fs::read_to_string(path)?;
    let file: FleetFile = toml::from_str(&raw)?;

    let filter = file
        .device_filter
        .as_deref()
        .map(|p| compile_anchored("device_filter", p))
        .transpose()?;

    let mut entries = Vec::with_capacity(file.devices.len());
    for raw in file.devices {
        entries.push(FleetEntry {
            pattern: compile_anchored("pattern", &raw.pattern)?,
            pin: raw.pin,
            retry: raw.retry,
            max_retry: raw.max_retry,
        });
    }

    info!(
        devices = entries.len(),
        filter = filter.as_ref().map(Regex::as_str),
        path = %path.display(),
        "fleet file loaded"
    );

    Ok(Some(FleetConfig { entries, filter }))
}
