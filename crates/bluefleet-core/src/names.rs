// ── Name cache and persistence ──
//
// Unnamed devices are usually ignored, but a device only reveals its name
// when the radio conditions allow it. Once a name is learned for an address
// it is kept for the rest of the session (and across sessions when a store
// is configured), so a later garbled inquiry cannot demote the device back
// to "unnamed".

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::{error, info, warn};

use bluefleet_stack::DeviceAddress;

/// Persistence collaborator for the address→name map.
///
/// Load/store faults are never fatal — the in-memory cache stays
/// authoritative for the session.
pub trait NameStore: Send + Sync {
    fn load(&self) -> io::Result<HashMap<String, String>>;
    fn store(&self, names: &HashMap<String, String>) -> io::Result<()>;
}

/// In-memory address→name map, exclusively owned by the engine.
#[derive(Debug, Default)]
pub struct NameCache {
    names: HashMap<String, String>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the cache from a store. Failure yields an empty cache, logged.
    pub fn load_from(store: &dyn NameStore) -> Self {
        match store.load() {
            Ok(names) => {
                info!(devices = names.len(), "device name cache loaded");
                Self { names }
            }
            Err(e) => {
                error!(error = %e, "cannot load the device name cache");
                Self::new()
            }
        }
    }

    pub fn get(&self, address: &DeviceAddress) -> Option<&str> {
        self.names.get(address.as_str()).map(String::as_str)
    }

    /// Record a freshly discovered name. Empty names are discarded, and an
    /// already-known name is never overwritten — once learned, a name only
    /// leaves the cache with the cache itself.
    pub fn learn(&mut self, address: &DeviceAddress, name: &str) -> bool {
        if name.is_empty() || self.names.contains_key(address.as_str()) {
            return false;
        }
        self.names.insert(address.as_str().to_owned(), name.to_owned());
        true
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Write the cache through the store. Failure is logged, never fatal.
    pub fn flush_to(&self, store: &dyn NameStore) {
        if let Err(e) = store.store(&self.names) {
            error!(error = %e, "cannot store the device name cache");
        }
    }
}

/// Flat-file name store: one `ADDRESS=Name` pair per line, `#` comments.
#[derive(Debug, Clone)]
pub struct FileNameStore {
    path: PathBuf,
}

impl FileNameStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl NameStore for FileNameStore {
    fn load(&self) -> io::Result<HashMap<String, String>> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "device name file does not exist, starting empty");
            return Ok(HashMap::new());
        }

        let raw = fs::read_to_string(&self.path)?;
        let mut names = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((address, name)) = line.split_once('=') {
                let (address, name) = (address.trim(), name.trim());
                if !address.is_empty() && !name.is_empty() {
                    names.insert(address.to_owned(), name.to_owned());
                }
            }
        }
        Ok(names)
    }

    fn store(&self, names: &HashMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(&self.path)?;
        writeln!(file, "# address to name map")?;
        // Stable output ordering keeps the file diffable.
        let mut entries: Vec<_> = names.iter().collect();
        entries.sort();
        for (address, name) in entries {
            writeln!(file, "{address}={name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn addr(s: &str) -> DeviceAddress {
        DeviceAddress::new(s)
    }

    #[test]
    fn learned_names_are_never_overwritten() {
        let mut cache = NameCache::new();
        assert!(cache.learn(&addr("AABBCCDDEEFF"), "printer"));
        assert!(!cache.learn(&addr("AABBCCDDEEFF"), ""));
        assert!(!cache.learn(&addr("AABBCCDDEEFF"), "other"));
        assert_eq!(cache.get(&addr("AABBCCDDEEFF")), Some("printer"));
    }

    #[test]
    fn empty_names_are_discarded() {
        let mut cache = NameCache::new();
        assert!(!cache.learn(&addr("AABBCCDDEEFF"), ""));
        assert!(cache.is_empty());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileNameStore::new(dir.path().join("names.cache"));

        let mut cache = NameCache::new();
        cache.learn(&addr("AABBCCDDEEFF"), "printer");
        cache.learn(&addr("001122334455"), "badge 07");
        cache.flush_to(&store);

        let reloaded = NameCache::load_from(&store);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(&addr("AABBCCDDEEFF")), Some("printer"));
        assert_eq!(reloaded.get(&addr("001122334455")), Some("badge 07"));
    }

    #[test]
    fn missing_file_loads_empty() {
        let store = FileNameStore::new("/nonexistent/names.cache");
        let cache = NameCache::load_from(&store);
        assert!(cache.is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.cache");
        fs::write(&path, "# comment\nAABBCCDDEEFF=printer\ngarbage line\n=noaddr\n").unwrap();

        let cache = NameCache::load_from(&FileNameStore::new(path));
        assert_eq!(cache.len(), 1);
    }
}
