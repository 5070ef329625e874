//! Privileged broker contract and its simulated implementation
//!
//! The broker is the out-of-process service that actually touches kernel
//! state. Calls are synchronous, blocking round-trips; this layer never
//! retries them, because a repeated load or unload against a privileged
//! service can have partial side effects the retry would mask.

use crate::info::LoadedKextInfo;
use crate::status::Status;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

/// The privileged broker surface.
///
/// Implementations must serialize state transitions per identifier; a
/// caller racing a transition already in flight may observe `Busy`.
pub trait Broker: Send + Sync {
    /// Request a load of the named extension, resolving dependencies from
    /// the installed registry and the supplied search paths
    fn load(&self, identifier: &str, dependency_paths: &[String]) -> Status;

    /// Request an unload of the named extension
    fn unload(&self, identifier: &str) -> Status;

    /// Introspect loaded extensions; `None` filters mean match-all.
    ///
    /// Records are returned whole; key restriction happens when records are
    /// rendered, since a record is a closed struct.
    fn loaded_info(
        &self,
        identifiers: Option<&[String]>,
        info_keys: Option<&[String]>,
    ) -> Result<Vec<LoadedKextInfo>, Status>;
}

/// An installable extension known to the simulated registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KextSpec {
    /// Bundle identifier
    pub identifier: String,
    /// Bundle version string
    pub version: String,
    /// Installed bundle path
    pub bundle_path: String,
    /// Identifiers of directly linked dependencies
    pub dependencies: Vec<String>,
    /// Whether the bundle carries an acceptable signature
    pub signed: bool,
}

/// Construction options for the simulated broker
#[derive(Debug, Clone, Default)]
pub struct BrokerOptions {
    /// Extensions present in the installed registry
    pub available: Vec<KextSpec>,
}

#[derive(Debug, Clone)]
struct LoadedEntry {
    version: String,
    load_address: u64,
    load_size: u64,
    reference_count: u32,
    started: bool,
    dependencies: Vec<String>,
}

#[derive(Debug, Default)]
struct BrokerState {
    available: FxHashMap<String, KextSpec>,
    loaded: FxHashMap<String, LoadedEntry>,
    next_load_address: u64,
    offline: bool,
}

/// In-process realization of the broker contract.
///
/// Implements the per-identifier state machine
/// `Unloaded -> Loaded -> Unloaded` over an installed-extension registry.
/// One lock guards all state, so transitions serialize.
#[derive(Debug)]
pub struct SimulatedBroker {
    state: RwLock<BrokerState>,
}

const KERNEL_BASE: u64 = 0xffff_ff7f_8000_0000;

impl SimulatedBroker {
    /// Create a broker with an empty registry
    pub fn new() -> Self {
        Self::with_options(BrokerOptions::default())
    }

    /// Create a broker with a pre-populated registry
    pub fn with_options(options: BrokerOptions) -> Self {
        let mut available = FxHashMap::default();
        for spec in options.available {
            available.insert(spec.identifier.clone(), spec);
        }
        Self {
            state: RwLock::new(BrokerState {
                available,
                loaded: FxHashMap::default(),
                next_load_address: KERNEL_BASE,
                offline: false,
            }),
        }
    }

    /// Add an installable extension to the registry
    pub fn install(&self, spec: KextSpec) {
        let mut state = self.state.write();
        state.available.insert(spec.identifier.clone(), spec);
    }

    /// Simulate loss of the broker connection.
    ///
    /// While offline every call returns `CommunicationFailure`.
    pub fn set_offline(&self, offline: bool) {
        self.state.write().offline = offline;
    }

    /// Identifiers currently loaded (test hook)
    pub fn loaded_identifiers(&self) -> Vec<String> {
        let state = self.state.read();
        let mut ids: Vec<String> = state.loaded.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for SimulatedBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn image_size(identifier: &str) -> u64 {
    (identifier.len() as u64 + 1) * 0x1000
}

impl BrokerState {
    fn insert_loaded(&mut self, identifier: &str, version: String, dependencies: Vec<String>) {
        let size = image_size(identifier);
        let entry = LoadedEntry {
            version,
            load_address: self.next_load_address,
            load_size: size,
            reference_count: 0,
            started: true,
            dependencies,
        };
        self.next_load_address += size;
        self.loaded.insert(identifier.to_string(), entry);
    }

    /// Bring one dependency into the loaded set, recursively.
    ///
    /// A dependency resolves from the installed registry, or from a supplied
    /// search path whose final component names it.
    fn ensure_dependency(
        &mut self,
        identifier: &str,
        search_paths: &[String],
        visiting: &mut FxHashSet<String>,
    ) -> bool {
        if let Some(entry) = self.loaded.get_mut(identifier) {
            entry.reference_count += 1;
            return true;
        }
        if !visiting.insert(identifier.to_string()) {
            // Dependency cycle; the kernel would refuse the link
            return false;
        }

        if let Some(spec) = self.available.get(identifier).cloned() {
            for dep in &spec.dependencies {
                if !self.ensure_dependency(dep, search_paths, visiting) {
                    return false;
                }
            }
            self.insert_loaded(identifier, spec.version.clone(), spec.dependencies.clone());
            if let Some(entry) = self.loaded.get_mut(identifier) {
                entry.reference_count = 1;
            }
            return true;
        }

        let leaf = identifier.rsplit('.').next().unwrap_or(identifier);
        let found = search_paths
            .iter()
            .any(|path| path.contains(identifier) || path.contains(leaf));
        if found {
            self.insert_loaded(identifier, "0.0.0".to_string(), Vec::new());
            if let Some(entry) = self.loaded.get_mut(identifier) {
                entry.reference_count = 1;
            }
        }
        found
    }
}

impl Broker for SimulatedBroker {
    fn load(&self, identifier: &str, dependency_paths: &[String]) -> Status {
        let mut state = self.state.write();
        if state.offline {
            return Status::CommunicationFailure;
        }
        if state.loaded.contains_key(identifier) {
            return Status::AlreadyLoaded;
        }
        let spec = match state.available.get(identifier).cloned() {
            Some(spec) => spec,
            None => return Status::NotFound,
        };
        if !spec.signed {
            return Status::Authentication;
        }

        let mut visiting = FxHashSet::default();
        visiting.insert(identifier.to_string());
        for dep in &spec.dependencies {
            if !state.ensure_dependency(dep, dependency_paths, &mut visiting) {
                log::debug!("load {identifier}: dependency {dep} unresolved");
                return Status::DependencyResolution;
            }
        }

        state.insert_loaded(identifier, spec.version.clone(), spec.dependencies.clone());
        log::debug!("load {identifier}: loaded version {}", spec.version);
        Status::Success
    }

    fn unload(&self, identifier: &str) -> Status {
        let mut state = self.state.write();
        if state.offline {
            return Status::CommunicationFailure;
        }
        if !state.loaded.contains_key(identifier) {
            return Status::NotLoaded;
        }
        let has_dependents = state
            .loaded
            .iter()
            .any(|(id, entry)| id != identifier && entry.dependencies.iter().any(|d| d == identifier));
        if has_dependents {
            return Status::Busy;
        }

        let entry = match state.loaded.remove(identifier) {
            Some(entry) => entry,
            None => return Status::NotLoaded,
        };
        for dep in &entry.dependencies {
            if let Some(dep_entry) = state.loaded.get_mut(dep) {
                dep_entry.reference_count = dep_entry.reference_count.saturating_sub(1);
            }
        }
        log::debug!("unload {identifier}: done");
        Status::Success
    }

    fn loaded_info(
        &self,
        identifiers: Option<&[String]>,
        _info_keys: Option<&[String]>,
    ) -> Result<Vec<LoadedKextInfo>, Status> {
        let state = self.state.read();
        if state.offline {
            return Err(Status::CommunicationFailure);
        }
        let mut records: Vec<LoadedKextInfo> = state
            .loaded
            .iter()
            .filter(|(id, _)| match identifiers {
                Some(wanted) => wanted.iter().any(|w| w == *id),
                None => true,
            })
            .map(|(id, entry)| LoadedKextInfo {
                identifier: id.clone(),
                version: entry.version.clone(),
                load_address: entry.load_address,
                load_size: entry.load_size,
                reference_count: entry.reference_count,
                started: entry.started,
                dependencies: entry.dependencies.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(records)
    }
}
