//! Save/load for reproductive systems.
//!
//! Tracker state crosses the persistence boundary as a flat key/value map
//! ([`StateMap`]) — the engine defines the key/value shape, the host
//! decides where the bytes go. [`save_to`]/[`load_from`] additionally
//! provide a versioned bincode envelope for hosts that want one.
//!
//! Only trackers whose state differs from their type's defaults are
//! written (`Tracker::should_save`). On load, a missing tracker entry or a
//! missing field means "use defaults" — never an error. An entry naming an
//! identifier with no registry entry is a configuration error and fails
//! the load.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use reprosim_logic::constants::trackers;
use reprosim_logic::guide::Sex;

use crate::error::PersistError;
use crate::events::{NotificationSink, SubjectId};
use crate::registry::Registry;
use crate::settings::Settings;
use crate::system::ReproductiveSystem;

/// Version number for the save envelope (increment when the format changes).
pub const SAVE_VERSION: u32 = 1;

/// One persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SaveValue {
    U64(u64),
    I64(i64),
    F64(f64),
    Bool(bool),
    Str(String),
}

/// Flat key/value state of one tracker (or one hosted child, prefixed).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMap(BTreeMap<String, SaveValue>);

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&SaveValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: String, value: SaveValue) {
        self.0.insert(key, value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn put_u64(&mut self, key: &str, value: u64) {
        self.0.insert(key.to_string(), SaveValue::U64(value));
    }

    pub fn put_f64(&mut self, key: &str, value: f64) {
        self.0.insert(key.to_string(), SaveValue::F64(value));
    }

    pub fn put_bool(&mut self, key: &str, value: bool) {
        self.0.insert(key.to_string(), SaveValue::Bool(value));
    }

    pub fn put_str(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), SaveValue::Str(value.to_string()));
    }

    /// Read a `u64` field; a missing key yields `default`, a key of the
    /// wrong kind is a malformed save.
    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64, PersistError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(SaveValue::U64(v)) => Ok(*v),
            Some(_) => Err(PersistError::BadField {
                key: key.to_string(),
                expected: "u64",
            }),
        }
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, PersistError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(SaveValue::F64(v)) => Ok(*v),
            Some(_) => Err(PersistError::BadField {
                key: key.to_string(),
                expected: "f64",
            }),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, PersistError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(SaveValue::Bool(v)) => Ok(*v),
            Some(_) => Err(PersistError::BadField {
                key: key.to_string(),
                expected: "bool",
            }),
        }
    }

    pub fn str_or(&self, key: &str, default: &str) -> Result<String, PersistError> {
        match self.0.get(key) {
            None => Ok(default.to_string()),
            Some(SaveValue::Str(v)) => Ok(v.clone()),
            Some(_) => Err(PersistError::BadField {
                key: key.to_string(),
                expected: "str",
            }),
        }
    }

    /// Extract the entries under `prefix` into a new map with the prefix
    /// stripped (used by container trackers for their children).
    pub fn sub_map(&self, prefix: &str) -> StateMap {
        let mut out = StateMap::new();
        for (k, v) in &self.0 {
            if let Some(rest) = k.strip_prefix(prefix) {
                out.0.insert(rest.to_string(), v.clone());
            }
        }
        out
    }

    /// Merge `child` into `self` with every key prefixed.
    pub fn merge_prefixed(&mut self, prefix: &str, child: &StateMap) {
        for (k, v) in &child.0 {
            self.0.insert(format!("{}{}", prefix, k), v.clone());
        }
    }
}

/// One saved tracker: identifier plus its non-default fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSave {
    pub id: String,
    pub state: StateMap,
}

/// Serializable snapshot of one reproductive system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSave {
    pub version: u32,
    pub subject: SubjectId,
    pub profile: reprosim_logic::guide::SubjectProfile,
    pub seed: u64,
    pub clock: u64,
    pub last_update: u64,
    pub carry: f64,
    pub trackers: Vec<TrackerSave>,
}

/// Capture a system's persistable state.
pub fn snapshot(system: &ReproductiveSystem) -> SystemSave {
    let trackers = system
        .trackers_iter()
        .filter(|t| t.should_save())
        .map(|t| TrackerSave {
            id: t.id().to_string(),
            state: t.save_state(),
        })
        .collect();
    SystemSave {
        version: SAVE_VERSION,
        subject: system.subject(),
        profile: system.profile().clone(),
        seed: system.seed(),
        clock: system.clock(),
        last_update: system.last_update(),
        carry: system.conversion_carry(),
        trackers,
    }
}

/// Rebuild a system from a snapshot.
///
/// Trackers are restored through the registry; lifecycle hooks do not run
/// for restored trackers (their state is already live). Trackers absent
/// from the save because their state was all-default are re-created with
/// defaults: the male sperm-production reserve (absent ⇒ full), and the
/// female baseline cycle only when nothing has been simulated yet.
pub fn restore(
    save: SystemSave,
    registry: &Registry,
    settings: &Settings,
    sink: &dyn NotificationSink,
) -> Result<ReproductiveSystem, PersistError> {
    if save.version != SAVE_VERSION {
        return Err(PersistError::VersionMismatch {
            expected: SAVE_VERSION,
            found: save.version,
        });
    }
    let mut system = ReproductiveSystem::bare(save.subject, save.profile, registry, save.seed);
    system.set_clock_state(save.clock, save.last_update, save.carry);
    for entry in &save.trackers {
        let tracker = registry.load_tracker(&entry.id, &entry.state, system.guides())?;
        system.insert_restored(tracker);
    }
    match system.profile().sex {
        Sex::Male => {
            if system.tracker(trackers::SPERM_PRODUCTION).is_none() {
                system.ensure_baseline(settings, sink);
            }
        }
        Sex::Female => {
            if system.clock() == 0 && system.tracker(trackers::CYCLE).is_none() {
                system.ensure_baseline(settings, sink);
            }
        }
    }
    Ok(system)
}

/// Write a bincode-encoded snapshot.
pub fn save_to<W: Write>(writer: W, system: &ReproductiveSystem) -> Result<(), PersistError> {
    bincode::serialize_into(writer, &snapshot(system))?;
    Ok(())
}

/// Human-readable snapshot dump, for debug consoles and inspection.
pub fn snapshot_json(system: &ReproductiveSystem) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&snapshot(system))
}

/// Read a bincode-encoded snapshot and rebuild the system.
pub fn load_from<R: Read>(
    reader: R,
    registry: &Registry,
    settings: &Settings,
    sink: &dyn NotificationSink,
) -> Result<ReproductiveSystem, PersistError> {
    let save: SystemSave = bincode::deserialize_from(reader)?;
    restore(save, registry, settings, sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_yields_default() {
        let map = StateMap::new();
        assert_eq!(map.u64_or("absent", 42).unwrap(), 42);
        assert_eq!(map.f64_or("absent", 1.5).unwrap(), 1.5);
        assert!(!map.bool_or("absent", false).unwrap());
        assert_eq!(map.str_or("absent", "x").unwrap(), "x");
    }

    #[test]
    fn wrong_kind_is_bad_field() {
        let mut map = StateMap::new();
        map.put_str("phase", "luteal");
        let err = map.u64_or("phase", 0).unwrap_err();
        assert!(matches!(err, PersistError::BadField { .. }));
    }

    #[test]
    fn sub_map_strips_prefix() {
        let mut map = StateMap::new();
        map.put_u64("pill.remaining", 100);
        map.put_u64("other.remaining", 7);
        let sub = map.sub_map("pill.");
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.u64_or("remaining", 0).unwrap(), 100);
    }

    #[test]
    fn merge_prefixed_roundtrips_with_sub_map() {
        let mut child = StateMap::new();
        child.put_u64("remaining", 9);
        child.put_bool("active", true);
        let mut parent = StateMap::new();
        parent.merge_prefixed("pill.", &child);
        assert_eq!(parent.sub_map("pill."), child);
    }

    #[test]
    fn state_map_bincode_roundtrip() {
        let mut map = StateMap::new();
        map.put_u64("a", 1);
        map.put_f64("b", 2.5);
        map.put_str("c", "three");
        let bytes = bincode::serialize(&map).unwrap();
        let back: StateMap = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, map);
    }
}
