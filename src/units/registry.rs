//! Registry of currently loaded unit instances.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{CommandUnit, UnitError, UnitId, UnitLoader};

/// The active instance of a unit.
///
/// Instances are immutable; a reload produces a new `LoadedUnit` with a
/// higher version instead of mutating this one.
#[derive(Clone)]
pub struct LoadedUnit {
    id: UnitId,
    version: u64,
    instance: Arc<dyn CommandUnit>,
    source: Option<PathBuf>,
}

impl LoadedUnit {
    pub fn id(&self) -> &UnitId {
        &self.id
    }

    /// Starts at 1, incremented by every successful reload.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn instance(&self) -> &Arc<dyn CommandUnit> {
        &self.instance
    }

    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }
}

impl std::fmt::Debug for LoadedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedUnit")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Owned copy of the registry contents, in ascending id order.
pub type UnitSnapshot = BTreeMap<UnitId, LoadedUnit>;

/// Result of a batch load.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<UnitId>,
    /// Raw name as requested, so ids that fail to parse are reported too.
    pub failed: Vec<(String, UnitError)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`UnitRegistry::reload_one`].
#[derive(Debug)]
pub enum ReloadOutcome {
    /// The new instance replaced the old one.
    Reloaded { version: u64 },
    /// The id was never loaded; nothing changed.
    Unknown,
    /// Re-execution failed; the previous instance is still in place.
    Failed(UnitError),
}

impl ReloadOutcome {
    pub fn is_reloaded(&self) -> bool {
        matches!(self, Self::Reloaded { .. })
    }
}

/// Owns the mapping from unit id to its current instance.
pub struct UnitRegistry {
    loader: Arc<dyn UnitLoader>,
    units: RwLock<BTreeMap<UnitId, LoadedUnit>>,
}

impl UnitRegistry {
    pub fn new(loader: Arc<dyn UnitLoader>) -> Self {
        Self {
            loader,
            units: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn loader(&self) -> &Arc<dyn UnitLoader> {
        &self.loader
    }

    /// Parse and load every name in `names`. Names that are not valid ids
    /// are reported as failures; the rest of the batch still loads.
    pub fn load_names<I, S>(&self, names: I) -> LoadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut invalid = Vec::new();
        let mut ids = Vec::new();

        for name in names {
            let name = name.as_ref();
            match UnitId::parse(name) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    tracing::error!("[registry] {e}");
                    invalid.push((name.to_string(), e));
                }
            }
        }

        let mut report = self.load(ids);
        report.failed.splice(0..0, invalid);
        report
    }

    /// Load every id in `ids`. Failures are per id and never abort the batch.
    ///
    /// Ids that are already loaded are reloaded. An id whose stem is already
    /// taken by another loaded unit is rejected, since changed files are
    /// mapped back to units by stem.
    pub fn load(&self, ids: impl IntoIterator<Item = UnitId>) -> LoadReport {
        let mut report = LoadReport::default();

        for id in ids {
            if self.units.read().contains_key(&id) {
                match self.reload_one(&id) {
                    ReloadOutcome::Failed(e) => report.failed.push((id.to_string(), e)),
                    _ => report.loaded.push(id),
                }
                continue;
            }

            if let Some(existing) = self.resolve_stem(id.stem()) {
                let err = duplicate_stem(&id, &existing);
                report.failed.push((id.to_string(), err));
                continue;
            }

            let instance = match self.loader.load(&id) {
                Ok(instance) => instance,
                Err(e) => {
                    tracing::error!("[registry] failed to load {id}: {e}");
                    report.failed.push((id.to_string(), e));
                    continue;
                }
            };

            let unit = LoadedUnit {
                source: self.loader.source_path(&id),
                id: id.clone(),
                version: 1,
                instance,
            };

            // The loader ran unlocked; another load may have taken the stem since
            let mut units = self.units.write();
            if let Some(existing) = stem_owner(&units, id.stem()) {
                drop(units);
                let err = duplicate_stem(&id, &existing);
                report.failed.push((id.to_string(), err));
                continue;
            }
            units.insert(id.clone(), unit);
            drop(units);

            crate::log_event!("registry", "loaded", "{id}");
            report.loaded.push(id);
        }

        report
    }

    /// Re-execute the definition of an already loaded unit and swap it in.
    ///
    /// The loader runs without holding the registry lock, and the old
    /// instance is replaced only once the new one is fully constructed.
    pub fn reload_one(&self, id: &UnitId) -> ReloadOutcome {
        let current_version = match self.units.read().get(id) {
            Some(unit) => unit.version,
            None => {
                tracing::warn!("[registry] reload requested for unknown unit {id}");
                return ReloadOutcome::Unknown;
            }
        };

        let instance = match self.loader.load(id) {
            Ok(instance) => instance,
            Err(e) => {
                tracing::error!(
                    "[registry] failed to reload {id}, keeping version {current_version}: {e}"
                );
                return ReloadOutcome::Failed(e);
            }
        };

        let mut units = self.units.write();
        let version = units.get(id).map_or(current_version, |unit| unit.version) + 1;
        units.insert(
            id.clone(),
            LoadedUnit {
                id: id.clone(),
                version,
                instance,
                source: self.loader.source_path(id),
            },
        );
        drop(units);

        crate::log_event!("registry", "reloaded", "{id} (version {version})");
        ReloadOutcome::Reloaded { version }
    }

    /// Reload every loaded unit independently.
    pub fn reload_all(&self) -> Vec<(UnitId, ReloadOutcome)> {
        self.ids()
            .into_iter()
            .map(|id| {
                let outcome = self.reload_one(&id);
                (id, outcome)
            })
            .collect()
    }

    /// Owned copy of the current id -> unit mapping.
    pub fn snapshot(&self) -> UnitSnapshot {
        self.units.read().clone()
    }

    pub fn get(&self, id: &UnitId) -> Option<LoadedUnit> {
        self.units.read().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<UnitId> {
        self.units.read().keys().cloned().collect()
    }

    /// First loaded unit (ascending id) whose identifier ends with `stem`.
    pub fn resolve_stem(&self, stem: &str) -> Option<UnitId> {
        stem_owner(&self.units.read(), stem)
    }

    /// Definition files of all loaded units that have one.
    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.units
            .read()
            .values()
            .filter_map(|unit| unit.source.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }
}

fn stem_owner(units: &BTreeMap<UnitId, LoadedUnit>, stem: &str) -> Option<UnitId> {
    units.keys().find(|id| id.ends_with_stem(stem)).cloned()
}

fn duplicate_stem(id: &UnitId, existing: &UnitId) -> UnitError {
    let err = UnitError::DuplicateStem {
        id: id.to_string(),
        stem: id.stem().to_string(),
        existing: existing.to_string(),
    };
    tracing::error!("[registry] {err}");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct Stub {
        id: UnitId,
    }

    impl CommandUnit for Stub {
        fn id(&self) -> &UnitId {
            &self.id
        }
    }

    /// Loader whose definitions are edited in memory.
    #[derive(Default)]
    struct ScriptedLoader {
        // id -> whether the current definition is valid
        definitions: Mutex<HashMap<String, bool>>,
    }

    impl ScriptedLoader {
        fn define(&self, id: &str, valid: bool) {
            self.definitions.lock().insert(id.to_string(), valid);
        }
    }

    impl UnitLoader for ScriptedLoader {
        fn load(&self, id: &UnitId) -> Result<Arc<dyn CommandUnit>, UnitError> {
            match self.definitions.lock().get(id.as_str()) {
                Some(true) => Ok(Arc::new(Stub { id: id.clone() })),
                Some(false) => Err(UnitError::InvalidDefinition {
                    id: id.to_string(),
                    reason: "syntax error".into(),
                }),
                None => Err(UnitError::NotFound {
                    id: id.to_string(),
                    path: PathBuf::from(id.as_str()),
                }),
            }
        }
    }

    fn id(raw: &str) -> UnitId {
        UnitId::parse(raw).unwrap()
    }

    fn setup() -> (Arc<ScriptedLoader>, UnitRegistry) {
        let loader = Arc::new(ScriptedLoader::default());
        let registry = UnitRegistry::new(loader.clone());
        (loader, registry)
    }

    #[test]
    fn test_load_continues_past_failures() {
        let (loader, registry) = setup();
        loader.define("a", true);
        loader.define("b", false);
        loader.define("c", true);

        let report = registry.load([id("a"), id("b"), id("c"), id("missing")]);

        assert_eq!(report.loaded, vec![id("a"), id("c")]);
        assert_eq!(report.failed.len(), 2);
        assert!(!report.is_complete());
        assert_eq!(registry.ids(), vec![id("a"), id("c")]);
    }

    #[test]
    fn test_load_rejects_duplicate_stems() {
        let (loader, registry) = setup();
        loader.define("one.greet", true);
        loader.define("two.greet", true);

        let report = registry.load([id("one.greet"), id("two.greet")]);

        assert_eq!(report.loaded, vec![id("one.greet")]);
        assert!(matches!(
            report.failed[0].1,
            UnitError::DuplicateStem { .. }
        ));
    }

    #[test]
    fn test_load_names_reports_invalid_ids_and_loads_the_rest() {
        let (loader, registry) = setup();
        loader.define("greet", true);
        loader.define("close_session", true);

        let report = registry.load_names(["greet", "bad id", "close_session"]);

        assert_eq!(report.loaded, vec![id("greet"), id("close_session")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad id");
        assert!(matches!(report.failed[0].1, UnitError::InvalidId(_)));
        assert_eq!(registry.len(), 2);
    }

    /// Loader that holds every load long enough for concurrent loads to overlap.
    struct SlowLoader;

    impl UnitLoader for SlowLoader {
        fn load(&self, id: &UnitId) -> Result<Arc<dyn CommandUnit>, UnitError> {
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(Arc::new(Stub { id: id.clone() }))
        }
    }

    #[test]
    fn test_concurrent_loads_never_share_a_stem() {
        let registry = UnitRegistry::new(Arc::new(SlowLoader));

        let (first, second) = std::thread::scope(|scope| {
            let first = scope.spawn(|| registry.load([id("one.greet")]));
            let second = scope.spawn(|| registry.load([id("two.greet")]));
            (first.join().unwrap(), second.join().unwrap())
        });

        assert_eq!(registry.len(), 1);
        assert_eq!(first.loaded.len() + second.loaded.len(), 1);
        let failed: Vec<_> = first.failed.iter().chain(&second.failed).collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0].1, UnitError::DuplicateStem { .. }));
    }

    #[test]
    fn test_reload_replaces_instance_and_bumps_version() {
        let (loader, registry) = setup();
        loader.define("greet", true);
        registry.load([id("greet")]);
        let before = registry.get(&id("greet")).unwrap();

        loader.define("greet", true);
        let outcome = registry.reload_one(&id("greet"));

        assert!(matches!(outcome, ReloadOutcome::Reloaded { version: 2 }));
        let after = registry.get(&id("greet")).unwrap();
        assert_eq!(after.version(), 2);
        assert!(!Arc::ptr_eq(before.instance(), after.instance()));
        // The old instance stays valid for whoever still holds it.
        assert_eq!(before.version(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_previous_instance() {
        let (loader, registry) = setup();
        loader.define("greet", true);
        registry.load([id("greet")]);
        let before = registry.get(&id("greet")).unwrap();

        loader.define("greet", false);
        let outcome = registry.reload_one(&id("greet"));

        assert!(matches!(outcome, ReloadOutcome::Failed(_)));
        let after = registry.get(&id("greet")).unwrap();
        assert_eq!(after.version(), 1);
        assert!(Arc::ptr_eq(before.instance(), after.instance()));
    }

    #[test]
    fn test_reload_unknown_is_noop() {
        let (_loader, registry) = setup();
        assert!(matches!(
            registry.reload_one(&id("nobody")),
            ReloadOutcome::Unknown
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reload_all_is_independent_per_unit() {
        let (loader, registry) = setup();
        loader.define("a", true);
        loader.define("b", true);
        registry.load([id("a"), id("b")]);

        loader.define("a", false);
        let outcomes = registry.reload_all();

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].1, ReloadOutcome::Failed(_)));
        assert!(outcomes[1].1.is_reloaded());
        assert_eq!(registry.get(&id("a")).unwrap().version(), 1);
        assert_eq!(registry.get(&id("b")).unwrap().version(), 2);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_reloads() {
        let (loader, registry) = setup();
        loader.define("greet", true);
        registry.load([id("greet")]);

        let snapshot = registry.snapshot();
        registry.reload_one(&id("greet"));

        assert_eq!(snapshot[&id("greet")].version(), 1);
        assert_eq!(registry.get(&id("greet")).unwrap().version(), 2);
    }

    #[test]
    fn test_resolve_stem_matches_segment() {
        let (loader, registry) = setup();
        loader.define("commands.close_session", true);
        loader.define("greet", true);
        registry.load([id("commands.close_session"), id("greet")]);

        assert_eq!(
            registry.resolve_stem("close_session"),
            Some(id("commands.close_session"))
        );
        assert_eq!(registry.resolve_stem("greet"), Some(id("greet")));
        assert_eq!(registry.resolve_stem("session"), None);
    }
}
