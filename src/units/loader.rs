//! Unit loaders: turn a [`UnitId`] into a fresh unit instance.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::UnitResult;
use super::manifest::{ManifestUnit, UnitManifest};
use super::{CommandUnit, UnitError, UnitId};

/// Constructor for a unit compiled into the host.
pub type BuiltinFactory = fn(UnitId) -> Arc<dyn CommandUnit>;

/// Executes unit definitions.
///
/// Every call must build a new instance from the definition as it is right
/// now; loaders never cache instances.
pub trait UnitLoader: Send + Sync {
    /// Execute the definition of `id`.
    fn load(&self, id: &UnitId) -> UnitResult<Arc<dyn CommandUnit>>;

    /// Path of the file backing `id`, if it has one.
    fn source_path(&self, id: &UnitId) -> Option<PathBuf> {
        let _ = id;
        None
    }

    /// Directories where new or changed definitions may appear.
    fn roots(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Loads units from TOML manifests under a root directory, falling back to
/// builtin units when no file exists.
///
/// A definition file on disk takes precedence over a builtin with the same
/// identifier.
pub struct ManifestLoader {
    root: PathBuf,
    extension: String,
    builtins: BTreeMap<UnitId, BuiltinFactory>,
}

impl ManifestLoader {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            builtins: BTreeMap::new(),
        }
    }

    /// Register a builtin unit.
    pub fn with_builtin(mut self, id: UnitId, factory: BuiltinFactory) -> Self {
        self.builtins.insert(id, factory);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn definition_path(&self, id: &UnitId) -> PathBuf {
        self.root.join(id.relative_path(&self.extension))
    }
}

impl UnitLoader for ManifestLoader {
    fn load(&self, id: &UnitId) -> UnitResult<Arc<dyn CommandUnit>> {
        let path = self.definition_path(id);

        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return match self.builtins.get(id) {
                    Some(factory) => {
                        crate::debug_event!("loader", "builtin", "{id}");
                        Ok(factory(id.clone()))
                    }
                    None => Err(UnitError::NotFound {
                        id: id.to_string(),
                        path,
                    }),
                };
            }
            Err(e) => {
                return Err(UnitError::Io {
                    id: id.to_string(),
                    source: e,
                });
            }
        };

        let manifest = UnitManifest::parse(id, &source)?;
        crate::debug_event!("loader", "parsed", "{id} from {}", path.display());
        Ok(Arc::new(ManifestUnit::new(id.clone(), manifest)))
    }

    fn source_path(&self, id: &UnitId) -> Option<PathBuf> {
        let path = self.definition_path(id);
        if path.exists() || !self.builtins.contains_key(id) {
            Some(path)
        } else {
            None
        }
    }

    fn roots(&self) -> Vec<PathBuf> {
        vec![self.root.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::session::DetachedSession;
    use crate::watcher::WatcherHandle;
    use std::fs;
    use tempfile::TempDir;

    struct Marker {
        id: UnitId,
    }

    impl CommandUnit for Marker {
        fn id(&self) -> &UnitId {
            &self.id
        }
    }

    fn marker(id: UnitId) -> Arc<dyn CommandUnit> {
        Arc::new(Marker { id })
    }

    fn id(raw: &str) -> UnitId {
        UnitId::parse(raw).unwrap()
    }

    #[test]
    fn test_load_manifest_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("greet.toml"),
            "[[commands]]\nname = \"hi\"\nactions = [{ say = \"hello\" }]\n",
        )
        .unwrap();

        let loader = ManifestLoader::new(temp_dir.path(), "toml");
        let unit = loader.load(&id("greet")).unwrap();
        assert_eq!(unit.id().as_str(), "greet");

        let ctx = Arc::new(Context::new(
            Arc::new(DetachedSession::new("test")),
            Arc::new(WatcherHandle::new()),
        ));
        let commands = unit.register(&ctx).unwrap().unwrap();
        assert!(commands.contains_key("hi"));
    }

    #[test]
    fn test_dotted_id_maps_to_nested_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("commands")).unwrap();
        fs::write(
            temp_dir.path().join("commands/tools.toml"),
            "commands = []\n",
        )
        .unwrap();

        let loader = ManifestLoader::new(temp_dir.path(), "toml");
        assert!(loader.load(&id("commands.tools")).is_ok());
        assert_eq!(
            loader.source_path(&id("commands.tools")),
            Some(temp_dir.path().join("commands").join("tools.toml"))
        );
    }

    #[test]
    fn test_missing_definition_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ManifestLoader::new(temp_dir.path(), "toml");

        let err = loader.load(&id("ghost")).err().unwrap();
        assert!(matches!(err, UnitError::NotFound { .. }));
    }

    #[test]
    fn test_syntax_error_is_invalid_definition() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("broken.toml"), "[[commands]\nname = ").unwrap();

        let loader = ManifestLoader::new(temp_dir.path(), "toml");
        let err = loader.load(&id("broken")).err().unwrap();
        assert!(matches!(err, UnitError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_builtin_fallback_and_file_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ManifestLoader::new(temp_dir.path(), "toml").with_builtin(id("core"), marker);

        // No file: the builtin is used and has no backing path.
        assert!(loader.load(&id("core")).is_ok());
        assert_eq!(loader.source_path(&id("core")), None);

        // A file with the same id overrides the builtin.
        fs::write(temp_dir.path().join("core.toml"), "not = [valid").unwrap();
        assert!(loader.load(&id("core")).is_err());
        assert!(loader.source_path(&id("core")).is_some());
    }
}
