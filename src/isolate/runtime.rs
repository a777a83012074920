//! Host runtime abstraction: the process's module search path and its
//! registry of already-loaded units, as an explicit object.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{GraftError, Result};

/// `json-2.7.1`, `mime-types-data-3.2024.0507`
static VERSIONED_DIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z0-9_.\-]+?)-(?P<version>\d[A-Za-z0-9_.]*)$")
        .expect("static regex")
});

/// The host's module tables plus the two entry-point operations a loaded
/// service needs.
///
/// Implementations mutate process-wide state; nothing here is locked.
pub trait HostRuntime: Send {
    /// Ordered search-path entries.
    fn search_path(&self) -> &[PathBuf];

    fn is_loaded(&self, name: &str) -> bool;

    /// Root directory the named unit was loaded from, if known.
    fn install_location(&self, name: &str) -> Option<PathBuf>;

    /// Search-path entries rooted under the unit's install location.
    fn path_entries_for(&self, name: &str) -> Result<Vec<PathBuf>> {
        let root = self
            .install_location(name)
            .ok_or_else(|| GraftError::Isolation {
                name: name.to_string(),
                reason: "install location unknown".to_string(),
            })?;
        Ok(self
            .search_path()
            .iter()
            .filter(|p| p.starts_with(&root))
            .cloned()
            .collect())
    }

    /// Strike the unit from the search path and the loaded registry.
    ///
    /// Returns the install location that was excised, or `None` when the unit
    /// was not loaded (a no-op).
    fn isolate(&mut self, name: &str) -> Result<Option<PathBuf>>;

    /// Put `path` ahead of every existing entry. Duplicates are dropped.
    fn prepend_search_path(&mut self, path: PathBuf);

    /// Load one unit of code (a bootstrap entry file).
    fn require(&mut self, path: &Path) -> Result<()>;

    /// Run the loaded service's finish-loading entry point for `root`.
    fn finish_loading(&mut self, root: &Path) -> Result<()>;
}

/// In-memory search path and loaded registry.
///
/// Used directly as the runtime in tests (it records `require` and
/// `finish_loading` calls) and as the bookkeeping half of
/// [`super::NativeRuntime`].
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    search_path: Vec<PathBuf>,
    /// Loaded unit name to its install root, when known.
    loaded: BTreeMap<String, Option<PathBuf>>,
    required: Vec<PathBuf>,
    finished: Vec<PathBuf>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path<I: IntoIterator<Item = PathBuf>>(mut self, entries: I) -> Self {
        self.search_path.extend(entries);
        self
    }

    /// Record a unit as loaded.
    pub fn register(&mut self, name: impl Into<String>, install_path: Option<PathBuf>) {
        self.loaded.insert(name.into(), install_path);
    }

    /// Register every `<name>-<version>` directory found on the search path.
    /// Already-registered names are left alone.
    pub fn discover_from_search_path(&mut self) -> usize {
        let mut found = 0;
        for entry in self.search_path.clone() {
            if let Some((name, root)) = versioned_root(&entry) {
                if !self.loaded.contains_key(&name) {
                    self.register(name, Some(root));
                    found += 1;
                }
            }
        }
        found
    }

    pub fn loaded_names(&self) -> Vec<String> {
        self.loaded.keys().cloned().collect()
    }

    /// First search-path entry that provides `name`.
    pub fn resolve(&self, name: &str) -> Option<&PathBuf> {
        self.search_path.iter().find(|entry| {
            entry.ancestors().any(|dir| {
                dir.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n == name || versioned_name(n).as_deref() == Some(name))
                    .unwrap_or(false)
            })
        })
    }

    /// Files passed to `require`, in order.
    pub fn required(&self) -> &[PathBuf] {
        &self.required
    }

    /// Roots passed to `finish_loading`, in order.
    pub fn finished(&self) -> &[PathBuf] {
        &self.finished
    }

    pub(crate) fn record_required(&mut self, path: &Path) {
        self.required.push(path.to_path_buf());
    }

    pub(crate) fn record_finished(&mut self, root: &Path) {
        self.finished.push(root.to_path_buf());
    }
}

impl HostRuntime for ModuleTable {
    fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    fn install_location(&self, name: &str) -> Option<PathBuf> {
        self.loaded.get(name).cloned().flatten()
    }

    fn isolate(&mut self, name: &str) -> Result<Option<PathBuf>> {
        if !self.is_loaded(name) {
            return Ok(None);
        }
        let root = self
            .install_location(name)
            .ok_or_else(|| GraftError::Isolation {
                name: name.to_string(),
                reason: "install location unknown".to_string(),
            })?;
        self.search_path.retain(|p| !p.starts_with(&root));
        self.loaded.remove(name);
        Ok(Some(root))
    }

    fn prepend_search_path(&mut self, path: PathBuf) {
        self.search_path.retain(|p| p != &path);
        self.search_path.insert(0, path);
    }

    fn require(&mut self, path: &Path) -> Result<()> {
        let resolved = locate_entry(path).ok_or_else(|| GraftError::LoadFailed {
            stage: path.display().to_string(),
            cause: "no such file".to_string(),
        })?;
        self.record_required(&resolved);
        if let Some(stem) = resolved.file_stem().and_then(|s| s.to_str()) {
            self.register(stem, resolved.parent().map(Path::to_path_buf));
        }
        Ok(())
    }

    fn finish_loading(&mut self, root: &Path) -> Result<()> {
        self.record_finished(root);
        Ok(())
    }
}

/// `path` itself, or for an extension-less entry the first sibling file with
/// that stem (`config/boot` → `config/boot.rb`).
fn locate_entry(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.extension().is_some() {
        return None;
    }
    let stem = path.file_name()?;
    std::fs::read_dir(path.parent()?)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.file_stem() == Some(stem))
        .min()
}

fn versioned_name(dir_name: &str) -> Option<String> {
    VERSIONED_DIR
        .captures(dir_name)
        .map(|c| c["name"].to_string())
}

/// Nearest ancestor of `entry` named `<name>-<version>`.
fn versioned_root(entry: &Path) -> Option<(String, PathBuf)> {
    entry.ancestors().find_map(|dir| {
        let file_name = dir.file_name()?.to_str()?;
        versioned_name(file_name).map(|name| (name, dir.to_path_buf()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_table() -> ModuleTable {
        let mut table = ModuleTable::new().with_search_path([
            PathBuf::from("/host/gems/json-2.6.3/lib"),
            PathBuf::from("/host/gems/json-2.6.3/ext"),
            PathBuf::from("/host/gems/ffi-1.15.5/lib"),
            PathBuf::from("/host/app/lib"),
        ]);
        table.register("json", Some(PathBuf::from("/host/gems/json-2.6.3")));
        table.register("ffi", Some(PathBuf::from("/host/gems/ffi-1.15.5")));
        table
    }

    #[test]
    fn test_path_entries_for() {
        let table = host_table();
        assert_eq!(
            table.path_entries_for("json").unwrap(),
            vec![
                PathBuf::from("/host/gems/json-2.6.3/lib"),
                PathBuf::from("/host/gems/json-2.6.3/ext"),
            ]
        );
    }

    #[test]
    fn test_path_entries_for_unknown_location() {
        let mut table = ModuleTable::new();
        table.register("date", None);
        assert!(matches!(
            table.path_entries_for("date"),
            Err(GraftError::Isolation { .. })
        ));
    }

    #[test]
    fn test_isolate_removes_entries_and_registry() {
        let mut table = host_table();
        let removed = table.isolate("json").unwrap();
        assert_eq!(removed, Some(PathBuf::from("/host/gems/json-2.6.3")));
        assert!(!table.is_loaded("json"));
        assert_eq!(table.search_path().len(), 2);
        assert!(table.is_loaded("ffi"));
    }

    #[test]
    fn test_isolate_is_component_wise() {
        let mut table = ModuleTable::new().with_search_path([
            PathBuf::from("/gems/json"),
            PathBuf::from("/gems/json-ext/lib"),
        ]);
        table.register("json", Some(PathBuf::from("/gems/json")));
        table.isolate("json").unwrap();
        assert_eq!(table.search_path(), &[PathBuf::from("/gems/json-ext/lib")]);
    }

    #[test]
    fn test_isolate_twice_equals_once() {
        let mut once = host_table();
        once.isolate("json").unwrap();

        let mut twice = host_table();
        twice.isolate("json").unwrap();
        assert_eq!(twice.isolate("json").unwrap(), None);

        assert_eq!(once.search_path(), twice.search_path());
        assert_eq!(once.loaded_names(), twice.loaded_names());
    }

    #[test]
    fn test_isolate_never_loaded_is_noop() {
        let mut table = host_table();
        assert_eq!(table.isolate("bigdecimal").unwrap(), None);
        assert_eq!(table.search_path().len(), 4);
    }

    #[test]
    fn test_isolate_unknown_location_leaves_state() {
        let mut table = host_table();
        table.register("date", None);
        assert!(table.isolate("date").is_err());
        assert!(table.is_loaded("date"));
    }

    #[test]
    fn test_prepend_search_path_dedups() {
        let mut table = host_table();
        table.prepend_search_path(PathBuf::from("/host/app/lib"));
        assert_eq!(table.search_path()[0], PathBuf::from("/host/app/lib"));
        assert_eq!(table.search_path().len(), 4);
    }

    #[test]
    fn test_resolve_prefers_first_entry() {
        let mut table = host_table();
        assert_eq!(
            table.resolve("json"),
            Some(&PathBuf::from("/host/gems/json-2.6.3/lib"))
        );
        table.isolate("json").unwrap();
        table.prepend_search_path(PathBuf::from("/ws/deps/json-2.7.1/lib"));
        assert_eq!(
            table.resolve("json"),
            Some(&PathBuf::from("/ws/deps/json-2.7.1/lib"))
        );
    }

    #[test]
    fn test_discover_from_search_path() {
        let mut table = ModuleTable::new().with_search_path([
            PathBuf::from("/gems/mime-types-data-3.2024.0507/lib"),
            PathBuf::from("/gems/json-2.6.3/lib"),
            PathBuf::from("/app/lib"),
        ]);
        assert_eq!(table.discover_from_search_path(), 2);
        assert_eq!(
            table.install_location("mime-types-data"),
            Some(PathBuf::from("/gems/mime-types-data-3.2024.0507"))
        );
        assert!(table.is_loaded("json"));
        assert_eq!(table.discover_from_search_path(), 0);
    }

    #[test]
    fn test_require_records_and_registers() {
        let dir = tempfile::tempdir().unwrap();
        let boot = dir.path().join("boot.rb");
        std::fs::write(&boot, "").unwrap();

        let mut table = ModuleTable::new();
        table.require(&boot).unwrap();
        assert_eq!(table.required(), &[boot.clone()]);
        assert_eq!(table.install_location("boot"), Some(dir.path().to_path_buf()));

        let missing = dir.path().join("application.rb");
        assert!(matches!(
            table.require(&missing),
            Err(GraftError::LoadFailed { .. })
        ));
    }

    #[test]
    fn test_require_resolves_extensionless_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        let boot = dir.path().join("config/boot.rb");
        std::fs::write(&boot, "").unwrap();

        let mut table = ModuleTable::new();
        table.require(&dir.path().join("config/boot")).unwrap();
        assert_eq!(table.required(), &[boot]);
        assert!(table.require(&dir.path().join("config/application")).is_err());
    }
}
