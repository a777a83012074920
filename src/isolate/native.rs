//! Host runtime backed by dynamic libraries.
//!
//! A service's bootstrap entries are shared libraries. `require` opens one
//! and, when it exports `graft_boot`, calls it. `finish_loading` calls
//! `graft_finish_loading(root)` on the most recently opened library that
//! exports it. Libraries are never closed: a load is permanent for the life
//! of the process.

use libloading::Library;
use std::ffi::{c_char, CString};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::runtime::{HostRuntime, ModuleTable};
use crate::error::{GraftError, Result};

const BOOT_SYMBOL: &[u8] = b"graft_boot\0";
const FINISH_SYMBOL: &[u8] = b"graft_finish_loading\0";

type BootFn = unsafe extern "C" fn() -> i32;
type FinishFn = unsafe extern "C" fn(*const c_char) -> i32;

/// Search-path variable read by [`NativeRuntime::from_env`].
pub const LOAD_PATH_ENV: &str = "GRAFT_LOAD_PATH";

pub struct NativeRuntime {
    table: ModuleTable,
    libraries: Vec<(PathBuf, Library)>,
}

impl NativeRuntime {
    pub fn new(table: ModuleTable) -> Self {
        Self {
            table,
            libraries: Vec::new(),
        }
    }

    /// Runtime seeded from `GRAFT_LOAD_PATH`, with every versioned directory
    /// on it registered as a loaded dependency.
    pub fn from_env() -> Self {
        let entries = std::env::var_os(LOAD_PATH_ENV)
            .map(|v| std::env::split_paths(&v).collect::<Vec<_>>())
            .unwrap_or_default();
        let mut table = ModuleTable::new().with_search_path(entries);
        let found = table.discover_from_search_path();
        debug!(found, "Discovered host dependencies");
        Self::new(table)
    }

    pub fn table(&self) -> &ModuleTable {
        &self.table
    }

    /// Paths of every library opened so far.
    pub fn libraries(&self) -> Vec<&Path> {
        self.libraries.iter().map(|(p, _)| p.as_path()).collect()
    }

    /// Add the platform library extension when the entry has none, and look
    /// relative entries up on the search path.
    fn locate(&self, path: &Path) -> Option<PathBuf> {
        let with_ext = if path.extension().is_none() {
            path.with_extension(std::env::consts::DLL_EXTENSION)
        } else {
            path.to_path_buf()
        };

        if with_ext.is_absolute() {
            return with_ext.exists().then_some(with_ext);
        }
        self.table
            .search_path()
            .iter()
            .map(|dir| dir.join(&with_ext))
            .find(|candidate| candidate.exists())
    }
}

impl HostRuntime for NativeRuntime {
    fn search_path(&self) -> &[PathBuf] {
        self.table.search_path()
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.table.is_loaded(name)
    }

    fn install_location(&self, name: &str) -> Option<PathBuf> {
        self.table.install_location(name)
    }

    fn isolate(&mut self, name: &str) -> Result<Option<PathBuf>> {
        self.table.isolate(name)
    }

    fn prepend_search_path(&mut self, path: PathBuf) {
        self.table.prepend_search_path(path)
    }

    fn require(&mut self, path: &Path) -> Result<()> {
        let stage = path.display().to_string();
        let resolved = self.locate(path).ok_or_else(|| GraftError::LoadFailed {
            stage: stage.clone(),
            cause: "no such file".to_string(),
        })?;

        // SAFETY: opening a library runs its initializers; the service is
        // trusted code by the time it reaches the loader.
        let library = unsafe { Library::new(&resolved) }.map_err(|e| GraftError::LoadFailed {
            stage: stage.clone(),
            cause: e.to_string(),
        })?;

        // Kept before boot runs: whatever boot sets up must stay mapped even
        // if it then reports failure.
        self.libraries.push((resolved.clone(), library));
        self.table.record_required(&resolved);

        let boot = self.libraries.last().and_then(|(_, lib)| {
            // SAFETY: the exported symbol follows the `BootFn` signature.
            unsafe { lib.get::<BootFn>(BOOT_SYMBOL) }
                .ok()
                .map(|sym| *sym)
        });
        if let Some(boot) = boot {
            run_boot(boot, &stage)?;
        }

        info!(library = %resolved.display(), "Loaded entry library");
        if let Some(stem) = resolved.file_stem().and_then(|s| s.to_str()) {
            self.table
                .register(stem, resolved.parent().map(Path::to_path_buf));
        }
        Ok(())
    }

    fn finish_loading(&mut self, root: &Path) -> Result<()> {
        let root_arg = CString::new(root.to_string_lossy().as_bytes()).map_err(|e| {
            GraftError::LoadFailed {
                stage: "finish loading".to_string(),
                cause: e.to_string(),
            }
        })?;

        let finish = self.libraries.iter().rev().find_map(|(_, lib)| {
            // SAFETY: the exported symbol follows the `FinishFn` signature.
            unsafe { lib.get::<FinishFn>(FINISH_SYMBOL) }
                .ok()
                .map(|sym| *sym)
        });
        let finish = finish.ok_or_else(|| GraftError::LoadFailed {
            stage: "finish loading".to_string(),
            cause: "no loaded library exports graft_finish_loading".to_string(),
        })?;

        // SAFETY: `root_arg` outlives the call; the library stays loaded.
        let code = unsafe { finish(root_arg.as_ptr()) };
        if code != 0 {
            return Err(GraftError::LoadFailed {
                stage: "finish loading".to_string(),
                cause: format!("graft_finish_loading returned {}", code),
            });
        }
        self.table.record_finished(root);
        Ok(())
    }
}

fn run_boot(boot: BootFn, stage: &str) -> Result<()> {
    // SAFETY: `boot` comes from a library held in `NativeRuntime::libraries`.
    let code = unsafe { boot() };
    if code != 0 {
        return Err(GraftError::LoadFailed {
            stage: stage.to_string(),
            cause: format!("graft_boot returned {}", code),
        });
    }
    Ok(())
}
