//! Extension library loading.
//!
//! Extensions are shared objects found under a per-bridge root directory;
//! the loader keeps each library open for the life of the bridge so the
//! attached entry points stay valid.

use std::{collections::HashMap, path::PathBuf};

use gc_arena::Collect;
use libloading::{Library, Symbol};

#[derive(Debug)]
pub enum ExtensionError {
    LibraryNotFound(String),
    SymbolNotFound(String, String),
    LoadError(String, String),
}

impl std::fmt::Display for ExtensionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtensionError::LibraryNotFound(name) => {
                write!(f, "Unable to find extension library '{}'", name)
            }
            ExtensionError::SymbolNotFound(lib, sym) => write!(
                f,
                "Unable to find init symbol '{}' in extension library '{}'",
                sym, lib
            ),
            ExtensionError::LoadError(name, err) => {
                write!(f, "Failed to load extension library '{}': {}", name, err)
            }
        }
    }
}

pub struct ExtensionLibraries {
    root: PathBuf,
    libraries: HashMap<String, Library>,
}

gc_arena::unsafe_empty_collect!(ExtensionLibraries);

impl ExtensionLibraries {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            libraries: HashMap::new(),
        }
    }

    fn find_library_path(&self, name: &str) -> Option<PathBuf> {
        let exact = self.root.join(name);
        if exact.exists() {
            return Some(exact);
        }

        // Try with platform extension
        #[cfg(target_os = "linux")]
        let extensions = &[".so", ".dylib", ".dll"];
        #[cfg(target_os = "macos")]
        let extensions = &[".dylib", ".so", ".dll"];
        #[cfg(target_os = "windows")]
        let extensions = &[".dll", ".so", ".dylib"];
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        let extensions = &[".so", ".dll", ".dylib"];

        for ext in extensions {
            let path = self.root.join(format!("{}{}", name, ext));
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    pub fn get_library(&mut self, name: &str) -> Result<&Library, ExtensionError> {
        if !self.libraries.contains_key(name) {
            let path = self
                .find_library_path(name)
                .ok_or_else(|| ExtensionError::LibraryNotFound(name.to_string()))?;
            let lib = unsafe { Library::new(&path) }
                .map_err(|e| ExtensionError::LoadError(name.to_string(), e.to_string()))?;
            self.libraries.insert(name.to_string(), lib);
        }
        Ok(&self.libraries[name])
    }

    /// Address of an extension's init entry point.
    pub fn get_init(&mut self, library: &str, symbol: &str) -> Result<u64, ExtensionError> {
        let l = self.get_library(library)?;
        let sym: Symbol<unsafe extern "C" fn()> = unsafe { l.get(symbol.as_bytes()) }
            .map_err(|_| ExtensionError::SymbolNotFound(library.to_string(), symbol.to_string()))?;
        Ok(*sym as u64)
    }
}
