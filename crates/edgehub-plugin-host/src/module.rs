//! Plugin module loading.
//!
//! A [`PluginModule`] couples a parsed descriptor with a fully resolved
//! call table. For dynamic modules the backing library is kept alive for
//! the module's lifetime; builtin modules supply their call table
//! directly.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use libloading::Library;

use edgehub_plugin_api::abi::{
    self, PluginInitFn, PluginReleaseFn, PluginShutdownFn, StorageOpFn,
};
use edgehub_plugin_api::shim::{PluginShim, StoragePlugin};
use edgehub_plugin_api::{Capabilities, Descriptor, RawDescriptor, PLUGIN_TYPE_STORAGE};

use crate::{Error, IncompatibilityError, LoadError, Result};

/// Resolved call table for a storage plugin.
///
/// Required entry points are always present; capability-gated entries are
/// resolved only when the descriptor claims the corresponding bit and stay
/// `None` otherwise.
#[derive(Debug, Clone, Copy)]
pub struct StorageVtable {
    pub init: PluginInitFn,
    pub shutdown: PluginShutdownFn,
    pub release: PluginReleaseFn,

    pub common_insert: Option<StorageOpFn>,
    pub common_retrieve: Option<StorageOpFn>,
    pub common_update: Option<StorageOpFn>,
    pub common_delete: Option<StorageOpFn>,

    pub reading_append: Option<StorageOpFn>,
    pub reading_fetch: Option<StorageOpFn>,
    pub reading_retrieve: Option<StorageOpFn>,
    pub reading_purge: Option<StorageOpFn>,
}

impl StorageVtable {
    /// Minimal call table with no optional operations.
    pub fn new(
        init: PluginInitFn,
        shutdown: PluginShutdownFn,
        release: PluginReleaseFn,
    ) -> Self {
        Self {
            init,
            shutdown,
            release,
            common_insert: None,
            common_retrieve: None,
            common_update: None,
            common_delete: None,
            reading_append: None,
            reading_fetch: None,
            reading_retrieve: None,
            reading_purge: None,
        }
    }

    /// Full call table over a [`StoragePlugin`] implementation, for
    /// builtin plugins registered without a dynamic library.
    pub fn for_plugin<P: StoragePlugin>() -> Self {
        Self {
            init: PluginShim::<P>::init,
            shutdown: PluginShim::<P>::shutdown,
            release: PluginShim::<P>::release,
            common_insert: Some(PluginShim::<P>::common_insert),
            common_retrieve: Some(PluginShim::<P>::common_retrieve),
            common_update: Some(PluginShim::<P>::common_update),
            common_delete: Some(PluginShim::<P>::common_delete),
            reading_append: Some(PluginShim::<P>::reading_append),
            reading_fetch: Some(PluginShim::<P>::reading_fetch),
            reading_retrieve: Some(PluginShim::<P>::reading_retrieve),
            reading_purge: Some(PluginShim::<P>::reading_purge),
        }
    }

    /// Check that every entry gated by a claimed capability bit is
    /// present.
    pub(crate) fn check_claimed(&self, descriptor: &Descriptor) -> std::result::Result<(), LoadError> {
        let missing = |symbol| LoadError::MissingEntryPoint {
            module: descriptor.name.clone(),
            symbol,
        };
        if descriptor.supports(Capabilities::COMMON) {
            self.common_insert.ok_or(missing(abi::COMMON_INSERT_SYMBOL))?;
            self.common_retrieve
                .ok_or(missing(abi::COMMON_RETRIEVE_SYMBOL))?;
            self.common_update.ok_or(missing(abi::COMMON_UPDATE_SYMBOL))?;
            self.common_delete.ok_or(missing(abi::COMMON_DELETE_SYMBOL))?;
        }
        if descriptor.supports(Capabilities::READINGS) {
            self.reading_append
                .ok_or(missing(abi::READING_APPEND_SYMBOL))?;
            self.reading_fetch.ok_or(missing(abi::READING_FETCH_SYMBOL))?;
            self.reading_retrieve
                .ok_or(missing(abi::READING_RETRIEVE_SYMBOL))?;
            self.reading_purge.ok_or(missing(abi::READING_PURGE_SYMBOL))?;
        }
        Ok(())
    }
}

/// A loaded plugin module: descriptor plus resolved call table.
#[derive(Debug)]
pub struct PluginModule {
    descriptor: Descriptor,
    vtable: StorageVtable,
    path: Option<PathBuf>,
    loaded_at: DateTime<Utc>,

    // Keeps the resolved symbols alive for dynamic modules.
    _library: Option<Library>,
}

impl PluginModule {
    /// Load a plugin module from a dynamic library file.
    ///
    /// Validates the file, reads the exported descriptor, checks the type
    /// tag against the call-table shapes the host implements, and resolves
    /// every required entry point, failing fast with [`LoadError`] naming
    /// the module and the missing symbol.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        validate_file(path)?;

        let library = unsafe {
            Library::new(path).map_err(|source| LoadError::Open {
                path: path.display().to_string(),
                source,
            })?
        };

        let descriptor = unsafe {
            let raw = library
                .get::<*const RawDescriptor>(abi::DESCRIPTOR_SYMBOL.as_bytes())
                .map_err(|_| LoadError::MissingEntryPoint {
                    module: module_name(path),
                    symbol: abi::DESCRIPTOR_SYMBOL,
                })?;
            Descriptor::from_raw(&**raw).map_err(LoadError::Descriptor)?
        };

        if descriptor.plugin_type != PLUGIN_TYPE_STORAGE {
            return Err(IncompatibilityError::UnsupportedType {
                plugin: descriptor.name,
                found: descriptor.plugin_type,
            }
            .into());
        }

        let vtable = unsafe { resolve_storage_vtable(&library, &descriptor)? };

        tracing::info!(plugin = %descriptor, path = %path.display(), "plugin module loaded");

        Ok(Self {
            descriptor,
            vtable,
            path: Some(path.to_path_buf()),
            loaded_at: Utc::now(),
            _library: Some(library),
        })
    }

    /// Register an in-process plugin without a dynamic library.
    ///
    /// The same admission rules apply: the type tag must be supported and
    /// every claimed capability must be backed by a call-table entry.
    pub fn builtin(descriptor: Descriptor, vtable: StorageVtable) -> Result<Self> {
        if descriptor.plugin_type != PLUGIN_TYPE_STORAGE {
            return Err(IncompatibilityError::UnsupportedType {
                plugin: descriptor.name,
                found: descriptor.plugin_type,
            }
            .into());
        }
        vtable.check_claimed(&descriptor)?;

        tracing::info!(plugin = %descriptor, "builtin plugin module registered");

        Ok(Self {
            descriptor,
            vtable,
            path: None,
            loaded_at: Utc::now(),
            _library: None,
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub(crate) fn vtable(&self) -> &StorageVtable {
        &self.vtable
    }

    /// Path of the backing library; `None` for builtin modules.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

impl Display for PluginModule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.descriptor.fmt(f)
    }
}

/// Resolve the storage call table, gated by the descriptor's capability
/// bits.
unsafe fn resolve_storage_vtable(
    library: &Library,
    descriptor: &Descriptor,
) -> std::result::Result<StorageVtable, LoadError> {
    let module = descriptor.name.as_str();
    let mut vtable = StorageVtable::new(
        unsafe { resolve(library, module, abi::INIT_SYMBOL)? },
        unsafe { resolve(library, module, abi::SHUTDOWN_SYMBOL)? },
        unsafe { resolve(library, module, abi::RELEASE_SYMBOL)? },
    );

    if descriptor.supports(Capabilities::COMMON) {
        vtable.common_insert = Some(unsafe { resolve(library, module, abi::COMMON_INSERT_SYMBOL)? });
        vtable.common_retrieve =
            Some(unsafe { resolve(library, module, abi::COMMON_RETRIEVE_SYMBOL)? });
        vtable.common_update = Some(unsafe { resolve(library, module, abi::COMMON_UPDATE_SYMBOL)? });
        vtable.common_delete = Some(unsafe { resolve(library, module, abi::COMMON_DELETE_SYMBOL)? });
    }

    if descriptor.supports(Capabilities::READINGS) {
        vtable.reading_append =
            Some(unsafe { resolve(library, module, abi::READING_APPEND_SYMBOL)? });
        vtable.reading_fetch = Some(unsafe { resolve(library, module, abi::READING_FETCH_SYMBOL)? });
        vtable.reading_retrieve =
            Some(unsafe { resolve(library, module, abi::READING_RETRIEVE_SYMBOL)? });
        vtable.reading_purge = Some(unsafe { resolve(library, module, abi::READING_PURGE_SYMBOL)? });
    }

    Ok(vtable)
}

unsafe fn resolve<T: Copy>(
    library: &Library,
    module: &str,
    symbol: &'static str,
) -> std::result::Result<T, LoadError> {
    unsafe {
        library
            .get::<T>(symbol.as_bytes())
            .map(|s| *s)
            .map_err(|_| LoadError::MissingEntryPoint {
                module: module.to_string(),
                symbol,
            })
    }
}

fn validate_file(path: &Path) -> std::result::Result<(), LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.display().to_string()));
    }
    if !path.is_file() {
        return Err(LoadError::InvalidFile {
            path: path.display().to_string(),
            reason: "not a regular file".into(),
        });
    }

    let expected = match std::env::consts::OS {
        "macos" => "dylib",
        "linux" => "so",
        "windows" => "dll",
        other => {
            return Err(LoadError::InvalidFile {
                path: path.display().to_string(),
                reason: format!("unsupported platform: {other}"),
            })
        }
    };
    let ext = path.extension().and_then(|e| e.to_str());
    if ext != Some(expected) {
        return Err(LoadError::InvalidFile {
            path: path.display().to_string(),
            reason: format!("expected a .{expected} library"),
        });
    }
    Ok(())
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgehub_plugin_api::{InterfaceVersion, PluginError};
    use serde_json::Value;

    struct Nop;

    impl StoragePlugin for Nop {
        fn init(_config: &Value) -> std::result::Result<Self, PluginError> {
            Ok(Self)
        }
    }

    fn descriptor(options: Capabilities) -> Descriptor {
        Descriptor::new(
            "nop",
            "1.0.0",
            options,
            PLUGIN_TYPE_STORAGE,
            InterfaceVersion::new(1, 0),
        )
    }

    #[test]
    fn test_builtin_requires_claimed_entry_points() {
        let vtable = StorageVtable::new(
            PluginShim::<Nop>::init,
            PluginShim::<Nop>::shutdown,
            PluginShim::<Nop>::release,
        );

        let err = PluginModule::builtin(descriptor(Capabilities::COMMON), vtable).unwrap_err();
        assert!(matches!(
            err,
            Error::Load(LoadError::MissingEntryPoint { symbol, .. })
                if symbol == abi::COMMON_INSERT_SYMBOL
        ));
    }

    #[test]
    fn test_builtin_with_full_vtable() {
        let module = PluginModule::builtin(
            descriptor(Capabilities::COMMON | Capabilities::READINGS),
            StorageVtable::for_plugin::<Nop>(),
        )
        .unwrap();

        assert!(module.path().is_none());
        assert_eq!(module.descriptor().name, "nop");
    }

    #[test]
    fn test_builtin_rejects_unknown_type() {
        let descriptor = Descriptor::new(
            "filter",
            "1.0.0",
            Capabilities::empty(),
            "filter",
            InterfaceVersion::new(1, 0),
        );
        let err =
            PluginModule::builtin(descriptor, StorageVtable::for_plugin::<Nop>()).unwrap_err();
        assert!(matches!(
            err,
            Error::Incompatible(IncompatibilityError::UnsupportedType { found, .. })
                if found == "filter"
        ));
    }

    #[test]
    fn test_unclaimed_capabilities_need_no_entries() {
        let vtable = StorageVtable::new(
            PluginShim::<Nop>::init,
            PluginShim::<Nop>::shutdown,
            PluginShim::<Nop>::release,
        );
        assert!(PluginModule::builtin(descriptor(Capabilities::empty()), vtable).is_ok());
    }
}
