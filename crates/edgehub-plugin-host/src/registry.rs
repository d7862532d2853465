//! Plugin registry: module admission, handle lifecycle, guaranteed
//! release.
//!
//! The registry is the sole writer of the handle table. Modules whose
//! descriptor fails the compatibility check are never admitted, so no
//! handle can ever exist for an incompatible plugin.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use edgehub_plugin_api::error::RawError;
use edgehub_plugin_api::{Descriptor, InterfaceVersion, PluginError, PLUGIN_TYPE_STORAGE};

use crate::handle::{HandleEntry, HandleTable, InstanceState};
use crate::module::{PluginModule, StorageVtable};
use crate::storage::StorageConnection;
use crate::{Error, IncompatibilityError, Result};

/// Loads plugin modules, negotiates compatibility and tracks every live
/// instance handle.
pub struct PluginRegistry {
    host_interface: InterfaceVersion,
    modules: Mutex<Vec<Arc<PluginModule>>>,
    handles: Mutex<HandleTable>,
}

impl PluginRegistry {
    /// Registry speaking the interface version this host was built for.
    pub fn new() -> Self {
        Self::with_interface(InterfaceVersion::current())
    }

    /// Registry with an explicit host interface version.
    pub fn with_interface(host_interface: InterfaceVersion) -> Self {
        Self {
            host_interface,
            modules: Mutex::new(Vec::new()),
            handles: Mutex::new(HandleTable::new()),
        }
    }

    pub fn host_interface(&self) -> InterfaceVersion {
        self.host_interface
    }

    /// Pure compatibility check between a descriptor and this host.
    pub fn interface_compatible(&self, descriptor: &Descriptor) -> bool {
        descriptor.interface.is_supported_by(&self.host_interface)
    }

    /// Load a plugin module from a dynamic library and admit it.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Arc<PluginModule>> {
        self.admit(PluginModule::load(path)?)
    }

    /// Admit an in-process plugin module.
    pub fn register_builtin(
        &self,
        descriptor: Descriptor,
        vtable: StorageVtable,
    ) -> Result<Arc<PluginModule>> {
        self.admit(PluginModule::builtin(descriptor, vtable)?)
    }

    fn admit(&self, module: PluginModule) -> Result<Arc<PluginModule>> {
        let descriptor = module.descriptor();
        if !self.interface_compatible(descriptor) {
            return Err(IncompatibilityError::Interface {
                plugin: descriptor.name.clone(),
                plugin_interface: descriptor.interface,
                host_interface: self.host_interface,
            }
            .into());
        }

        let module = Arc::new(module);
        self.modules.lock().push(Arc::clone(&module));
        tracing::info!(plugin = %module.descriptor(), "plugin module admitted");
        Ok(module)
    }

    /// All admitted modules.
    pub fn modules(&self) -> Vec<Arc<PluginModule>> {
        self.modules.lock().clone()
    }

    /// Create a configured plugin instance and register its handle.
    ///
    /// `config` is an opaque, plugin-specific payload; pass `None` when
    /// the plugin needs none. On failure the error is propagated with no
    /// handle left registered; handle-creation failures are non-retryable
    /// unless the plugin explicitly marked them otherwise.
    pub fn create_handle(
        &self,
        module: &Arc<PluginModule>,
        config: Option<&Value>,
    ) -> Result<crate::PluginHandle> {
        let descriptor = module.descriptor();
        if !self.interface_compatible(descriptor) {
            return Err(IncompatibilityError::Interface {
                plugin: descriptor.name.clone(),
                plugin_interface: descriptor.interface,
                host_interface: self.host_interface,
            }
            .into());
        }

        let config_bytes = config.map(serde_json::to_vec).transpose()?;
        let (ptr, len) = match &config_bytes {
            Some(bytes) => (bytes.as_ptr(), bytes.len()),
            None => (std::ptr::null(), 0),
        };

        let mut raw_err: *const RawError = std::ptr::null();
        let instance = unsafe { (module.vtable().init)(ptr, len, &mut raw_err) };

        if instance.is_null() {
            // Copy the error out of plugin storage before anything else
            // can touch it.
            let error = if raw_err.is_null() {
                PluginError::new("init", "plugin init returned no instance")
            } else {
                unsafe { PluginError::from_raw(&*raw_err) }
            };
            tracing::warn!(plugin = %descriptor.name, %error, "handle creation failed");
            return Err(Error::Plugin(error));
        }

        let entry = Arc::new(HandleEntry {
            module: Arc::clone(module),
            state: Mutex::new(InstanceState { instance }),
        });
        let handle = self.handles.lock().insert(entry);
        tracing::info!(plugin = %descriptor.name, ?handle, "plugin handle created");
        Ok(handle)
    }

    /// Create a handle whose destruction is guaranteed by a guard.
    pub fn create_scoped(
        &self,
        module: &Arc<PluginModule>,
        config: Option<&Value>,
    ) -> Result<HandleGuard<'_>> {
        let handle = self.create_handle(module, config)?;
        Ok(HandleGuard {
            registry: self,
            handle,
        })
    }

    /// Destroy a handle, invoking the plugin's shutdown entry point.
    ///
    /// Idempotent: destroying an already-destroyed or unknown handle is a
    /// no-op and cannot corrupt the table.
    pub fn destroy_handle(&self, handle: crate::PluginHandle) {
        let entry = self.handles.lock().take(handle);
        let Some(entry) = entry else {
            tracing::debug!(?handle, "destroy of stale handle ignored");
            return;
        };

        // Waits for any in-flight call on this handle to finish.
        let mut state = entry.state.lock();
        if !state.instance.is_null() {
            unsafe { (entry.module.vtable().shutdown)(state.instance) };
            state.instance = std::ptr::null_mut();
        }
        tracing::info!(plugin = %entry.module.descriptor().name, ?handle, "plugin handle destroyed");
    }

    /// Storage call surface for a live handle.
    ///
    /// Fails with [`Error::StaleHandle`] when the handle was destroyed,
    /// and with an unsupported-type incompatibility when the module is not
    /// a storage plugin.
    pub fn storage(&self, handle: crate::PluginHandle) -> Result<StorageConnection> {
        let entry = self.handles.lock().get(handle).ok_or(Error::StaleHandle)?;
        let descriptor = entry.module.descriptor();
        if descriptor.plugin_type != PLUGIN_TYPE_STORAGE {
            return Err(IncompatibilityError::UnsupportedType {
                plugin: descriptor.name.clone(),
                found: descriptor.plugin_type.clone(),
            }
            .into());
        }
        Ok(StorageConnection::new(entry))
    }

    /// Number of live handles.
    pub fn live_handles(&self) -> usize {
        self.handles.lock().len()
    }

    /// Shut down every live handle. Returns how many were shut down.
    pub fn shutdown_all(&self) -> usize {
        let drained = self.handles.lock().drain();
        let count = drained.len();
        for entry in drained {
            let mut state = entry.state.lock();
            if !state.instance.is_null() {
                unsafe { (entry.module.vtable().shutdown)(state.instance) };
                state.instance = std::ptr::null_mut();
            }
        }
        if count > 0 {
            tracing::info!(count, "shut down remaining plugin handles");
        }
        count
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

/// RAII guard destroying its handle when dropped, so a handle acquired on
/// a failure path is still released.
pub struct HandleGuard<'a> {
    registry: &'a PluginRegistry,
    handle: crate::PluginHandle,
}

impl HandleGuard<'_> {
    pub fn handle(&self) -> crate::PluginHandle {
        self.handle
    }

    pub fn storage(&self) -> Result<StorageConnection> {
        self.registry.storage(self.handle)
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        self.registry.destroy_handle(self.handle);
    }
}
