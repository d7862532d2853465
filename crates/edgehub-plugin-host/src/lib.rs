//! Host-side plugin loader for the EdgeHub plugin ABI.
//!
//! This crate loads independently-compiled plugin modules, reads their
//! descriptors, negotiates capabilities, and mediates every call through
//! opaque instance handles:
//!
//! - [`PluginModule`] resolves a module's descriptor and call table, either
//!   from a dynamic library or from an in-process (builtin) plugin.
//! - [`PluginRegistry`] admits compatible modules, creates and tracks
//!   handles, and guarantees shutdown for every handle it created.
//! - [`StorageConnection`] dispatches storage operations for a handle,
//!   copying plugin errors out of borrowed storage at the call boundary.
//! - [`RetryPolicy`] centralizes the host's reaction to retryable errors.
//!
//! The ABI is synchronous: a plugin call either returns a result or a
//! [`PluginError`] before the calling context proceeds. Two distinct
//! handles may be driven concurrently; calls against the same handle are
//! serialized by the host.

pub mod handle;
pub mod module;
pub mod registry;
pub mod retry;
pub mod storage;

pub use edgehub_plugin_api::{
    Capabilities, Descriptor, DescriptorError, InterfaceVersion, PluginError,
    PLUGIN_INTERFACE_VERSION, PLUGIN_TYPE_STORAGE,
};
pub use handle::PluginHandle;
pub use module::{PluginModule, StorageVtable};
pub use registry::{HandleGuard, PluginRegistry};
pub use retry::RetryPolicy;
pub use storage::{StorageConnection, StorageOp};

/// Result type for host-side plugin operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Module loading failures: the module cannot be located or does not
/// expose the required entry points. Always fatal to that load attempt,
/// never retryable, and distinct from a later interface mismatch.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Module file does not exist.
    #[error("plugin module not found: {0}")]
    NotFound(String),

    /// Path exists but is not a loadable plugin file.
    #[error("invalid plugin file {path}: {reason}")]
    InvalidFile { path: String, reason: String },

    /// The dynamic library could not be opened.
    #[error("failed to open plugin module {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: libloading::Error,
    },

    /// A required entry point is missing from the module.
    #[error("plugin module '{module}' is missing required entry point '{symbol}'")]
    MissingEntryPoint {
        module: String,
        symbol: &'static str,
    },

    /// The exported descriptor is malformed.
    #[error("invalid plugin descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// Descriptor-level incompatibilities, surfaced before any handle exists.
#[derive(Debug, thiserror::Error)]
pub enum IncompatibilityError {
    /// The plugin was built against an interface version the host does not
    /// support.
    #[error(
        "plugin '{plugin}' was built against interface {plugin_interface}, \
         host supports interface {host_interface}"
    )]
    Interface {
        plugin: String,
        plugin_interface: InterfaceVersion,
        host_interface: InterfaceVersion,
    },

    /// The plugin's type tag does not match a call-table shape the host
    /// implements.
    #[error("plugin '{plugin}' has unsupported type '{found}'")]
    UnsupportedType { plugin: String, found: String },
}

/// Host-side plugin error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Module loading failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Descriptor rejected before any handle was created.
    #[error(transparent)]
    Incompatible(#[from] IncompatibilityError),

    /// Operational failure reported by the plugin, ownership already
    /// copied out of plugin storage. The retry decision belongs to the
    /// caller's policy layer (see [`RetryPolicy`]).
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// The handle was destroyed or never existed.
    #[error("stale plugin handle")]
    StaleHandle,

    /// Host-side JSON serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
