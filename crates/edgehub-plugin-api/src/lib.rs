//! EdgeHub plugin ABI.
//!
//! This crate defines the boundary between the EdgeHub host and
//! independently-compiled backend plugins: the descriptor a plugin exposes
//! before any instance exists, the capability bit layout, the structured
//! error channel, and the entry points a compliant plugin binary must
//! export. It is shared by both sides of the boundary: the host resolves
//! these symbols and types, while plugin authors implement
//! [`StoragePlugin`] and export the entry points with
//! [`export_storage_plugin!`].
//!
//! # Quick start (plugin side)
//!
//! ```rust,ignore
//! use edgehub_plugin_api::prelude::*;
//!
//! struct SqlitePlugin { /* ... */ }
//!
//! impl StoragePlugin for SqlitePlugin {
//!     fn init(config: &Value) -> Result<Self, PluginError> {
//!         // open the database described by `config`
//!         # unimplemented!()
//!     }
//! }
//!
//! export_storage_plugin! {
//!     plugin: SqlitePlugin,
//!     name: "sqlite",
//!     version: "1.0.0",
//!     capabilities: Capabilities::COMMON.union(Capabilities::READINGS),
//! }
//! ```

pub mod abi;
pub mod capabilities;
pub mod descriptor;
pub mod error;
pub mod macros;
pub mod shim;

pub use abi::{PluginInitFn, PluginReleaseFn, PluginShutdownFn, RawBuf, StorageOpFn};
pub use capabilities::Capabilities;
pub use descriptor::{
    Descriptor, DescriptorError, InterfaceVersion, RawDescriptor, PLUGIN_INTERFACE_VERSION,
    PLUGIN_TYPE_STORAGE,
};
pub use error::{PluginError, RawError};
pub use shim::{PluginShim, StoragePlugin};

/// Prelude module with the imports a plugin author needs.
pub mod prelude {
    pub use crate::capabilities::Capabilities;
    pub use crate::descriptor::{Descriptor, InterfaceVersion, PLUGIN_TYPE_STORAGE};
    pub use crate::error::PluginError;
    pub use crate::export_storage_plugin;
    pub use crate::shim::StoragePlugin;
    pub use serde_json::Value;
}
