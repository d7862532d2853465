//! Entry-point symbols and function-pointer types.
//!
//! A compliant plugin binary exports the descriptor static plus the entry
//! points below. The host resolves every required symbol at load time and
//! fails fast when one is missing; capability-gated symbols are resolved
//! only when the corresponding bit is claimed.

use crate::error::RawError;

/// Static [`crate::descriptor::RawDescriptor`] every plugin must export.
pub const DESCRIPTOR_SYMBOL: &str = "edgehub_plugin_descriptor";

/// Handle-creation entry point ([`PluginInitFn`]).
pub const INIT_SYMBOL: &str = "edgehub_plugin_init";

/// Handle-destruction entry point ([`PluginShutdownFn`]).
pub const SHUTDOWN_SYMBOL: &str = "edgehub_plugin_shutdown";

/// Result-buffer release entry point ([`PluginReleaseFn`]).
pub const RELEASE_SYMBOL: &str = "edgehub_plugin_release";

/// Storage operations gated by [`crate::Capabilities::COMMON`].
pub const COMMON_INSERT_SYMBOL: &str = "edgehub_plugin_common_insert";
pub const COMMON_RETRIEVE_SYMBOL: &str = "edgehub_plugin_common_retrieve";
pub const COMMON_UPDATE_SYMBOL: &str = "edgehub_plugin_common_update";
pub const COMMON_DELETE_SYMBOL: &str = "edgehub_plugin_common_delete";

/// Storage operations gated by [`crate::Capabilities::READINGS`].
pub const READING_APPEND_SYMBOL: &str = "edgehub_plugin_reading_append";
pub const READING_FETCH_SYMBOL: &str = "edgehub_plugin_reading_fetch";
pub const READING_RETRIEVE_SYMBOL: &str = "edgehub_plugin_reading_retrieve";
pub const READING_PURGE_SYMBOL: &str = "edgehub_plugin_reading_purge";

/// Plugin-allocated result buffer.
///
/// The host parses the contents and hands the buffer back through the
/// release entry point before the call returns to its own caller.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawBuf {
    pub ptr: *mut u8,
    pub len: usize,
}

impl RawBuf {
    pub const fn empty() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ptr.is_null() || self.len == 0
    }
}

/// Creates a configured plugin instance.
///
/// `config`/`config_len` carry an opaque JSON configuration payload, or
/// null/0 when absent. Returns the opaque instance pointer, or null on
/// failure with `err` set to a plugin-owned error valid until the next
/// call.
pub type PluginInitFn =
    unsafe extern "C" fn(config: *const u8, config_len: usize, err: *mut *const RawError) -> *mut ();

/// Destroys a plugin instance and frees all its resources.
pub type PluginShutdownFn = unsafe extern "C" fn(instance: *mut ());

/// Releases a result buffer previously returned by a storage operation.
pub type PluginReleaseFn = unsafe extern "C" fn(instance: *mut (), buf: RawBuf);

/// Shape shared by every storage operation.
///
/// `payload` is a JSON request document. Returns 0 on success with `out`
/// set to a plugin-allocated JSON result; nonzero on failure with `err`
/// set to a plugin-owned error valid until the next call on the same
/// instance.
pub type StorageOpFn = unsafe extern "C" fn(
    instance: *mut (),
    payload: *const u8,
    payload_len: usize,
    out: *mut RawBuf,
    err: *mut *const RawError,
) -> i32;
