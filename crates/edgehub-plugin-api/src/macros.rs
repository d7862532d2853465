//! Exports for plugin binaries.

/// Emit the `#[no_mangle]` descriptor static and every entry-point symbol
/// for a [`crate::StoragePlugin`] implementation.
///
/// `name` and `version` must be string literals (the descriptor static
/// points into them); `capabilities` must be a const expression. The
/// descriptor advertises [`crate::PLUGIN_TYPE_STORAGE`] and the interface
/// version this SDK was built for.
///
/// # Example
///
/// ```rust,ignore
/// export_storage_plugin! {
///     plugin: SqlitePlugin,
///     name: "sqlite",
///     version: "1.0.0",
///     capabilities: Capabilities::COMMON.union(Capabilities::READINGS),
/// }
/// ```
#[macro_export]
macro_rules! export_storage_plugin {
    (
        plugin: $ty:ty,
        name: $name:expr,
        version: $version:expr,
        capabilities: $caps:expr $(,)?
    ) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static edgehub_plugin_descriptor: $crate::descriptor::RawDescriptor =
            $crate::descriptor::RawDescriptor {
                name: $name.as_ptr(),
                name_len: $name.len(),
                version: $version.as_ptr(),
                version_len: $version.len(),
                options: ($caps).bits(),
                plugin_type: $crate::descriptor::PLUGIN_TYPE_STORAGE.as_ptr(),
                plugin_type_len: $crate::descriptor::PLUGIN_TYPE_STORAGE.len(),
                interface: $crate::descriptor::PLUGIN_INTERFACE_VERSION.as_ptr(),
                interface_len: $crate::descriptor::PLUGIN_INTERFACE_VERSION.len(),
            };

        #[no_mangle]
        pub unsafe extern "C" fn edgehub_plugin_init(
            config: *const u8,
            config_len: usize,
            err: *mut *const $crate::error::RawError,
        ) -> *mut () {
            unsafe { $crate::shim::PluginShim::<$ty>::init(config, config_len, err) }
        }

        #[no_mangle]
        pub unsafe extern "C" fn edgehub_plugin_shutdown(instance: *mut ()) {
            unsafe { $crate::shim::PluginShim::<$ty>::shutdown(instance) }
        }

        #[no_mangle]
        pub unsafe extern "C" fn edgehub_plugin_release(
            instance: *mut (),
            buf: $crate::abi::RawBuf,
        ) {
            unsafe { $crate::shim::PluginShim::<$ty>::release(instance, buf) }
        }

        $crate::__export_storage_op!($ty, edgehub_plugin_common_insert, common_insert);
        $crate::__export_storage_op!($ty, edgehub_plugin_common_retrieve, common_retrieve);
        $crate::__export_storage_op!($ty, edgehub_plugin_common_update, common_update);
        $crate::__export_storage_op!($ty, edgehub_plugin_common_delete, common_delete);
        $crate::__export_storage_op!($ty, edgehub_plugin_reading_append, reading_append);
        $crate::__export_storage_op!($ty, edgehub_plugin_reading_fetch, reading_fetch);
        $crate::__export_storage_op!($ty, edgehub_plugin_reading_retrieve, reading_retrieve);
        $crate::__export_storage_op!($ty, edgehub_plugin_reading_purge, reading_purge);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __export_storage_op {
    ($ty:ty, $symbol:ident, $method:ident) => {
        #[no_mangle]
        pub unsafe extern "C" fn $symbol(
            instance: *mut (),
            payload: *const u8,
            payload_len: usize,
            out: *mut $crate::abi::RawBuf,
            err: *mut *const $crate::error::RawError,
        ) -> i32 {
            unsafe {
                $crate::shim::PluginShim::<$ty>::$method(instance, payload, payload_len, out, err)
            }
        }
    };
}
