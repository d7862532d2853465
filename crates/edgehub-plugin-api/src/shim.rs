//! FFI shim between the C entry points and a Rust [`StoragePlugin`].
//!
//! [`PluginShim`] provides one `extern "C"` function per entry point,
//! handling instance boxing, JSON (de)serialization, result-buffer
//! allocation and last-error storage. [`crate::export_storage_plugin!`]
//! wraps these in `#[no_mangle]` exports; the host can also call them
//! directly for in-process (builtin) plugins.

use std::cell::RefCell;
use std::marker::PhantomData;

use serde_json::Value;

use crate::abi::RawBuf;
use crate::error::{PluginError, RawError};

/// Storage plugin implementation, written by plugin authors.
///
/// Operation methods default to a non-retryable "not supported" error, so
/// a plugin implements only the operations behind the capability bits it
/// claims in its descriptor. A plugin must never claim a bit whose
/// operations it leaves unimplemented.
///
/// Retryable errors carry a contract: the plugin must guarantee that a
/// failed call reported as retryable left no partial side effect a retry
/// would duplicate.
pub trait StoragePlugin: Send + Sized + 'static {
    /// Create a configured instance. The config payload is plugin-specific
    /// and opaque to the host.
    fn init(config: &Value) -> Result<Self, PluginError>;

    /// Release resources before the instance is dropped.
    fn shutdown(&mut self) {}

    fn common_insert(&mut self, payload: &Value) -> Result<Value, PluginError> {
        let _ = payload;
        Err(PluginError::unsupported("common_insert"))
    }

    fn common_retrieve(&mut self, payload: &Value) -> Result<Value, PluginError> {
        let _ = payload;
        Err(PluginError::unsupported("common_retrieve"))
    }

    fn common_update(&mut self, payload: &Value) -> Result<Value, PluginError> {
        let _ = payload;
        Err(PluginError::unsupported("common_update"))
    }

    fn common_delete(&mut self, payload: &Value) -> Result<Value, PluginError> {
        let _ = payload;
        Err(PluginError::unsupported("common_delete"))
    }

    fn reading_append(&mut self, payload: &Value) -> Result<Value, PluginError> {
        let _ = payload;
        Err(PluginError::unsupported("reading_append"))
    }

    fn reading_fetch(&mut self, payload: &Value) -> Result<Value, PluginError> {
        let _ = payload;
        Err(PluginError::unsupported("reading_fetch"))
    }

    fn reading_retrieve(&mut self, payload: &Value) -> Result<Value, PluginError> {
        let _ = payload;
        Err(PluginError::unsupported("reading_retrieve"))
    }

    fn reading_purge(&mut self, payload: &Value) -> Result<Value, PluginError> {
        let _ = payload;
        Err(PluginError::unsupported("reading_purge"))
    }
}

/// Error storage with a stable address, so the raw view stays valid until
/// the next call replaces it.
struct ErrorSlot {
    message: String,
    entry_point: String,
    raw: RawError,
}

impl ErrorSlot {
    fn store(err: PluginError) -> Box<ErrorSlot> {
        let PluginError {
            message,
            entry_point,
            retryable,
        } = err;
        let mut slot = Box::new(ErrorSlot {
            message,
            entry_point,
            raw: RawError::empty(),
        });
        let raw = RawError {
            message: slot.message.as_ptr(),
            message_len: slot.message.len(),
            entry_point: slot.entry_point.as_ptr(),
            entry_point_len: slot.entry_point.len(),
            retryable,
        };
        slot.raw = raw;
        slot
    }
}

thread_local! {
    // Init failures have no instance to hang error storage off; the slot
    // stays valid until the next init call on the same thread.
    static INIT_ERROR: RefCell<Option<Box<ErrorSlot>>> = const { RefCell::new(None) };
}

/// Boxed instance state behind the opaque pointer handed to the host.
struct Instance<P> {
    plugin: P,
    last_error: Option<Box<ErrorSlot>>,
}

/// Generic entry-point implementations over a [`StoragePlugin`].
pub struct PluginShim<P: StoragePlugin>(PhantomData<P>);

impl<P: StoragePlugin> PluginShim<P> {
    /// Handle-creation entry point.
    ///
    /// # Safety
    /// `config` must reference `config_len` valid bytes (or be null), and
    /// `err` must be null or a valid out-pointer.
    pub unsafe extern "C" fn init(
        config: *const u8,
        config_len: usize,
        err: *mut *const RawError,
    ) -> *mut () {
        let config = if config.is_null() || config_len == 0 {
            Value::Null
        } else {
            let bytes = unsafe { std::slice::from_raw_parts(config, config_len) };
            match serde_json::from_slice(bytes) {
                Ok(value) => value,
                Err(e) => {
                    let error = PluginError::new("init", format!("invalid config: {e}"));
                    return unsafe { Self::init_fail(error, err) };
                }
            }
        };

        match P::init(&config) {
            Ok(plugin) => Box::into_raw(Box::new(Instance::<P> {
                plugin,
                last_error: None,
            })) as *mut (),
            Err(error) => unsafe { Self::init_fail(error, err) },
        }
    }

    unsafe fn init_fail(error: PluginError, err: *mut *const RawError) -> *mut () {
        let slot = ErrorSlot::store(error);
        let raw = &slot.raw as *const RawError;
        INIT_ERROR.with(|cell| *cell.borrow_mut() = Some(slot));
        if !err.is_null() {
            unsafe { *err = raw };
        }
        std::ptr::null_mut()
    }

    /// Handle-destruction entry point.
    ///
    /// # Safety
    /// `instance` must be null or a pointer previously returned by
    /// [`Self::init`], not destroyed yet.
    pub unsafe extern "C" fn shutdown(instance: *mut ()) {
        if instance.is_null() {
            return;
        }
        let mut instance = unsafe { Box::from_raw(instance as *mut Instance<P>) };
        instance.plugin.shutdown();
    }

    /// Result-buffer release entry point.
    ///
    /// # Safety
    /// `buf` must have been produced by an operation on this shim and not
    /// released yet.
    pub unsafe extern "C" fn release(instance: *mut (), buf: RawBuf) {
        let _ = instance;
        if buf.is_empty() {
            return;
        }
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                buf.ptr, buf.len,
            )));
        }
    }

    unsafe fn op(
        instance: *mut (),
        payload: *const u8,
        payload_len: usize,
        out: *mut RawBuf,
        err: *mut *const RawError,
        entry_point: &str,
        f: impl FnOnce(&mut P, &Value) -> Result<Value, PluginError>,
    ) -> i32 {
        let Some(instance) = (unsafe { (instance as *mut Instance<P>).as_mut() }) else {
            return -1;
        };
        instance.last_error = None;

        let payload = if payload.is_null() || payload_len == 0 {
            Value::Null
        } else {
            let bytes = unsafe { std::slice::from_raw_parts(payload, payload_len) };
            match serde_json::from_slice(bytes) {
                Ok(value) => value,
                Err(e) => {
                    let error = PluginError::new(entry_point, format!("invalid payload: {e}"));
                    return unsafe { Self::fail(instance, error, err) };
                }
            }
        };

        let result = match f(&mut instance.plugin, &payload) {
            Ok(result) => result,
            Err(error) => return unsafe { Self::fail(instance, error, err) },
        };

        let bytes = match serde_json::to_vec(&result) {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = PluginError::new(entry_point, format!("result serialization: {e}"));
                return unsafe { Self::fail(instance, error, err) };
            }
        };
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        let ptr = Box::into_raw(boxed) as *mut u8;
        if !out.is_null() {
            unsafe { *out = RawBuf { ptr, len } };
        }
        0
    }

    unsafe fn fail(instance: &mut Instance<P>, error: PluginError, err: *mut *const RawError) -> i32 {
        let slot = ErrorSlot::store(error);
        if !err.is_null() {
            unsafe { *err = &slot.raw };
        }
        instance.last_error = Some(slot);
        -1
    }
}

macro_rules! storage_op_shims {
    ($($fn_name:ident => $method:ident),* $(,)?) => {
        impl<P: StoragePlugin> PluginShim<P> {
            $(
                /// Storage operation entry point.
                ///
                /// # Safety
                /// `instance` must be a live pointer from [`Self::init`];
                /// `payload` must reference `payload_len` valid bytes (or
                /// be null); `out` and `err` must be null or valid
                /// out-pointers.
                pub unsafe extern "C" fn $fn_name(
                    instance: *mut (),
                    payload: *const u8,
                    payload_len: usize,
                    out: *mut RawBuf,
                    err: *mut *const RawError,
                ) -> i32 {
                    unsafe {
                        Self::op(
                            instance,
                            payload,
                            payload_len,
                            out,
                            err,
                            stringify!($method),
                            P::$method,
                        )
                    }
                }
            )*
        }
    };
}

storage_op_shims! {
    common_insert => common_insert,
    common_retrieve => common_retrieve,
    common_update => common_update,
    common_delete => common_delete,
    reading_append => reading_append,
    reading_fetch => reading_fetch,
    reading_retrieve => reading_retrieve,
    reading_purge => reading_purge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo {
        tag: String,
    }

    impl StoragePlugin for Echo {
        fn init(config: &Value) -> Result<Self, PluginError> {
            match config.get("tag").and_then(Value::as_str) {
                Some(tag) => Ok(Self {
                    tag: tag.to_string(),
                }),
                None => Err(PluginError::new("init", "invalid config")),
            }
        }

        fn common_insert(&mut self, payload: &Value) -> Result<Value, PluginError> {
            Ok(json!({ "tag": self.tag, "payload": payload }))
        }
    }

    #[test]
    fn test_init_and_insert_round_trip() {
        let config = serde_json::to_vec(&json!({ "tag": "t1" })).unwrap();
        let mut err: *const RawError = std::ptr::null();
        let instance =
            unsafe { PluginShim::<Echo>::init(config.as_ptr(), config.len(), &mut err) };
        assert!(!instance.is_null());

        let payload = serde_json::to_vec(&json!({ "k": 1 })).unwrap();
        let mut out = RawBuf::empty();
        let rc = unsafe {
            PluginShim::<Echo>::common_insert(
                instance,
                payload.as_ptr(),
                payload.len(),
                &mut out,
                &mut err,
            )
        };
        assert_eq!(rc, 0);
        assert!(!out.is_empty());

        let bytes = unsafe { std::slice::from_raw_parts(out.ptr, out.len) };
        let result: Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(result, json!({ "tag": "t1", "payload": { "k": 1 } }));

        unsafe {
            PluginShim::<Echo>::release(instance, out);
            PluginShim::<Echo>::shutdown(instance);
        }
    }

    #[test]
    fn test_init_failure_reports_error() {
        let config = serde_json::to_vec(&json!({})).unwrap();
        let mut err: *const RawError = std::ptr::null();
        let instance =
            unsafe { PluginShim::<Echo>::init(config.as_ptr(), config.len(), &mut err) };
        assert!(instance.is_null());
        assert!(!err.is_null());

        let owned = unsafe { PluginError::from_raw(&*err) };
        assert_eq!(owned.entry_point, "init");
        assert_eq!(owned.message, "invalid config");
        assert!(!owned.retryable);
    }

    #[test]
    fn test_unimplemented_op_reports_unsupported() {
        let config = serde_json::to_vec(&json!({ "tag": "t2" })).unwrap();
        let mut err: *const RawError = std::ptr::null();
        let instance =
            unsafe { PluginShim::<Echo>::init(config.as_ptr(), config.len(), &mut err) };
        assert!(!instance.is_null());

        let mut out = RawBuf::empty();
        let rc = unsafe {
            PluginShim::<Echo>::reading_purge(instance, std::ptr::null(), 0, &mut out, &mut err)
        };
        assert_eq!(rc, -1);
        let owned = unsafe { PluginError::from_raw(&*err) };
        assert_eq!(owned.entry_point, "reading_purge");

        unsafe { PluginShim::<Echo>::shutdown(instance) };
    }
}
