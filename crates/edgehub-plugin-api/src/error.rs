//! Structured error channel.
//!
//! Every fallible cross-boundary call reports failure through the same
//! shape: a message, the entry point that failed, and a retry
//! classification. The raw form is plugin-owned and borrowed for the
//! duration of the call only; the host copies it into the owned form
//! before returning.

/// Raw error payload produced by a plugin.
///
/// Storage lifetime is not guaranteed beyond the call boundary: the payload
/// stays valid only until the next call on the same instance (for init
/// failures, until the next init call on the same thread).
#[repr(C)]
pub struct RawError {
    /// Human-readable diagnostic text.
    pub message: *const u8,
    pub message_len: usize,

    /// Name of the API operation that failed.
    pub entry_point: *const u8,
    pub entry_point_len: usize,

    /// True when the identical call may be safely reattempted.
    pub retryable: bool,
}

impl RawError {
    pub const fn empty() -> Self {
        Self {
            message: std::ptr::null(),
            message_len: 0,
            entry_point: std::ptr::null(),
            entry_point_len: 0,
            retryable: false,
        }
    }
}

/// Owned plugin error, copied out of plugin storage at the call boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("plugin operation '{entry_point}' failed: {message}")]
pub struct PluginError {
    /// Human-readable diagnostic text.
    pub message: String,

    /// Name of the API operation that failed, so the caller can attribute
    /// the failure without stack inspection across the module boundary.
    pub entry_point: String,

    /// Retry classification. `true` means the failure is transient and the
    /// identical call may be reattempted without duplicating side effects;
    /// the plugin must uphold at-most-once semantics for such operations.
    pub retryable: bool,
}

impl PluginError {
    /// New non-retryable error. Handle-creation failures default to this
    /// unless the plugin explicitly marks them retryable.
    pub fn new(entry_point: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            entry_point: entry_point.into(),
            retryable: false,
        }
    }

    /// Mark the error as safely retryable.
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// Standard error for an entry point the plugin does not implement.
    pub fn unsupported(entry_point: &str) -> Self {
        Self::new(entry_point, "entry point not supported")
    }

    /// Copy a raw error out of plugin-owned storage.
    ///
    /// # Safety
    /// The raw error's pointer/length pairs must reference valid memory for
    /// the duration of the call.
    pub unsafe fn from_raw(raw: &RawError) -> Self {
        let extract = |ptr: *const u8, len: usize| {
            if ptr.is_null() || len == 0 {
                return String::new();
            }
            let slice = unsafe { std::slice::from_raw_parts(ptr, len) };
            String::from_utf8_lossy(slice).into_owned()
        };

        Self {
            message: extract(raw.message, raw.message_len),
            entry_point: extract(raw.entry_point, raw.entry_point_len),
            retryable: raw.retryable,
        }
    }
}
