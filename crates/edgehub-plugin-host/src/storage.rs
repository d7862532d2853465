//! Storage operation dispatch.
//!
//! Routes the generic handle lifecycle to the storage call table. The
//! capability gate runs before anything crosses the boundary: invoking an
//! operation behind a bit the plugin did not claim is a host programming
//! error and asserts, it is never surfaced as a plugin failure.

use std::sync::Arc;

use serde_json::{json, Value};

use edgehub_plugin_api::abi::{RawBuf, StorageOpFn};
use edgehub_plugin_api::error::RawError;
use edgehub_plugin_api::{Capabilities, Descriptor, PluginError};

use crate::handle::HandleEntry;
use crate::module::StorageVtable;
use crate::{Error, Result};

/// Storage operations defined by the `"storage"` call-table shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    CommonInsert,
    CommonRetrieve,
    CommonUpdate,
    CommonDelete,
    ReadingAppend,
    ReadingFetch,
    ReadingRetrieve,
    ReadingPurge,
}

impl StorageOp {
    /// Entry-point name used for error attribution.
    pub fn entry_point(&self) -> &'static str {
        match self {
            Self::CommonInsert => "common_insert",
            Self::CommonRetrieve => "common_retrieve",
            Self::CommonUpdate => "common_update",
            Self::CommonDelete => "common_delete",
            Self::ReadingAppend => "reading_append",
            Self::ReadingFetch => "reading_fetch",
            Self::ReadingRetrieve => "reading_retrieve",
            Self::ReadingPurge => "reading_purge",
        }
    }

    /// Capability bit gating this operation.
    pub fn capability(&self) -> Capabilities {
        match self {
            Self::CommonInsert | Self::CommonRetrieve | Self::CommonUpdate | Self::CommonDelete => {
                Capabilities::COMMON
            }
            Self::ReadingAppend
            | Self::ReadingFetch
            | Self::ReadingRetrieve
            | Self::ReadingPurge => Capabilities::READINGS,
        }
    }

    fn resolve(&self, vtable: &StorageVtable) -> Option<StorageOpFn> {
        match self {
            Self::CommonInsert => vtable.common_insert,
            Self::CommonRetrieve => vtable.common_retrieve,
            Self::CommonUpdate => vtable.common_update,
            Self::CommonDelete => vtable.common_delete,
            Self::ReadingAppend => vtable.reading_append,
            Self::ReadingFetch => vtable.reading_fetch,
            Self::ReadingRetrieve => vtable.reading_retrieve,
            Self::ReadingPurge => vtable.reading_purge,
        }
    }
}

/// Storage call surface bound to one live handle.
///
/// Calls against the same handle are serialized internally; a connection
/// held across a destroy observes [`Error::StaleHandle`] on its next call.
pub struct StorageConnection {
    entry: Arc<HandleEntry>,
}

impl StorageConnection {
    pub(crate) fn new(entry: Arc<HandleEntry>) -> Self {
        Self { entry }
    }

    pub fn descriptor(&self) -> &Descriptor {
        self.entry.module.descriptor()
    }

    /// Invoke one storage operation with a raw JSON payload.
    pub fn call(&self, op: StorageOp, payload: &Value) -> Result<Value> {
        let descriptor = self.entry.module.descriptor();
        assert!(
            descriptor.supports(op.capability()),
            "host bug: operation '{}' requires capability {:?}, which plugin '{}' did not claim",
            op.entry_point(),
            op.capability(),
            descriptor.name,
        );
        // Admission checks every claimed capability against the call
        // table, so the entry must be present here.
        let f = op
            .resolve(self.entry.module.vtable())
            .expect("claimed capability resolved at load time");

        let payload_bytes = serde_json::to_vec(payload)?;

        let mut state = self.entry.state.lock();
        if state.instance.is_null() {
            return Err(Error::StaleHandle);
        }

        let mut out = RawBuf::empty();
        let mut raw_err: *const RawError = std::ptr::null();
        let rc = unsafe {
            f(
                state.instance,
                payload_bytes.as_ptr(),
                payload_bytes.len(),
                &mut out,
                &mut raw_err,
            )
        };

        if rc != 0 {
            // The raw payload is only borrowed for the duration of this
            // call; copy it out before returning.
            let error = if raw_err.is_null() {
                PluginError::new(op.entry_point(), format!("operation failed with status {rc}"))
            } else {
                unsafe { PluginError::from_raw(&*raw_err) }
            };
            tracing::debug!(plugin = %descriptor.name, %error, "storage operation failed");
            return Err(Error::Plugin(error));
        }

        if out.is_empty() {
            return Ok(Value::Null);
        }
        let bytes = unsafe { std::slice::from_raw_parts(out.ptr, out.len) };
        let parsed = serde_json::from_slice(bytes);
        // Hand the buffer back before surfacing any parse error.
        unsafe { (self.entry.module.vtable().release)(state.instance, out) };
        Ok(parsed?)
    }

    /// Insert rows into a common table.
    pub fn insert(&self, table: &str, values: &Value) -> Result<Value> {
        self.call(
            StorageOp::CommonInsert,
            &json!({ "table": table, "values": values }),
        )
    }

    /// Retrieve rows from a common table, optionally filtered by a query
    /// document.
    pub fn retrieve(&self, table: &str, query: Option<&Value>) -> Result<Value> {
        let mut payload = json!({ "table": table });
        if let Some(query) = query {
            payload["query"] = query.clone();
        }
        self.call(StorageOp::CommonRetrieve, &payload)
    }

    /// Update rows in a common table.
    pub fn update(&self, table: &str, updates: &Value) -> Result<Value> {
        self.call(
            StorageOp::CommonUpdate,
            &json!({ "table": table, "updates": updates }),
        )
    }

    /// Delete rows from a common table matching a condition.
    pub fn delete_rows(&self, table: &str, condition: &Value) -> Result<Value> {
        self.call(
            StorageOp::CommonDelete,
            &json!({ "table": table, "condition": condition }),
        )
    }

    /// Append a block of readings.
    pub fn append_readings(&self, readings: &Value) -> Result<Value> {
        self.call(StorageOp::ReadingAppend, &json!({ "readings": readings }))
    }

    /// Fetch up to `count` readings starting at `first_id`.
    pub fn fetch_readings(&self, first_id: u64, count: u64) -> Result<Value> {
        self.call(
            StorageOp::ReadingFetch,
            &json!({ "id": first_id, "count": count }),
        )
    }

    /// Retrieve readings matching a query document.
    pub fn retrieve_readings(&self, query: Option<&Value>) -> Result<Value> {
        let payload = match query {
            Some(query) => json!({ "query": query }),
            None => Value::Null,
        };
        self.call(StorageOp::ReadingRetrieve, &payload)
    }

    /// Purge readings older than `max_age_hours`, keeping unsent rows
    /// newer than `sent_id`. `flags` selects the plugin's purge strategy,
    /// e.g. `"purge"` or `"retain"`.
    pub fn purge_readings(
        &self,
        max_age_hours: u64,
        sent_id: u64,
        flags: Option<&str>,
    ) -> Result<Value> {
        let mut payload = json!({ "age": max_age_hours, "sent": sent_id });
        if let Some(flags) = flags {
            payload["flags"] = flags.into();
        }
        self.call(StorageOp::ReadingPurge, &payload)
    }
}
