//! Exercises the exported symbols a plugin binary would carry.

use edgehub_plugin_api::prelude::*;
use edgehub_plugin_api::{Descriptor, RawBuf, RawError};
use serde_json::json;

struct CounterPlugin {
    count: u64,
}

impl StoragePlugin for CounterPlugin {
    fn init(config: &Value) -> Result<Self, PluginError> {
        let count = config.get("start").and_then(Value::as_u64).unwrap_or(0);
        Ok(Self { count })
    }

    fn common_insert(&mut self, _payload: &Value) -> Result<Value, PluginError> {
        self.count += 1;
        Ok(json!({ "count": self.count }))
    }
}

export_storage_plugin! {
    plugin: CounterPlugin,
    name: "counter",
    version: "0.2.0",
    capabilities: Capabilities::COMMON,
}

#[test]
fn test_exported_descriptor_parses() {
    let parsed = unsafe { Descriptor::from_raw(&edgehub_plugin_descriptor) }.unwrap();

    assert_eq!(parsed.name, "counter");
    assert_eq!(parsed.version, "0.2.0");
    assert_eq!(parsed.plugin_type, PLUGIN_TYPE_STORAGE);
    assert_eq!(parsed.interface, InterfaceVersion::current());
    assert!(parsed.supports(Capabilities::COMMON));
    assert!(!parsed.supports(Capabilities::READINGS));
}

#[test]
fn test_exported_entry_points_drive_the_plugin() {
    let config = serde_json::to_vec(&json!({ "start": 41 })).unwrap();
    let mut err: *const RawError = std::ptr::null();
    let instance = unsafe { edgehub_plugin_init(config.as_ptr(), config.len(), &mut err) };
    assert!(!instance.is_null());

    let payload = serde_json::to_vec(&json!({ "table": "t", "values": {} })).unwrap();
    let mut out = RawBuf::empty();
    let rc = unsafe {
        edgehub_plugin_common_insert(instance, payload.as_ptr(), payload.len(), &mut out, &mut err)
    };
    assert_eq!(rc, 0);

    let bytes = unsafe { std::slice::from_raw_parts(out.ptr, out.len) };
    let result: Value = serde_json::from_slice(bytes).unwrap();
    assert_eq!(result, json!({ "count": 42 }));

    unsafe {
        edgehub_plugin_release(instance, out);
        edgehub_plugin_shutdown(instance);
    }
}
