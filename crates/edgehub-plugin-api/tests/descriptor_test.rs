//! Descriptor parsing tests against raw boundary structs.

use edgehub_plugin_api::{
    Capabilities, Descriptor, DescriptorError, InterfaceVersion, RawDescriptor,
    PLUGIN_TYPE_STORAGE,
};

fn raw(name: &str, version: &str, options: u32, plugin_type: &str, interface: &str) -> RawDescriptor {
    RawDescriptor {
        name: name.as_ptr(),
        name_len: name.len(),
        version: version.as_ptr(),
        version_len: version.len(),
        options,
        plugin_type: plugin_type.as_ptr(),
        plugin_type_len: plugin_type.len(),
        interface: interface.as_ptr(),
        interface_len: interface.len(),
    }
}

#[test]
fn test_parse_storage_descriptor() {
    let raw = raw("sqlite", "1.0", 0x0003, PLUGIN_TYPE_STORAGE, "1.5");
    let parsed = unsafe { Descriptor::from_raw(&raw) }.unwrap();

    assert_eq!(parsed.name, "sqlite");
    assert_eq!(parsed.version, "1.0");
    assert_eq!(parsed.plugin_type, PLUGIN_TYPE_STORAGE);
    assert_eq!(parsed.interface, InterfaceVersion::new(1, 5));
    assert!(parsed.supports(Capabilities::COMMON));
    assert!(parsed.supports(Capabilities::READINGS));
}

#[test]
fn test_parse_copies_out_of_raw_storage() {
    let name = String::from("transient");
    let raw = raw(&name, "0.1", 0x0001, PLUGIN_TYPE_STORAGE, "1.0");
    let parsed = unsafe { Descriptor::from_raw(&raw) }.unwrap();
    drop(name);
    assert_eq!(parsed.name, "transient");
}

#[test]
fn test_missing_name_is_rejected() {
    let mut raw = raw("x", "1.0", 0, PLUGIN_TYPE_STORAGE, "1.0");
    raw.name = std::ptr::null();
    raw.name_len = 0;

    let err = unsafe { Descriptor::from_raw(&raw) }.unwrap_err();
    assert!(matches!(err, DescriptorError::MissingField("name")));
}

#[test]
fn test_bad_interface_string_is_rejected() {
    let raw = raw("x", "1.0", 0, PLUGIN_TYPE_STORAGE, "one.five");
    let err = unsafe { Descriptor::from_raw(&raw) }.unwrap_err();
    assert!(matches!(err, DescriptorError::InvalidInterface(_)));
}

#[test]
fn test_reserved_option_bits_survive_parsing() {
    let raw = raw("x", "1.0", 0x00F1, PLUGIN_TYPE_STORAGE, "1.0");
    let parsed = unsafe { Descriptor::from_raw(&raw) }.unwrap();

    assert_eq!(parsed.options.bits(), 0x00F1);
    assert!(parsed.supports(Capabilities::COMMON));
    assert!(!parsed.supports(Capabilities::READINGS));
}
