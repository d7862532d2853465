//! Module loading error paths.
//!
//! These tests exercise loading failures on real files: missing paths,
//! files that are not plugin libraries, and libraries the dynamic linker
//! rejects. Loading failures are always fatal to the attempt and distinct
//! from interface mismatches.

use std::io::Write;

use edgehub_plugin_host::{Error, LoadError, PluginModule, PluginRegistry};

#[test]
fn test_load_nonexistent_path() {
    let err = PluginModule::load("/nonexistent/plugins/storage.so").unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::NotFound(_))));
}

#[test]
fn test_load_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = PluginModule::load(dir.path()).unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::InvalidFile { .. })));
}

#[test]
fn test_load_wrong_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plugin.txt");
    std::fs::File::create(&path).unwrap();

    let err = PluginModule::load(&path).unwrap_err();
    match err {
        Error::Load(LoadError::InvalidFile { reason, .. }) => {
            assert!(reason.contains("library"), "unexpected reason: {reason}");
        }
        other => panic!("expected InvalidFile, got: {other}"),
    }
}

#[cfg(target_os = "linux")]
#[test]
fn test_load_garbage_library_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.so");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"this is not an ELF shared object").unwrap();
    drop(file);

    let err = PluginModule::load(&path).unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::Open { .. })));
}

#[test]
fn test_registry_load_propagates_load_errors() {
    let registry = PluginRegistry::new();
    let err = registry.load("/nonexistent/plugins/storage.so").unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::NotFound(_))));
    assert!(registry.modules().is_empty());
    assert_eq!(registry.live_handles(), 0);
}
