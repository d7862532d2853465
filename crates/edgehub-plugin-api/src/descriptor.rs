//! Plugin descriptor.
//!
//! Every plugin binary exports a static named `edgehub_plugin_descriptor`
//! (see [`crate::abi::DESCRIPTOR_SYMBOL`]) describing itself before any
//! instance exists. The host reads the descriptor, decides compatibility,
//! and only then resolves the rest of the call table.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::capabilities::Capabilities;

/// Interface version this revision of the ABI crate describes.
///
/// Plugins built with the SDK advertise it; the host refuses descriptors it
/// cannot support before any handle is created.
pub const PLUGIN_INTERFACE_VERSION: &str = "1.0";

/// Type tag for storage plugins. Matched exactly, case-sensitively.
///
/// The type tag is an open string set: future plugin kinds reuse the same
/// descriptor/handle/error skeleton under a new tag.
pub const PLUGIN_TYPE_STORAGE: &str = "storage";

/// Raw descriptor exported by plugin binaries.
///
/// All string fields are pointer + length pairs into memory owned by the
/// plugin for the lifetime of the loaded module.
#[repr(C)]
pub struct RawDescriptor {
    /// Human-readable plugin name.
    pub name: *const u8,
    pub name_len: usize,

    /// Plugin release version, opaque to the host beyond display.
    pub version: *const u8,
    pub version_len: usize,

    /// Capability bit field. See [`Capabilities`] for the layout.
    pub options: u32,

    /// Plugin type tag selecting the call-table shape.
    pub plugin_type: *const u8,
    pub plugin_type_len: usize,

    /// ABI interface version the plugin was built against ("MAJOR.MINOR").
    pub interface: *const u8,
    pub interface_len: usize,
}

// SAFETY: the pointers reference immutable, 'static string data baked into
// the plugin binary. The struct is only ever read.
unsafe impl Sync for RawDescriptor {}

/// Two-component ABI interface version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceVersion {
    pub major: u32,
    pub minor: u32,
}

impl InterfaceVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The interface version matching [`PLUGIN_INTERFACE_VERSION`].
    pub const fn current() -> Self {
        Self::new(1, 0)
    }

    /// Pure compatibility predicate.
    ///
    /// A plugin interface is supported when the major version matches the
    /// host's and the minor version does not exceed it.
    pub const fn is_supported_by(&self, host: &InterfaceVersion) -> bool {
        self.major == host.major && self.minor <= host.minor
    }
}

impl FromStr for InterfaceVersion {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DescriptorError::InvalidInterface(s.to_string());
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl Display for InterfaceVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Parsed plugin descriptor with owned strings.
///
/// Created once at module load, owned by the loader for the module's
/// lifetime. Serializable so hosts can report loaded plugins as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    /// Human-readable name, unique within a running host for diagnostics.
    pub name: String,

    /// Plugin release version string, opaque to the host.
    pub version: String,

    /// Negotiated capability set, reserved bits preserved.
    pub options: Capabilities,

    /// Call-table shape tag, e.g. [`PLUGIN_TYPE_STORAGE`].
    pub plugin_type: String,

    /// Interface version the plugin was built against.
    pub interface: InterfaceVersion,
}

impl Descriptor {
    /// Build a descriptor directly, for in-process (builtin) plugins.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        options: Capabilities,
        plugin_type: impl Into<String>,
        interface: InterfaceVersion,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            options,
            plugin_type: plugin_type.into(),
            interface,
        }
    }

    /// Parse a raw descriptor, copying every field out of plugin-owned
    /// storage.
    ///
    /// # Safety
    /// The raw descriptor's pointer/length pairs must reference valid
    /// memory for the duration of the call.
    pub unsafe fn from_raw(raw: &RawDescriptor) -> Result<Self, DescriptorError> {
        let extract = |ptr: *const u8, len: usize, field: &'static str| {
            if ptr.is_null() || len == 0 {
                return Err(DescriptorError::MissingField(field));
            }
            let slice = unsafe { std::slice::from_raw_parts(ptr, len) };
            String::from_utf8(slice.to_vec()).map_err(|_| DescriptorError::InvalidUtf8(field))
        };

        let name = extract(raw.name, raw.name_len, "name")?;
        let version = extract(raw.version, raw.version_len, "version")?;
        let plugin_type = extract(raw.plugin_type, raw.plugin_type_len, "type")?;
        let interface = extract(raw.interface, raw.interface_len, "interface")?.parse()?;

        Ok(Self {
            name,
            version,
            options: Capabilities::from_options(raw.options),
            plugin_type,
            interface,
        })
    }

    /// Pure bit test against the negotiated capability set.
    pub fn supports(&self, capability: Capabilities) -> bool {
        self.options.supports(capability)
    }
}

impl Display for Descriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} ({}, interface {})",
            self.name, self.version, self.plugin_type, self.interface
        )
    }
}

/// Descriptor parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("missing required descriptor field: {0}")]
    MissingField(&'static str),

    #[error("invalid UTF-8 in descriptor field '{0}'")]
    InvalidUtf8(&'static str),

    #[error("invalid interface version '{0}': expected MAJOR.MINOR")]
    InvalidInterface(String),
}
